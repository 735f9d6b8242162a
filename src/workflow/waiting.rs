// Bounded waiting for external conditions
//
// Assignment and payment both wait on something outside the workflow. The
// wait is a poll loop that can be cancelled and always ends at a deadline.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::WaitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl WaitPolicy {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }
}

impl From<&WaitConfig> for WaitPolicy {
    fn from(config: &WaitConfig) -> Self {
        Self::new(config.poll_interval(), config.timeout())
    }
}

/// Receiving side of a cancellation request.
///
/// Cancelled once the paired sender publishes `true`. A signal whose sender
/// is gone without ever sending `true` never fires.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// Signal that never fires
    pub fn never() -> Self {
        Self { receiver: None }
    }

    pub fn new(receiver: watch::Receiver<bool>) -> Self {
        Self {
            receiver: Some(receiver),
        }
    }

    /// Sender and signal pair; send `true` to cancel
    pub fn pair() -> (watch::Sender<bool>, Self) {
        let (sender, receiver) = watch::channel(false);
        (sender, Self::new(receiver))
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver
            .as_ref()
            .map(|receiver| *receiver.borrow())
            .unwrap_or(false)
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&mut self) {
        let Some(receiver) = self.receiver.as_mut() else {
            return std::future::pending().await;
        };

        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Sender dropped without cancelling
                return std::future::pending().await;
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Ready { value: T, attempts: u32 },
    TimedOut { waited: Duration, attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Probe until it yields a value, the policy's deadline passes or `cancel` fires.
///
/// `Ok(None)` from the probe means "not yet" and schedules another probe after
/// `poll_interval`. A probe error ends the wait immediately.
pub async fn wait_for<T, F, Fut>(
    policy: &WaitPolicy,
    cancel: &mut CancelSignal,
    mut probe: F,
) -> Result<WaitOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    let polled = tokio::time::timeout(
        policy.timeout,
        poll_until_ready(policy.poll_interval, cancel, &mut probe, &mut attempts),
    )
    .await;

    Ok(match polled {
        Ok(Some(value)) => WaitOutcome::Ready {
            value: value?,
            attempts,
        },
        Ok(None) => WaitOutcome::Cancelled { attempts },
        Err(_) => WaitOutcome::TimedOut {
            waited: started.elapsed(),
            attempts,
        },
    })
}

/// `None` when cancelled
async fn poll_until_ready<T, F, Fut>(
    poll_interval: Duration,
    cancel: &mut CancelSignal,
    probe: &mut F,
    attempts: &mut u32,
) -> Option<Result<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    loop {
        // Counted once the probe actually starts
        let probed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            probed = async {
                *attempts += 1;
                probe().await
            } => probed,
        };

        match probed {
            Ok(Some(value)) => return Some(Ok(value)),
            Ok(None) => {}
            Err(e) => return Some(Err(e)),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy() -> WaitPolicy {
        WaitPolicy::new(Duration::from_secs(10), Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_probe() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut cancel = CancelSignal::never();

        let outcome = wait_for(&policy(), &mut cancel, || {
            let calls = calls.clone();
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok((call == 3).then_some(call))
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::Ready { value: 3, attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_at_deadline() {
        let mut cancel = CancelSignal::never();
        let policy = WaitPolicy::new(Duration::from_secs(10), Duration::from_secs(55));

        let outcome = wait_for(&policy, &mut cancel, || async { Ok(None::<()>) })
            .await
            .unwrap();

        match outcome {
            WaitOutcome::TimedOut { waited, attempts } => {
                assert!(waited >= Duration::from_secs(55) && waited < Duration::from_secs(56));
                // probes at 0s, 10s, ..., 50s
                assert_eq!(attempts, 6);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_sleep() {
        let (sender, mut cancel) = CancelSignal::pair();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            sender.send(true).unwrap();
        });

        let outcome = wait_for(&policy(), &mut cancel, || async { Ok(None::<()>) })
            .await
            .unwrap();

        assert_eq!(outcome, WaitOutcome::Cancelled { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_skips_probe() {
        let (sender, mut cancel) = CancelSignal::pair();
        sender.send(true).unwrap();
        assert!(cancel.is_cancelled());

        let calls = Arc::new(AtomicU32::new(0));
        let outcome = wait_for(&policy(), &mut cancel, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None::<()>)
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::Cancelled { attempts: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_ends_wait() {
        let mut cancel = CancelSignal::never();

        let result = wait_for(&policy(), &mut cancel, || async {
            Err::<Option<()>, _>(anyhow!("directory offline"))
        })
        .await;

        assert_eq!(result.unwrap_err().to_string(), "directory offline");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_never_cancels() {
        let (sender, mut cancel) = CancelSignal::pair();
        drop(sender);

        let outcome = wait_for(
            &WaitPolicy::new(Duration::from_secs(1), Duration::from_secs(3)),
            &mut cancel,
            || async { Ok(None::<()>) },
        )
        .await
        .unwrap();

        assert!(matches!(outcome, WaitOutcome::TimedOut { .. }));
    }
}
