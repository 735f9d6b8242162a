use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Counters for one workflow instance, shared by every order it processes
#[derive(Debug, Default)]
pub struct WorkflowMetrics {
    pub orders_started: AtomicU64,
    pub orders_paid: AtomicU64,
    pub orders_rejected: AtomicU64,
    pub orders_failed: AtomicU64,
    pub technician_polls: AtomicU64,
    pub payment_checks: AtomicU64,
    pub steps_executed: AtomicU64,
    pub step_retries: AtomicU64,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.orders_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_paid(&self) {
        self.orders_paid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.orders_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.orders_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_technician_polls(&self, polls: u32) {
        self.technician_polls
            .fetch_add(u64::from(polls), Ordering::Relaxed);
    }

    pub fn record_payment_checks(&self, checks: u32) {
        self.payment_checks
            .fetch_add(u64::from(checks), Ordering::Relaxed);
    }

    pub fn record_step(&self) {
        self.steps_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step_retry(&self) {
        self.step_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> WorkflowStats {
        WorkflowStats {
            orders_started: self.orders_started.load(Ordering::Relaxed),
            orders_paid: self.orders_paid.load(Ordering::Relaxed),
            orders_rejected: self.orders_rejected.load(Ordering::Relaxed),
            orders_failed: self.orders_failed.load(Ordering::Relaxed),
            technician_polls: self.technician_polls.load(Ordering::Relaxed),
            payment_checks: self.payment_checks.load(Ordering::Relaxed),
            steps_executed: self.steps_executed.load(Ordering::Relaxed),
            step_retries: self.step_retries.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Workflow metrics: started={}, paid={}, rejected={}, failed={}, technician_polls={}, payment_checks={}, steps={}, step_retries={}",
            stats.orders_started,
            stats.orders_paid,
            stats.orders_rejected,
            stats.orders_failed,
            stats.technician_polls,
            stats.payment_checks,
            stats.steps_executed,
            stats.step_retries
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkflowStats {
    pub orders_started: u64,
    pub orders_paid: u64,
    pub orders_rejected: u64,
    pub orders_failed: u64,
    pub technician_polls: u64,
    pub payment_checks: u64,
    pub steps_executed: u64,
    pub step_retries: u64,
}

/// Time a stage and log its duration
pub struct OperationTimer {
    operation: &'static str,
    order_number: u64,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str, order_number: u64) -> Self {
        Self {
            operation,
            order_number,
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            order_number = self.order_number,
            duration_ms = duration.as_millis() as u64,
            "Stage completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_reflect_recorded_events() {
        let metrics = WorkflowMetrics::new();
        metrics.record_started();
        metrics.record_technician_polls(3);
        metrics.record_step();
        metrics.record_step_retry();
        metrics.record_paid();

        let stats = metrics.get_stats();
        assert_eq!(stats.orders_started, 1);
        assert_eq!(stats.technician_polls, 3);
        assert_eq!(stats.steps_executed, 1);
        assert_eq!(stats.step_retries, 1);
        assert_eq!(stats.orders_paid, 1);
        assert_eq!(stats.orders_failed, 0);
    }
}
