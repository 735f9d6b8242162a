// The five pipeline stages. Each consumes an order in the state it needs
// and returns it in the successor state, or stops with a `WorkflowError`
// that carries the order as it stood.

use tracing::{debug, info, warn};

use super::driver::RepairWorkflow;
use super::waiting::{wait_for, WaitOutcome, WaitPolicy};
use crate::errors::WorkflowError;
use crate::observability::OperationTimer;
use crate::order::{
    InProgress, Invalid, New, Paid, RepairOrder, Stage, StateKind, Step, Valid, WaitingForPayment,
    WorkDone,
};

impl RepairWorkflow {
    /// Decide eligibility from the customer's standing
    pub fn validate(
        &self,
        order: RepairOrder<New>,
    ) -> Result<RepairOrder<Valid>, RepairOrder<Invalid>> {
        let standing = self.eligibility.standing(order.customer());
        let validated = order.validate(&standing);

        match &validated {
            Ok(valid) => info!(order_number = valid.order_number(), "Order validated"),
            Err(invalid) => info!(
                order_number = invalid.order_number(),
                reasons = ?invalid.state().validation_errors(),
                "Order rejected"
            ),
        }
        validated
    }

    /// Wait for an idle technician and start work with the given steps.
    ///
    /// The technician returned by the successful poll is the one assigned;
    /// empty polls leave no trace on the order.
    pub async fn assign(
        &self,
        order: RepairOrder<Valid>,
        steps: Vec<Step>,
    ) -> Result<RepairOrder<InProgress>, WorkflowError> {
        let timer = OperationTimer::new("assignment", order.order_number());
        let policy = WaitPolicy::from(&self.config.assignment);
        let mut cancel = self.cancel.clone();
        let technicians = self.technicians.as_ref();

        let waited = wait_for(&policy, &mut cancel, move || {
            technicians.find_idle_technician()
        })
        .await;

        let outcome = match waited {
            Ok(outcome) => outcome,
            Err(source) => return Err(WorkflowError::collaborator(Stage::Assignment, source, order)),
        };

        match outcome {
            WaitOutcome::Ready {
                value: technician,
                attempts,
            } => {
                self.metrics.record_technician_polls(attempts);
                info!(
                    order_number = order.order_number(),
                    technician = %technician,
                    steps = steps.len(),
                    polls = attempts,
                    "Technician assigned"
                );
                timer.finish();
                Ok(order.start_progress(technician, steps))
            }
            WaitOutcome::TimedOut { waited, attempts } => {
                self.metrics.record_technician_polls(attempts);
                warn!(
                    order_number = order.order_number(),
                    waited_secs = waited.as_secs(),
                    polls = attempts,
                    "No idle technician before deadline"
                );
                Err(WorkflowError::TechnicianUnavailable {
                    waited,
                    attempts,
                    order: Box::new(order.erase()),
                })
            }
            WaitOutcome::Cancelled { attempts } => {
                self.metrics.record_technician_polls(attempts);
                Err(WorkflowError::cancelled(Stage::Assignment, order))
            }
        }
    }

    /// Execute the remaining steps front to back.
    ///
    /// A failing step is retried up to `work.max_step_attempts` attempts in
    /// total. When it keeps failing the order is handed back with the failed
    /// step still at the front and every completed step removed.
    pub async fn work(
        &self,
        order: RepairOrder<InProgress>,
    ) -> Result<RepairOrder<WorkDone>, WorkflowError> {
        let timer = OperationTimer::new("work", order.order_number());
        let max_attempts = self.config.work.max_step_attempts.max(1);
        let retry_delay = self.config.work.retry_delay();
        let mut cancel = self.cancel.clone();
        let mut order = order;

        while let Some(step) = order.next_step().cloned() {
            if cancel.is_cancelled() {
                return Err(WorkflowError::cancelled(Stage::Work, order));
            }

            let mut attempts = 0;
            loop {
                attempts += 1;
                let executed = self.executor.execute_step(&order, &step).await;
                match executed {
                    Ok(()) => break,
                    Err(source) if attempts >= max_attempts => {
                        warn!(
                            order_number = order.order_number(),
                            step = %step,
                            attempts,
                            error = %source,
                            "Step failed, giving up"
                        );
                        return Err(WorkflowError::StepFailed {
                            step,
                            attempts,
                            source,
                            order: Box::new(order.erase()),
                        });
                    }
                    Err(e) => {
                        self.metrics.record_step_retry();
                        warn!(
                            order_number = order.order_number(),
                            step = %step,
                            attempt = attempts,
                            error = %e,
                            "Step failed, retrying"
                        );
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                return Err(WorkflowError::cancelled(Stage::Work, order));
                            }
                            _ = tokio::time::sleep(retry_delay) => {}
                        }
                    }
                }
            }

            order.complete_next_step();
            self.metrics.record_step();
            debug!(
                order_number = order.order_number(),
                step = %step,
                steps_left = order.state().steps_left().len(),
                "Step completed"
            );
        }

        let done = order
            .finish_work()
            .map_err(|order| WorkflowError::wrong_state(StateKind::WorkDone, order.erase()))?;
        info!(order_number = done.order_number(), "Work done");
        timer.finish();
        Ok(done)
    }

    /// Issue the invoice
    pub async fn invoice(
        &self,
        order: RepairOrder<WorkDone>,
    ) -> Result<RepairOrder<WaitingForPayment>, WorkflowError> {
        let generated = self.invoices.generate_invoice(&order).await;
        match generated {
            Ok(invoice) => {
                info!(order_number = order.order_number(), invoice = %invoice, "Invoice sent");
                Ok(order.send_invoice(invoice))
            }
            Err(source) => Err(WorkflowError::collaborator(Stage::Invoicing, source, order)),
        }
    }

    /// Wait until the invoice is paid; expires after `payment.timeout_seconds`
    pub async fn collect_payment(
        &self,
        order: RepairOrder<WaitingForPayment>,
    ) -> Result<RepairOrder<Paid>, WorkflowError> {
        let timer = OperationTimer::new("payment", order.order_number());
        let policy = WaitPolicy::from(&self.config.payment);
        let mut cancel = self.cancel.clone();
        let payments = self.payments.as_ref();
        let invoice = order.state().invoice().clone();
        let invoice_ref = &invoice;

        let waited = wait_for(&policy, &mut cancel, move || async move {
            let confirmed = payments.await_confirmation(invoice_ref).await?;
            Ok::<_, anyhow::Error>(confirmed.then_some(()))
        })
        .await;

        let outcome = match waited {
            Ok(outcome) => outcome,
            Err(source) => return Err(WorkflowError::collaborator(Stage::Payment, source, order)),
        };

        match outcome {
            WaitOutcome::Ready { attempts, .. } => {
                self.metrics.record_payment_checks(attempts);
                info!(
                    order_number = order.order_number(),
                    invoice = %invoice,
                    "Payment received"
                );
                timer.finish();
                Ok(order.record_payment())
            }
            WaitOutcome::TimedOut { waited, attempts } => {
                self.metrics.record_payment_checks(attempts);
                warn!(
                    order_number = order.order_number(),
                    invoice = %invoice,
                    waited_secs = waited.as_secs(),
                    "Invoice expired unpaid"
                );
                Err(WorkflowError::PaymentExpired {
                    invoice,
                    waited,
                    attempts,
                    order: Box::new(order.erase()),
                })
            }
            WaitOutcome::Cancelled { attempts } => {
                self.metrics.record_payment_checks(attempts);
                Err(WorkflowError::cancelled(Stage::Payment, order))
            }
        }
    }
}
