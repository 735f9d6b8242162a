use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

use super::waiting::CancelSignal;
use crate::collaborators::{
    EligibilityCheck, InvoiceGenerator, PaymentChannel, RecordedEligibility, RejectedOrderStore,
    StepExecutor, StepPlanner, TechnicianDirectory,
};
use crate::config::WorkflowConfig;
use crate::errors::WorkflowError;
use crate::observability::WorkflowMetrics;
use crate::order::{
    InProgress, Invalid, InvoiceId, New, OrderIntake, OrderState, Paid, RepairOrder, Stage,
    StateKind, Valid, WaitingForPayment, WorkDone, WorkflowState,
};
use crate::telemetry::{create_order_span, generate_correlation_id};

/// Terminal result of running an order through the workflow
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Paid(RepairOrder<Paid>),
    Rejected(RepairOrder<Invalid>),
}

impl Outcome {
    pub fn order_number(&self) -> u64 {
        match self {
            Outcome::Paid(order) => order.order_number(),
            Outcome::Rejected(order) => order.order_number(),
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Outcome::Paid(_))
    }

    pub fn invoice(&self) -> Option<&InvoiceId> {
        match self {
            Outcome::Paid(order) => Some(order.state().invoice()),
            Outcome::Rejected(_) => None,
        }
    }

    pub fn rejection_reasons(&self) -> Option<&[String]> {
        match self {
            Outcome::Paid(_) => None,
            Outcome::Rejected(order) => Some(order.state().validation_errors()),
        }
    }

    /// Erased form, ready to serialize
    pub fn into_snapshot(self) -> RepairOrder<OrderState> {
        match self {
            Outcome::Paid(order) => order.erase(),
            Outcome::Rejected(order) => order.erase(),
        }
    }
}

/// Drives repair orders from `New` to a terminal state.
///
/// Cheap to clone; every clone shares the same collaborators and metrics,
/// so one instance can process many orders concurrently.
#[derive(Clone)]
pub struct RepairWorkflow {
    pub(super) eligibility: Arc<dyn EligibilityCheck>,
    pub(super) technicians: Arc<dyn TechnicianDirectory>,
    pub(super) planner: Arc<dyn StepPlanner>,
    pub(super) executor: Arc<dyn StepExecutor>,
    pub(super) invoices: Arc<dyn InvoiceGenerator>,
    pub(super) payments: Arc<dyn PaymentChannel>,
    pub(super) rejected: Arc<dyn RejectedOrderStore>,
    pub(super) config: WorkflowConfig,
    pub(super) metrics: Arc<WorkflowMetrics>,
    pub(super) cancel: CancelSignal,
}

impl std::fmt::Debug for RepairWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairWorkflow")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl RepairWorkflow {
    pub fn builder() -> RepairWorkflowBuilder {
        RepairWorkflowBuilder::default()
    }

    /// Same workflow, stopped early once `true` is published on `receiver`
    pub fn with_cancellation(mut self, receiver: watch::Receiver<bool>) -> Self {
        self.cancel = CancelSignal::new(receiver);
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn metrics(&self) -> &WorkflowMetrics {
        &self.metrics
    }

    /// Run a new order through validation, planning, assignment, work,
    /// invoicing and payment.
    ///
    /// A rejected order is handed to the rejected-order store and returned
    /// as `Outcome::Rejected`; none of the later collaborators see it.
    pub async fn process(&self, order: RepairOrder<New>) -> Result<Outcome, WorkflowError> {
        let span = create_order_span(order.order_number(), &generate_correlation_id());
        self.metrics.record_started();

        let result = async {
            info!(
                order_number = order.order_number(),
                vehicle = order.vehicle(),
                "Processing repair order"
            );
            self.run_from_new(order).await
        }
        .instrument(span)
        .await;

        self.record_result(&result);
        result
    }

    /// Continue an order from a snapshot.
    ///
    /// Picks up at whatever stage the snapshot's state calls for. An
    /// `in_progress` snapshot keeps its technician and remaining steps; the
    /// planner is not consulted again. Terminal snapshots are returned as
    /// they are.
    pub async fn resume(&self, order: RepairOrder<OrderState>) -> Result<Outcome, WorkflowError> {
        let kind = order.state().kind();
        match kind {
            StateKind::Paid => return Ok(Outcome::Paid(restore(order)?)),
            StateKind::Invalid => return Ok(Outcome::Rejected(restore(order)?)),
            _ => {}
        }

        let span = create_order_span(order.order_number(), &generate_correlation_id());
        self.metrics.record_started();

        let result = async {
            info!(
                order_number = order.order_number(),
                state = %kind,
                "Resuming repair order"
            );
            match kind {
                StateKind::New => self.run_from_new(restore(order)?).await,
                StateKind::Valid => self.run_from_valid(restore(order)?).await,
                StateKind::InProgress => self.run_from_in_progress(restore(order)?).await,
                StateKind::WorkDone => self.run_from_work_done(restore(order)?).await,
                StateKind::WaitingForPayment => self.run_from_waiting(restore(order)?).await,
                StateKind::Invalid | StateKind::Paid => {
                    Err(WorkflowError::wrong_state(StateKind::New, order))
                }
            }
        }
        .instrument(span)
        .await;

        self.record_result(&result);
        result
    }

    /// JSON entry point: an intake document in, the terminal snapshot out
    pub async fn process_json(&self, intake: &str) -> Result<String, WorkflowError> {
        let intake: OrderIntake = serde_json::from_str(intake)?;
        let outcome = self.process(intake.into()).await?;
        Ok(serde_json::to_string(&outcome.into_snapshot())?)
    }

    async fn run_from_new(&self, order: RepairOrder<New>) -> Result<Outcome, WorkflowError> {
        match self.validate(order) {
            Ok(valid) => self.run_from_valid(valid).await,
            Err(invalid) => {
                self.store_rejected(&invalid).await;
                Ok(Outcome::Rejected(invalid))
            }
        }
    }

    async fn run_from_valid(&self, order: RepairOrder<Valid>) -> Result<Outcome, WorkflowError> {
        let steps = match self.planner.compute_steps(&order) {
            Ok(steps) => steps,
            Err(source) => return Err(WorkflowError::collaborator(Stage::Planning, source, order)),
        };
        let in_progress = self.assign(order, steps).await?;
        self.run_from_in_progress(in_progress).await
    }

    async fn run_from_in_progress(
        &self,
        order: RepairOrder<InProgress>,
    ) -> Result<Outcome, WorkflowError> {
        let done = self.work(order).await?;
        self.run_from_work_done(done).await
    }

    async fn run_from_work_done(
        &self,
        order: RepairOrder<WorkDone>,
    ) -> Result<Outcome, WorkflowError> {
        let waiting = self.invoice(order).await?;
        self.run_from_waiting(waiting).await
    }

    async fn run_from_waiting(
        &self,
        order: RepairOrder<WaitingForPayment>,
    ) -> Result<Outcome, WorkflowError> {
        let paid = self.collect_payment(order).await?;
        Ok(Outcome::Paid(paid))
    }

    /// A store failure does not change the outcome; the order stays rejected.
    async fn store_rejected(&self, order: &RepairOrder<Invalid>) {
        let snapshot = order.clone().erase();
        if let Err(e) = self.rejected.store_rejected(&snapshot).await {
            warn!(
                order_number = order.order_number(),
                error = %e,
                "Failed to store rejected order"
            );
        }
    }

    fn record_result(&self, result: &Result<Outcome, WorkflowError>) {
        match result {
            Ok(Outcome::Paid(order)) => {
                self.metrics.record_paid();
                info!(
                    order_number = order.order_number(),
                    invoice = %order.state().invoice(),
                    "Repair order paid"
                );
            }
            Ok(Outcome::Rejected(_)) => self.metrics.record_rejected(),
            Err(e) => {
                self.metrics.record_failed();
                error!(error = %e, "Repair order stopped");
            }
        }

        if self.config.observability.metrics_enabled {
            self.metrics.log_stats();
        }
    }
}

fn restore<S: WorkflowState>(
    order: RepairOrder<OrderState>,
) -> Result<RepairOrder<S>, WorkflowError> {
    order
        .restore::<S>()
        .map_err(|order| WorkflowError::wrong_state(S::KIND, order))
}

/// Collects collaborators for a [`RepairWorkflow`].
///
/// Eligibility defaults to the flags recorded on the customer and the
/// configuration to [`WorkflowConfig::default`]; every other collaborator
/// is required.
#[derive(Default)]
pub struct RepairWorkflowBuilder {
    eligibility: Option<Arc<dyn EligibilityCheck>>,
    technicians: Option<Arc<dyn TechnicianDirectory>>,
    planner: Option<Arc<dyn StepPlanner>>,
    executor: Option<Arc<dyn StepExecutor>>,
    invoices: Option<Arc<dyn InvoiceGenerator>>,
    payments: Option<Arc<dyn PaymentChannel>>,
    rejected: Option<Arc<dyn RejectedOrderStore>>,
    config: Option<WorkflowConfig>,
    metrics: Option<Arc<WorkflowMetrics>>,
    cancel: Option<CancelSignal>,
}

impl RepairWorkflowBuilder {
    pub fn eligibility(mut self, eligibility: Arc<dyn EligibilityCheck>) -> Self {
        self.eligibility = Some(eligibility);
        self
    }

    pub fn technicians(mut self, technicians: Arc<dyn TechnicianDirectory>) -> Self {
        self.technicians = Some(technicians);
        self
    }

    pub fn planner(mut self, planner: Arc<dyn StepPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn invoices(mut self, invoices: Arc<dyn InvoiceGenerator>) -> Self {
        self.invoices = Some(invoices);
        self
    }

    pub fn payments(mut self, payments: Arc<dyn PaymentChannel>) -> Self {
        self.payments = Some(payments);
        self
    }

    pub fn rejected_store(mut self, rejected: Arc<dyn RejectedOrderStore>) -> Self {
        self.rejected = Some(rejected);
        self
    }

    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share counters with another workflow
    pub fn metrics(mut self, metrics: Arc<WorkflowMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<RepairWorkflow, WorkflowError> {
        Ok(RepairWorkflow {
            eligibility: self
                .eligibility
                .unwrap_or_else(|| Arc::new(RecordedEligibility)),
            technicians: self
                .technicians
                .ok_or(WorkflowError::MissingCollaborator("technician directory"))?,
            planner: self
                .planner
                .ok_or(WorkflowError::MissingCollaborator("step planner"))?,
            executor: self
                .executor
                .ok_or(WorkflowError::MissingCollaborator("step executor"))?,
            invoices: self
                .invoices
                .ok_or(WorkflowError::MissingCollaborator("invoice generator"))?,
            payments: self
                .payments
                .ok_or(WorkflowError::MissingCollaborator("payment channel"))?,
            rejected: self
                .rejected
                .ok_or(WorkflowError::MissingCollaborator("rejected order store"))?,
            config: self.config.unwrap_or_default(),
            metrics: self.metrics.unwrap_or_default(),
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}
