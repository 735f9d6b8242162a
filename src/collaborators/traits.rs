// Traits for the external collaborators the workflow consumes.
// Implementations must be safe to share between concurrently processed orders.

use anyhow::Result;
use async_trait::async_trait;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::order::{
    Customer, CustomerStanding, InProgress, InvoiceId, OrderState, RepairOrder, Step, Technician,
    Valid, WorkDone,
};

/// Customer eligibility lookup
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait EligibilityCheck: Send + Sync {
    /// Report the facts that decide whether the customer may place an order
    fn standing(&self, customer: &Customer) -> CustomerStanding;
}

/// Technician directory
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait TechnicianDirectory: Send + Sync {
    /// Non-blocking lookup. `None` means nobody is idle right now, which is not an error.
    async fn find_idle_technician(&self) -> Result<Option<Technician>>;
}

/// Computes the ordered repair steps for an accepted order
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait StepPlanner: Send + Sync {
    fn compute_steps(&self, order: &RepairOrder<Valid>) -> Result<Vec<Step>>;
}

/// Carries out a single repair step
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute_step(&self, order: &RepairOrder<InProgress>, step: &Step) -> Result<()>;
}

/// Invoice generation
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait InvoiceGenerator: Send + Sync {
    async fn generate_invoice(&self, order: &RepairOrder<WorkDone>) -> Result<InvoiceId>;
}

/// Payment confirmation channel
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait PaymentChannel: Send + Sync {
    /// `Ok(true)` once the invoice is paid, `Ok(false)` while it is still open
    async fn await_confirmation(&self, invoice: &InvoiceId) -> Result<bool>;
}

/// Sink for rejected orders
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RejectedOrderStore: Send + Sync {
    async fn store_rejected(&self, order: &RepairOrder<OrderState>) -> Result<()>;
}
