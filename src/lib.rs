//! Repair order workflow for a car repair shop.
//!
//! An order moves through `New → Valid | Invalid`, then
//! `Valid → InProgress → WorkDone → WaitingForPayment → Paid`. Each state
//! is a type parameter of [`RepairOrder`], so an operation that does not
//! apply to a state simply does not exist on it:
//!
//! ```compile_fail
//! use repair_order::{Paid, RepairOrder, RepairWorkflow};
//!
//! async fn reinvoice(workflow: &RepairWorkflow, order: RepairOrder<Paid>) {
//!     // Only an order whose work is done can be invoiced
//!     let _ = workflow.invoice(order).await;
//! }
//! ```
//!
//! Transitions are only reachable through [`RepairWorkflow`], so a state
//! always means its collaborator was consulted. Outside the crate an order
//! cannot be validated against a made-up standing or marked paid directly:
//!
//! ```compile_fail
//! use repair_order::{Customer, CustomerStanding, New, RepairOrder};
//!
//! let order = RepairOrder::<New>::new(1, "VIN-1", None, Customer::new(true, true));
//! let _ = order.validate(&CustomerStanding::default());
//! ```
//!
//! ```compile_fail
//! use repair_order::{RepairOrder, WaitingForPayment};
//!
//! fn mark_paid(order: RepairOrder<WaitingForPayment>) {
//!     let _ = order.record_payment();
//! }
//! ```
//!
//! [`RepairWorkflow`] drives an order through every stage using the
//! collaborator traits in [`collaborators`].

pub mod collaborators;
pub mod config;
pub mod errors;
pub mod observability;
pub mod order;
pub mod telemetry;
pub mod workflow;

pub use config::{config, init_config, WorkflowConfig};
pub use errors::WorkflowError;
pub use observability::{OperationTimer, WorkflowMetrics, WorkflowStats};
pub use order::{
    Customer, CustomerStanding, InProgress, Invalid, InvoiceId, New, OrderIntake, OrderState,
    Paid, RepairOrder, Stage, StateKind, Step, Technician, Valid, WaitingForPayment, WorkDone,
    WorkflowState,
};
pub use telemetry::{create_order_span, generate_correlation_id, init_telemetry};
pub use workflow::{CancelSignal, Outcome, RepairWorkflow, RepairWorkflowBuilder, WaitPolicy};
