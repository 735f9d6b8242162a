// Repair order aggregate
//
// `types` holds the order and its typestate markers, `transitions` the pure
// moves between them and `states` the erased runtime form.

pub mod states;
pub mod transitions;
pub mod types;

pub use states::{OrderState, Stage, StateKind, WorkflowState};
pub use types::{
    Customer, CustomerStanding, InProgress, Invalid, InvoiceId, New, OrderIntake, Paid,
    RepairOrder, Step, Technician, Valid, WaitingForPayment, WorkDone, BANNED_REASON,
    OUTSTANDING_DEBT_REASON,
};
