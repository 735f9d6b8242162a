// Repair workflow orchestration
//
// `stages` moves an order one state forward using the collaborators,
// `driver` chains the stages and `waiting` bounds the two external waits.

pub mod driver;
pub mod stages;
pub mod waiting;


pub use driver::{Outcome, RepairWorkflow, RepairWorkflowBuilder};
pub use waiting::{wait_for, CancelSignal, WaitOutcome, WaitPolicy};
