// External collaborators of the repair workflow
//
// The workflow only sees these through the traits in `traits`; `memory`
// provides self-contained implementations.

pub mod memory;
pub mod traits;

pub use memory::{
    FixedStepPlanner, InMemoryRejectedStore, InstantPayment, PaymentLedger, RecordedEligibility,
    RecordingStepExecutor, RejectedOrderRecord, SequentialInvoices, TechnicianPool,
};
pub use traits::{
    EligibilityCheck, InvoiceGenerator, PaymentChannel, RejectedOrderStore, StepExecutor,
    StepPlanner, TechnicianDirectory,
};

#[cfg(any(test, feature = "testing"))]
pub use traits::{
    MockEligibilityCheck, MockInvoiceGenerator, MockPaymentChannel, MockRejectedOrderStore,
    MockStepExecutor, MockStepPlanner, MockTechnicianDirectory,
};
