use std::time::Duration;
use thiserror::Error;

use crate::order::{InvoiceId, OrderState, RepairOrder, Stage, StateKind, Step, WorkflowState};

/// Failures that stop a workflow before it reaches a terminal state.
///
/// Rejection by validation is not an error; it is an outcome. Variants that
/// interrupt a running order carry the order as it stood, so callers can
/// persist it or hand it back to `RepairWorkflow::resume`.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(
        "order {}: no idle technician after {attempts} polls over {waited:?}",
        .order.order_number()
    )]
    TechnicianUnavailable {
        waited: Duration,
        attempts: u32,
        order: Box<RepairOrder<OrderState>>,
    },

    #[error(
        "order {}: payment for invoice {invoice} not confirmed after {attempts} checks over {waited:?}",
        .order.order_number()
    )]
    PaymentExpired {
        invoice: InvoiceId,
        waited: Duration,
        attempts: u32,
        order: Box<RepairOrder<OrderState>>,
    },

    #[error("order {}: cancelled during {stage}", .order.order_number())]
    Cancelled {
        stage: Stage,
        order: Box<RepairOrder<OrderState>>,
    },

    #[error("order {}: step '{step}' failed after {attempts} attempts", .order.order_number())]
    StepFailed {
        step: Step,
        attempts: u32,
        #[source]
        source: anyhow::Error,
        order: Box<RepairOrder<OrderState>>,
    },

    #[error("order {}: {stage} collaborator failed", .order.order_number())]
    Collaborator {
        stage: Stage,
        #[source]
        source: anyhow::Error,
        order: Box<RepairOrder<OrderState>>,
    },

    #[error("order {}: expected state {expected}, found {found}", .order.order_number())]
    WrongState {
        expected: StateKind,
        found: StateKind,
        order: Box<RepairOrder<OrderState>>,
    },

    #[error("workflow is missing the {0} collaborator")]
    MissingCollaborator(&'static str),

    #[error("order JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    pub(crate) fn cancelled<S: WorkflowState>(stage: Stage, order: RepairOrder<S>) -> Self {
        WorkflowError::Cancelled {
            stage,
            order: Box::new(order.erase()),
        }
    }

    pub(crate) fn collaborator<S: WorkflowState>(
        stage: Stage,
        source: anyhow::Error,
        order: RepairOrder<S>,
    ) -> Self {
        WorkflowError::Collaborator {
            stage,
            source,
            order: Box::new(order.erase()),
        }
    }

    pub(crate) fn wrong_state(expected: StateKind, order: RepairOrder<OrderState>) -> Self {
        WorkflowError::WrongState {
            expected,
            found: order.state().kind(),
            order: Box::new(order),
        }
    }

    /// The order as it stood when the workflow stopped
    pub fn order(&self) -> Option<&RepairOrder<OrderState>> {
        match self {
            WorkflowError::TechnicianUnavailable { order, .. }
            | WorkflowError::PaymentExpired { order, .. }
            | WorkflowError::Cancelled { order, .. }
            | WorkflowError::StepFailed { order, .. }
            | WorkflowError::Collaborator { order, .. }
            | WorkflowError::WrongState { order, .. } => Some(order),
            WorkflowError::MissingCollaborator(_) | WorkflowError::Serialization(_) => None,
        }
    }

    pub fn into_order(self) -> Option<RepairOrder<OrderState>> {
        match self {
            WorkflowError::TechnicianUnavailable { order, .. }
            | WorkflowError::PaymentExpired { order, .. }
            | WorkflowError::Cancelled { order, .. }
            | WorkflowError::StepFailed { order, .. }
            | WorkflowError::Collaborator { order, .. }
            | WorkflowError::WrongState { order, .. } => Some(*order),
            WorkflowError::MissingCollaborator(_) | WorkflowError::Serialization(_) => None,
        }
    }

    /// Waits that ran out; retrying later may succeed
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            WorkflowError::TechnicianUnavailable { .. } | WorkflowError::PaymentExpired { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Customer, New};

    #[test]
    fn test_error_message_names_order_and_stage() {
        let order = RepairOrder::<New>::new(12, "VIN-12", None, Customer::default());
        let error = WorkflowError::cancelled(Stage::Assignment, order);
        assert_eq!(error.to_string(), "order 12: cancelled during assignment");
        assert_eq!(error.order().map(|o| o.state().kind()), Some(StateKind::New));
    }

    #[test]
    fn test_collaborator_error_keeps_source() {
        let order = RepairOrder::<New>::new(5, "VIN-5", None, Customer::default());
        let error = WorkflowError::collaborator(
            Stage::Invoicing,
            anyhow::anyhow!("printer on fire"),
            order,
        );
        let source = std::error::Error::source(&error).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("printer on fire"));
        assert!(!error.is_timeout());
        assert_eq!(error.into_order().map(|o| o.order_number()), Some(5));
    }
}
