// Runtime view of the workflow states
//
// The typestate markers in `types` give compile-time legality. This module
// holds the erased form used for storage, error payloads and resuming:
// a closed, serializable sum type plus the transition graph.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use super::types::{
    InProgress, Invalid, InvoiceId, New, Paid, RepairOrder, Step, Technician, Valid,
    WaitingForPayment, WorkDone,
};

/// Name of a workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    New,
    Valid,
    Invalid,
    InProgress,
    WorkDone,
    WaitingForPayment,
    Paid,
}

impl StateKind {
    pub const ALL: [StateKind; 7] = [
        StateKind::New,
        StateKind::Valid,
        StateKind::Invalid,
        StateKind::InProgress,
        StateKind::WorkDone,
        StateKind::WaitingForPayment,
        StateKind::Paid,
    ];

    /// Legal successor states
    pub fn successors(self) -> &'static [StateKind] {
        match self {
            StateKind::New => &[StateKind::Valid, StateKind::Invalid],
            StateKind::Valid => &[StateKind::InProgress],
            StateKind::InProgress => &[StateKind::WorkDone],
            StateKind::WorkDone => &[StateKind::WaitingForPayment],
            StateKind::WaitingForPayment => &[StateKind::Paid],
            StateKind::Invalid | StateKind::Paid => &[],
        }
    }

    pub fn can_transition_to(self, next: StateKind) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StateKind::New => "new",
            StateKind::Valid => "valid",
            StateKind::Invalid => "invalid",
            StateKind::InProgress => "in_progress",
            StateKind::WorkDone => "work_done",
            StateKind::WaitingForPayment => "waiting_for_payment",
            StateKind::Paid => "paid",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage, used to say where a workflow stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validation,
    Planning,
    Assignment,
    Work,
    Invoicing,
    Payment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validation => "validation",
            Stage::Planning => "planning",
            Stage::Assignment => "assignment",
            Stage::Work => "work",
            Stage::Invoicing => "invoicing",
            Stage::Payment => "payment",
        };
        f.write_str(name)
    }
}

/// Workflow state with its payload, tagged at runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrderState {
    New,
    Valid,
    Invalid {
        validation_errors: Vec<String>,
    },
    InProgress {
        assigned_technician: Technician,
        steps_left: VecDeque<Step>,
    },
    WorkDone,
    WaitingForPayment {
        invoice: InvoiceId,
    },
    Paid {
        invoice: InvoiceId,
    },
}

impl OrderState {
    pub fn kind(&self) -> StateKind {
        match self {
            OrderState::New => StateKind::New,
            OrderState::Valid => StateKind::Valid,
            OrderState::Invalid { .. } => StateKind::Invalid,
            OrderState::InProgress { .. } => StateKind::InProgress,
            OrderState::WorkDone => StateKind::WorkDone,
            OrderState::WaitingForPayment { .. } => StateKind::WaitingForPayment,
            OrderState::Paid { .. } => StateKind::Paid,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Implemented only by the seven typestate markers
pub trait WorkflowState:
    sealed::Sealed + Into<OrderState> + TryFrom<OrderState, Error = OrderState>
{
    const KIND: StateKind;
}

macro_rules! unit_state {
    ($($marker:ident),+) => {
        $(
            impl sealed::Sealed for $marker {}

            impl WorkflowState for $marker {
                const KIND: StateKind = StateKind::$marker;
            }

            impl From<$marker> for OrderState {
                fn from(_: $marker) -> Self {
                    OrderState::$marker
                }
            }

            impl TryFrom<OrderState> for $marker {
                type Error = OrderState;

                fn try_from(state: OrderState) -> Result<Self, Self::Error> {
                    match state {
                        OrderState::$marker => Ok($marker),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

unit_state!(New, Valid, WorkDone);

impl sealed::Sealed for Invalid {}
impl WorkflowState for Invalid {
    const KIND: StateKind = StateKind::Invalid;
}

impl From<Invalid> for OrderState {
    fn from(state: Invalid) -> Self {
        OrderState::Invalid {
            validation_errors: state.validation_errors,
        }
    }
}

impl TryFrom<OrderState> for Invalid {
    type Error = OrderState;

    // A rejection without reasons is not a well-formed Invalid state
    fn try_from(state: OrderState) -> Result<Self, Self::Error> {
        match state {
            OrderState::Invalid { validation_errors } if !validation_errors.is_empty() => {
                Ok(Invalid { validation_errors })
            }
            other => Err(other),
        }
    }
}

impl sealed::Sealed for InProgress {}
impl WorkflowState for InProgress {
    const KIND: StateKind = StateKind::InProgress;
}

impl From<InProgress> for OrderState {
    fn from(state: InProgress) -> Self {
        OrderState::InProgress {
            assigned_technician: state.assigned_technician,
            steps_left: state.steps_left,
        }
    }
}

impl TryFrom<OrderState> for InProgress {
    type Error = OrderState;

    fn try_from(state: OrderState) -> Result<Self, Self::Error> {
        match state {
            OrderState::InProgress {
                assigned_technician,
                steps_left,
            } => Ok(InProgress {
                assigned_technician,
                steps_left,
            }),
            other => Err(other),
        }
    }
}

impl sealed::Sealed for WaitingForPayment {}
impl WorkflowState for WaitingForPayment {
    const KIND: StateKind = StateKind::WaitingForPayment;
}

impl From<WaitingForPayment> for OrderState {
    fn from(state: WaitingForPayment) -> Self {
        OrderState::WaitingForPayment {
            invoice: state.invoice,
        }
    }
}

impl TryFrom<OrderState> for WaitingForPayment {
    type Error = OrderState;

    fn try_from(state: OrderState) -> Result<Self, Self::Error> {
        match state {
            OrderState::WaitingForPayment { invoice } => Ok(WaitingForPayment { invoice }),
            other => Err(other),
        }
    }
}

impl sealed::Sealed for Paid {}
impl WorkflowState for Paid {
    const KIND: StateKind = StateKind::Paid;
}

impl From<Paid> for OrderState {
    fn from(state: Paid) -> Self {
        OrderState::Paid {
            invoice: state.invoice,
        }
    }
}

impl TryFrom<OrderState> for Paid {
    type Error = OrderState;

    fn try_from(state: OrderState) -> Result<Self, Self::Error> {
        match state {
            OrderState::Paid { invoice } => Ok(Paid { invoice }),
            other => Err(other),
        }
    }
}

impl<S: WorkflowState> RepairOrder<S> {
    pub fn kind(&self) -> StateKind {
        S::KIND
    }

    /// Forget the static state, keeping it as an explicit runtime tag
    pub fn erase(self) -> RepairOrder<OrderState> {
        self.update_state(Into::into)
    }
}

impl RepairOrder<OrderState> {
    /// Runtime-checked downcast to a typed order.
    ///
    /// Hands the snapshot back unchanged when it is not in state `S`. This is
    /// the fallback for data that crossed a serialization boundary; inside a
    /// single process the typed transitions make the check unnecessary.
    pub fn restore<S: WorkflowState>(self) -> Result<RepairOrder<S>, RepairOrder<OrderState>> {
        let RepairOrder {
            order_number,
            damage_description,
            vehicle,
            customer,
            state,
        } = self;

        match S::try_from(state) {
            Ok(state) => Ok(RepairOrder {
                order_number,
                damage_description,
                vehicle,
                customer,
                state,
            }),
            Err(state) => Err(RepairOrder {
                order_number,
                damage_description,
                vehicle,
                customer,
                state,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::types::Customer;

    fn new_order() -> RepairOrder<New> {
        RepairOrder::new(
            7,
            "WVW-ZZZ-1K-Z-5-W-000001",
            Some("dented door".to_string()),
            Customer::default(),
        )
    }

    #[test]
    fn test_transition_graph_is_a_dag_with_two_terminals() {
        let terminals: Vec<_> = StateKind::ALL
            .iter()
            .copied()
            .filter(|kind| kind.is_terminal())
            .collect();
        assert_eq!(terminals, vec![StateKind::Invalid, StateKind::Paid]);

        assert!(StateKind::New.can_transition_to(StateKind::Valid));
        assert!(StateKind::New.can_transition_to(StateKind::Invalid));
        assert!(!StateKind::InProgress.can_transition_to(StateKind::Valid));
        assert!(!StateKind::Valid.can_transition_to(StateKind::New));

        // Every edge moves strictly forward in declaration order, so no cycle exists
        for (index, kind) in StateKind::ALL.iter().enumerate() {
            for next in kind.successors() {
                let next_index = StateKind::ALL.iter().position(|k| k == next).unwrap();
                assert!(next_index > index, "{kind} -> {next} goes backwards");
            }
        }
    }

    #[test]
    fn test_erased_order_serializes_with_explicit_state() {
        let erased = new_order()
            .with_state(InProgress {
                assigned_technician: Technician::new("tech-1"),
                steps_left: VecDeque::from(vec![Step::from("paint panel")]),
            })
            .erase();

        let json = serde_json::to_value(&erased).unwrap();
        assert_eq!(json["state"], "in_progress");
        assert_eq!(json["order_number"], 7);
        assert_eq!(json["assigned_technician"], "tech-1");
        assert_eq!(json["steps_left"][0], "paint panel");

        let parsed: RepairOrder<OrderState> = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, erased);
    }

    #[test]
    fn test_unit_state_serializes_as_tag_only() {
        let json = serde_json::to_value(new_order().erase()).unwrap();
        assert_eq!(json["state"], "new");
        assert_eq!(json["vehicle"], "WVW-ZZZ-1K-Z-5-W-000001");
    }

    #[test]
    fn test_restore_returns_snapshot_on_mismatch() {
        let erased = new_order().with_state(Valid).erase();

        let back = erased.clone().restore::<Paid>().unwrap_err();
        assert_eq!(back, erased);

        let valid = erased.restore::<Valid>().unwrap();
        assert_eq!(valid.kind(), StateKind::Valid);
        assert_eq!(valid.order_number(), 7);
    }

    #[test]
    fn test_restore_keeps_identity_fields() {
        let customer = Customer::new(false, false);
        let erased = RepairOrder::<New>::new(31, "VIN-31", Some("bent rim".to_string()), customer)
            .with_state(InProgress {
                assigned_technician: Technician::new("tech-4"),
                steps_left: VecDeque::from(vec![Step::from("swap rim")]),
            })
            .erase();

        let restored = erased.restore::<InProgress>().unwrap();

        assert_eq!(restored.order_number(), 31);
        assert_eq!(restored.vehicle(), "VIN-31");
        assert_eq!(restored.damage_description(), Some("bent rim"));
        assert_eq!(restored.customer(), &customer);
        assert_eq!(restored.state().assigned_technician(), &Technician::new("tech-4"));
        assert_eq!(restored.next_step(), Some(&Step::from("swap rim")));
    }

    #[test]
    fn test_restore_rejects_invalid_without_reasons() {
        let erased = new_order().with_state(OrderState::Invalid {
            validation_errors: Vec::new(),
        });
        assert!(erased.restore::<Invalid>().is_err());
    }
}
