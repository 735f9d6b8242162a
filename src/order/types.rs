// Core types for the repair order workflow

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Reason recorded when the customer still owes the shop money
pub const OUTSTANDING_DEBT_REASON: &str = "Customer has outstanding debt";
/// Reason recorded when the customer is banned
pub const BANNED_REASON: &str = "Customer is banned from the shop";

/// Customer referenced by an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Customer {
    pub has_outstanding_debt: bool,
    pub is_banned: bool,
}

impl Customer {
    pub fn new(has_outstanding_debt: bool, is_banned: bool) -> Self {
        Self {
            has_outstanding_debt,
            is_banned,
        }
    }
}

/// Answer of the eligibility check for one customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CustomerStanding {
    pub has_outstanding_debt: bool,
    pub is_banned: bool,
}

impl CustomerStanding {
    pub fn is_eligible(&self) -> bool {
        !self.has_outstanding_debt && !self.is_banned
    }

    /// Human-readable rejection reasons, debt before ban
    pub fn reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if self.has_outstanding_debt {
            reasons.push(OUTSTANDING_DEBT_REASON.to_string());
        }
        if self.is_banned {
            reasons.push(BANNED_REASON.to_string());
        }
        reasons
    }
}

impl From<&Customer> for CustomerStanding {
    fn from(customer: &Customer) -> Self {
        Self {
            has_outstanding_debt: customer.has_outstanding_debt,
            is_banned: customer.is_banned,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Technician(pub String);

impl Technician {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Technician {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl fmt::Display for Technician {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of repair work, e.g. "paint panel"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Step(pub String);

impl Step {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }

    pub fn description(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Step {
    fn from(description: &str) -> Self {
        Self::new(description)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque invoice identifier; its shape is never checked
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub String);

impl InvoiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for InvoiceId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A repair order in workflow state `S`.
///
/// Identity fields are fixed at creation. Every transition consumes the
/// order and hands back a new value carrying the successor state, so a
/// stale state can never be observed or advanced twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairOrder<S> {
    pub(crate) order_number: u64,
    pub(crate) damage_description: Option<String>,
    pub(crate) vehicle: String,
    pub(crate) customer: Customer,
    #[serde(flatten)]
    pub(crate) state: S,
}

impl RepairOrder<New> {
    pub fn new(
        order_number: u64,
        vehicle: impl Into<String>,
        damage_description: Option<String>,
        customer: Customer,
    ) -> Self {
        Self {
            order_number,
            damage_description,
            vehicle: vehicle.into(),
            customer,
            state: New,
        }
    }
}

impl<S> RepairOrder<S> {
    pub fn order_number(&self) -> u64 {
        self.order_number
    }

    pub fn damage_description(&self) -> Option<&str> {
        self.damage_description.as_deref()
    }

    pub fn vehicle(&self) -> &str {
        &self.vehicle
    }

    pub fn customer(&self) -> &Customer {
        &self.customer
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Move the identity fields into an order carrying a state derived from the current one
    pub(crate) fn update_state<N>(self, update: impl FnOnce(S) -> N) -> RepairOrder<N> {
        RepairOrder {
            order_number: self.order_number,
            damage_description: self.damage_description,
            vehicle: self.vehicle,
            customer: self.customer,
            state: update(self.state),
        }
    }

    pub(crate) fn with_state<N>(self, state: N) -> RepairOrder<N> {
        self.update_state(|_| state)
    }
}

/// Intake payload for creating a new order from JSON
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderIntake {
    pub order_number: u64,
    #[serde(default)]
    pub damage_description: Option<String>,
    pub vehicle: String,
    pub customer: Customer,
}

impl From<OrderIntake> for RepairOrder<New> {
    fn from(intake: OrderIntake) -> Self {
        RepairOrder::new(
            intake.order_number,
            intake.vehicle,
            intake.damage_description,
            intake.customer,
        )
    }
}

// Typestate markers. Each carries only the data meaningful at that point.

/// Initial, unvalidated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct New;

/// Passed the eligibility check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Valid;

/// Terminal rejection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalid {
    pub(crate) validation_errors: Vec<String>,
}

impl Invalid {
    /// Never empty
    pub fn validation_errors(&self) -> &[String] {
        &self.validation_errors
    }
}

/// Work underway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InProgress {
    pub(crate) assigned_technician: Technician,
    pub(crate) steps_left: VecDeque<Step>,
}

impl InProgress {
    pub fn assigned_technician(&self) -> &Technician {
        &self.assigned_technician
    }

    /// Remaining steps in execution order
    pub fn steps_left(&self) -> &VecDeque<Step> {
        &self.steps_left
    }
}

/// All steps completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkDone;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingForPayment {
    pub(crate) invoice: InvoiceId,
}

impl WaitingForPayment {
    pub fn invoice(&self) -> &InvoiceId {
        &self.invoice
    }
}

/// Terminal success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paid {
    pub(crate) invoice: InvoiceId,
}

impl Paid {
    pub fn invoice(&self) -> &InvoiceId {
        &self.invoice
    }
}
