// Pure state transitions. Each one consumes the order and returns it in
// the single legal successor state; nothing here talks to collaborators.
//
// Moves are crate-private; outside the crate an order only advances
// through the `RepairWorkflow` stages.

use super::types::{
    CustomerStanding, InProgress, Invalid, InvoiceId, New, Paid, RepairOrder, Step, Technician,
    Valid, WaitingForPayment, WorkDone,
};

impl RepairOrder<New> {
    /// Accept or reject the order based on the customer's standing.
    ///
    /// A rejected order always carries at least one reason.
    pub(crate) fn validate(
        self,
        standing: &CustomerStanding,
    ) -> Result<RepairOrder<Valid>, RepairOrder<Invalid>> {
        if standing.is_eligible() {
            Ok(self.with_state(Valid))
        } else {
            let validation_errors = standing.reasons();
            Err(self.with_state(Invalid { validation_errors }))
        }
    }
}

impl RepairOrder<Valid> {
    /// Hand the order to a technician together with every step to perform
    pub(crate) fn start_progress(
        self,
        technician: Technician,
        steps: impl IntoIterator<Item = Step>,
    ) -> RepairOrder<InProgress> {
        self.with_state(InProgress {
            assigned_technician: technician,
            steps_left: steps.into_iter().collect(),
        })
    }
}

impl RepairOrder<InProgress> {
    pub fn has_steps_left(&self) -> bool {
        !self.state.steps_left.is_empty()
    }

    /// Step that will be executed next
    pub fn next_step(&self) -> Option<&Step> {
        self.state.steps_left.front()
    }

    /// Drop the front step after it has been carried out
    pub(crate) fn complete_next_step(&mut self) -> Option<Step> {
        self.state.steps_left.pop_front()
    }

    /// Close the work phase. Returns the order unchanged while steps remain.
    pub(crate) fn finish_work(self) -> Result<RepairOrder<WorkDone>, RepairOrder<InProgress>> {
        if self.has_steps_left() {
            Err(self)
        } else {
            Ok(self.with_state(WorkDone))
        }
    }
}

impl RepairOrder<WorkDone> {
    pub(crate) fn send_invoice(self, invoice: InvoiceId) -> RepairOrder<WaitingForPayment> {
        self.with_state(WaitingForPayment { invoice })
    }
}

impl RepairOrder<WaitingForPayment> {
    /// Mark the invoice as settled, carrying it into the terminal state
    pub(crate) fn record_payment(self) -> RepairOrder<Paid> {
        self.update_state(|waiting| Paid {
            invoice: waiting.invoice,
        })
    }
}
