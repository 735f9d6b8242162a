// In-memory collaborator implementations.
//
// Thread-safe and deterministic: usable when embedding the workflow in a
// process without external services, and as fixtures in tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::traits::*;
use crate::order::{
    Customer, CustomerStanding, InProgress, InvoiceId, OrderState, RepairOrder, Step, Technician,
    Valid, WorkDone,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reads the debt and ban flags recorded on the customer
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordedEligibility;

impl EligibilityCheck for RecordedEligibility {
    fn standing(&self, customer: &Customer) -> CustomerStanding {
        CustomerStanding::from(customer)
    }
}

/// Pool of idle technicians handed out first come, first served
#[derive(Debug, Default)]
pub struct TechnicianPool {
    idle: Mutex<VecDeque<Technician>>,
    polls: AtomicU64,
}

impl TechnicianPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle(technicians: impl IntoIterator<Item = Technician>) -> Self {
        Self {
            idle: Mutex::new(technicians.into_iter().collect()),
            polls: AtomicU64::new(0),
        }
    }

    /// Put a technician back into the idle pool
    pub fn release(&self, technician: Technician) {
        debug!(technician = %technician, "Technician released to pool");
        lock(&self.idle).push_back(technician);
    }

    pub fn idle_count(&self) -> usize {
        lock(&self.idle).len()
    }

    /// Number of lookups served so far
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TechnicianDirectory for TechnicianPool {
    async fn find_idle_technician(&self) -> Result<Option<Technician>> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        Ok(lock(&self.idle).pop_front())
    }
}

/// Planner that returns the same step list for every order
#[derive(Debug, Clone, Default)]
pub struct FixedStepPlanner {
    steps: Vec<Step>,
}

impl FixedStepPlanner {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }
}

impl StepPlanner for FixedStepPlanner {
    fn compute_steps(&self, _order: &RepairOrder<Valid>) -> Result<Vec<Step>> {
        Ok(self.steps.clone())
    }
}

/// Executor that records every step it performs.
///
/// Failures can be scripted per step to exercise the retry policy.
#[derive(Debug, Default)]
pub struct RecordingStepExecutor {
    executed: Mutex<Vec<(u64, Step)>>,
    failures: Mutex<HashMap<Step, u32>>,
    attempts: AtomicU64,
}

impl RecordingStepExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` attempts of `step` fail
    pub fn fail_step(&self, step: impl Into<Step>, times: u32) {
        lock(&self.failures).insert(step.into(), times);
    }

    /// Successfully executed steps, in execution order
    pub fn executed_steps(&self) -> Vec<Step> {
        lock(&self.executed)
            .iter()
            .map(|(_, step)| step.clone())
            .collect()
    }

    pub fn executed_for(&self, order_number: u64) -> Vec<Step> {
        lock(&self.executed)
            .iter()
            .filter(|(number, _)| *number == order_number)
            .map(|(_, step)| step.clone())
            .collect()
    }

    /// All attempts, failed ones included
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StepExecutor for RecordingStepExecutor {
    async fn execute_step(&self, order: &RepairOrder<InProgress>, step: &Step) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        {
            let mut failures = lock(&self.failures);
            if let Some(remaining) = failures.get_mut(step) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(anyhow!("step '{}' failed", step));
                }
            }
        }

        lock(&self.executed).push((order.order_number(), step.clone()));
        Ok(())
    }
}

/// Hands out `<prefix><n>` identifiers, counting from 1
#[derive(Debug)]
pub struct SequentialInvoices {
    prefix: String,
    next: AtomicU64,
}

impl SequentialInvoices {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialInvoices {
    fn default() -> Self {
        Self::new("INV-")
    }
}

#[async_trait]
impl InvoiceGenerator for SequentialInvoices {
    async fn generate_invoice(&self, _order: &RepairOrder<WorkDone>) -> Result<InvoiceId> {
        let number = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(InvoiceId::new(format!("{}{}", self.prefix, number)))
    }
}

/// Ledger of settled invoices.
///
/// `await_confirmation` suspends until some invoice is confirmed and then
/// reports whether it was the one asked about.
#[derive(Debug, Default)]
pub struct PaymentLedger {
    confirmed: Mutex<HashSet<InvoiceId>>,
    notify: Notify,
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm(&self, invoice: InvoiceId) {
        debug!(invoice = %invoice, "Payment confirmed");
        lock(&self.confirmed).insert(invoice);
        self.notify.notify_waiters();
    }

    pub fn is_confirmed(&self, invoice: &InvoiceId) -> bool {
        lock(&self.confirmed).contains(invoice)
    }
}

#[async_trait]
impl PaymentChannel for PaymentLedger {
    async fn await_confirmation(&self, invoice: &InvoiceId) -> Result<bool> {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking so a confirmation in between is not missed
        notified.as_mut().enable();

        if self.is_confirmed(invoice) {
            return Ok(true);
        }

        notified.await;
        Ok(self.is_confirmed(invoice))
    }
}

/// Payment channel that treats every invoice as already paid
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantPayment;

#[async_trait]
impl PaymentChannel for InstantPayment {
    async fn await_confirmation(&self, _invoice: &InvoiceId) -> Result<bool> {
        Ok(true)
    }
}

#[derive(Debug, Clone)]
pub struct RejectedOrderRecord {
    pub order: RepairOrder<OrderState>,
    pub rejected_at: DateTime<Utc>,
}

/// Keeps rejected orders in memory
#[derive(Debug, Default)]
pub struct InMemoryRejectedStore {
    records: Mutex<Vec<RejectedOrderRecord>>,
}

impl InMemoryRejectedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RejectedOrderRecord> {
        lock(&self.records).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored orders as JSON lines
    pub fn export_json_lines(&self) -> Result<String> {
        let records = lock(&self.records);
        let mut out = String::new();
        for record in records.iter() {
            out.push_str(&serde_json::to_string(&record.order)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[async_trait]
impl RejectedOrderStore for InMemoryRejectedStore {
    async fn store_rejected(&self, order: &RepairOrder<OrderState>) -> Result<()> {
        lock(&self.records).push(RejectedOrderRecord {
            order: order.clone(),
            rejected_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{CustomerStanding, New};
    use std::sync::Arc;
    use std::time::Duration;

    fn valid_order() -> RepairOrder<Valid> {
        RepairOrder::<New>::new(1, "VIN-1", None, Customer::default())
            .validate(&CustomerStanding::default())
            .unwrap()
    }

    #[tokio::test]
    async fn test_technician_pool_hands_out_in_release_order() {
        let pool = TechnicianPool::new();
        assert_eq!(pool.find_idle_technician().await.unwrap(), None);

        pool.release(Technician::new("ada"));
        pool.release(Technician::new("bob"));

        assert_eq!(
            pool.find_idle_technician().await.unwrap(),
            Some(Technician::new("ada"))
        );
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.polls(), 2);
    }

    #[tokio::test]
    async fn test_recording_executor_fails_scripted_step() {
        let executor = RecordingStepExecutor::new();
        executor.fail_step("paint panel", 1);
        let order =
            valid_order().start_progress(Technician::new("ada"), vec![Step::from("paint panel")]);

        assert!(executor.execute_step(&order, &Step::from("paint panel")).await.is_err());
        assert!(executor.execute_step(&order, &Step::from("paint panel")).await.is_ok());
        assert_eq!(executor.executed_steps(), vec![Step::from("paint panel")]);
        assert_eq!(executor.attempts(), 2);
    }

    #[tokio::test]
    async fn test_sequential_invoices_start_at_one() {
        let invoices = SequentialInvoices::default();
        let done = valid_order()
            .start_progress(Technician::new("ada"), Vec::new())
            .finish_work()
            .unwrap();
        assert_eq!(invoices.generate_invoice(&done).await.unwrap(), InvoiceId::new("INV-1"));
        assert_eq!(invoices.generate_invoice(&done).await.unwrap(), InvoiceId::new("INV-2"));
    }

    #[tokio::test]
    async fn test_payment_ledger_wakes_waiter_on_confirm() {
        let ledger = Arc::new(PaymentLedger::new());
        let invoice = InvoiceId::new("INV-1");

        let waiter = {
            let ledger = ledger.clone();
            let invoice = invoice.clone();
            tokio::spawn(async move { ledger.await_confirmation(&invoice).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        ledger.confirm(invoice.clone());

        assert!(waiter.await.unwrap().unwrap());
        assert!(ledger.await_confirmation(&invoice).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_store_exports_json_lines() {
        let store = InMemoryRejectedStore::new();
        let invalid = RepairOrder::<New>::new(3, "VIN-3", None, Customer::new(true, false))
            .validate(&CustomerStanding {
                has_outstanding_debt: true,
                is_banned: false,
            })
            .unwrap_err();

        store.store_rejected(&invalid.erase()).await.unwrap();

        assert_eq!(store.len(), 1);
        let lines = store.export_json_lines().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(lines.trim()).unwrap();
        assert_eq!(parsed["state"], "invalid");
        assert_eq!(parsed["validation_errors"][0], "Customer has outstanding debt");
    }
}
