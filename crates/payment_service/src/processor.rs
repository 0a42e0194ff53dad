use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use allocation::{
    calculate_allocation, derive_status, reference_date, AllocationSummary, OutstandingPeriod,
    PeriodAllocation,
};
use models::{
    CreditTransaction, CreditTransactionKind, PaymentMethod, PaymentRecord, PaymentStatus,
    PaymentSummary, Santri, Timeline, TimelineMode,
};
use store::{
    AllocationCommit, AllocationStore, CreditLedger, PaymentStore, PeriodUpdate, SantriDirectory,
    Store, StoreError, TimelineStore,
};
use timeline::TimelineConfig;

use crate::error::{Result, ServiceError};

/// How often a commit is retried after the credit balance moved underneath
/// it before the conflict is surfaced to the caller.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedPayment {
    pub payment_id: String,
    pub allocations: Vec<PeriodAllocation>,
    pub summary: AllocationSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentHistory {
    pub timeline_id: String,
    /// The date statuses were derived against (simulation date for
    /// manual-mode timelines).
    pub reference_date: NaiveDate,
    pub payments: Vec<PaymentRecord>,
    pub summary: PaymentSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SantriPaymentStatus {
    #[serde(flatten)]
    pub santri: Santri,
    pub payment_summary: PaymentSummary,
}

/// Preview of one outstanding period after walking the current credit
/// across the unpaid periods in order. Mutates nothing.
#[derive(Debug, Clone, Serialize)]
pub struct ReducedPeriod {
    pub period_key: String,
    pub period_label: String,
    pub amount: u64,
    pub credit_applied: u64,
    pub effective_amount: u64,
}

/// Thousands-separated rupiah amount, `40000` -> `40.000`.
pub fn format_rupiah(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

/// The single allocation path every payment goes through, whether it was
/// entered by an admin, submitted by a guardian, or settled digitally.
pub struct PaymentProcessor {
    store: Arc<dyn Store>,
}

impl PaymentProcessor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn active_timeline(&self) -> Result<Timeline> {
        self.store
            .get_active_timeline()
            .await?
            .ok_or_else(|| ServiceError::NotFound("active timeline".to_string()))
    }

    async fn santri(&self, santri_id: &str) -> Result<Santri> {
        self.store
            .get_santri(santri_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("santri {}", santri_id)))
    }

    /// Active periods the santri has not paid yet, in period order.
    async fn outstanding_periods(
        &self,
        timeline: &Timeline,
        santri_id: &str,
    ) -> Result<Vec<OutstandingPeriod>> {
        let stored = self.store.payments_for_santri(santri_id).await?;

        let mut outstanding = Vec::new();
        for (key, period) in timeline.ordered_periods() {
            if !period.active {
                continue;
            }
            let status = stored
                .iter()
                .find(|r| r.period_key == key)
                .map(|r| r.status)
                .unwrap_or(PaymentStatus::BelumBayar);
            if status == PaymentStatus::Lunas {
                continue;
            }
            outstanding.push(OutstandingPeriod {
                period_key: key.to_string(),
                period_number: period.number,
                period_label: period.label.clone(),
                amount: period.amount,
                status,
            });
        }
        Ok(outstanding)
    }

    /// Allocate a payment across the santri's outstanding periods and
    /// persist the result atomically.
    ///
    /// The commit carries the balance the allocation was computed against;
    /// when another payment lands in between, the store rejects it and the
    /// whole read-allocate-commit cycle runs again with fresh state. A
    /// payment that completes no period is still committed — the full
    /// amount becomes credit.
    pub async fn process_payment_with_credit(
        &self,
        santri_id: &str,
        payment_amount: u64,
        method: PaymentMethod,
    ) -> Result<ProcessedPayment> {
        if santri_id.is_empty() {
            return Err(ServiceError::Validation("santri id is required".to_string()));
        }
        if payment_amount == 0 {
            return Err(ServiceError::Validation(
                "payment amount must be greater than zero".to_string(),
            ));
        }

        let timeline = self.active_timeline().await?;
        self.santri(santri_id).await?;

        let mut attempt = 1;
        loop {
            let outstanding = self.outstanding_periods(&timeline, santri_id).await?;
            let balance = self.store.balance(santri_id).await?;
            let outcome = calculate_allocation(payment_amount, &outstanding, balance);

            let now = Utc::now();
            let payment_id = format!("payment_{}_{}", now.timestamp_millis(), santri_id);
            let transaction =
                credit_transaction_for(santri_id, &outcome.summary, balance, &payment_id, now);

            let commit = AllocationCommit {
                timeline_id: timeline.id.clone(),
                santri_id: santri_id.to_string(),
                payment_id: payment_id.clone(),
                payment_method: method,
                payment_date: now,
                period_updates: outcome
                    .allocations
                    .iter()
                    .map(|a| PeriodUpdate {
                        period_key: a.period_key.clone(),
                        total_amount: a.total_amount,
                        credit_used: a.credit_used,
                        actual_payment: a.new_payment,
                    })
                    .collect(),
                new_balance: outcome.summary.final_credit_balance,
                expected_balance: balance,
                transaction,
            };

            match self.store.commit_allocation(commit).await {
                Ok(()) => {
                    tracing::info!(
                        santri_id,
                        payment_amount,
                        periods_completed = outcome.summary.periods_completed,
                        final_credit = outcome.summary.final_credit_balance,
                        "payment allocated"
                    );
                    return Ok(ProcessedPayment {
                        payment_id,
                        allocations: outcome.allocations,
                        summary: outcome.summary,
                    });
                }
                Err(StoreError::Conflict { expected, actual }) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::warn!(
                        santri_id,
                        attempt,
                        expected,
                        actual,
                        "credit balance moved, retrying allocation"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Admin entry of a cash payment; same engine, same commit path.
    pub async fn record_manual_payment(
        &self,
        santri_id: &str,
        payment_amount: u64,
    ) -> Result<ProcessedPayment> {
        self.process_payment_with_credit(santri_id, payment_amount, PaymentMethod::Manual)
            .await
    }

    /// One row per active period, lazily implying unpaid records, statuses
    /// derived against the timeline's reference date.
    pub async fn payment_history(&self, santri_id: &str) -> Result<PaymentHistory> {
        let timeline = self.active_timeline().await?;
        let santri = self.santri(santri_id).await?;
        let stored = self.store.payments_for_santri(santri_id).await?;

        let today = reference_date(&timeline, Utc::now().date_naive());
        let now = Utc::now();

        let mut payments = Vec::new();
        for (key, period) in timeline.ordered_periods() {
            if !period.active {
                continue;
            }
            let mut record = stored
                .iter()
                .find(|r| r.period_key == key)
                .cloned()
                .unwrap_or_else(|| PaymentRecord::implied(&santri, key, period, now));
            record.status = derive_status(record.status, period.due_date, today);
            payments.push(record);
        }

        let summary = PaymentSummary::from_payments(&payments);
        Ok(PaymentHistory {
            timeline_id: timeline.id.clone(),
            reference_date: today,
            payments,
            summary,
        })
    }

    /// Per-santri summaries for the admin overview, sorted by name.
    pub async fn all_santri_status(&self) -> Result<Vec<SantriPaymentStatus>> {
        let santri_list = self.store.list_santri().await?;

        let mut statuses = Vec::with_capacity(santri_list.len());
        for santri in santri_list {
            let history = self.payment_history(&santri.id).await?;
            statuses.push(SantriPaymentStatus {
                santri,
                payment_summary: history.summary,
            });
        }
        Ok(statuses)
    }

    /// What each outstanding period would effectively cost after the
    /// current credit is walked across them in order.
    pub async fn reduced_amounts(&self, santri_id: &str) -> Result<Vec<ReducedPeriod>> {
        let timeline = self.active_timeline().await?;
        self.santri(santri_id).await?;

        let mut remaining = self.store.balance(santri_id).await?;
        let outstanding = self.outstanding_periods(&timeline, santri_id).await?;

        let mut reduced = Vec::with_capacity(outstanding.len());
        for period in outstanding {
            let credit_applied = remaining.min(period.amount);
            remaining -= credit_applied;
            reduced.push(ReducedPeriod {
                period_key: period.period_key,
                period_label: period.period_label,
                amount: period.amount,
                credit_applied,
                effective_amount: period.amount - credit_applied,
            });
        }
        Ok(reduced)
    }

    pub async fn credit_balance(&self, santri_id: &str) -> Result<u64> {
        self.santri(santri_id).await?;
        Ok(self.store.balance(santri_id).await?)
    }

    pub async fn credit_history(
        &self,
        santri_id: &str,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>> {
        self.santri(santri_id).await?;
        Ok(self.store.history(santri_id, limit).await?)
    }

    /// Generate a new active timeline and seed an unpaid record for every
    /// enrolled santri in every active period.
    pub async fn create_timeline(&self, config: &TimelineConfig) -> Result<Timeline> {
        let now = Utc::now();
        let generated = timeline::generate_timeline(config, now)?;
        self.store.set_active_timeline(generated.clone()).await?;

        let santri_list = self.store.list_santri().await?;
        let mut records = Vec::new();
        for (key, period) in generated.ordered_periods() {
            if !period.active {
                continue;
            }
            for santri in &santri_list {
                records.push(PaymentRecord::implied(santri, key, period, now));
            }
        }
        self.store.seed_payments(records).await?;

        tracing::info!(
            timeline_id = %generated.id,
            periods = generated.periods.len(),
            santri = santri_list.len(),
            "timeline created and payments seeded"
        );
        Ok(generated)
    }

    pub async fn delete_timeline(&self) -> Result<()> {
        self.active_timeline().await?;
        self.store.delete_active_timeline().await?;
        Ok(())
    }

    pub async fn set_simulation(
        &self,
        mode: TimelineMode,
        simulation_date: Option<NaiveDate>,
    ) -> Result<Timeline> {
        if mode == TimelineMode::Manual && simulation_date.is_none() {
            return Err(ServiceError::Validation(
                "manual mode requires a simulation date".to_string(),
            ));
        }
        Ok(self.store.set_simulation(mode, simulation_date).await?)
    }
}

fn credit_transaction_for(
    santri_id: &str,
    summary: &AllocationSummary,
    balance_before: u64,
    payment_id: &str,
    now: chrono::DateTime<Utc>,
) -> CreditTransaction {
    let balance_after = summary.final_credit_balance;
    let net = balance_after as i64 - balance_before as i64;
    let kind = if net < 0 || (net == 0 && summary.credit_used > 0) {
        CreditTransactionKind::Usage
    } else {
        CreditTransactionKind::Earned
    };
    let description = match kind {
        CreditTransactionKind::Usage => {
            format!("Credit digunakan untuk {} periode", summary.periods_completed)
        }
        CreditTransactionKind::Earned => format!(
            "Credit dari pembayaran Rp {}",
            format_rupiah(summary.payment_amount)
        ),
    };

    CreditTransaction {
        santri_id: santri_id.to_string(),
        amount: net,
        kind,
        description,
        related_payment_id: Some(payment_id.to_string()),
        periods_affected: summary.affected_periods.clone(),
        balance_before,
        balance_after,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use models::TimelineKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use store::{MemoryStore, Result as StoreResult};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config() -> TimelineConfig {
        TimelineConfig {
            id: Some("timeline_2025".to_string()),
            name: "Bisyaroh 2025".to_string(),
            kind: TimelineKind::Yearly,
            duration: 3,
            base_amount: 40000,
            total_amount: 120000,
            start_date: date(2025, 1, 1),
            holidays: Vec::new(),
            // Manual mode pins the reference date so derived statuses are
            // deterministic in tests
            mode: Some(TimelineMode::Manual),
            simulation_date: Some(date(2025, 2, 10)),
        }
    }

    async fn processor_with_santri() -> (PaymentProcessor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_santri(Santri {
                id: "santri_1".to_string(),
                santri_name: "Ahmad".to_string(),
                wali_name: "Pak Budi".to_string(),
            })
            .await
            .unwrap();
        store
            .upsert_santri(Santri {
                id: "santri_2".to_string(),
                santri_name: "Zainab".to_string(),
                wali_name: "Bu Siti".to_string(),
            })
            .await
            .unwrap();

        let processor = PaymentProcessor::new(store.clone());
        processor.create_timeline(&config()).await.unwrap();
        (processor, store)
    }

    #[tokio::test]
    async fn test_exact_payment_completes_one_period() {
        let (processor, store) = processor_with_santri().await;

        let result = processor
            .process_payment_with_credit("santri_1", 40000, PaymentMethod::Manual)
            .await
            .unwrap();

        assert_eq!(result.summary.periods_completed, 1);
        assert_eq!(result.summary.final_credit_balance, 0);

        let record = store
            .get_payment("period_1", "santri_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Lunas);
        assert_eq!(record.actual_payment, 40000);
        assert_eq!(record.payment_method, Some(PaymentMethod::Manual));
    }

    #[tokio::test]
    async fn test_overpayment_banks_credit_and_later_combines() {
        let (processor, store) = processor_with_santri().await;

        processor
            .process_payment_with_credit("santri_1", 50000, PaymentMethod::Online)
            .await
            .unwrap();
        assert_eq!(store.balance("santri_1").await.unwrap(), 10000);

        // 30000 + 10000 credit covers period_2 exactly
        let result = processor
            .process_payment_with_credit("santri_1", 30000, PaymentMethod::Online)
            .await
            .unwrap();
        assert_eq!(result.summary.credit_used, 10000);
        assert_eq!(result.summary.payment_used, 30000);
        assert_eq!(store.balance("santri_1").await.unwrap(), 0);

        let record = store
            .get_payment("period_2", "santri_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.credit_used, 10000);
        assert_eq!(record.actual_payment, 30000);
    }

    #[tokio::test]
    async fn test_small_payment_becomes_credit_top_up() {
        let (processor, store) = processor_with_santri().await;

        let result = processor
            .process_payment_with_credit("santri_1", 15000, PaymentMethod::Manual)
            .await
            .unwrap();

        assert!(result.allocations.is_empty());
        assert_eq!(result.summary.final_credit_balance, 15000);
        assert_eq!(store.balance("santri_1").await.unwrap(), 15000);

        let history = store.history("santri_1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, CreditTransactionKind::Earned);
        assert_eq!(history[0].amount, 15000);
    }

    #[tokio::test]
    async fn test_credit_transaction_chain_is_consistent() {
        let (processor, store) = processor_with_santri().await;

        processor
            .process_payment_with_credit("santri_1", 50000, PaymentMethod::Online)
            .await
            .unwrap();
        processor
            .process_payment_with_credit("santri_1", 30000, PaymentMethod::Online)
            .await
            .unwrap();

        let history = store.history("santri_1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        // Newest first: the second payment consumed the banked 10000
        assert_eq!(history[0].kind, CreditTransactionKind::Usage);
        assert_eq!(history[0].amount, -10000);
        assert_eq!(history[0].balance_before, 10000);
        assert_eq!(history[0].balance_after, 0);
        for txn in &history {
            assert_eq!(
                txn.balance_after as i64,
                txn.balance_before as i64 + txn.amount
            );
        }
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (processor, _) = processor_with_santri().await;

        assert!(matches!(
            processor
                .process_payment_with_credit("santri_1", 0, PaymentMethod::Manual)
                .await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            processor
                .process_payment_with_credit("", 1000, PaymentMethod::Manual)
                .await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            processor
                .process_payment_with_credit("santri_ghost", 1000, PaymentMethod::Manual)
                .await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_payment_without_timeline_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_santri(Santri {
                id: "santri_1".to_string(),
                santri_name: "Ahmad".to_string(),
                wali_name: "Pak Budi".to_string(),
            })
            .await
            .unwrap();
        let processor = PaymentProcessor::new(store);

        assert!(matches!(
            processor
                .process_payment_with_credit("santri_1", 1000, PaymentMethod::Manual)
                .await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_history_derives_statuses_from_simulation_date() {
        let (processor, _) = processor_with_santri().await;

        // Simulation date 2025-02-10: period_1 (due Jan 31) is overdue,
        // period_2 (due Feb 28) and period_3 are not
        let history = processor.payment_history("santri_1").await.unwrap();
        assert_eq!(history.reference_date, date(2025, 2, 10));
        assert_eq!(history.payments[0].status, PaymentStatus::Terlambat);
        assert_eq!(history.payments[1].status, PaymentStatus::BelumBayar);
        assert_eq!(history.payments[2].status, PaymentStatus::BelumBayar);

        let summary = &history.summary;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.terlambat, 1);
        assert_eq!(summary.belum_bayar, 2);
        assert_eq!(summary.unpaid_amount, 120000);
    }

    #[tokio::test]
    async fn test_history_lunas_is_sticky_under_simulation() {
        let (processor, _) = processor_with_santri().await;

        processor
            .process_payment_with_credit("santri_1", 40000, PaymentMethod::Manual)
            .await
            .unwrap();

        // Push the simulated clock past every due date
        processor
            .set_simulation(TimelineMode::Manual, Some(date(2026, 1, 1)))
            .await
            .unwrap();

        let history = processor.payment_history("santri_1").await.unwrap();
        assert_eq!(history.payments[0].status, PaymentStatus::Lunas);
        assert_eq!(history.payments[1].status, PaymentStatus::Terlambat);
    }

    #[tokio::test]
    async fn test_all_santri_status_sorted_by_name() {
        let (processor, _) = processor_with_santri().await;

        processor
            .process_payment_with_credit("santri_2", 120000, PaymentMethod::Online)
            .await
            .unwrap();

        let statuses = processor.all_santri_status().await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].santri.santri_name, "Ahmad");
        assert_eq!(statuses[1].santri.santri_name, "Zainab");
        assert_eq!(statuses[1].payment_summary.progress_percentage, 100);
        assert_eq!(statuses[0].payment_summary.progress_percentage, 0);
    }

    #[tokio::test]
    async fn test_reduced_amounts_preview() {
        let (processor, store) = processor_with_santri().await;
        store.set_balance("santri_1", 50000).await.unwrap();

        let reduced = processor.reduced_amounts("santri_1").await.unwrap();
        assert_eq!(reduced.len(), 3);
        assert_eq!(reduced[0].credit_applied, 40000);
        assert_eq!(reduced[0].effective_amount, 0);
        assert_eq!(reduced[1].credit_applied, 10000);
        assert_eq!(reduced[1].effective_amount, 30000);
        assert_eq!(reduced[2].credit_applied, 0);

        // Preview only: nothing was persisted
        assert_eq!(store.balance("santri_1").await.unwrap(), 50000);
        assert!(store
            .get_payment("period_1", "santri_1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_format_rupiah() {
        assert_eq!(format_rupiah(0), "0");
        assert_eq!(format_rupiah(500), "500");
        assert_eq!(format_rupiah(40000), "40.000");
        assert_eq!(format_rupiah(1250000), "1.250.000");
    }

    /// Wraps a MemoryStore and fails `commit_allocation` a configurable
    /// number of times before delegating.
    struct FlakyStore {
        inner: MemoryStore,
        conflicts_remaining: AtomicU32,
        io_failures_remaining: AtomicU32,
    }

    impl FlakyStore {
        fn new(inner: MemoryStore, conflicts: u32, io_failures: u32) -> Self {
            Self {
                inner,
                conflicts_remaining: AtomicU32::new(conflicts),
                io_failures_remaining: AtomicU32::new(io_failures),
            }
        }
    }

    #[async_trait]
    impl store::TimelineStore for FlakyStore {
        async fn get_active_timeline(&self) -> StoreResult<Option<Timeline>> {
            self.inner.get_active_timeline().await
        }
        async fn set_active_timeline(&self, timeline: Timeline) -> StoreResult<()> {
            self.inner.set_active_timeline(timeline).await
        }
        async fn delete_active_timeline(&self) -> StoreResult<()> {
            self.inner.delete_active_timeline().await
        }
        async fn reset_payments(&self) -> StoreResult<()> {
            self.inner.reset_payments().await
        }
        async fn set_simulation(
            &self,
            mode: TimelineMode,
            simulation_date: Option<NaiveDate>,
        ) -> StoreResult<Timeline> {
            self.inner.set_simulation(mode, simulation_date).await
        }
    }

    #[async_trait]
    impl store::PaymentStore for FlakyStore {
        async fn get_payment(
            &self,
            period_key: &str,
            santri_id: &str,
        ) -> StoreResult<Option<PaymentRecord>> {
            self.inner.get_payment(period_key, santri_id).await
        }
        async fn payments_for_santri(&self, santri_id: &str) -> StoreResult<Vec<PaymentRecord>> {
            self.inner.payments_for_santri(santri_id).await
        }
        async fn payments_for_period(&self, period_key: &str) -> StoreResult<Vec<PaymentRecord>> {
            self.inner.payments_for_period(period_key).await
        }
        async fn upsert_payment(&self, record: PaymentRecord) -> StoreResult<()> {
            self.inner.upsert_payment(record).await
        }
        async fn seed_payments(&self, records: Vec<PaymentRecord>) -> StoreResult<()> {
            self.inner.seed_payments(records).await
        }
    }

    #[async_trait]
    impl store::CreditLedger for FlakyStore {
        async fn balance(&self, santri_id: &str) -> StoreResult<u64> {
            self.inner.balance(santri_id).await
        }
        async fn set_balance(&self, santri_id: &str, balance: u64) -> StoreResult<()> {
            self.inner.set_balance(santri_id, balance).await
        }
        async fn append_transaction(&self, transaction: CreditTransaction) -> StoreResult<()> {
            self.inner.append_transaction(transaction).await
        }
        async fn history(
            &self,
            santri_id: &str,
            limit: usize,
        ) -> StoreResult<Vec<CreditTransaction>> {
            self.inner.history(santri_id, limit).await
        }
    }

    #[async_trait]
    impl store::SantriDirectory for FlakyStore {
        async fn list_santri(&self) -> StoreResult<Vec<Santri>> {
            self.inner.list_santri().await
        }
        async fn get_santri(&self, santri_id: &str) -> StoreResult<Option<Santri>> {
            self.inner.get_santri(santri_id).await
        }
        async fn upsert_santri(&self, santri: Santri) -> StoreResult<()> {
            self.inner.upsert_santri(santri).await
        }
    }

    #[async_trait]
    impl store::AllocationStore for FlakyStore {
        async fn commit_allocation(&self, commit: AllocationCommit) -> StoreResult<()> {
            if self.io_failures_remaining.load(Ordering::SeqCst) > 0 {
                self.io_failures_remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "simulated write failure",
                )));
            }
            if self.conflicts_remaining.load(Ordering::SeqCst) > 0 {
                self.conflicts_remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Conflict {
                    expected: commit.expected_balance,
                    actual: commit.expected_balance + 1,
                });
            }
            self.inner.commit_allocation(commit).await
        }
        async fn invalidate_cache(&self) {
            self.inner.invalidate_cache().await
        }
    }

    async fn flaky_processor(conflicts: u32, io_failures: u32) -> (PaymentProcessor, Arc<FlakyStore>) {
        let inner = MemoryStore::new();
        inner
            .upsert_santri(Santri {
                id: "santri_1".to_string(),
                santri_name: "Ahmad".to_string(),
                wali_name: "Pak Budi".to_string(),
            })
            .await
            .unwrap();
        let store = Arc::new(FlakyStore::new(inner, conflicts, io_failures));
        let processor = PaymentProcessor::new(store.clone());
        processor.create_timeline(&config()).await.unwrap();
        (processor, store)
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_no_partial_state() {
        let (processor, store) = flaky_processor(0, 1).await;

        let err = processor
            .process_payment_with_credit("santri_1", 40000, PaymentMethod::Online)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));

        // No period was marked paid and no credit moved
        let record = store
            .inner
            .get_payment("period_1", "santri_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PaymentStatus::BelumBayar);
        assert_eq!(store.inner.balance("santri_1").await.unwrap(), 0);
        assert!(store.inner.history("santri_1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conflict_is_retried_then_succeeds() {
        let (processor, store) = flaky_processor(2, 0).await;

        let result = processor
            .process_payment_with_credit("santri_1", 40000, PaymentMethod::Online)
            .await
            .unwrap();
        assert_eq!(result.summary.periods_completed, 1);

        let record = store
            .inner
            .get_payment("period_1", "santri_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Lunas);
    }

    #[tokio::test]
    async fn test_conflict_surfaces_after_exhausted_retries() {
        let (processor, store) = flaky_processor(10, 0).await;

        let err = processor
            .process_payment_with_credit("santri_1", 40000, PaymentMethod::Online)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let record = store
            .inner
            .get_payment("period_1", "santri_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PaymentStatus::BelumBayar);
    }
}
