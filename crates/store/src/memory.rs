use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

use models::{CreditTransaction, PaymentRecord, Santri, Timeline, TimelineMode};

use crate::commit::AllocationCommit;
use crate::db::DatabaseFile;
use crate::error::Result;
use crate::traits::{AllocationStore, CreditLedger, PaymentStore, SantriDirectory, TimelineStore};

/// In-memory store, used by tests and the CLI dry paths. Commits go through
/// the same validate-then-apply logic as the file store, so the atomicity
/// contract can be exercised without touching disk.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<DatabaseFile>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: DatabaseFile) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Snapshot of the current state, for assertions.
    pub async fn snapshot(&self) -> DatabaseFile {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl TimelineStore for MemoryStore {
    async fn get_active_timeline(&self) -> Result<Option<Timeline>> {
        Ok(self.state.read().await.timeline.clone())
    }

    async fn set_active_timeline(&self, timeline: Timeline) -> Result<()> {
        let mut state = self.state.write().await;
        state.timeline = Some(timeline);
        state.payments.clear();
        Ok(())
    }

    async fn delete_active_timeline(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.timeline = None;
        state.payments.clear();
        Ok(())
    }

    async fn reset_payments(&self) -> Result<()> {
        self.state.write().await.payments.clear();
        Ok(())
    }

    async fn set_simulation(
        &self,
        mode: TimelineMode,
        simulation_date: Option<NaiveDate>,
    ) -> Result<Timeline> {
        self.state.write().await.set_simulation(mode, simulation_date)
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn get_payment(&self, period_key: &str, santri_id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self.state.read().await.payment(period_key, santri_id).cloned())
    }

    async fn payments_for_santri(&self, santri_id: &str) -> Result<Vec<PaymentRecord>> {
        Ok(self.state.read().await.payments_for_santri(santri_id))
    }

    async fn payments_for_period(&self, period_key: &str) -> Result<Vec<PaymentRecord>> {
        Ok(self.state.read().await.payments_for_period(period_key))
    }

    async fn upsert_payment(&self, record: PaymentRecord) -> Result<()> {
        self.state.write().await.upsert_payment(record);
        Ok(())
    }

    async fn seed_payments(&self, records: Vec<PaymentRecord>) -> Result<()> {
        let mut state = self.state.write().await;
        for record in records {
            state.upsert_payment(record);
        }
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for MemoryStore {
    async fn balance(&self, santri_id: &str) -> Result<u64> {
        Ok(self.state.read().await.balance(santri_id))
    }

    async fn set_balance(&self, santri_id: &str, balance: u64) -> Result<()> {
        self.state.write().await.set_balance(santri_id, balance, Utc::now());
        Ok(())
    }

    async fn append_transaction(&self, transaction: CreditTransaction) -> Result<()> {
        self.state.write().await.credit_transactions.push(transaction);
        Ok(())
    }

    async fn history(&self, santri_id: &str, limit: usize) -> Result<Vec<CreditTransaction>> {
        let state = self.state.read().await;
        let mut transactions: Vec<CreditTransaction> = state
            .credit_transactions
            .iter()
            .filter(|t| t.santri_id == santri_id)
            .cloned()
            .collect();
        transactions.reverse();
        transactions.truncate(limit);
        Ok(transactions)
    }
}

#[async_trait]
impl SantriDirectory for MemoryStore {
    async fn list_santri(&self) -> Result<Vec<Santri>> {
        let mut santri = self.state.read().await.santri.clone();
        santri.sort_by(|a, b| a.santri_name.cmp(&b.santri_name));
        Ok(santri)
    }

    async fn get_santri(&self, santri_id: &str) -> Result<Option<Santri>> {
        Ok(self.state.read().await.santri_by_id(santri_id).cloned())
    }

    async fn upsert_santri(&self, santri: Santri) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.santri.iter_mut().find(|s| s.id == santri.id) {
            *existing = santri;
        } else {
            state.santri.push(santri);
        }
        Ok(())
    }
}

#[async_trait]
impl AllocationStore for MemoryStore {
    async fn commit_allocation(&self, commit: AllocationCommit) -> Result<()> {
        self.state.write().await.apply_commit(&commit)
    }

    async fn invalidate_cache(&self) {}
}
