use async_trait::async_trait;
use chrono::NaiveDate;

use models::{CreditTransaction, PaymentRecord, Santri, Timeline, TimelineMode};

use crate::commit::AllocationCommit;
use crate::error::Result;

/// Access to the single active timeline.
#[async_trait]
pub trait TimelineStore: Send + Sync {
    async fn get_active_timeline(&self) -> Result<Option<Timeline>>;
    /// Replaces the active timeline. Existing payment records are wiped —
    /// they belong to the timeline that defined their periods.
    async fn set_active_timeline(&self, timeline: Timeline) -> Result<()>;
    /// Deletes the timeline together with all its payment records.
    async fn delete_active_timeline(&self) -> Result<()>;
    /// Clears payment records but keeps the timeline.
    async fn reset_payments(&self) -> Result<()>;
    async fn set_simulation(
        &self,
        mode: TimelineMode,
        simulation_date: Option<NaiveDate>,
    ) -> Result<Timeline>;
}

/// Per (period, santri) payment records of the active timeline.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get_payment(&self, period_key: &str, santri_id: &str) -> Result<Option<PaymentRecord>>;
    async fn payments_for_santri(&self, santri_id: &str) -> Result<Vec<PaymentRecord>>;
    async fn payments_for_period(&self, period_key: &str) -> Result<Vec<PaymentRecord>>;
    async fn upsert_payment(&self, record: PaymentRecord) -> Result<()>;
    /// Writes a batch of records in one go (timeline seeding).
    async fn seed_payments(&self, records: Vec<PaymentRecord>) -> Result<()>;
}

/// Per-santri credit balance plus the append-only audit log. The balance
/// is authoritative; the log is never consulted to recompute it.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Balance of a santri; santri without an account have 0.
    async fn balance(&self, santri_id: &str) -> Result<u64>;
    async fn set_balance(&self, santri_id: &str, balance: u64) -> Result<()>;
    async fn append_transaction(&self, transaction: CreditTransaction) -> Result<()>;
    /// Transactions for one santri, newest first, at most `limit`.
    async fn history(&self, santri_id: &str, limit: usize) -> Result<Vec<CreditTransaction>>;
}

/// Enrollment directory.
#[async_trait]
pub trait SantriDirectory: Send + Sync {
    async fn list_santri(&self) -> Result<Vec<Santri>>;
    async fn get_santri(&self, santri_id: &str) -> Result<Option<Santri>>;
    async fn upsert_santri(&self, santri: Santri) -> Result<()>;
}

/// The generic atomic multi-write: all writes of one processed payment
/// land together or not at all.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    async fn commit_allocation(&self, commit: AllocationCommit) -> Result<()>;
    /// Drops any cached state so the next read hits the backing storage.
    async fn invalidate_cache(&self);
}

/// Everything the payment service needs from a backing store.
pub trait Store:
    TimelineStore + PaymentStore + CreditLedger + SantriDirectory + AllocationStore
{
}

impl<T> Store for T where
    T: TimelineStore + PaymentStore + CreditLedger + SantriDirectory + AllocationStore
{
}
