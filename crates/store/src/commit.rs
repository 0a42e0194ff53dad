use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use models::{CreditTransaction, PaymentMethod};

/// One period going to `lunas` inside an [`AllocationCommit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodUpdate {
    pub period_key: String,
    /// Nominal amount of the period, covered in full.
    pub total_amount: u64,
    pub credit_used: u64,
    pub actual_payment: u64,
}

/// Every write of one processed payment, applied atomically: the period
/// records going to `lunas`, the new credit balance, and the audit entry.
/// Either all of it lands or none of it does.
///
/// `expected_balance` is the balance the allocation was computed against.
/// A store must reject the commit with [`StoreError::Conflict`] when the
/// live balance differs, so two concurrent payments for the same santri
/// cannot spend the same credit twice.
///
/// [`StoreError::Conflict`]: crate::error::StoreError::Conflict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationCommit {
    pub timeline_id: String,
    pub santri_id: String,
    pub payment_id: String,
    pub payment_method: PaymentMethod,
    pub payment_date: DateTime<Utc>,
    pub period_updates: Vec<PeriodUpdate>,
    pub new_balance: u64,
    pub expected_balance: u64,
    pub transaction: CreditTransaction,
}
