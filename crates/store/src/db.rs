use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use models::{
    CreditAccount, CreditTransaction, PaymentRecord, PaymentStatus, Santri, Timeline, TimelineMode,
};

use crate::commit::AllocationCommit;
use crate::error::{Result, StoreError};

/// The whole database as one serializable document. The file-backed store
/// persists exactly this; the in-memory store keeps it behind a lock.
/// Payments belong to the single active timeline and are keyed
/// `period_key -> santri_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseFile {
    #[serde(default)]
    pub timeline: Option<Timeline>,
    #[serde(default)]
    pub santri: Vec<Santri>,
    #[serde(default)]
    pub payments: BTreeMap<String, BTreeMap<String, PaymentRecord>>,
    #[serde(default)]
    pub credit_accounts: BTreeMap<String, CreditAccount>,
    #[serde(default)]
    pub credit_transactions: Vec<CreditTransaction>,
}

impl DatabaseFile {
    pub fn santri_by_id(&self, santri_id: &str) -> Option<&Santri> {
        self.santri.iter().find(|s| s.id == santri_id)
    }

    pub fn balance(&self, santri_id: &str) -> u64 {
        self.credit_accounts
            .get(santri_id)
            .map(|a| a.balance)
            .unwrap_or(0)
    }

    pub fn payment(&self, period_key: &str, santri_id: &str) -> Option<&PaymentRecord> {
        self.payments.get(period_key).and_then(|m| m.get(santri_id))
    }

    pub fn payments_for_santri(&self, santri_id: &str) -> Vec<PaymentRecord> {
        self.payments
            .values()
            .filter_map(|m| m.get(santri_id))
            .cloned()
            .collect()
    }

    pub fn payments_for_period(&self, period_key: &str) -> Vec<PaymentRecord> {
        self.payments
            .get(period_key)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn upsert_payment(&mut self, record: PaymentRecord) {
        self.payments
            .entry(record.period_key.clone())
            .or_default()
            .insert(record.santri_id.clone(), record);
    }

    pub fn set_balance(&mut self, santri_id: &str, balance: u64, now: chrono::DateTime<Utc>) {
        let account = self
            .credit_accounts
            .entry(santri_id.to_string())
            .or_insert(CreditAccount {
                balance: 0,
                last_update: now,
            });
        account.balance = balance;
        account.last_update = now;
    }

    pub fn set_simulation(
        &mut self,
        mode: TimelineMode,
        simulation_date: Option<NaiveDate>,
    ) -> Result<Timeline> {
        let timeline = self
            .timeline
            .as_mut()
            .ok_or_else(|| StoreError::NotFound("active timeline".to_string()))?;
        timeline.mode = mode;
        timeline.simulation_date = simulation_date;
        timeline.updated_at = Utc::now();
        Ok(timeline.clone())
    }

    /// Apply an allocation commit, validate-then-apply: every check runs
    /// before the first mutation, so a rejected commit leaves the state
    /// exactly as it was.
    pub fn apply_commit(&mut self, commit: &AllocationCommit) -> Result<()> {
        let timeline = self
            .timeline
            .as_ref()
            .ok_or_else(|| StoreError::NotFound("active timeline".to_string()))?;
        if timeline.id != commit.timeline_id {
            return Err(StoreError::NotFound(format!(
                "timeline {}",
                commit.timeline_id
            )));
        }

        let santri = self
            .santri_by_id(&commit.santri_id)
            .ok_or_else(|| StoreError::NotFound(format!("santri {}", commit.santri_id)))?
            .clone();

        let actual = self.balance(&commit.santri_id);
        if actual != commit.expected_balance {
            return Err(StoreError::Conflict {
                expected: commit.expected_balance,
                actual,
            });
        }

        let mut touched = Vec::with_capacity(commit.period_updates.len());
        for update in &commit.period_updates {
            let period = timeline.period(&update.period_key).ok_or_else(|| {
                StoreError::NotFound(format!("period {}", update.period_key))
            })?;
            touched.push((update, update.period_key.clone(), period.clone()));
        }

        // All checks passed, mutate.
        for (update, period_key, period) in touched {
            let mut record = self
                .payment(&period_key, &commit.santri_id)
                .cloned()
                .unwrap_or_else(|| {
                    PaymentRecord::implied(&santri, &period_key, &period, commit.payment_date)
                });
            record.status = PaymentStatus::Lunas;
            record.amount = update.total_amount;
            record.actual_payment = update.actual_payment;
            record.credit_used = update.credit_used;
            record.payment_date = Some(commit.payment_date);
            record.payment_method = Some(commit.payment_method);
            record.payment_id = Some(commit.payment_id.clone());
            record.updated_at = commit.payment_date;
            self.upsert_payment(record);
        }

        self.set_balance(&commit.santri_id, commit.new_balance, commit.payment_date);
        self.credit_transactions.push(commit.transaction.clone());

        Ok(())
    }
}
