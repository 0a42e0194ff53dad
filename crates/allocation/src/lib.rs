//! Payment allocation engine and status derivation.
//!
//! A single incoming amount is spread across the outstanding periods of the
//! active timeline, oldest first. Pre-existing credit and the new payment are
//! treated as one pool; a period is only ever paid in full, and whatever the
//! pool cannot cover becomes (or stays) credit. The functions here only
//! compute — persistence is the caller's job.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use models::{PaymentStatus, Timeline, TimelineMode};

/// One not-yet-paid period as seen by the engine. The caller builds these
/// from the active timeline and the santri's stored payment records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutstandingPeriod {
    pub period_key: String,
    pub period_number: u32,
    pub period_label: String,
    pub amount: u64,
    pub status: PaymentStatus,
}

/// A fully covered period in the allocation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodAllocation {
    pub period_key: String,
    pub period_label: String,
    /// Nominal amount of the period, always covered in full.
    pub total_amount: u64,
    /// Share of `total_amount` taken from pre-existing credit.
    pub credit_used: u64,
    /// Share of `total_amount` taken from the new payment.
    pub new_payment: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub payment_amount: u64,
    /// Pre-existing credit consumed across all allocated periods.
    pub credit_used: u64,
    /// Portion of the new payment consumed across all allocated periods.
    pub payment_used: u64,
    /// Credit added on top of the prior balance by this payment.
    pub new_credit_generated: u64,
    pub final_credit_balance: u64,
    pub periods_completed: usize,
    pub affected_periods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub allocations: Vec<PeriodAllocation>,
    pub summary: AllocationSummary,
}

/// Numeric suffix of a `period_N` key. Keys that do not follow the shape
/// fall back to the period number carried alongside them.
fn period_sort_key(period: &OutstandingPeriod) -> u32 {
    period
        .period_key
        .strip_prefix("period_")
        .and_then(|n| n.parse().ok())
        .unwrap_or(period.period_number)
}

/// Allocate `payment_amount` plus the existing `credit_balance` across the
/// outstanding periods, oldest first.
///
/// Pure and idempotent: identical inputs always produce identical output,
/// and nothing is persisted here. Already-paid periods are ignored, the
/// rest is re-sorted defensively by the numeric suffix of the period key.
/// Each allocated period records how much of its cost came from credit
/// (credit is drawn first) and how much from the new payment. The walk
/// stops at the first period the remaining pool cannot cover in full;
/// the remainder is reported as the final credit balance.
pub fn calculate_allocation(
    payment_amount: u64,
    periods: &[OutstandingPeriod],
    credit_balance: u64,
) -> AllocationOutcome {
    let total_available = payment_amount + credit_balance;

    let mut unpaid: Vec<&OutstandingPeriod> = periods
        .iter()
        .filter(|p| p.status != PaymentStatus::Lunas)
        .collect();
    unpaid.sort_by_key(|p| period_sort_key(p));

    let mut remaining = total_available;
    let mut credit_used: u64 = 0;
    let mut allocations = Vec::new();
    let mut affected_periods = Vec::new();

    for period in unpaid {
        if remaining < period.amount {
            break;
        }

        let credit_applied = (credit_balance - credit_used).min(period.amount);
        let payment_needed = period.amount - credit_applied;

        allocations.push(PeriodAllocation {
            period_key: period.period_key.clone(),
            period_label: period.period_label.clone(),
            total_amount: period.amount,
            credit_used: credit_applied,
            new_payment: payment_needed,
        });
        affected_periods.push(period.period_key.clone());

        remaining -= period.amount;
        credit_used += credit_applied;
    }

    let allocated_total: u64 = allocations.iter().map(|a| a.total_amount).sum();
    let final_credit_balance = total_available - allocated_total;
    let payment_used = allocated_total - credit_used;
    let new_credit_generated = final_credit_balance.saturating_sub(credit_balance);

    AllocationOutcome {
        summary: AllocationSummary {
            payment_amount,
            credit_used,
            payment_used,
            new_credit_generated,
            final_credit_balance,
            periods_completed: allocations.len(),
            affected_periods,
        },
        allocations,
    }
}

/// The date payment statuses are judged against: manual-mode timelines use
/// their simulation date, real-time timelines the wall clock passed in.
pub fn reference_date(timeline: &Timeline, today: NaiveDate) -> NaiveDate {
    match timeline.mode {
        TimelineMode::Manual => timeline.simulation_date.unwrap_or(today),
        TimelineMode::RealTime => today,
    }
}

/// Derive the effective status of a payment record on `on_date`.
///
/// `Lunas` is sticky — a paid period never reverts. Anything unpaid is
/// `terlambat` once `on_date` has passed the due date, `belum_bayar`
/// before that. Recomputed on every read, never stored back.
pub fn derive_status(stored: PaymentStatus, due_date: NaiveDate, on_date: NaiveDate) -> PaymentStatus {
    if stored == PaymentStatus::Lunas {
        return PaymentStatus::Lunas;
    }
    if on_date > due_date {
        PaymentStatus::Terlambat
    } else {
        PaymentStatus::BelumBayar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use models::TimelineKind;
    use std::collections::BTreeMap;

    fn unpaid(key: &str, number: u32, amount: u64) -> OutstandingPeriod {
        OutstandingPeriod {
            period_key: key.to_string(),
            period_number: number,
            period_label: format!("Periode {}", number),
            amount,
            status: PaymentStatus::BelumBayar,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_payment_covers_first_period_only() {
        // Scenario A: two periods of 40000, payment 40000, no credit
        let periods = vec![unpaid("period_1", 1, 40000), unpaid("period_2", 2, 40000)];
        let outcome = calculate_allocation(40000, &periods, 0);

        assert_eq!(outcome.allocations.len(), 1);
        assert_eq!(outcome.allocations[0].period_key, "period_1");
        assert_eq!(outcome.allocations[0].credit_used, 0);
        assert_eq!(outcome.allocations[0].new_payment, 40000);
        assert_eq!(outcome.summary.final_credit_balance, 0);
        assert_eq!(outcome.summary.new_credit_generated, 0);
    }

    #[test]
    fn test_overpayment_becomes_credit() {
        // Scenario B: one period of 40000, payment 50000
        let periods = vec![unpaid("period_1", 1, 40000)];
        let outcome = calculate_allocation(50000, &periods, 0);

        assert_eq!(outcome.allocations.len(), 1);
        assert_eq!(outcome.summary.payment_used, 40000);
        assert_eq!(outcome.summary.final_credit_balance, 10000);
        assert_eq!(outcome.summary.new_credit_generated, 10000);
    }

    #[test]
    fn test_credit_combines_with_payment() {
        // Scenario C: period 40000, payment 20000, credit 25000
        let periods = vec![unpaid("period_1", 1, 40000)];
        let outcome = calculate_allocation(20000, &periods, 25000);

        assert_eq!(outcome.allocations.len(), 1);
        // Credit is drawn first, the payment covers the rest
        assert_eq!(outcome.allocations[0].credit_used, 25000);
        assert_eq!(outcome.allocations[0].new_payment, 15000);
        assert_eq!(outcome.summary.credit_used, 25000);
        assert_eq!(outcome.summary.payment_used, 15000);
        assert_eq!(outcome.summary.final_credit_balance, 5000);
        // The leftover 5000 comes from the payment, not on top of old credit
        assert_eq!(outcome.summary.new_credit_generated, 0);
    }

    #[test]
    fn test_no_outstanding_periods() {
        // Scenario D: nothing to pay, whole amount becomes credit
        let outcome = calculate_allocation(30000, &[], 0);

        assert!(outcome.allocations.is_empty());
        assert_eq!(outcome.summary.final_credit_balance, 30000);
        assert_eq!(outcome.summary.new_credit_generated, 30000);
        assert_eq!(outcome.summary.payment_used, 0);
    }

    #[test]
    fn test_pool_below_first_period_all_credit() {
        let periods = vec![unpaid("period_1", 1, 40000)];
        let outcome = calculate_allocation(15000, &periods, 10000);

        assert!(outcome.allocations.is_empty());
        assert_eq!(outcome.summary.final_credit_balance, 25000);
        assert_eq!(outcome.summary.credit_used, 0);
    }

    #[test]
    fn test_no_partial_allocation_and_no_skipping() {
        // 90000 covers period 1 and 2 but only half of period 3; period 3
        // must stay untouched even though nothing else follows it.
        let periods = vec![
            unpaid("period_1", 1, 40000),
            unpaid("period_2", 2, 40000),
            unpaid("period_3", 3, 40000),
        ];
        let outcome = calculate_allocation(90000, &periods, 0);

        assert_eq!(outcome.allocations.len(), 2);
        assert_eq!(
            outcome.summary.affected_periods,
            vec!["period_1".to_string(), "period_2".to_string()]
        );
        assert_eq!(outcome.summary.final_credit_balance, 10000);
    }

    #[test]
    fn test_paid_periods_are_ignored() {
        let mut paid = unpaid("period_1", 1, 40000);
        paid.status = PaymentStatus::Lunas;
        let periods = vec![paid, unpaid("period_2", 2, 40000)];

        let outcome = calculate_allocation(40000, &periods, 0);
        assert_eq!(outcome.allocations.len(), 1);
        assert_eq!(outcome.allocations[0].period_key, "period_2");
    }

    #[test]
    fn test_overdue_periods_still_allocatable() {
        let mut late = unpaid("period_1", 1, 40000);
        late.status = PaymentStatus::Terlambat;
        let outcome = calculate_allocation(40000, &[late], 0);
        assert_eq!(outcome.allocations.len(), 1);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        // Caller should sort, but the engine re-sorts by key suffix anyway
        let periods = vec![
            unpaid("period_3", 3, 10000),
            unpaid("period_1", 1, 10000),
            unpaid("period_2", 2, 10000),
        ];
        let outcome = calculate_allocation(20000, &periods, 0);

        assert_eq!(
            outcome.summary.affected_periods,
            vec!["period_1".to_string(), "period_2".to_string()]
        );
    }

    #[test]
    fn test_malformed_key_falls_back_to_period_number() {
        let odd = unpaid("makeup_period", 1, 10000);
        let periods = vec![unpaid("period_2", 2, 10000), odd];
        let outcome = calculate_allocation(10000, &periods, 0);

        assert_eq!(outcome.allocations[0].period_key, "makeup_period");
    }

    #[test]
    fn test_credit_spans_multiple_periods() {
        let periods = vec![unpaid("period_1", 1, 30000), unpaid("period_2", 2, 30000)];
        let outcome = calculate_allocation(20000, &periods, 40000);

        assert_eq!(outcome.allocations.len(), 2);
        assert_eq!(outcome.allocations[0].credit_used, 30000);
        assert_eq!(outcome.allocations[0].new_payment, 0);
        assert_eq!(outcome.allocations[1].credit_used, 10000);
        assert_eq!(outcome.allocations[1].new_payment, 20000);
        assert_eq!(outcome.summary.credit_used, 40000);
        assert_eq!(outcome.summary.payment_used, 20000);
        assert_eq!(outcome.summary.final_credit_balance, 0);
    }

    #[test]
    fn test_balance_identity_holds() {
        // final = payment + credit - sum(allocated), across a spread of inputs
        let periods = vec![
            unpaid("period_1", 1, 35000),
            unpaid("period_2", 2, 35000),
            unpaid("period_3", 3, 35000),
        ];
        for payment in [0u64, 10000, 35000, 70000, 120000] {
            for credit in [0u64, 5000, 35000, 100000] {
                let outcome = calculate_allocation(payment, &periods, credit);
                let allocated: u64 = outcome.allocations.iter().map(|a| a.total_amount).sum();
                assert_eq!(
                    outcome.summary.final_credit_balance,
                    payment + credit - allocated
                );
                assert!(allocated <= payment + credit);
                for alloc in &outcome.allocations {
                    assert_eq!(alloc.credit_used + alloc.new_payment, alloc.total_amount);
                }
            }
        }
    }

    #[test]
    fn test_calculation_is_idempotent() {
        let periods = vec![unpaid("period_1", 1, 40000), unpaid("period_2", 2, 45000)];
        let first = calculate_allocation(60000, &periods, 30000);
        let second = calculate_allocation(60000, &periods, 30000);
        assert_eq!(first, second);
    }

    fn timeline_with_mode(mode: TimelineMode, simulation_date: Option<NaiveDate>) -> Timeline {
        let now = Utc::now();
        Timeline {
            id: "timeline_test".to_string(),
            name: "Bisyaroh".to_string(),
            kind: TimelineKind::Yearly,
            duration: 2,
            base_amount: 40000,
            total_amount: 80000,
            amount_per_period: 40000,
            start_date: date(2025, 1, 1),
            holidays: Vec::new(),
            periods: BTreeMap::new(),
            mode,
            simulation_date,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_reference_date_manual_mode() {
        let tl = timeline_with_mode(TimelineMode::Manual, Some(date(2025, 6, 15)));
        assert_eq!(reference_date(&tl, date(2025, 2, 1)), date(2025, 6, 15));

        // Manual mode without a simulation date falls back to today
        let tl = timeline_with_mode(TimelineMode::Manual, None);
        assert_eq!(reference_date(&tl, date(2025, 2, 1)), date(2025, 2, 1));
    }

    #[test]
    fn test_reference_date_real_time_ignores_simulation() {
        let tl = timeline_with_mode(TimelineMode::RealTime, Some(date(2025, 6, 15)));
        assert_eq!(reference_date(&tl, date(2025, 2, 1)), date(2025, 2, 1));
    }

    #[test]
    fn test_derive_status_unpaid() {
        let due = date(2025, 3, 31);
        assert_eq!(
            derive_status(PaymentStatus::BelumBayar, due, date(2025, 3, 31)),
            PaymentStatus::BelumBayar
        );
        assert_eq!(
            derive_status(PaymentStatus::BelumBayar, due, date(2025, 4, 1)),
            PaymentStatus::Terlambat
        );
        // A stored terlambat goes back to belum_bayar if the clock is behind
        // the due date (manual-mode simulation moving backwards)
        assert_eq!(
            derive_status(PaymentStatus::Terlambat, due, date(2025, 2, 1)),
            PaymentStatus::BelumBayar
        );
    }

    #[test]
    fn test_derive_status_lunas_is_sticky() {
        let due = date(2025, 3, 31);
        assert_eq!(
            derive_status(PaymentStatus::Lunas, due, date(2026, 1, 1)),
            PaymentStatus::Lunas
        );
    }
}
