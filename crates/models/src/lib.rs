
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Settings models
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
	pub host: String,
	pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	pub data_file: String,
	pub server: ServerSettings,
}

/// Payment status of one period for one santri.
/// `Lunas` is sticky: once a record is marked paid it never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	Lunas,
	BelumBayar,
	Terlambat,
}

impl PaymentStatus {
	pub fn is_paid(self) -> bool {
		matches!(self, PaymentStatus::Lunas)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
	Manual,
	Online,
	Hardware,
}

/// Granularity of a timeline: a yearly timeline bills per month, a monthly
/// timeline per day, a weekly timeline per week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
	Yearly,
	Monthly,
	Weekly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineMode {
	RealTime,
	Manual,
}

/// One billable interval inside a timeline. Immutable once the timeline is
/// created. Keyed `period_N` in the timeline's period map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Period {
	pub number: u32,
	pub label: String,
	pub amount: u64,
	pub due_date: NaiveDate,
	pub active: bool,
	#[serde(default)]
	pub is_holiday: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
	pub id: String,
	pub name: String,
	#[serde(rename = "type")]
	pub kind: TimelineKind,
	pub duration: u32,
	pub base_amount: u64,
	pub total_amount: u64,
	pub amount_per_period: u64,
	pub start_date: NaiveDate,
	#[serde(default)]
	pub holidays: Vec<u32>,
	pub periods: BTreeMap<String, Period>,
	pub mode: TimelineMode,
	#[serde(default)]
	pub simulation_date: Option<NaiveDate>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Timeline {
	/// Periods in ascending order by period number.
	pub fn ordered_periods(&self) -> Vec<(&str, &Period)> {
		let mut periods: Vec<(&str, &Period)> = self
			.periods
			.iter()
			.map(|(k, p)| (k.as_str(), p))
			.collect();
		periods.sort_by_key(|(_, p)| p.number);
		periods
	}

	pub fn period(&self, key: &str) -> Option<&Period> {
		self.periods.get(key)
	}
}

/// Enrollment record of one student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Santri {
	pub id: String,
	pub santri_name: String,
	pub wali_name: String,
}

/// One payment record per (timeline, period, santri). Created lazily: a
/// missing record means `belum_bayar` with nothing paid yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
	pub santri_id: String,
	pub santri_name: String,
	pub wali_name: String,
	pub period_key: String,
	pub period_label: String,
	pub amount: u64,
	pub status: PaymentStatus,
	#[serde(default)]
	pub actual_payment: u64,
	#[serde(default)]
	pub credit_used: u64,
	#[serde(default)]
	pub payment_date: Option<DateTime<Utc>>,
	#[serde(default)]
	pub payment_method: Option<PaymentMethod>,
	#[serde(default)]
	pub payment_id: Option<String>,
	#[serde(default)]
	pub notes: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
	/// The implied record for a period no payment has been stored for.
	pub fn implied(santri: &Santri, period_key: &str, period: &Period, now: DateTime<Utc>) -> Self {
		PaymentRecord {
			santri_id: santri.id.clone(),
			santri_name: santri.santri_name.clone(),
			wali_name: santri.wali_name.clone(),
			period_key: period_key.to_string(),
			period_label: period.label.clone(),
			amount: period.amount,
			status: PaymentStatus::BelumBayar,
			actual_payment: 0,
			credit_used: 0,
			payment_date: None,
			payment_method: None,
			payment_id: None,
			notes: String::new(),
			created_at: now,
			updated_at: now,
		}
	}
}

/// Per-santri prepaid balance. The balance is the source of truth, stored
/// denormalized; the transaction log is audit-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAccount {
	pub balance: u64,
	pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditTransactionKind {
	Usage,
	Earned,
}

/// Immutable audit entry for one credit movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
	pub santri_id: String,
	pub amount: i64,
	#[serde(rename = "type")]
	pub kind: CreditTransactionKind,
	pub description: String,
	#[serde(default)]
	pub related_payment_id: Option<String>,
	#[serde(default)]
	pub periods_affected: Vec<String>,
	pub balance_before: u64,
	pub balance_after: u64,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSummary {
	pub total: usize,
	pub lunas: usize,
	pub belum_bayar: usize,
	pub terlambat: usize,
	pub total_amount: u64,
	pub paid_amount: u64,
	pub unpaid_amount: u64,
	pub progress_percentage: u32,
}

impl PaymentSummary {
	/// Summarize a list of payment rows (statuses already derived).
	pub fn from_payments(payments: &[PaymentRecord]) -> Self {
		let total = payments.len();
		let lunas = payments.iter().filter(|p| p.status == PaymentStatus::Lunas).count();
		let belum_bayar = payments
			.iter()
			.filter(|p| p.status == PaymentStatus::BelumBayar)
			.count();
		let terlambat = payments
			.iter()
			.filter(|p| p.status == PaymentStatus::Terlambat)
			.count();

		let total_amount: u64 = payments.iter().map(|p| p.amount).sum();
		let paid_amount: u64 = payments
			.iter()
			.filter(|p| p.status == PaymentStatus::Lunas)
			.map(|p| p.amount)
			.sum();
		let unpaid_amount = total_amount - paid_amount;

		let progress_percentage = if total > 0 {
			((lunas as f64 / total as f64) * 100.0).round() as u32
		} else {
			0
		};

		PaymentSummary {
			total,
			lunas,
			belum_bayar,
			terlambat,
			total_amount,
			paid_amount,
			unpaid_amount,
			progress_percentage,
		}
	}
}
