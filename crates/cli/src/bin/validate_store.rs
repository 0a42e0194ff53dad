use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use models::PaymentStatus;
use store::DatabaseFile;

#[derive(Parser, Debug)]
#[command(name = "validate-store", about = "Check the database file for broken invariants.")]
struct Args {
    /// Path to the database JSON file
    #[arg(long, default_value = "data/bisyaroh.json")]
    data_file: PathBuf,
}

#[derive(Default)]
struct Report {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Report {
    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }
    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
    fn print(&self, file: &str) {
        for w in &self.warnings {
            println!("[WARN] {}: {}", file, w);
        }
        for e in &self.errors {
            println!("[ERROR] {}: {}", file, e);
        }
    }
    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

fn validate_timeline(db: &DatabaseFile, rep: &mut Report) {
    let Some(timeline) = &db.timeline else {
        rep.warn("no active timeline");
        return;
    };

    for (key, period) in &timeline.periods {
        let suffix: Option<u32> = key.strip_prefix("period_").and_then(|n| n.parse().ok());
        match suffix {
            None => rep.error(format!("period key '{}' does not match period_N", key)),
            Some(n) if n != period.number => rep.error(format!(
                "period key '{}' carries number {}",
                key, period.number
            )),
            Some(n) if n == 0 || n > timeline.duration => rep.error(format!(
                "period '{}' outside 1..={}",
                key, timeline.duration
            )),
            _ => {}
        }
        if period.is_holiday && period.amount != 0 {
            rep.error(format!("holiday period '{}' has amount {}", key, period.amount));
        }
        if period.is_holiday == period.active {
            rep.error(format!("period '{}' active flag disagrees with holiday flag", key));
        }
    }
}

fn validate_payments(db: &DatabaseFile, rep: &mut Report) {
    let Some(timeline) = &db.timeline else {
        if !db.payments.is_empty() {
            rep.error("payment records exist without an active timeline");
        }
        return;
    };

    for (period_key, by_santri) in &db.payments {
        if timeline.period(period_key).is_none() {
            rep.error(format!("payments reference unknown period '{}'", period_key));
        }
        for (santri_id, record) in by_santri {
            if record.period_key != *period_key {
                rep.error(format!(
                    "record under '{}' says period '{}'",
                    period_key, record.period_key
                ));
            }
            if db.santri_by_id(santri_id).is_none() {
                rep.warn(format!(
                    "payment in '{}' references unenrolled santri '{}'",
                    period_key, santri_id
                ));
            }
            match record.status {
                PaymentStatus::Lunas => {
                    if record.credit_used + record.actual_payment != record.amount {
                        rep.error(format!(
                            "lunas record {}/{} splits {} + {} against amount {}",
                            period_key,
                            santri_id,
                            record.credit_used,
                            record.actual_payment,
                            record.amount
                        ));
                    }
                    if record.payment_date.is_none() {
                        rep.error(format!(
                            "lunas record {}/{} has no payment date",
                            period_key, santri_id
                        ));
                    }
                }
                _ => {
                    if record.actual_payment > 0 || record.credit_used > 0 {
                        rep.error(format!(
                            "unpaid record {}/{} carries payment amounts",
                            period_key, santri_id
                        ));
                    }
                }
            }
        }
    }
}

fn validate_credit_chain(db: &DatabaseFile, rep: &mut Report) {
    // Transactions are append-only, so file order per santri is
    // chronological.
    let mut last_after: HashMap<&str, u64> = HashMap::new();

    for (i, txn) in db.credit_transactions.iter().enumerate() {
        if txn.balance_after as i64 != txn.balance_before as i64 + txn.amount {
            rep.error(format!(
                "credit transaction #{} for '{}' breaks its own arithmetic ({} + {} != {})",
                i, txn.santri_id, txn.balance_before, txn.amount, txn.balance_after
            ));
        }
        if let Some(prev_after) = last_after.get(txn.santri_id.as_str()) {
            if *prev_after != txn.balance_before {
                rep.warn(format!(
                    "credit transaction #{} for '{}' starts at {} but the previous one ended at {}",
                    i, txn.santri_id, txn.balance_before, prev_after
                ));
            }
        }
        last_after.insert(txn.santri_id.as_str(), txn.balance_after);
    }

    for (santri_id, chain_end) in last_after {
        let stored = db.balance(santri_id);
        if stored != chain_end {
            rep.warn(format!(
                "stored balance for '{}' is {} but the transaction chain ends at {}",
                santri_id, stored, chain_end
            ));
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let file = args.data_file.display().to_string();

    let raw = fs::read_to_string(&args.data_file)
        .with_context(|| format!("reading {}", file))?;
    let db: DatabaseFile =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", file))?;

    let mut rep = Report::default();
    validate_timeline(&db, &mut rep);
    validate_payments(&db, &mut rep);
    validate_credit_chain(&db, &mut rep);

    rep.print(&file);
    println!(
        "{} error(s), {} warning(s)",
        rep.errors.len(),
        rep.warnings.len()
    );

    if rep.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}
