use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use models::TimelineKind;
use payment_service::{format_rupiah, PaymentProcessor};
use store::FileStore;
use timeline::TimelineConfig;

#[derive(Parser, Debug)]
#[command(name = "create-timeline", about = "Create the active payment timeline and seed unpaid records for every santri.")]
struct Args {
    /// Path to the database JSON file
    #[arg(long, default_value = "data/bisyaroh.json")]
    data_file: PathBuf,

    /// Display name, e.g. "Bisyaroh 2025/2026"
    #[arg(long)]
    name: String,

    /// Timeline granularity: yearly (monthly periods), monthly (daily), weekly
    #[arg(long, default_value = "yearly")]
    kind: String,

    /// Number of periods
    #[arg(long)]
    duration: u32,

    /// Nominal amount per period before holiday redistribution
    #[arg(long)]
    base_amount: u64,

    /// Total amount to collect across all active periods
    #[arg(long)]
    total_amount: u64,

    /// First day of the timeline (YYYY-MM-DD)
    #[arg(long)]
    start_date: NaiveDate,

    /// Holiday period numbers (repeatable), billed nothing
    #[arg(long = "holiday")]
    holidays: Vec<u32>,

    /// Explicit timeline id; derived from the start date when omitted
    #[arg(long)]
    id: Option<String>,
}

fn parse_kind(raw: &str) -> Result<TimelineKind> {
    match raw.to_ascii_lowercase().as_str() {
        "yearly" => Ok(TimelineKind::Yearly),
        "monthly" => Ok(TimelineKind::Monthly),
        "weekly" => Ok(TimelineKind::Weekly),
        other => Err(anyhow!("unknown timeline kind '{}', expected yearly|monthly|weekly", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TimelineConfig {
        id: args.id,
        name: args.name,
        kind: parse_kind(&args.kind)?,
        duration: args.duration,
        base_amount: args.base_amount,
        total_amount: args.total_amount,
        start_date: args.start_date,
        holidays: args.holidays,
        mode: None,
        simulation_date: None,
    };

    let store = Arc::new(FileStore::new(&args.data_file));
    let processor = PaymentProcessor::new(store);
    let timeline = processor.create_timeline(&config).await?;

    println!("Created timeline '{}' ({})", timeline.name, timeline.id);
    println!(
        "Per period: Rp {}  |  total: Rp {}",
        format_rupiah(timeline.amount_per_period),
        format_rupiah(timeline.total_amount)
    );
    println!();
    for (key, period) in timeline.ordered_periods() {
        let marker = if period.is_holiday { " (libur)" } else { "" };
        println!(
            "{:<12} {:<40} due {}  Rp {}{}",
            key,
            period.label,
            period.due_date,
            format_rupiah(period.amount),
            marker
        );
    }

    Ok(())
}
