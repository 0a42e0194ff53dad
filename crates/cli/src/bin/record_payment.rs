use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use models::PaymentMethod;
use payment_service::{format_rupiah, PaymentProcessor};
use store::FileStore;

#[derive(Parser, Debug)]
#[command(name = "record-payment", about = "Allocate a payment across a santri's outstanding periods.")]
struct Args {
    /// Path to the database JSON file
    #[arg(long, default_value = "data/bisyaroh.json")]
    data_file: PathBuf,

    /// Santri id
    #[arg(long)]
    santri: String,

    /// Payment amount in rupiah
    #[arg(long)]
    amount: u64,

    /// Payment method: manual, online or hardware
    #[arg(long, default_value = "manual")]
    method: String,
}

fn parse_method(raw: &str) -> Result<PaymentMethod> {
    match raw.to_ascii_lowercase().as_str() {
        "manual" => Ok(PaymentMethod::Manual),
        "online" => Ok(PaymentMethod::Online),
        "hardware" => Ok(PaymentMethod::Hardware),
        other => Err(anyhow!("unknown payment method '{}', expected manual|online|hardware", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let method = parse_method(&args.method)?;

    let store = Arc::new(FileStore::new(&args.data_file));
    let processor = PaymentProcessor::new(store);

    let result = processor
        .process_payment_with_credit(&args.santri, args.amount, method)
        .await?;

    println!("Payment {} recorded", result.payment_id);
    if result.allocations.is_empty() {
        println!("No period could be completed; the full amount was banked as credit.");
    }
    for alloc in &result.allocations {
        println!(
            "  {:<40} Rp {:>12}  (credit Rp {} + bayar Rp {})",
            alloc.period_label,
            format_rupiah(alloc.total_amount),
            format_rupiah(alloc.credit_used),
            format_rupiah(alloc.new_payment)
        );
    }

    let summary = &result.summary;
    println!();
    println!("Periods completed : {}", summary.periods_completed);
    println!("Credit used       : Rp {}", format_rupiah(summary.credit_used));
    println!("Payment used      : Rp {}", format_rupiah(summary.payment_used));
    println!("New credit        : Rp {}", format_rupiah(summary.new_credit_generated));
    println!("Credit balance    : Rp {}", format_rupiah(summary.final_credit_balance));

    Ok(())
}
