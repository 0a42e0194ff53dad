use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use models::{PaymentRecord, Santri};
use store::{FileStore, PaymentStore, SantriDirectory, TimelineStore};

#[derive(Parser, Debug)]
#[command(name = "add-santri", about = "Enroll a santri and seed their unpaid records for the active timeline.")]
struct Args {
    /// Path to the database JSON file
    #[arg(long, default_value = "data/bisyaroh.json")]
    data_file: PathBuf,

    /// Santri id, e.g. santri_ahmad
    #[arg(long)]
    id: String,

    /// Santri name
    #[arg(long)]
    name: String,

    /// Guardian (wali) name
    #[arg(long)]
    wali: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let store = Arc::new(FileStore::new(&args.data_file));
    let santri = Santri {
        id: args.id,
        santri_name: args.name,
        wali_name: args.wali,
    };
    store.upsert_santri(santri.clone()).await?;
    println!("Enrolled {} (wali: {})", santri.santri_name, santri.wali_name);

    // When a timeline is already running, give the new santri their unpaid
    // rows right away so they show up in the admin overview.
    if let Some(timeline) = store.get_active_timeline().await? {
        let now = chrono::Utc::now();
        let mut records = Vec::new();
        for (key, period) in timeline.ordered_periods() {
            if !period.active {
                continue;
            }
            if store.get_payment(key, &santri.id).await?.is_none() {
                records.push(PaymentRecord::implied(&santri, key, period, now));
            }
        }
        let seeded = records.len();
        store.seed_payments(records).await?;
        println!("Seeded {} unpaid periods on timeline {}", seeded, timeline.id);
    }

    Ok(())
}
