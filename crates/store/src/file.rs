use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

use models::{CreditTransaction, PaymentRecord, Santri, Timeline, TimelineMode};

use crate::commit::AllocationCommit;
use crate::db::DatabaseFile;
use crate::error::Result;
use crate::traits::{AllocationStore, CreditLedger, PaymentStore, SantriDirectory, TimelineStore};

/// File-backed store: the whole database lives in one JSON file. Mutations
/// rewrite the file through a temp file and an atomic rename, so a failed
/// write never leaves a half-written database behind. Reads go through a
/// cache that is invalidated on every write.
pub struct FileStore {
    path: PathBuf,
    cache: RwLock<Option<DatabaseFile>>,
    // Serializes in-process mutations so two writers cannot interleave
    // their load-mutate-save cycles.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<DatabaseFile> {
        {
            let cache = self.cache.read().await;
            if let Some(ref db) = *cache {
                return Ok(db.clone());
            }
        }

        let db = self.load_from_disk().await?;

        let mut cache = self.cache.write().await;
        *cache = Some(db.clone());
        Ok(db)
    }

    /// A missing file is an empty database, so first runs need no setup.
    async fn load_from_disk(&self) -> Result<DatabaseFile> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DatabaseFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, db: &DatabaseFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(db)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        let mut cache = self.cache.write().await;
        *cache = None;
        Ok(())
    }

    async fn mutate<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut DatabaseFile) -> Result<R>,
    {
        let _guard = self.write_lock.lock().await;
        let mut db = self.load_from_disk().await?;
        let result = f(&mut db)?;
        self.save(&db).await?;
        Ok(result)
    }
}

#[async_trait]
impl TimelineStore for FileStore {
    async fn get_active_timeline(&self) -> Result<Option<Timeline>> {
        Ok(self.load().await?.timeline)
    }

    async fn set_active_timeline(&self, timeline: Timeline) -> Result<()> {
        self.mutate(|db| {
            db.timeline = Some(timeline);
            db.payments.clear();
            Ok(())
        })
        .await
    }

    async fn delete_active_timeline(&self) -> Result<()> {
        self.mutate(|db| {
            db.timeline = None;
            db.payments.clear();
            Ok(())
        })
        .await
    }

    async fn reset_payments(&self) -> Result<()> {
        self.mutate(|db| {
            db.payments.clear();
            Ok(())
        })
        .await
    }

    async fn set_simulation(
        &self,
        mode: TimelineMode,
        simulation_date: Option<NaiveDate>,
    ) -> Result<Timeline> {
        self.mutate(|db| db.set_simulation(mode, simulation_date)).await
    }
}

#[async_trait]
impl PaymentStore for FileStore {
    async fn get_payment(&self, period_key: &str, santri_id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self.load().await?.payment(period_key, santri_id).cloned())
    }

    async fn payments_for_santri(&self, santri_id: &str) -> Result<Vec<PaymentRecord>> {
        Ok(self.load().await?.payments_for_santri(santri_id))
    }

    async fn payments_for_period(&self, period_key: &str) -> Result<Vec<PaymentRecord>> {
        Ok(self.load().await?.payments_for_period(period_key))
    }

    async fn upsert_payment(&self, record: PaymentRecord) -> Result<()> {
        self.mutate(|db| {
            db.upsert_payment(record);
            Ok(())
        })
        .await
    }

    async fn seed_payments(&self, records: Vec<PaymentRecord>) -> Result<()> {
        self.mutate(|db| {
            for record in records {
                db.upsert_payment(record);
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CreditLedger for FileStore {
    async fn balance(&self, santri_id: &str) -> Result<u64> {
        Ok(self.load().await?.balance(santri_id))
    }

    async fn set_balance(&self, santri_id: &str, balance: u64) -> Result<()> {
        self.mutate(|db| {
            db.set_balance(santri_id, balance, Utc::now());
            Ok(())
        })
        .await
    }

    async fn append_transaction(&self, transaction: CreditTransaction) -> Result<()> {
        self.mutate(|db| {
            db.credit_transactions.push(transaction);
            Ok(())
        })
        .await
    }

    async fn history(&self, santri_id: &str, limit: usize) -> Result<Vec<CreditTransaction>> {
        let db = self.load().await?;
        let mut transactions: Vec<CreditTransaction> = db
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
impl SantriDirectory for FileStore {
    async fn list_santri(&self) -> Result<Vec<Santri>> {
        let mut santri = self.load().await?.santri;
        santri.sort_by(|a, b| a.santri_name.cmp(&b.santri_name));
        Ok(santri)
    }

    async fn get_santri(&self, santri_id: &str) -> Result<Option<Santri>> {
        Ok(self.load().await?.santri_by_id(santri_id).cloned())
    }

    async fn upsert_santri(&self, santri: Santri) -> Result<()> {
        self.mutate(|db| {
            if let Some(existing) = db.santri.iter_mut().find(|s| s.id == santri.id) {
                *existing = santri;
            } else {
                db.santri.push(santri);
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl AllocationStore for FileStore {
    async fn commit_allocation(&self, commit: AllocationCommit) -> Result<()> {
        self.mutate(|db| db.apply_commit(&commit)).await
    }

    async fn invalidate_cache(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}
