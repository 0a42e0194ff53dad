pub mod commit;
pub mod db;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use commit::{AllocationCommit, PeriodUpdate};
pub use db::DatabaseFile;
pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::{AllocationStore, CreditLedger, PaymentStore, SantriDirectory, Store, TimelineStore};
