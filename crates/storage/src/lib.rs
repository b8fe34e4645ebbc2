//! Record stores behind the custody tracker.
//!
//! The stores hold the latest known state of every deal attempt, pin request
//! and partition claim. They apply no business rules: every write is accepted
//! and replaces the whole record atomically. Ordering, idempotence and
//! transition checks happen in the ingestion gate of `custody-core`.

use custody_types::{BackupMetadata, ContentId, DagSummary, Deal, PartitionRecord, Pin};

pub mod memory;
pub mod sled_store;

pub use memory::MemoryCustodyStore;
pub use sled_store::SledCustodyStore;

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt record under key {key}")]
    Corrupt { key: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Latest state of each (cid, miner-or-provisional slot) deal attempt.
pub trait DealStore: Send + Sync {
    /// Every deal attempt recorded for `cid`.
    fn deals_for(&self, cid: &ContentId) -> Result<Vec<Deal>>;

    /// The attempt that started with queued sequence `origin`, whichever slot
    /// it currently occupies.
    fn find_deal(&self, cid: &ContentId, origin: u64) -> Result<Option<Deal>>;

    /// Insert or replace the attempt. A record that gained a miner leaves its
    /// provisional slot in the same write.
    fn upsert_deal(&self, deal: Deal) -> Result<()>;
}

/// Pin requests keyed by request id, indexed by cid.
pub trait PinStore: Send + Sync {
    fn get_pin(&self, request_id: &str) -> Result<Option<Pin>>;

    fn pins_for(&self, cid: &ContentId) -> Result<Vec<Pin>>;

    fn upsert_pin(&self, pin: Pin) -> Result<()>;
}

/// Partition claims keyed by (cid, partition) plus the per-cid completeness
/// summary.
pub trait ClaimStore: Send + Sync {
    fn partitions_for(&self, cid: &ContentId) -> Result<Vec<PartitionRecord>>;

    fn get_partition(
        &self,
        cid: &ContentId,
        partition: &ContentId,
    ) -> Result<Option<PartitionRecord>>;

    fn upsert_partition(&self, record: PartitionRecord) -> Result<()>;

    fn dag_summary(&self, cid: &ContentId) -> Result<Option<DagSummary>>;

    fn put_dag_summary(&self, summary: DagSummary) -> Result<()>;
}

/// Everything the custody tracker persists.
pub trait CustodyStore: DealStore + PinStore + ClaimStore {
    fn get_backup(&self, car_cid: &ContentId) -> Result<Option<BackupMetadata>>;

    fn put_backup(&self, backup: BackupMetadata) -> Result<()>;

    fn backups_for(&self, source_cid: &ContentId) -> Result<Vec<BackupMetadata>>;

    /// Hide `cid` from reads without erasing its records.
    fn mark_deleted(&self, cid: &ContentId) -> Result<()>;

    /// Lift a deletion marker; returns whether one was present.
    fn clear_deleted(&self, cid: &ContentId) -> Result<bool>;

    fn is_deleted(&self, cid: &ContentId) -> Result<bool>;

    /// Whether any deal, pin or claim was ever recorded for `cid`.
    fn has_records(&self, cid: &ContentId) -> Result<bool> {
        Ok(!self.deals_for(cid)?.is_empty()
            || !self.pins_for(cid)?.is_empty()
            || !self.partitions_for(cid)?.is_empty())
    }
}
