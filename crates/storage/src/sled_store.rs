//! Sled-backed record store.
//!
//! Key layout (all keys are UTF-8):
//!
//! | tree            | key                          | value            |
//! |-----------------|------------------------------|------------------|
//! | `deals`         | `{cid}/p/{origin}` or `{cid}/m/{miner}/{origin}` | `Deal` json |
//! | `pins`          | `{request_id}`               | `Pin` json       |
//! | `pins_by_cid`   | `{cid}/{request_id}`         | empty            |
//! | `partitions`    | `{cid}/{partition}`          | `PartitionRecord` json |
//! | `dag_summaries` | `{cid}`                      | `DagSummary` json |
//! | `backups`       | `{car_cid}`                  | `BackupMetadata` json |
//! | `backups_by_source` | `{source_cid}/{car_cid}` | empty            |
//! | `deleted`       | `{cid}`                      | empty            |
//!
//! Origins are zero padded so a prefix scan yields attempts in order.

use crate::{ClaimStore, CustodyStore, DealStore, PinStore, Result, StorageError};
use custody_types::{BackupMetadata, ContentId, DagSummary, Deal, PartitionRecord, Pin};
use serde::de::DeserializeOwned;
use sled::{Batch, Db, IVec, Tree};
use std::path::Path;

const EMPTY: &[u8] = &[];

pub struct SledCustodyStore {
    db: Db,
    deals: Tree,
    pins: Tree,
    pins_by_cid: Tree,
    partitions: Tree,
    dag_summaries: Tree,
    backups: Tree,
    backups_by_source: Tree,
    deleted: Tree,
}

impl SledCustodyStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Throwaway store that lives only as long as the process.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let store = Self {
            deals: db.open_tree("deals")?,
            pins: db.open_tree("pins")?,
            pins_by_cid: db.open_tree("pins_by_cid")?,
            partitions: db.open_tree("partitions")?,
            dag_summaries: db.open_tree("dag_summaries")?,
            backups: db.open_tree("backups")?,
            backups_by_source: db.open_tree("backups_by_source")?,
            deleted: db.open_tree("deleted")?,
            db,
        };
        tracing::debug!(
            deals = store.deals.len(),
            pins = store.pins.len(),
            "opened sled custody store"
        );
        Ok(store)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn cid_prefix(cid: &ContentId) -> String {
        format!("{cid}/")
    }

    /// Decode every value stored under `prefix`.
    fn scan_values<T: DeserializeOwned>(tree: &Tree, prefix: &str) -> Result<Vec<T>> {
        tree.scan_prefix(prefix.as_bytes())
            .map(|entry| -> Result<T> {
                let (_, value) = entry?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    /// Suffixes of the index keys stored under `prefix`.
    fn scan_index(tree: &Tree, prefix: &str) -> Result<Vec<String>> {
        tree.scan_prefix(prefix.as_bytes())
            .map(|entry| -> Result<String> {
                let (key, _) = entry?;
                let key = String::from_utf8(key.to_vec()).map_err(|_| StorageError::Corrupt {
                    key: String::from_utf8_lossy(&key).into_owned(),
                })?;
                Ok(key[prefix.len()..].to_string())
            })
            .collect()
    }

    fn get_json<T: DeserializeOwned>(tree: &Tree, key: &str) -> Result<Option<T>> {
        tree.get(key.as_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(Into::into)
    }

    /// Key currently holding the deal attempt `origin` of `cid`.
    fn deal_key_for_origin(&self, cid: &ContentId, origin: u64) -> Result<Option<(IVec, Deal)>> {
        for entry in self.deals.scan_prefix(Self::cid_prefix(cid).as_bytes()) {
            let (key, value) = entry?;
            let deal: Deal = serde_json::from_slice(&value)?;
            if deal.origin == origin {
                return Ok(Some((key, deal)));
            }
        }
        Ok(None)
    }
}

impl DealStore for SledCustodyStore {
    fn deals_for(&self, cid: &ContentId) -> Result<Vec<Deal>> {
        Self::scan_values(&self.deals, &Self::cid_prefix(cid))
    }

    fn find_deal(&self, cid: &ContentId, origin: u64) -> Result<Option<Deal>> {
        Ok(self
            .deal_key_for_origin(cid, origin)?
            .map(|(_, deal)| deal))
    }

    fn upsert_deal(&self, deal: Deal) -> Result<()> {
        let key = deal.key().to_string();
        let mut batch = Batch::default();
        if let Some((previous, _)) = self.deal_key_for_origin(&deal.cid, deal.origin)? {
            if previous.as_ref() != key.as_bytes() {
                batch.remove(previous);
            }
        }
        batch.insert(key.as_bytes(), serde_json::to_vec(&deal)?);
        self.deals.apply_batch(batch)?;
        Ok(())
    }
}

impl PinStore for SledCustodyStore {
    fn get_pin(&self, request_id: &str) -> Result<Option<Pin>> {
        Self::get_json(&self.pins, request_id)
    }

    fn pins_for(&self, cid: &ContentId) -> Result<Vec<Pin>> {
        let mut pins = Vec::new();
        for request_id in Self::scan_index(&self.pins_by_cid, &Self::cid_prefix(cid))? {
            if let Some(pin) = self.get_pin(&request_id)? {
                pins.push(pin);
            }
        }
        Ok(pins)
    }

    fn upsert_pin(&self, pin: Pin) -> Result<()> {
        if let Some(previous) = self.get_pin(&pin.request_id)? {
            if previous.cid != pin.cid {
                self.pins_by_cid
                    .remove(format!("{}/{}", previous.cid, pin.request_id).as_bytes())?;
            }
        }
        self.pins
            .insert(pin.request_id.as_bytes(), serde_json::to_vec(&pin)?)?;
        self.pins_by_cid
            .insert(format!("{}/{}", pin.cid, pin.request_id).as_bytes(), EMPTY)?;
        Ok(())
    }
}

impl ClaimStore for SledCustodyStore {
    fn partitions_for(&self, cid: &ContentId) -> Result<Vec<PartitionRecord>> {
        Self::scan_values(&self.partitions, &Self::cid_prefix(cid))
    }

    fn get_partition(
        &self,
        cid: &ContentId,
        partition: &ContentId,
    ) -> Result<Option<PartitionRecord>> {
        Self::get_json(&self.partitions, &format!("{cid}/{partition}"))
    }

    fn upsert_partition(&self, record: PartitionRecord) -> Result<()> {
        let key = format!("{}/{}", record.cid, record.partition);
        self.partitions
            .insert(key.as_bytes(), serde_json::to_vec(&record)?)?;
        Ok(())
    }

    fn dag_summary(&self, cid: &ContentId) -> Result<Option<DagSummary>> {
        Self::get_json(&self.dag_summaries, &cid.to_string())
    }

    fn put_dag_summary(&self, summary: DagSummary) -> Result<()> {
        self.dag_summaries.insert(
            summary.cid.to_string().as_bytes(),
            serde_json::to_vec(&summary)?,
        )?;
        Ok(())
    }
}

impl CustodyStore for SledCustodyStore {
    fn get_backup(&self, car_cid: &ContentId) -> Result<Option<BackupMetadata>> {
        Self::get_json(&self.backups, &car_cid.to_string())
    }

    fn put_backup(&self, backup: BackupMetadata) -> Result<()> {
        self.backups.insert(
            backup.car_cid.to_string().as_bytes(),
            serde_json::to_vec(&backup)?,
        )?;
        self.backups_by_source.insert(
            format!("{}/{}", backup.source_cid, backup.car_cid).as_bytes(),
            EMPTY,
        )?;
        Ok(())
    }

    fn backups_for(&self, source_cid: &ContentId) -> Result<Vec<BackupMetadata>> {
        let mut backups = Vec::new();
        for car in Self::scan_index(&self.backups_by_source, &Self::cid_prefix(source_cid))? {
            if let Some(backup) = Self::get_json(&self.backups, &car)? {
                backups.push(backup);
            }
        }
        Ok(backups)
    }

    fn mark_deleted(&self, cid: &ContentId) -> Result<()> {
        self.deleted.insert(cid.to_string().as_bytes(), EMPTY)?;
        Ok(())
    }

    fn clear_deleted(&self, cid: &ContentId) -> Result<bool> {
        Ok(self.deleted.remove(cid.to_string().as_bytes())?.is_some())
    }

    fn is_deleted(&self, cid: &ContentId) -> Result<bool> {
        Ok(self.deleted.contains_key(cid.to_string().as_bytes())?)
    }
}
