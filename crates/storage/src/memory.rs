//! In-memory record store (tests and single-process deployments).

use crate::{ClaimStore, CustodyStore, DealStore, PinStore, Result};
use custody_types::{BackupMetadata, ContentId, DagSummary, Deal, DealSlot, PartitionRecord, Pin};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MemoryCustodyStore {
    inner: Arc<MemoryCustodyStoreInner>,
}

#[derive(Default)]
struct MemoryCustodyStoreInner {
    /// cid -> slot -> deal
    deals: RwLock<HashMap<ContentId, BTreeMap<DealSlot, Deal>>>,

    /// request id -> pin
    pins: RwLock<HashMap<String, Pin>>,

    /// cid -> request ids
    pins_by_cid: RwLock<HashMap<ContentId, BTreeSet<String>>>,

    /// cid -> partition -> record
    partitions: RwLock<HashMap<ContentId, BTreeMap<ContentId, PartitionRecord>>>,

    summaries: RwLock<HashMap<ContentId, DagSummary>>,

    /// car cid -> backup
    backups: RwLock<HashMap<ContentId, BackupMetadata>>,

    deleted: RwLock<HashSet<ContentId>>,
}

impl MemoryCustodyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DealStore for MemoryCustodyStore {
    fn deals_for(&self, cid: &ContentId) -> Result<Vec<Deal>> {
        let deals = self.inner.deals.read();
        Ok(deals
            .get(cid)
            .map(|slots| slots.values().cloned().collect())
            .unwrap_or_default())
    }

    fn find_deal(&self, cid: &ContentId, origin: u64) -> Result<Option<Deal>> {
        let deals = self.inner.deals.read();
        Ok(deals.get(cid).and_then(|slots| {
            slots
                .iter()
                .find(|(slot, _)| slot.origin() == origin)
                .map(|(_, deal)| deal.clone())
        }))
    }

    fn upsert_deal(&self, deal: Deal) -> Result<()> {
        let key = deal.key();
        let mut deals = self.inner.deals.write();
        let slots = deals.entry(key.cid).or_default();
        slots.retain(|slot, _| slot.origin() != key.slot.origin());
        slots.insert(key.slot, deal);
        Ok(())
    }
}

impl PinStore for MemoryCustodyStore {
    fn get_pin(&self, request_id: &str) -> Result<Option<Pin>> {
        Ok(self.inner.pins.read().get(request_id).cloned())
    }

    fn pins_for(&self, cid: &ContentId) -> Result<Vec<Pin>> {
        let by_cid = self.inner.pins_by_cid.read();
        let pins = self.inner.pins.read();

        let ids = match by_cid.get(cid) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };

        Ok(ids.iter().filter_map(|id| pins.get(id).cloned()).collect())
    }

    fn upsert_pin(&self, pin: Pin) -> Result<()> {
        // Lock order: pins_by_cid, then pins (same as pins_for).
        let mut by_cid = self.inner.pins_by_cid.write();
        let mut pins = self.inner.pins.write();

        if let Some(previous) = pins.get(&pin.request_id) {
            if previous.cid != pin.cid {
                if let Some(ids) = by_cid.get_mut(&previous.cid) {
                    ids.remove(&pin.request_id);
                }
            }
        }
        by_cid
            .entry(pin.cid)
            .or_default()
            .insert(pin.request_id.clone());
        pins.insert(pin.request_id.clone(), pin);
        Ok(())
    }
}

impl ClaimStore for MemoryCustodyStore {
    fn partitions_for(&self, cid: &ContentId) -> Result<Vec<PartitionRecord>> {
        let partitions = self.inner.partitions.read();
        Ok(partitions
            .get(cid)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn get_partition(
        &self,
        cid: &ContentId,
        partition: &ContentId,
    ) -> Result<Option<PartitionRecord>> {
        let partitions = self.inner.partitions.read();
        Ok(partitions
            .get(cid)
            .and_then(|records| records.get(partition))
            .cloned())
    }

    fn upsert_partition(&self, record: PartitionRecord) -> Result<()> {
        self.inner
            .partitions
            .write()
            .entry(record.cid)
            .or_default()
            .insert(record.partition, record);
        Ok(())
    }

    fn dag_summary(&self, cid: &ContentId) -> Result<Option<DagSummary>> {
        Ok(self.inner.summaries.read().get(cid).cloned())
    }

    fn put_dag_summary(&self, summary: DagSummary) -> Result<()> {
        self.inner.summaries.write().insert(summary.cid, summary);
        Ok(())
    }
}

impl CustodyStore for MemoryCustodyStore {
    fn get_backup(&self, car_cid: &ContentId) -> Result<Option<BackupMetadata>> {
        Ok(self.inner.backups.read().get(car_cid).cloned())
    }

    fn put_backup(&self, backup: BackupMetadata) -> Result<()> {
        self.inner.backups.write().insert(backup.car_cid, backup);
        Ok(())
    }

    fn backups_for(&self, source_cid: &ContentId) -> Result<Vec<BackupMetadata>> {
        let backups = self.inner.backups.read();
        let mut list: Vec<BackupMetadata> = backups
            .values()
            .filter(|backup| &backup.source_cid == source_cid)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.car_cid.cmp(&b.car_cid));
        Ok(list)
    }

    fn mark_deleted(&self, cid: &ContentId) -> Result<()> {
        self.inner.deleted.write().insert(*cid);
        Ok(())
    }

    fn clear_deleted(&self, cid: &ContentId) -> Result<bool> {
        Ok(self.inner.deleted.write().remove(cid))
    }

    fn is_deleted(&self, cid: &ContentId) -> Result<bool> {
        Ok(self.inner.deleted.read().contains(cid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cid::Cid;
    use custody_types::{Assignment, DealState, PinStatus, Timestamp};
    use multihash_codetable::{Code, MultihashDigest};

    fn cid(seed: &[u8]) -> ContentId {
        ContentId::new(Cid::new_v1(0x55, Code::Sha2_256.digest(seed)))
    }

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_rekey_on_miner_assignment() {
        let store = MemoryCustodyStore::new();
        let root = cid(b"root");

        let queued = Deal::queued(root, 10, at(0));
        store.upsert_deal(queued.clone()).unwrap();
        assert_eq!(store.find_deal(&root, 10).unwrap(), Some(queued.clone()));

        let proposing = queued.advance(
            11,
            at(1),
            DealState::Proposing(Assignment {
                miner: "f0100".into(),
            }),
        );
        store.upsert_deal(proposing.clone()).unwrap();

        let deals = store.deals_for(&root).unwrap();
        assert_eq!(deals, vec![proposing]);
    }

    #[test]
    fn test_independent_attempts_coexist() {
        let store = MemoryCustodyStore::new();
        let root = cid(b"root");

        store.upsert_deal(Deal::queued(root, 1, at(0))).unwrap();
        store.upsert_deal(Deal::queued(root, 2, at(0))).unwrap();
        store.upsert_deal(Deal::queued(cid(b"other"), 1, at(0))).unwrap();

        assert_eq!(store.deals_for(&root).unwrap().len(), 2);
        assert!(store.find_deal(&root, 3).unwrap().is_none());
    }

    #[test]
    fn test_pin_index_follows_cid_changes() {
        let store = MemoryCustodyStore::new();
        let first = cid(b"first");
        let second = cid(b"second");

        store
            .upsert_pin(Pin::new("req", first, PinStatus::Queued, at(0)))
            .unwrap();
        store
            .upsert_pin(Pin::new("req", second, PinStatus::Queued, at(0)))
            .unwrap();

        assert!(store.pins_for(&first).unwrap().is_empty());
        assert_eq!(store.pins_for(&second).unwrap().len(), 1);
    }

    #[test]
    fn test_deletion_marker_and_has_records() {
        let store = MemoryCustodyStore::new();
        let root = cid(b"root");

        assert!(!store.has_records(&root).unwrap());
        store.upsert_deal(Deal::queued(root, 1, at(0))).unwrap();
        assert!(store.has_records(&root).unwrap());

        store.mark_deleted(&root).unwrap();
        assert!(store.is_deleted(&root).unwrap());
        assert!(store.clear_deleted(&root).unwrap());
        assert!(!store.clear_deleted(&root).unwrap());
    }
}
