//! Entry point used by the HTTP surface and in-process collaborators.

use crate::aggregator::StatusAggregator;
use crate::completeness::CompletenessTracker;
use crate::error::{ApplyOutcome, CustodyError, Result, TransitionViolation};
use crate::gate::IngestionGate;
use crate::locks::KeyLocks;
use custody_storage::CustodyStore;
use custody_types::{
    BackupMetadata, ContentId, DagStructure, Deal, PartitionClaim, Pin, StatusResult,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Wires the gate, the completeness tracker and the aggregator to one store.
pub struct CustodyTracker {
    store: Arc<dyn CustodyStore>,
    gate: IngestionGate,
    completeness: CompletenessTracker,
    aggregator: StatusAggregator,
    backup_locks: KeyLocks<ContentId>,
}

impl CustodyTracker {
    pub fn new(store: Arc<dyn CustodyStore>) -> Self {
        Self {
            gate: IngestionGate::new(store.clone()),
            completeness: CompletenessTracker::new(store.clone()),
            aggregator: StatusAggregator::new(store.clone()),
            backup_locks: KeyLocks::new(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn CustodyStore> {
        &self.store
    }

    pub fn apply_deal_update(&self, update: Deal) -> Result<ApplyOutcome> {
        self.gate.apply_deal_update(update)
    }

    pub fn apply_pin_update(&self, update: Pin) -> Result<ApplyOutcome> {
        self.gate.apply_pin_update(update)
    }

    /// Record a partition claim stamped with the current time.
    pub fn record_claim(&self, claim: PartitionClaim) -> Result<DagStructure> {
        self.completeness.record_claim(claim, chrono::Utc::now())
    }

    pub fn structure_for(&self, cid: &ContentId) -> Result<DagStructure> {
        self.completeness.structure_for(cid)
    }

    pub fn parts_for(&self, cid: &ContentId) -> Result<Vec<ContentId>> {
        self.completeness.parts_for(cid)
    }

    pub fn status_for(&self, cid: &ContentId) -> Result<StatusResult> {
        self.aggregator.status_for(cid)
    }

    /// Hide `cid` from status reads. Records stay in the store and a later
    /// update brings the cid back.
    pub fn delete(&self, cid: &ContentId) -> Result<()> {
        if self.store.is_deleted(cid)? || !self.store.has_records(cid)? {
            return Err(CustodyError::NotFound { cid: *cid });
        }
        self.store.mark_deleted(cid)?;
        info!(cid = %cid, "content deleted");
        Ok(())
    }

    /// Register an archived CAR file. The mapping for a car cid never
    /// changes once written.
    pub fn record_backup(&self, backup: BackupMetadata) -> Result<ApplyOutcome> {
        let car_cid = backup.car_cid;
        self.backup_locks.with(&car_cid, || -> Result<ApplyOutcome> {
            match self.store.get_backup(&car_cid)? {
                Some(existing) if existing == backup => Ok(ApplyOutcome::Unchanged),
                Some(_) => {
                    warn!(car = %car_cid, "refused to rewrite backup metadata");
                    Err(CustodyError::invalid(
                        car_cid,
                        TransitionViolation::BackupConflict { car_cid },
                    ))
                }
                None => {
                    debug!(
                        car = %car_cid,
                        source = %backup.source_cid,
                        structure = ?backup.structure,
                        "backup recorded"
                    );
                    self.store.put_backup(backup)?;
                    Ok(ApplyOutcome::Created)
                }
            }
        })
    }

    pub fn backups_for(&self, source_cid: &ContentId) -> Result<Vec<BackupMetadata>> {
        Ok(self.store.backups_for(source_cid)?)
    }
}
