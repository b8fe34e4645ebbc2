//! DAG completeness tracking.
//!
//! The claims verifier decides whether a partition really holds the blocks
//! it claims; this tracker only folds its verdicts. A cid becomes
//! `Complete` when a claim arrives at level `complete`, or when the verified
//! partitions together cover the cid's full block set. `Complete` is a
//! latch: later claims never move it back.

use crate::error::Result;
use crate::locks::KeyLocks;
use crate::metrics;
use custody_storage::CustodyStore;
use custody_types::{
    ClaimVerification, ContentId, DagStructure, DagSummary, PartitionClaim, PartitionRecord,
    Timestamp,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

pub struct CompletenessTracker {
    store: Arc<dyn CustodyStore>,
    locks: KeyLocks<ContentId>,
}

impl CompletenessTracker {
    pub fn new(store: Arc<dyn CustodyStore>) -> Self {
        Self {
            store,
            locks: KeyLocks::new(),
        }
    }

    /// Fold `claim` into the partition record and return the resulting
    /// structure for the claim's cid.
    pub fn record_claim(&self, claim: PartitionClaim, at: Timestamp) -> Result<DagStructure> {
        let cid = claim.cid;
        let structure = self.locks.with(&cid, || self.record_locked(&claim, at))?;
        metrics::record_claim();
        Ok(structure)
    }

    fn record_locked(&self, claim: &PartitionClaim, at: Timestamp) -> Result<DagStructure> {
        let cid = claim.cid;

        match self.store.get_partition(&cid, &claim.partition)? {
            Some(mut record) => {
                if record.absorb(claim) {
                    self.store.upsert_partition(record)?;
                }
            }
            None => self
                .store
                .upsert_partition(PartitionRecord::from_claim(claim, at))?,
        }

        let stored = self.store.dag_summary(&cid)?;
        let mut summary = stored.clone().unwrap_or_else(|| DagSummary::new(cid));
        if summary.dag_blocks.is_none() {
            summary.dag_blocks = claim.dag_blocks.clone().filter(|blocks| !blocks.is_empty());
        }

        if summary.structure != DagStructure::Complete {
            summary.structure = if claim.verification == ClaimVerification::Complete
                || self.covers_dag(&summary)?
            {
                info!(cid = %cid, partition = %claim.partition, "DAG complete");
                DagStructure::Complete
            } else {
                DagStructure::Partial
            };
        }

        debug!(
            cid = %cid,
            partition = %claim.partition,
            structure = ?summary.structure,
            "partition claim recorded"
        );
        let structure = summary.structure;
        if stored.as_ref() != Some(&summary) {
            self.store.put_dag_summary(summary)?;
        }
        Ok(structure)
    }

    /// Whether verified partitions hold every block of the known DAG.
    fn covers_dag(&self, summary: &DagSummary) -> Result<bool> {
        let Some(dag_blocks) = summary.dag_blocks.as_ref() else {
            return Ok(false);
        };
        let mut present = BTreeSet::new();
        for record in self.store.partitions_for(&summary.cid)? {
            if record.verification >= ClaimVerification::Verified {
                present.extend(record.blocks);
            }
        }
        Ok(dag_blocks.is_subset(&present))
    }

    /// `Unknown` until the first claim for `cid` is recorded.
    pub fn structure_for(&self, cid: &ContentId) -> Result<DagStructure> {
        Ok(self
            .store
            .dag_summary(cid)?
            .map(|summary| summary.structure)
            .unwrap_or_default())
    }

    /// Partition (CAR) cids recorded for `cid`.
    pub fn parts_for(&self, cid: &ContentId) -> Result<Vec<ContentId>> {
        Ok(self
            .store
            .partitions_for(cid)?
            .into_iter()
            .map(|record| record.partition)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{at, cid, claim};
    use custody_storage::MemoryCustodyStore;

    fn tracker() -> CompletenessTracker {
        CompletenessTracker::new(Arc::new(MemoryCustodyStore::new()))
    }

    #[test]
    fn test_unknown_until_first_claim() {
        let tracker = tracker();
        assert_eq!(tracker.structure_for(&cid("root")).unwrap(), DagStructure::Unknown);
        assert!(tracker.parts_for(&cid("root")).unwrap().is_empty());
    }

    #[test]
    fn test_unverified_claims_stay_partial() {
        let tracker = tracker();
        let mut c = claim("root", "p0", &["a", "b"], Some(&["a", "b"]));
        c.verification = ClaimVerification::Unverified;
        assert_eq!(tracker.record_claim(c, at(0)).unwrap(), DagStructure::Partial);
    }

    #[test]
    fn test_union_of_partitions_completes() {
        let tracker = tracker();
        let all = ["a", "b", "c"];
        let first = claim("root", "p0", &["a", "b"], Some(&all));
        assert_eq!(tracker.record_claim(first, at(0)).unwrap(), DagStructure::Partial);

        let second = claim("root", "p1", &["c"], None);
        assert_eq!(tracker.record_claim(second, at(1)).unwrap(), DagStructure::Complete);
        assert_eq!(tracker.parts_for(&cid("root")).unwrap().len(), 2);
    }

    #[test]
    fn test_verifier_can_declare_complete() {
        let tracker = tracker();
        let mut c = claim("root", "p0", &["a"], None);
        c.verification = ClaimVerification::Complete;
        assert_eq!(tracker.record_claim(c, at(0)).unwrap(), DagStructure::Complete);

        let mut late = claim("root", "p1", &["z"], None);
        late.verification = ClaimVerification::Unverified;
        assert_eq!(tracker.record_claim(late, at(1)).unwrap(), DagStructure::Complete);
        assert_eq!(tracker.structure_for(&cid("root")).unwrap(), DagStructure::Complete);
    }

    #[test]
    fn test_repeated_claims_fold_into_one_partition() {
        let tracker = tracker();
        let all = ["a", "b"];
        tracker
            .record_claim(claim("root", "p0", &["a"], Some(&all)), at(0))
            .unwrap();
        let structure = tracker
            .record_claim(claim("root", "p0", &["b"], None), at(1))
            .unwrap();
        assert_eq!(structure, DagStructure::Complete);
        assert_eq!(tracker.parts_for(&cid("root")).unwrap(), vec![cid("p0")]);
    }
}
