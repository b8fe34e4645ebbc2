//! DAG completeness claims and archival metadata.

use crate::{ContentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Known structural completeness of the DAG rooted at a CID.
///
/// `Unknown` means nobody has claimed anything yet; it may be partial or
/// complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DagStructure {
    #[default]
    Unknown,
    Partial,
    Complete,
}

/// Outcome of the claims verifier for one partition claim.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ClaimVerification {
    /// Published but not checked yet.
    #[default]
    Unverified,
    /// The partition is confirmed to hold the claimed blocks.
    Verified,
    /// The verifier walked the DAG over the recorded partitions and found
    /// every block.
    Complete,
}

/// Assertion that a CAR partition holds a set of blocks of a CID's DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionClaim {
    pub cid: ContentId,
    pub partition: ContentId,
    #[serde(default)]
    pub blocks: BTreeSet<ContentId>,
    /// Full block set of the DAG, when the verifier knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dag_blocks: Option<BTreeSet<ContentId>>,
    #[serde(default)]
    pub verification: ClaimVerification,
}

/// Stored fold of every claim seen for one (cid, partition).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionRecord {
    pub cid: ContentId,
    pub partition: ContentId,
    pub blocks: BTreeSet<ContentId>,
    pub verification: ClaimVerification,
    pub recorded_at: Timestamp,
}

impl PartitionRecord {
    pub fn from_claim(claim: &PartitionClaim, at: Timestamp) -> Self {
        Self {
            cid: claim.cid,
            partition: claim.partition,
            blocks: claim.blocks.clone(),
            verification: claim.verification,
            recorded_at: at,
        }
    }

    /// Fold a later claim for the same partition. Blocks accumulate and the
    /// verification level never drops.
    pub fn absorb(&mut self, claim: &PartitionClaim) -> bool {
        let before = (self.blocks.len(), self.verification);
        self.blocks.extend(claim.blocks.iter().copied());
        self.verification = self.verification.max(claim.verification);
        before != (self.blocks.len(), self.verification)
    }
}

/// Per-CID completeness state kept next to the partition records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagSummary {
    pub cid: ContentId,
    pub structure: DagStructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dag_blocks: Option<BTreeSet<ContentId>>,
}

impl DagSummary {
    pub fn new(cid: ContentId) -> Self {
        Self {
            cid,
            structure: DagStructure::Unknown,
            dag_blocks: None,
        }
    }
}

/// Mapping written when a CAR file is archived. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub structure: DagStructure,
    pub source_cid: ContentId,
    pub content_cid: ContentId,
    pub car_cid: ContentId,
}
