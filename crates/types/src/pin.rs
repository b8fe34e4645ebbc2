//! Pinning (IPFS replication) records.

use crate::{ContentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinStatus {
    Queued,
    Pinning,
    Pinned,
    Failed,
}

impl PinStatus {
    /// `pinned` and `failed` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PinStatus::Pinned | PinStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PinStatus::Queued => "queued",
            PinStatus::Pinning => "pinning",
            PinStatus::Pinned => "pinned",
            PinStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One replication request for a CID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    #[serde(rename = "requestid")]
    pub request_id: String,
    pub cid: ContentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: PinStatus,
    pub created: Timestamp,
    /// Time of the last status change; absent until the first change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    /// Size of the pinned DAG in bytes, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Pin {
    pub fn new(
        request_id: impl Into<String>,
        cid: ContentId,
        status: PinStatus,
        created: Timestamp,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            cid,
            name: None,
            status,
            created,
            updated: None,
            meta: BTreeMap::new(),
            size: None,
        }
    }

    /// Placeholder reported while content has not reached the pinning service.
    pub fn synthetic_queued(cid: ContentId, created: Timestamp) -> Self {
        Self::new(String::new(), cid, PinStatus::Queued, created)
    }

    /// Timestamp used for last-write-wins ordering.
    pub fn changed_at(&self) -> Timestamp {
        self.updated.unwrap_or(self.created)
    }

    /// Copy of this pin moved to `status` at `at`.
    pub fn transitioned(&self, status: PinStatus, at: Timestamp) -> Self {
        Self {
            status,
            updated: Some(at),
            ..self.clone()
        }
    }
}

/// Pick the pin reported for a CID: the most recently created non-failed pin,
/// or the most recently created one when every request failed.
pub fn surfaced_pin(pins: &[Pin]) -> Option<&Pin> {
    let newest = |a: &&Pin, b: &&Pin| {
        a.created
            .cmp(&b.created)
            .then_with(|| a.request_id.cmp(&b.request_id))
    };
    pins.iter()
        .filter(|pin| pin.status != PinStatus::Failed)
        .max_by(newest)
        .or_else(|| pins.iter().max_by(newest))
}
