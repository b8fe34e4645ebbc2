//! Storage-deal records.
//!
//! A [`Deal`] is one attempt to store a CID with one miner. Each status carries
//! exactly the fields that exist at that stage, so a published deal always has
//! a chain deal id and an active deal always has its activation window.

use crate::{ContentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flat status of a deal, as reported upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    Queued,
    Proposing,
    Rejected,
    Accepted,
    Errored,
    Published,
    Active,
    Terminated,
}

impl DealStatus {
    /// `active` and `terminated` never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DealStatus::Active | DealStatus::Terminated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::Queued => "queued",
            DealStatus::Proposing => "proposing",
            DealStatus::Rejected => "rejected",
            DealStatus::Accepted => "accepted",
            DealStatus::Errored => "errored",
            DealStatus::Published => "published",
            DealStatus::Active => "active",
            DealStatus::Terminated => "terminated",
        }
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Miner assignment of a pending deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub miner: String,
}

/// A deal that made it on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub miner: String,
    pub chain_deal_id: u64,
}

/// A deal that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finalization {
    pub miner: String,
    pub chain_deal_id: u64,
    pub deal_activation_timestamp: Timestamp,
    pub deal_expiration_timestamp: Timestamp,
}

/// Status-specific part of a deal, tagged by `status` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DealState {
    Queued,
    Proposing(Assignment),
    Rejected(Assignment),
    Accepted(Assignment),
    Errored(Assignment),
    Published(Publication),
    Active(Finalization),
    Terminated(Finalization),
}

impl DealState {
    pub fn status(&self) -> DealStatus {
        match self {
            DealState::Queued => DealStatus::Queued,
            DealState::Proposing(_) => DealStatus::Proposing,
            DealState::Rejected(_) => DealStatus::Rejected,
            DealState::Accepted(_) => DealStatus::Accepted,
            DealState::Errored(_) => DealStatus::Errored,
            DealState::Published(_) => DealStatus::Published,
            DealState::Active(_) => DealStatus::Active,
            DealState::Terminated(_) => DealStatus::Terminated,
        }
    }

    pub fn miner(&self) -> Option<&str> {
        match self {
            DealState::Queued => None,
            DealState::Proposing(a)
            | DealState::Rejected(a)
            | DealState::Accepted(a)
            | DealState::Errored(a) => Some(&a.miner),
            DealState::Published(p) => Some(&p.miner),
            DealState::Active(f) | DealState::Terminated(f) => Some(&f.miner),
        }
    }

    pub fn chain_deal_id(&self) -> Option<u64> {
        match self {
            DealState::Published(p) => Some(p.chain_deal_id),
            DealState::Active(f) | DealState::Terminated(f) => Some(f.chain_deal_id),
            _ => None,
        }
    }

    pub fn finalization(&self) -> Option<&Finalization> {
        match self {
            DealState::Active(f) | DealState::Terminated(f) => Some(f),
            _ => None,
        }
    }
}

/// Where a deal record lives in the deal store.
///
/// A queued deal has no miner yet and sits in a provisional slot named after
/// the sequence number of its first queued event (`origin`). Once a later
/// update for the same origin names a miner, the record moves to the miner
/// slot; it is never duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DealSlot {
    Provisional { origin: u64 },
    Miner { miner: String, origin: u64 },
}

impl DealSlot {
    pub fn origin(&self) -> u64 {
        match self {
            DealSlot::Provisional { origin } | DealSlot::Miner { origin, .. } => *origin,
        }
    }
}

impl fmt::Display for DealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DealSlot::Provisional { origin } => write!(f, "p/{origin:020}"),
            DealSlot::Miner { miner, origin } => write!(f, "m/{miner}/{origin:020}"),
        }
    }
}

/// Store key of one deal attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DealKey {
    pub cid: ContentId,
    pub slot: DealSlot,
}

impl DealKey {
    pub fn provisional(cid: ContentId, origin: u64) -> Self {
        Self {
            cid,
            slot: DealSlot::Provisional { origin },
        }
    }
}

impl fmt::Display for DealKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cid, self.slot)
    }
}

/// One storage-deal attempt with one miner for one CID.
///
/// Updates from the deal indexer carry the full target record, so the same
/// type is used for stored records and for update events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub cid: ContentId,
    /// Sequence number of the first queued event for this attempt.
    pub origin: u64,
    pub sequence: u64,
    pub last_status_change_timestamp: Timestamp,
    /// When the attempt was first accepted. Stamped by the ingestion gate
    /// and carried unchanged by every later version of the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<Timestamp>,
    #[serde(flatten)]
    pub state: DealState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piece_cid: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_root_cid: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datamodel_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
}

impl Deal {
    /// Create a freshly queued deal; `origin` and `sequence` start equal.
    pub fn queued(cid: ContentId, sequence: u64, at: Timestamp) -> Self {
        Self {
            cid,
            origin: sequence,
            sequence,
            last_status_change_timestamp: at,
            first_seen: Some(at),
            state: DealState::Queued,
            piece_cid: None,
            batch_root_cid: None,
            datamodel_selector: None,
            status_text: None,
        }
    }

    /// Derive the next record for the same attempt.
    pub fn advance(&self, sequence: u64, at: Timestamp, state: DealState) -> Self {
        Self {
            sequence,
            last_status_change_timestamp: at,
            state,
            ..self.clone()
        }
    }

    /// First-seen time, falling back to the record's own timestamp for
    /// records that were never stamped.
    pub fn first_seen_at(&self) -> Timestamp {
        self.first_seen.unwrap_or(self.last_status_change_timestamp)
    }

    pub fn status(&self) -> DealStatus {
        self.state.status()
    }

    pub fn miner(&self) -> Option<&str> {
        self.state.miner()
    }

    pub fn chain_deal_id(&self) -> Option<u64> {
        self.state.chain_deal_id()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn key(&self) -> DealKey {
        let slot = match self.miner() {
            Some(miner) => DealSlot::Miner {
                miner: miner.to_string(),
                origin: self.origin,
            },
            None => DealSlot::Provisional {
                origin: self.origin,
            },
        };
        DealKey {
            cid: self.cid,
            slot,
        }
    }

    /// Check invariants the tagged state cannot express on its own.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(miner) = self.miner() {
            if miner.trim().is_empty() {
                return Err(format!("deal {} has an empty miner", self.key()));
            }
        }
        if let Some(f) = self.state.finalization() {
            if f.deal_expiration_timestamp < f.deal_activation_timestamp {
                return Err(format!(
                    "deal {} expires ({}) before it activates ({})",
                    self.key(),
                    f.deal_expiration_timestamp,
                    f.deal_activation_timestamp
                ));
            }
        }
        if self.sequence < self.origin {
            return Err(format!(
                "deal {} has sequence {} below its origin",
                self.key(),
                self.sequence
            ));
        }
        Ok(())
    }
}
