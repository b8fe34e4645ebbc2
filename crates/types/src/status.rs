//! Derived status views served to callers.

use crate::{ContentId, Deal, Pin, Timestamp};
use serde::{Deserialize, Serialize};

/// Aggregate over every deal for a CID.
///
/// Serialized as `{"status": "ongoing" | "finalized", "deals": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "deals", rename_all = "lowercase")]
pub enum DealsView {
    /// At least one deal can still change (or there are none yet).
    Ongoing(Vec<Deal>),
    /// Every deal is terminal; the list will not change.
    Finalized(Vec<Deal>),
}

impl DealsView {
    /// Build the view, ordering deals by attempt then sequence.
    pub fn from_deals(mut deals: Vec<Deal>) -> Self {
        deals.sort_by(|a, b| {
            a.origin
                .cmp(&b.origin)
                .then_with(|| a.miner().cmp(&b.miner()))
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        if !deals.is_empty() && deals.iter().all(Deal::is_terminal) {
            DealsView::Finalized(deals)
        } else {
            DealsView::Ongoing(deals)
        }
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, DealsView::Finalized(_))
    }

    pub fn deals(&self) -> &[Deal] {
        match self {
            DealsView::Ongoing(deals) | DealsView::Finalized(deals) => deals,
        }
    }
}

impl Default for DealsView {
    fn default() -> Self {
        DealsView::Ongoing(Vec::new())
    }
}

/// Externally visible custody status of one CID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub cid: ContentId,
    pub deals: DealsView,
    pub pin: Pin,
    pub created: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}
