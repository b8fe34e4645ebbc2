//! Read-side projection of the record stores into a `StatusResult`.

use crate::error::{CustodyError, Result};
use custody_storage::CustodyStore;
use custody_types::{surfaced_pin, ContentId, Deal, DealsView, Pin, StatusResult};
use std::sync::Arc;

/// Pure projection: nothing is written on read.
pub struct StatusAggregator {
    store: Arc<dyn CustodyStore>,
}

impl StatusAggregator {
    pub fn new(store: Arc<dyn CustodyStore>) -> Self {
        Self { store }
    }

    pub fn status_for(&self, cid: &ContentId) -> Result<StatusResult> {
        if self.store.is_deleted(cid)? {
            return Err(CustodyError::NotFound { cid: *cid });
        }

        let deals = self.store.deals_for(cid)?;
        let pins = self.store.pins_for(cid)?;
        let partitions = self.store.partitions_for(cid)?;

        let created = deals
            .iter()
            .map(Deal::first_seen_at)
            .chain(pins.iter().map(|pin| pin.created))
            .chain(partitions.iter().map(|record| record.recorded_at))
            .min()
            .ok_or(CustodyError::NotFound { cid: *cid })?;

        let pin = surfaced_pin(&pins)
            .cloned()
            .unwrap_or_else(|| Pin::synthetic_queued(*cid, created));
        let size = pins.iter().filter_map(|pin| pin.size).max();

        Ok(StatusResult {
            cid: *cid,
            deals: DealsView::from_deals(deals),
            pin,
            created,
            size,
        })
    }
}
