//! Update ingestion gate.
//!
//! Upstream collaborators deliver deal and pin events at least once and in
//! any order. The gate serializes events per key, discards stale ones,
//! refuses protocol violations and writes everything else through to the
//! store as a whole record.

use crate::error::{ApplyOutcome, CustodyError, Result, TransitionViolation};
use crate::locks::KeyLocks;
use crate::metrics;
use custody_storage::CustodyStore;
use custody_types::{ContentId, Deal, Pin};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub struct IngestionGate {
    store: Arc<dyn CustodyStore>,
    /// Deal attempts re-key between slots of one cid, so the cid is the key.
    deal_locks: KeyLocks<ContentId>,
    pin_locks: KeyLocks<String>,
}

impl IngestionGate {
    pub fn new(store: Arc<dyn CustodyStore>) -> Self {
        Self {
            store,
            deal_locks: KeyLocks::new(),
            pin_locks: KeyLocks::new(),
        }
    }

    /// Apply a deal event carrying the full target record.
    pub fn apply_deal_update(&self, update: Deal) -> Result<ApplyOutcome> {
        let cid = update.cid;
        let key = update.key().to_string();
        let result = self
            .deal_locks
            .with(&cid, || self.apply_deal_locked(update));

        metrics::record_update(metrics::DEAL_UPDATES, &result);
        match &result {
            Ok(ApplyOutcome::Stale) => trace!(deal = %key, "discarded stale deal update"),
            Ok(outcome) => debug!(deal = %key, outcome = outcome.as_str(), "deal update applied"),
            Err(CustodyError::InvalidTransition { reason, .. }) => {
                warn!(deal = %key, kind = reason.kind(), "rejected deal update: {}", reason)
            }
            Err(err) => warn!(deal = %key, "deal update failed: {}", err),
        }
        result
    }

    fn apply_deal_locked(&self, mut update: Deal) -> Result<ApplyOutcome> {
        let cid = update.cid;
        update
            .validate()
            .map_err(|reason| CustodyError::invalid(cid, TransitionViolation::Malformed(reason)))?;

        let outcome = match self.store.find_deal(&cid, update.origin)? {
            None => {
                update.first_seen = Some(update.first_seen_at());
                ApplyOutcome::Created
            }
            Some(existing) => {
                if update.sequence < existing.sequence {
                    return Ok(ApplyOutcome::Stale);
                }
                update.first_seen = Some(existing.first_seen_at());
                if update == existing {
                    return Ok(ApplyOutcome::Unchanged);
                }
                check_deal_transition(&existing, &update)
                    .map_err(|reason| CustodyError::invalid(cid, reason))?;
                ApplyOutcome::Updated
            }
        };

        self.store.upsert_deal(update)?;
        Ok(outcome)
    }

    /// Apply a pin event carrying the full target record.
    pub fn apply_pin_update(&self, update: Pin) -> Result<ApplyOutcome> {
        let request_id = update.request_id.clone();
        let result = self
            .pin_locks
            .with(&request_id, || self.apply_pin_locked(update));

        metrics::record_update(metrics::PIN_UPDATES, &result);
        match &result {
            Ok(ApplyOutcome::Stale) => {
                trace!(request_id = %request_id, "discarded stale pin update")
            }
            Ok(outcome) => {
                debug!(request_id = %request_id, outcome = outcome.as_str(), "pin update applied")
            }
            Err(CustodyError::InvalidTransition { reason, .. }) => {
                warn!(request_id = %request_id, kind = reason.kind(), "rejected pin update: {}", reason)
            }
            Err(err) => warn!(request_id = %request_id, "pin update failed: {}", err),
        }
        result
    }

    fn apply_pin_locked(&self, update: Pin) -> Result<ApplyOutcome> {
        let cid = update.cid;
        if update.request_id.is_empty() {
            return Err(CustodyError::invalid(
                cid,
                TransitionViolation::Malformed("pin without a request id".to_string()),
            ));
        }
        if let Some(updated) = update.updated {
            if updated < update.created {
                return Err(CustodyError::invalid(
                    cid,
                    TransitionViolation::Malformed(format!(
                        "pin {} updated ({}) before it was created ({})",
                        update.request_id, updated, update.created
                    )),
                ));
            }
        }

        let outcome = match self.store.get_pin(&update.request_id)? {
            None => ApplyOutcome::Created,
            Some(existing) => {
                if existing.cid != update.cid {
                    return Err(CustodyError::invalid(
                        cid,
                        TransitionViolation::CidMismatch {
                            request_id: update.request_id,
                            recorded: existing.cid,
                            offered: update.cid,
                        },
                    ));
                }
                if update.changed_at() < existing.changed_at() {
                    return Ok(ApplyOutcome::Stale);
                }
                if update == existing {
                    return Ok(ApplyOutcome::Unchanged);
                }
                if existing.status.is_terminal() && update.status != existing.status {
                    return Err(CustodyError::invalid(
                        cid,
                        TransitionViolation::PinRegressed {
                            request_id: update.request_id,
                            from: existing.status,
                            to: update.status,
                        },
                    ));
                }
                ApplyOutcome::Updated
            }
        };

        self.store.upsert_pin(update)?;
        if outcome == ApplyOutcome::Created {
            self.revive(&cid)?;
        }
        Ok(outcome)
    }

    /// A new pin request for a deleted cid means the content was uploaded
    /// again. Progress on existing deals or pins leaves the marker in place.
    fn revive(&self, cid: &ContentId) -> Result<()> {
        if self.store.clear_deleted(cid)? {
            info!(cid = %cid, "deleted content revived by a new pin request");
        }
        Ok(())
    }
}

/// Rules for moving an existing deal record to `update` (same attempt,
/// sequence not lower).
pub fn check_deal_transition(
    existing: &Deal,
    update: &Deal,
) -> std::result::Result<(), TransitionViolation> {
    let key = existing.key().to_string();

    if existing.is_terminal() && update.status() != existing.status() {
        return Err(if update.is_terminal() {
            TransitionViolation::TerminalDealChanged {
                key,
                from: existing.status(),
                to: update.status(),
            }
        } else {
            TransitionViolation::TerminalDealReopened {
                key,
                from: existing.status(),
                to: update.status(),
            }
        });
    }

    if let Some(recorded) = existing.chain_deal_id() {
        if update.chain_deal_id() != Some(recorded) {
            return Err(TransitionViolation::ChainDealIdConflict {
                key,
                recorded,
                offered: update.chain_deal_id(),
            });
        }
    }

    if let Some(recorded) = existing.miner() {
        if update.miner() != Some(recorded) {
            return Err(TransitionViolation::MinerConflict {
                key,
                recorded: recorded.to_string(),
                offered: update.miner().map(str::to_string),
            });
        }
    }

    Ok(())
}
