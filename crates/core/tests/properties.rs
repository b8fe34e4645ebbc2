//! Property tests for the ordering and monotonicity rules.

use chrono::{Duration, TimeZone, Utc};
use cid::Cid;
use custody_core::{ApplyOutcome, CustodyTracker};
use custody_storage::{DealStore, MemoryCustodyStore};
use custody_types::{
    Assignment, ClaimVerification, ContentId, DagStructure, Deal, DealState, DealsView,
    Finalization, PartitionClaim, Publication, Timestamp,
};
use multihash_codetable::{Code, MultihashDigest};
use proptest::prelude::*;
use std::sync::Arc;

fn cid(seed: &str) -> ContentId {
    ContentId::new(Cid::new_v1(0x70, Code::Sha2_256.digest(seed.as_bytes())))
}

fn at(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
}

/// Status index 0..8 for one attempt with miner `f01` and chain id 11.
fn state_for(index: u8) -> DealState {
    let assignment = Assignment {
        miner: "f01".into(),
    };
    let finalization = Finalization {
        miner: "f01".into(),
        chain_deal_id: 11,
        deal_activation_timestamp: at(1),
        deal_expiration_timestamp: at(2),
    };
    match index % 8 {
        0 => DealState::Queued,
        1 => DealState::Proposing(assignment),
        2 => DealState::Rejected(assignment),
        3 => DealState::Accepted(assignment),
        4 => DealState::Errored(assignment),
        5 => DealState::Published(Publication {
            miner: "f01".into(),
            chain_deal_id: 11,
        }),
        6 => DealState::Active(finalization),
        _ => DealState::Terminated(finalization),
    }
}

fn arbitrary_updates() -> impl Strategy<Value = Vec<(u64, u8)>> {
    prop::collection::vec((1u64..=40, 0u8..8), 1..30)
}

fn tracker() -> (CustodyTracker, Arc<MemoryCustodyStore>) {
    let store = Arc::new(MemoryCustodyStore::new());
    (CustodyTracker::new(store.clone()), store)
}

proptest! {
    #[test]
    fn terminal_deals_never_change_status(updates in arbitrary_updates()) {
        let (tracker, store) = tracker();
        let root = cid("root");
        let queued = Deal::queued(root, 1, at(0));
        let mut terminal = None;

        for (sequence, index) in updates {
            let update = queued.advance(sequence, at(sequence as i64), state_for(index));
            let _ = tracker.apply_deal_update(update);
            if let Some(deal) = store.find_deal(&root, 1).unwrap() {
                if let Some(status) = terminal {
                    prop_assert_eq!(deal.status(), status);
                } else if deal.is_terminal() {
                    terminal = Some(deal.status());
                }
            }
        }
    }
}

proptest! {
    #[test]
    fn stored_sequence_never_decreases(updates in arbitrary_updates()) {
        let (tracker, store) = tracker();
        let root = cid("root");
        let queued = Deal::queued(root, 1, at(0));
        let mut high = 0u64;

        for (sequence, index) in updates {
            let update = queued.advance(sequence, at(sequence as i64), state_for(index));
            let outcome = tracker.apply_deal_update(update.clone());
            if sequence < high {
                prop_assert_eq!(outcome.ok(), Some(ApplyOutcome::Stale));
            }
            if let Some(deal) = store.find_deal(&root, 1).unwrap() {
                prop_assert!(deal.sequence >= high);
                high = deal.sequence;
            }
        }
    }
}

proptest! {
    #[test]
    fn duplicate_delivery_is_a_no_op(sequence in 1u64..100, index in 0u8..8) {
        let (tracker, store) = tracker();
        let update = Deal::queued(cid("root"), 1, at(0))
            .advance(sequence, at(0), state_for(index));

        prop_assert_eq!(tracker.apply_deal_update(update.clone()).unwrap(), ApplyOutcome::Created);
        let before = store.deals_for(&update.cid).unwrap();
        prop_assert_eq!(tracker.apply_deal_update(update.clone()).unwrap(), ApplyOutcome::Unchanged);
        prop_assert_eq!(store.deals_for(&update.cid).unwrap(), before);
    }
}

proptest! {
    #[test]
    fn finalized_iff_non_empty_and_all_terminal(indexes in prop::collection::vec(0u8..8, 0..10)) {
        let root = cid("root");
        let deals: Vec<Deal> = indexes
            .iter()
            .enumerate()
            .map(|(origin, index)| {
                Deal::queued(root, origin as u64, at(0)).advance(origin as u64, at(0), state_for(*index))
            })
            .collect();
        let expected = !deals.is_empty() && deals.iter().all(Deal::is_terminal);
        let view = DealsView::from_deals(deals);
        prop_assert_eq!(view.is_finalized(), expected);
    }
}

proptest! {
    #[test]
    fn complete_structure_never_regresses(
        claims in prop::collection::vec((0usize..4, prop::collection::btree_set(0usize..6, 0..6), 0u8..3), 1..20),
    ) {
        let (tracker, _) = tracker();
        let root = cid("root");
        let dag: std::collections::BTreeSet<ContentId> = (0..6).map(|b| cid(&format!("b{b}"))).collect();
        let mut complete = false;

        for (partition, blocks, level) in claims {
            let verification = match level {
                0 => ClaimVerification::Unverified,
                1 => ClaimVerification::Verified,
                _ => ClaimVerification::Complete,
            };
            let structure = tracker
                .record_claim(PartitionClaim {
                    cid: root,
                    partition: cid(&format!("p{partition}")),
                    blocks: blocks.iter().map(|b| cid(&format!("b{b}"))).collect(),
                    dag_blocks: Some(dag.clone()),
                    verification,
                })
                .unwrap();
            if complete {
                prop_assert_eq!(structure, DagStructure::Complete);
            }
            complete = structure == DagStructure::Complete;
            prop_assert_ne!(structure, DagStructure::Unknown);
        }
    }
}
