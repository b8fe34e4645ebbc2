//! Concurrent writers and readers against one tracker.

use chrono::{Duration, TimeZone, Utc};
use cid::Cid;
use custody_core::{ApplyOutcome, CustodyTracker};
use custody_storage::{DealStore, MemoryCustodyStore, PinStore};
use custody_types::{ContentId, Deal, DealState, Pin, PinStatus, Publication, Timestamp};
use multihash_codetable::{Code, MultihashDigest};
use std::sync::Arc;

fn cid(seed: &str) -> ContentId {
    ContentId::new(Cid::new_v1(0x70, Code::Sha2_256.digest(seed.as_bytes())))
}

fn at(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
}

#[test]
fn test_concurrent_deal_updates_keep_highest_sequence() {
    let store = Arc::new(MemoryCustodyStore::new());
    let tracker = CustodyTracker::new(store.clone());
    let root = cid("root");
    let queued = Deal::queued(root, 1, at(0));
    tracker.apply_deal_update(queued.clone()).unwrap();

    std::thread::scope(|scope| {
        for worker in 0..8u64 {
            let tracker = &tracker;
            let queued = &queued;
            scope.spawn(move || {
                // Workers interleave sequences so most arrive out of order.
                for step in 0..50u64 {
                    let sequence = 2 + step * 8 + (7 - worker);
                    let update = queued.advance(
                        sequence,
                        at(sequence as i64),
                        DealState::Published(Publication {
                            miner: "f01".into(),
                            chain_deal_id: 5,
                        }),
                    );
                    tracker.apply_deal_update(update).unwrap();
                }
            });
        }
    });

    let deals = store.deals_for(&root).unwrap();
    assert_eq!(deals.len(), 1);
    assert_eq!(deals[0].sequence, 2 + 49 * 8 + 7);
}

#[test]
fn test_readers_never_see_torn_records() {
    let store = Arc::new(MemoryCustodyStore::new());
    let tracker = CustodyTracker::new(store.clone());
    let root = cid("root");
    let base = Pin::new("req", root, PinStatus::Queued, at(0));
    tracker.apply_pin_update(base.clone()).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for step in 1..200i64 {
                let status = if step % 2 == 0 {
                    PinStatus::Queued
                } else {
                    PinStatus::Pinning
                };
                let mut next = base.transitioned(status, at(step));
                next.size = Some(step as u64);
                tracker.apply_pin_update(next).unwrap();
            }
        });
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..200 {
                    let status = tracker.status_for(&root).unwrap();
                    let pin = status.pin;
                    // Size and status were written together.
                    if let Some(size) = pin.size {
                        let expected = if size % 2 == 0 {
                            PinStatus::Queued
                        } else {
                            PinStatus::Pinning
                        };
                        assert_eq!(pin.status, expected);
                        assert_eq!(pin.updated, Some(at(size as i64)));
                    }
                }
            });
        }
    });

    assert_eq!(store.get_pin("req").unwrap().unwrap().size, Some(199));
}

#[test]
fn test_independent_cids_update_in_parallel() {
    let tracker = CustodyTracker::new(Arc::new(MemoryCustodyStore::new()));

    let created: Vec<ApplyOutcome> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|n| {
                let tracker = &tracker;
                scope.spawn(move || {
                    let root = cid(&format!("cid-{n}"));
                    tracker
                        .apply_deal_update(Deal::queued(root, 1, at(0)))
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(created.iter().all(|outcome| *outcome == ApplyOutcome::Created));
    for n in 0..16 {
        assert!(tracker.status_for(&cid(&format!("cid-{n}"))).is_ok());
    }
}
