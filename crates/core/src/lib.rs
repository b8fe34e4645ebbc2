//! Custody status core.
//!
//! Deal and pin events from upstream collaborators enter through the
//! [`IngestionGate`], partition claims through the [`CompletenessTracker`],
//! and reads are served by the [`StatusAggregator`] as a projection over the
//! record stores. [`CustodyTracker`] bundles the three over one store.

pub mod aggregator;
pub mod completeness;
pub mod error;
pub mod gate;
pub mod locks;
pub mod metrics;
pub mod tracker;

pub use aggregator::StatusAggregator;
pub use completeness::CompletenessTracker;
pub use error::{ApplyOutcome, CustodyError, Result, TransitionViolation};
pub use gate::{check_deal_transition, IngestionGate};
pub use locks::KeyLocks;
pub use tracker::CustodyTracker;
