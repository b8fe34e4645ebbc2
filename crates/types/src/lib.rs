//! Custody records for content stored on a decentralized storage network.
//!
//! Deals (storage agreements with miners), pins (IPFS replication requests),
//! partition claims about DAG completeness, and the derived [`StatusResult`]
//! served for each CID.

pub mod content_id;
pub mod dag;
pub mod deal;
pub mod pin;
pub mod status;

pub use content_id::*;
pub use dag::*;
pub use deal::*;
pub use pin::*;
pub use status::*;

/// Wall-clock instant carried on every record.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
