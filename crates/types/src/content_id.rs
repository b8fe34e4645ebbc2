//! Content identifiers.

use cid::{Cid, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors emitted when parsing a content identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentIdError {
    #[error("content identifier must not be empty")]
    Empty,
    #[error("invalid content identifier {value}: {reason}")]
    Invalid { value: String, reason: String },
}

/// CID of a DAG root, a block or a CAR partition.
///
/// Serialized as its canonical string form (base32 for v1, base58btc for v0).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(Cid);

impl ContentId {
    pub fn new(cid: Cid) -> Self {
        Self(cid)
    }

    pub fn as_cid(&self) -> &Cid {
        &self.0
    }

    /// CID version (0 or 1).
    pub fn version(&self) -> u64 {
        match self.0.version() {
            Version::V0 => 0,
            Version::V1 => 1,
        }
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ContentIdError::Empty);
        }
        Cid::from_str(trimmed)
            .map(ContentId)
            .map_err(|err| ContentIdError::Invalid {
                value: trimmed.to_string(),
                reason: err.to_string(),
            })
    }
}

impl From<Cid> for ContentId {
    fn from(value: Cid) -> Self {
        ContentId(value)
    }
}

impl From<ContentId> for String {
    fn from(value: ContentId) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for ContentId {
    type Error = ContentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
