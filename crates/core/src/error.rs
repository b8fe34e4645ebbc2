//! Error taxonomy of the custody core.

use custody_storage::StorageError;
use custody_types::{ContentId, DealStatus, PinStatus};
use thiserror::Error;

/// Why an update was refused. Each variant is an upstream protocol violation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionViolation {
    #[error("deal {key} is {from} and cannot return to {to}")]
    TerminalDealReopened {
        key: String,
        from: DealStatus,
        to: DealStatus,
    },

    #[error("deal {key} is {from} and cannot move to {to}")]
    TerminalDealChanged {
        key: String,
        from: DealStatus,
        to: DealStatus,
    },

    #[error("deal {key} has chain deal id {recorded}, update carries {offered:?}")]
    ChainDealIdConflict {
        key: String,
        recorded: u64,
        offered: Option<u64>,
    },

    #[error("deal {key} is assigned to {recorded}, update carries {offered:?}")]
    MinerConflict {
        key: String,
        recorded: String,
        offered: Option<String>,
    },

    #[error("pin {request_id} is {from} and cannot move to {to}")]
    PinRegressed {
        request_id: String,
        from: PinStatus,
        to: PinStatus,
    },

    #[error("pin {request_id} belongs to {recorded}, update names {offered}")]
    CidMismatch {
        request_id: String,
        recorded: ContentId,
        offered: ContentId,
    },

    #[error("car {car_cid} is already archived with a different mapping")]
    BackupConflict { car_cid: ContentId },

    #[error("malformed record: {0}")]
    Malformed(String),
}

impl TransitionViolation {
    /// Stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransitionViolation::TerminalDealReopened { .. } => "terminal_deal_reopened",
            TransitionViolation::TerminalDealChanged { .. } => "terminal_deal_changed",
            TransitionViolation::ChainDealIdConflict { .. } => "chain_deal_id_conflict",
            TransitionViolation::MinerConflict { .. } => "miner_conflict",
            TransitionViolation::PinRegressed { .. } => "pin_regressed",
            TransitionViolation::CidMismatch { .. } => "cid_mismatch",
            TransitionViolation::BackupConflict { .. } => "backup_conflict",
            TransitionViolation::Malformed(_) => "malformed",
        }
    }
}

#[derive(Error, Debug)]
pub enum CustodyError {
    #[error("No custody record for {cid}")]
    NotFound { cid: ContentId },

    #[error("Invalid transition for {cid}: {reason}")]
    InvalidTransition {
        cid: ContentId,
        reason: TransitionViolation,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CustodyError {
    pub(crate) fn invalid(cid: ContentId, reason: TransitionViolation) -> Self {
        CustodyError::InvalidTransition { cid, reason }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CustodyError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, CustodyError>;

/// What a mutating operation did with its input.
///
/// `Stale` is the quiet discard of an out-of-order event; it is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
    Stale,
}

impl ApplyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Updated => "updated",
            ApplyOutcome::Unchanged => "unchanged",
            ApplyOutcome::Stale => "stale",
        }
    }

    /// Whether the store was written.
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Created | ApplyOutcome::Updated)
    }
}
