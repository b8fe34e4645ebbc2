//! Counters recorded through the `metrics` facade.
//!
//! Without an installed recorder every call is a no-op.

use crate::error::{ApplyOutcome, CustodyError, Result};
use ::metrics::{counter, describe_counter};

pub const DEAL_UPDATES: &str = "custody_deal_updates_total";
pub const PIN_UPDATES: &str = "custody_pin_updates_total";
pub const REJECTED_TRANSITIONS: &str = "custody_rejected_transitions_total";
pub const CLAIMS: &str = "custody_claims_total";

/// Register descriptions with the installed recorder.
pub fn describe() {
    describe_counter!(DEAL_UPDATES, "Deal update events by outcome");
    describe_counter!(PIN_UPDATES, "Pin update events by outcome");
    describe_counter!(
        REJECTED_TRANSITIONS,
        "Updates refused as invalid transitions, by violation kind"
    );
    describe_counter!(CLAIMS, "Partition claims recorded");
}

pub(crate) fn record_update(name: &'static str, result: &Result<ApplyOutcome>) {
    let outcome = match result {
        Ok(outcome) => outcome.as_str(),
        Err(CustodyError::InvalidTransition { reason, .. }) => {
            counter!(REJECTED_TRANSITIONS, "kind" => reason.kind()).increment(1);
            "rejected"
        }
        Err(_) => "error",
    };
    counter!(name, "outcome" => outcome).increment(1);
}

pub(crate) fn record_claim() {
    counter!(CLAIMS).increment(1);
}
