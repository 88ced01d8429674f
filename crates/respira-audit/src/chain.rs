//! Event hashing and whole-chain checks for the assessment ledger.
//!
//! An event digest covers, in this order: the ledger id, the sequence
//! number (u64, little-endian), the predecessor's hex digest, and the compact
//! JSON encoding of the assessment record.

use sha2::{Digest, Sha256};

use respira_contracts::{
    error::{RespiraError, RespiraResult},
    record::AssessmentRecord,
};

use crate::event::LedgerEvent;

/// SHA-256 digest of one ledger event, lowercase hex.
///
/// # Errors
///
/// `StoreWriteFailed` if the record cannot be serialized, which only happens
/// for non-finite floats.
pub fn hash_event(
    ledger_id: &str,
    sequence: u64,
    record: &AssessmentRecord,
    prev_hash: &str,
) -> RespiraResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| RespiraError::StoreWriteFailed {
        reason: format!("record {} is not serializable: {}", record.record_id, e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(ledger_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify the integrity of a hash chain.
///
/// Returns `true` when, for every event:
///
/// 1. **Sequence**: `sequence` equals its position in the slice.
/// 2. **Prev-hash linkage**: `prev_hash` equals the `this_hash` of the
///    preceding event (or `GENESIS_HASH` for event 0).
/// 3. **Hash correctness**: `this_hash` matches the value recomputed from
///    the event's own fields.
///
/// An empty chain is valid.
pub fn verify_chain(events: &[LedgerEvent]) -> bool {
    let mut expected_prev = LedgerEvent::GENESIS_HASH.to_string();

    for (position, event) in events.iter().enumerate() {
        if event.sequence != position as u64 || event.prev_hash != expected_prev {
            return false;
        }

        match hash_event(&event.ledger_id, event.sequence, &event.record, &event.prev_hash) {
            Ok(recomputed) if recomputed == event.this_hash => {}
            _ => return false,
        }

        expected_prev = event.this_hash.clone();
    }

    true
}
