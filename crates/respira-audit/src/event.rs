//! Ledger entry types.
//!
//! `LedgerEvent` is a single entry in the hash chain: it wraps an
//! `AssessmentRecord` with sequence numbering and the SHA-256 hashes that
//! make tampering detectable. `LedgerExport` is a point-in-time snapshot of
//! the whole chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use respira_contracts::record::AssessmentRecord;

/// A single entry in the SHA-256 hash chain of one store.
///
/// Each event commits to the previous event via `prev_hash`. Modifying any
/// field, including those of the embedded `record`, invalidates `this_hash`
/// and every subsequent `prev_hash`, which `verify_chain` detects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Monotonically increasing position in the chain, starting at 0.
    pub sequence: u64,

    /// The store this event belongs to.
    pub ledger_id: String,

    /// The assessment as persisted by the prediction service.
    pub record: AssessmentRecord,

    /// SHA-256 hash (hex) of the previous event, or `GENESIS_HASH` for the
    /// first event.
    pub prev_hash: String,

    /// SHA-256 hash (hex) over (ledger_id, sequence, prev_hash, canonical
    /// JSON of record).
    pub this_hash: String,
}

impl LedgerEvent {
    /// The sentinel `prev_hash` of the first event in every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// A snapshot of every event in a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerExport {
    pub ledger_id: String,

    /// All events in chain order (sequence 0 first).
    pub events: Vec<LedgerEvent>,

    pub exported_at: DateTime<Utc>,

    /// The `this_hash` of the last event. Empty string if the ledger is empty.
    pub terminal_hash: String,
}
