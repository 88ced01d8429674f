//! # respira-audit
//!
//! Append-only, SHA-256 hash-chained persistence for Respira assessments.
//!
//! ## Overview
//!
//! Every record the prediction service persists is wrapped in a
//! `LedgerEvent` that links to the previous event via its SHA-256 hash.
//! Tampering with any event, even a single field, breaks the chain and is
//! detected by `verify_chain`.
//!
//! The `queries` module holds the read-only views behind the patient
//! lookup, history and dashboard endpoints.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use respira_audit::{HashChainStore, queries};
//! use respira_core::traits::AssessmentStore;
//!
//! let store = HashChainStore::open("respira", "data/assessments.jsonl")?;
//! store.append(&record)?;
//!
//! assert!(store.verify_integrity());
//! let summary = queries::stats(&store)?;
//! ```

pub mod chain;
pub mod event;
pub mod queries;
pub mod store;

pub use chain::{hash_event, verify_chain};
pub use event::{LedgerEvent, LedgerExport};
pub use store::HashChainStore;

// ── Tests ─────────────────────────────────────────────────────────────────────
