//! Error types for the Respira scoring pipeline.
//!
//! All fallible operations in the workspace return `RespiraResult<T>`.
//! Most variants are recovered close to their source: the risk engine turns
//! inference errors into a low-confidence default and the external services
//! turn upstream errors into deterministic fallbacks. Only input validation
//! and startup configuration errors ever reach a caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single field-level validation failure, returned to HTTP clients verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Wire name of the offending field (e.g. `"spo2"`).
    pub field: String,
    /// Human-readable constraint that was violated.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The unified error type for the Respira workspace.
#[derive(Debug, Error)]
pub enum RespiraError {
    /// A clinical formula was called without a value it requires.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A patient observation failed range or format validation.
    #[error("validation failed on {} field(s)", errors.len())]
    Validation { errors: Vec<FieldError> },

    /// A categorical value has no entry in its exhaustive mapping.
    #[error("unknown {category} value '{value}'")]
    UnknownCategory { category: String, value: String },

    /// Scoring was requested but no classifier is loaded.
    #[error("classifier unavailable: {reason}")]
    ModelUnavailable { reason: String },

    /// The classifier rejected or failed on a feature vector.
    #[error("inference failed: {reason}")]
    Inference { reason: String },

    /// A model artifact does not satisfy the feature contract or format.
    #[error("model artifact invalid: {reason}")]
    ArtifactInvalid { reason: String },

    /// An external dependency (weather API, LLM API) failed.
    #[error("upstream '{service}' failed: {reason}")]
    Upstream { service: String, reason: String },

    /// The assessment store could not persist a record.
    #[error("store write failed: {reason}")]
    StoreWriteFailed { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

/// Convenience alias used throughout the Respira crates.
pub type RespiraResult<T> = Result<T, RespiraError>;
