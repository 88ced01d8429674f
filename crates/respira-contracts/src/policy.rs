//! Safety policy context and verdict types.
//!
//! The safety policy runs before the classifier. A `CriticalOverride` means
//! the vitals are an unambiguous emergency and the model is never consulted.

use serde::{Deserialize, Serialize};

use crate::features::FeatureRow;

/// Everything a safety rule may look at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyContext {
    pub features: FeatureRow,
}

/// The decision emitted by the safety policy for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyVerdict {
    /// No rule forces a score; the classifier decides.
    Proceed,

    /// A hard rule fired. The engine reports maximal risk with high trust.
    CriticalOverride {
        /// Id of the rule that fired, written to the audit record.
        rule_id: String,
        /// Human-readable explanation for telemetry.
        reason: String,
    },
}
