//! Artifact verification schema and report types.
//!
//! A classifier artifact is checked once, at startup, against an
//! `ArtifactSchema`: a JSON Schema for its structure plus rules for the
//! things JSON Schema cannot express, such as agreement with the
//! `FeatureContract` the engine will assemble vectors with.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structural and semantic expectations for one artifact format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSchema {
    /// E.g. `"xgboost-json-v1"`.
    pub schema_id: String,
    /// Structural JSON Schema. `Value::Null` skips the structural phase.
    pub json_schema: Value,
    pub rules: Vec<ArtifactRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRule {
    pub rule_id: String,
    pub description: String,
    pub rule_type: ArtifactRuleType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ArtifactRuleType {
    /// The value at the dotted path must be present and non-null.
    RequiredField { field_path: String },

    /// The string array at the dotted path must equal the contract's columns.
    MatchesContract { field_path: String },

    /// The array at the dotted path must contain at least one element.
    NonEmptyArray { field_path: String },

    /// Delegate to a function registered by name with the verifier.
    Custom { function_name: String },
}

/// The result of checking one artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// True only if every rule passed.
    pub passed: bool,
    pub failures: Vec<VerificationFailure>,
}

impl VerificationReport {
    /// All failures joined into one line, for logs and startup errors.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("[{}] {}", f.rule_id, f.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationFailure {
    pub rule_id: String,
    pub message: String,
}
