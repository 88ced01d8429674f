//! Startup verifier for classifier artifacts.
//!
//! `ArtifactVerifier` checks a parsed model document before the engine is
//! allowed to score with it. Verification runs in two phases:
//!
//! 1. **Structural**: the document is validated against
//!    `ArtifactSchema::json_schema` using the `jsonschema` crate.
//! 2. **Semantic**: each `ArtifactRule` in `ArtifactSchema::rules` is
//!    evaluated in order. All failures are collected before returning so
//!    operators see the full failure set in one pass.
//!
//! `MatchesContract` rules compare a column list in the artifact with the
//! `FeatureContract` the verifier was built for. Custom rules delegate to
//! named functions registered via `register_rule`.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use respira_contracts::{
    features::FeatureContract,
    verify::{ArtifactRuleType, ArtifactSchema, VerificationFailure, VerificationReport},
};

/// A caller-supplied verification function.
///
/// Receives the whole artifact document. Returns `Some(message)` when the
/// check fails, or `None` on success.
pub type CustomCheckFn = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Verifies artifacts against one `FeatureContract`.
pub struct ArtifactVerifier {
    contract: FeatureContract,
    custom_rules: HashMap<String, CustomCheckFn>,
}

impl ArtifactVerifier {
    /// Create a verifier with no custom rules registered.
    pub fn new(contract: FeatureContract) -> Self {
        Self {
            contract,
            custom_rules: HashMap::new(),
        }
    }

    /// A verifier with the XGBoost tree checks registered, for use with
    /// [`crate::xgboost_schema`].
    pub fn for_xgboost(contract: FeatureContract) -> Self {
        let mut verifier = Self::new(contract);
        verifier.register_rule(crate::schema::TREE_ARRAYS_CHECK, Box::new(crate::schema::check_tree_arrays));
        verifier
    }

    /// Register a custom check under `name`. Registering the same name twice
    /// replaces the previous function.
    pub fn register_rule(&mut self, name: impl Into<String>, f: CustomCheckFn) {
        self.custom_rules.insert(name.into(), f);
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.contract
    }

    /// Resolve a dot-notation path (e.g. `"learner.feature_names"`). Returns
    /// `None` when any segment is missing or the value is JSON `null`.
    fn resolve_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
        let mut current = value;
        for segment in path.split('.') {
            match current.get(segment) {
                Some(v) if !v.is_null() => current = v,
                _ => return None,
            }
        }
        Some(current)
    }

    fn check_contract(&self, value: Option<&Value>, field_path: &str) -> Option<String> {
        let Some(array) = value.and_then(Value::as_array) else {
            return Some(format!("field '{field_path}' is missing or not an array"));
        };
        let columns: Option<Vec<String>> = array.iter().map(|v| v.as_str().map(str::to_string)).collect();
        let Some(columns) = columns else {
            return Some(format!("field '{field_path}' must contain only strings"));
        };
        self.contract.check_columns(&columns).err().map(|e| e.to_string())
    }

    /// Verify `artifact` against `schema`.
    ///
    /// Runs structural JSON Schema validation first, then every semantic
    /// rule. All failures are accumulated.
    pub fn verify(&self, artifact: &Value, schema: &ArtifactSchema) -> VerificationReport {
        let mut failures: Vec<VerificationFailure> = Vec::new();

        // ── Phase 1: JSON Schema structural validation ────────────────────────
        if !schema.json_schema.is_null() {
            match jsonschema::validator_for(&schema.json_schema) {
                Ok(validator) => {
                    for error in validator.iter_errors(artifact) {
                        let message = format!("JSON Schema violation at {}: {}", error.instance_path, error);
                        warn!(schema_id = %schema.schema_id, %message, "structural validation failure");
                        failures.push(VerificationFailure {
                            rule_id: "json-schema".to_string(),
                            message,
                        });
                    }
                }
                Err(e) => {
                    let message = format!("invalid JSON Schema document: {e}");
                    warn!(schema_id = %schema.schema_id, %message, "schema compilation failure");
                    failures.push(VerificationFailure {
                        rule_id: "json-schema".to_string(),
                        message,
                    });
                }
            }
        }

        // ── Phase 2: Semantic rule evaluation ────────────────────────────────
        for rule in &schema.rules {
            debug!(rule_id = %rule.rule_id, description = %rule.description, "evaluating artifact rule");

            let failure_msg: Option<String> = match &rule.rule_type {
                ArtifactRuleType::RequiredField { field_path } => Self::resolve_path(artifact, field_path)
                    .is_none()
                    .then(|| format!("required field '{field_path}' is missing or null")),

                ArtifactRuleType::MatchesContract { field_path } => {
                    self.check_contract(Self::resolve_path(artifact, field_path), field_path)
                }

                ArtifactRuleType::NonEmptyArray { field_path } => {
                    match Self::resolve_path(artifact, field_path).and_then(Value::as_array) {
                        Some(items) if !items.is_empty() => None,
                        Some(_) => Some(format!("array '{field_path}' is empty")),
                        None => Some(format!("field '{field_path}' is missing or not an array")),
                    }
                }

                // An unregistered name is itself a failure so misconfigured
                // rules surface immediately.
                ArtifactRuleType::Custom { function_name } => match self.custom_rules.get(function_name.as_str()) {
                    Some(f) => f(artifact),
                    None => Some(format!("no custom rule registered for function name '{function_name}'")),
                },
            };

            if let Some(message) = failure_msg {
                warn!(rule_id = %rule.rule_id, %message, "artifact rule failed");
                failures.push(VerificationFailure {
                    rule_id: rule.rule_id.clone(),
                    message,
                });
            }
        }

        let passed = failures.is_empty();
        debug!(
            schema_id = %schema.schema_id,
            contract = %self.contract.version,
            passed,
            failure_count = failures.len(),
            "artifact verification complete"
        );

        VerificationReport { passed, failures }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
