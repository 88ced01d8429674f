//! # respira-verify
//!
//! Startup verification of classifier artifacts for Respira.
//!
//! This crate provides [`engine::ArtifactVerifier`], which validates a parsed
//! model document in two phases:
//!
//! 1. **Structural**: JSON Schema validation via the `jsonschema` crate.
//! 2. **Semantic**: rules (`RequiredField`, `MatchesContract`,
//!    `NonEmptyArray`, `Custom`) evaluated against the document.
//!
//! A model whose columns disagree with the engine's `FeatureContract` must
//! never serve a request; the server refuses to start instead.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use respira_verify::{ArtifactVerifier, xgboost_schema};
//!
//! let verifier = ArtifactVerifier::for_xgboost(FeatureContract::percent_predicted());
//! let report = verifier.verify(&document, &xgboost_schema());
//! ```

pub mod engine;
pub mod schema;

pub use engine::{ArtifactVerifier, CustomCheckFn};
pub use schema::{check_tree_arrays, xgboost_schema, XGBOOST_SCHEMA_ID};

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::{json, Value};

    use respira_contracts::features::FeatureContract;

    use super::*;

    fn bundled_model() -> Value {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models/model_xgb.json");
        let text = std::fs::read_to_string(path).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_bundled_model_passes_percent_predicted_contract() {
        let verifier = ArtifactVerifier::for_xgboost(FeatureContract::percent_predicted());
        let report = verifier.verify(&bundled_model(), &xgboost_schema());
        assert!(report.passed, "failures: {}", report.summary());
    }

    /// The same artifact is refused under the raw-vitals contract.
    #[test]
    fn test_bundled_model_fails_raw_vitals_contract() {
        let verifier = ArtifactVerifier::for_xgboost(FeatureContract::raw_vitals());
        let report = verifier.verify(&bundled_model(), &xgboost_schema());
        assert!(!report.passed);
        assert!(report.failures.iter().any(|f| f.rule_id == "feature-contract"));
    }

    #[test]
    fn test_ragged_tree_is_reported() {
        let mut doc = bundled_model();
        doc["learner"]["gradient_booster"]["model"]["trees"][1]["split_conditions"] = json!([40.0]);

        let verifier = ArtifactVerifier::for_xgboost(FeatureContract::percent_predicted());
        let report = verifier.verify(&doc, &xgboost_schema());
        assert!(!report.passed);
        assert!(report.failures.iter().any(|f| f.rule_id == "tree-arrays"), "got: {}", report.summary());
        assert!(check_tree_arrays(&doc).unwrap().contains("tree 1"));
    }

    #[test]
    fn test_wrong_objective_fails_structure() {
        let mut doc = bundled_model();
        doc["learner"]["objective"]["name"] = json!("reg:squarederror");

        let verifier = ArtifactVerifier::for_xgboost(FeatureContract::percent_predicted());
        let report = verifier.verify(&doc, &xgboost_schema());
        assert!(!report.passed);
        assert_eq!(report.failures[0].rule_id, "json-schema");
    }
}
