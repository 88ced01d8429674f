//! The XGBoost JSON artifact schema.

use serde_json::{json, Value};

use respira_contracts::verify::{ArtifactRule, ArtifactRuleType, ArtifactSchema};

pub const XGBOOST_SCHEMA_ID: &str = "xgboost-json-v1";

/// Name under which [`check_tree_arrays`] is registered.
pub const TREE_ARRAYS_CHECK: &str = "xgboost-tree-arrays";

const NODE_ARRAYS: [&str; 5] = [
    "left_children",
    "right_children",
    "split_indices",
    "split_conditions",
    "default_left",
];

/// Structure of a binary-logistic XGBoost model plus the rules that tie it
/// to the feature contract.
pub fn xgboost_schema() -> ArtifactSchema {
    let node_array = json!({ "type": "array", "minItems": 1 });
    let json_schema = json!({
        "type": "object",
        "required": ["learner"],
        "properties": {
            "learner": {
                "type": "object",
                "required": ["feature_names", "learner_model_param", "gradient_booster"],
                "properties": {
                    "feature_names": { "type": "array", "items": { "type": "string" } },
                    "learner_model_param": {
                        "type": "object",
                        "required": ["base_score"],
                        "properties": { "base_score": { "type": ["string", "number"] } }
                    },
                    "gradient_booster": {
                        "type": "object",
                        "required": ["model"],
                        "properties": {
                            "model": {
                                "type": "object",
                                "required": ["trees"],
                                "properties": {
                                    "trees": {
                                        "type": "array",
                                        "items": {
                                            "type": "object",
                                            "required": NODE_ARRAYS,
                                            "properties": {
                                                "left_children": node_array,
                                                "right_children": node_array,
                                                "split_indices": node_array,
                                                "split_conditions": node_array,
                                                "default_left": node_array
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "objective": {
                        "type": "object",
                        "properties": { "name": { "const": "binary:logistic" } }
                    }
                }
            }
        }
    });

    let rule = |rule_id: &str, description: &str, rule_type| ArtifactRule {
        rule_id: rule_id.to_string(),
        description: description.to_string(),
        rule_type,
    };

    ArtifactSchema {
        schema_id: XGBOOST_SCHEMA_ID.to_string(),
        json_schema,
        rules: vec![
            rule(
                "feature-contract",
                "Training columns equal the feature contract, in order",
                ArtifactRuleType::MatchesContract {
                    field_path: "learner.feature_names".to_string(),
                },
            ),
            rule(
                "base-score",
                "A prior probability is declared",
                ArtifactRuleType::RequiredField {
                    field_path: "learner.learner_model_param.base_score".to_string(),
                },
            ),
            rule(
                "has-trees",
                "The ensemble has at least one tree",
                ArtifactRuleType::NonEmptyArray {
                    field_path: "learner.gradient_booster.model.trees".to_string(),
                },
            ),
            rule(
                "tree-arrays",
                "Every tree's node arrays have equal length",
                ArtifactRuleType::Custom {
                    function_name: TREE_ARRAYS_CHECK.to_string(),
                },
            ),
        ],
    }
}

/// Fails when any tree's parallel node arrays differ in length.
pub fn check_tree_arrays(doc: &Value) -> Option<String> {
    let trees = doc.pointer("/learner/gradient_booster/model/trees")?.as_array()?;
    for (i, tree) in trees.iter().enumerate() {
        let lengths: Vec<usize> = NODE_ARRAYS
            .iter()
            .map(|key| tree.get(*key).and_then(Value::as_array).map_or(0, Vec::len))
            .collect();
        if lengths.windows(2).any(|w| w[0] != w[1]) {
            return Some(format!("tree {i} has node arrays of unequal length {lengths:?}"));
        }
    }
    None
}
