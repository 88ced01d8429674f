//! Gradient-boosted tree classifier loaded from an XGBoost JSON artifact.
//!
//! Only the parts of the format needed for inference are read:
//!
//! - `learner.feature_names`: training columns, in input order
//! - `learner.learner_model_param.base_score`: prior probability
//! - `learner.gradient_booster.model.trees[]`: flat node arrays
//!
//! Each tree stores its nodes as parallel arrays indexed by node id. A node
//! whose left child is `-1` is a leaf and its `split_conditions` entry is the
//! leaf value. Internal nodes send `x < condition` left; a missing (`NaN`)
//! value follows `default_left`.
//!
//! `p = sigmoid(logit(base_score) + Σ leaf values)`.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use respira_contracts::{
    error::{RespiraError, RespiraResult},
    features::FeatureVector,
};
use respira_core::traits::Classifier;

// ── Artifact schema ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Artifact {
    learner: Learner,
}

#[derive(Debug, Deserialize)]
struct Learner {
    #[serde(default)]
    feature_names: Vec<String>,
    learner_model_param: LearnerModelParam,
    gradient_booster: GradientBooster,
}

#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    base_score: NumberOrString,
}

#[derive(Debug, Deserialize)]
struct GradientBooster {
    model: BoosterModel,
}

#[derive(Debug, Deserialize)]
struct BoosterModel {
    trees: Vec<RawTree>,
}

#[derive(Debug, Deserialize)]
struct RawTree {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f64>,
    default_left: Vec<Flag>,
}

/// XGBoost writes model params as strings (`"5E-1"`), and 2.x wraps them in
/// brackets (`"[5E-1]"`); accept all three forms.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

impl NumberOrString {
    fn to_f64(&self) -> Option<f64> {
        match self {
            NumberOrString::Number(n) => Some(*n),
            NumberOrString::String(s) => s
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .trim()
                .parse()
                .ok(),
        }
    }
}

/// `default_left` is a bool array in older dumps and 0/1 in newer ones.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(u8),
}

impl Flag {
    fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

// ── Validated trees ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        default_left: bool,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_raw(raw: RawTree, index: usize, num_features: usize) -> RespiraResult<Self> {
        let n = raw.left_children.len();
        let invalid = |reason: String| RespiraError::ArtifactInvalid {
            reason: format!("tree {index}: {reason}"),
        };

        if n == 0 {
            return Err(invalid("has no nodes".to_string()));
        }
        if raw.right_children.len() != n
            || raw.split_indices.len() != n
            || raw.split_conditions.len() != n
            || raw.default_left.len() != n
        {
            return Err(invalid("node arrays differ in length".to_string()));
        }

        let child = |id: i64, node: usize| -> RespiraResult<usize> {
            // Children always come after their parent, which rules out cycles.
            usize::try_from(id)
                .ok()
                .filter(|&c| c > node && c < n)
                .ok_or_else(|| invalid(format!("node {node} has invalid child {id}")))
        };

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            if raw.left_children[i] == -1 {
                nodes.push(Node::Leaf(raw.split_conditions[i]));
                continue;
            }
            let feature = usize::try_from(raw.split_indices[i])
                .ok()
                .filter(|&f| f < num_features)
                .ok_or_else(|| invalid(format!("node {i} splits on unknown feature {}", raw.split_indices[i])))?;
            nodes.push(Node::Split {
                feature,
                threshold: raw.split_conditions[i],
                left: child(raw.left_children[i], i)?,
                right: child(raw.right_children[i], i)?,
                default_left: raw.default_left[i].is_set(),
            });
        }

        Ok(Self { nodes })
    }

    fn leaf_value(&self, x: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let v = x[*feature];
                    id = if v.is_nan() {
                        if *default_left { *left } else { *right }
                    } else if v < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

// ── Classifier ───────────────────────────────────────────────────────────────

/// A binary-logistic tree ensemble. Read-only after load.
#[derive(Debug, Clone)]
pub struct GradientBoostedClassifier {
    feature_names: Vec<String>,
    trees: Vec<Tree>,
    base_margin: f64,
}

impl GradientBoostedClassifier {
    /// Parse an XGBoost JSON model.
    ///
    /// # Errors
    ///
    /// `ArtifactInvalid` when the document is not a well-formed tree model.
    pub fn from_json_str(s: &str) -> RespiraResult<Self> {
        let artifact: Artifact = serde_json::from_str(s).map_err(|e| RespiraError::ArtifactInvalid {
            reason: format!("failed to parse model JSON: {e}"),
        })?;
        Self::from_artifact(artifact)
    }

    /// Read and parse the model at `path`.
    ///
    /// # Errors
    ///
    /// `ModelUnavailable` when the file cannot be read, `ArtifactInvalid`
    /// when its contents are malformed.
    pub fn from_file(path: &Path) -> RespiraResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| RespiraError::ModelUnavailable {
            reason: format!("failed to read model '{}': {}", path.display(), e),
        })?;
        let model = Self::from_json_str(&contents)?;
        info!(
            path = %path.display(),
            trees = model.trees.len(),
            features = model.feature_names.len(),
            "classifier loaded"
        );
        Ok(model)
    }

    fn from_artifact(artifact: Artifact) -> RespiraResult<Self> {
        let learner = artifact.learner;
        if learner.feature_names.is_empty() {
            return Err(RespiraError::ArtifactInvalid {
                reason: "model does not declare feature_names".to_string(),
            });
        }

        let base_score = learner
            .learner_model_param
            .base_score
            .to_f64()
            .filter(|p| *p > 0.0 && *p < 1.0)
            .ok_or_else(|| RespiraError::ArtifactInvalid {
                reason: "base_score must be a probability in (0, 1)".to_string(),
            })?;

        let num_features = learner.feature_names.len();
        let trees = learner
            .gradient_booster
            .model
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, raw)| Tree::from_raw(raw, i, num_features))
            .collect::<RespiraResult<Vec<_>>>()?;

        Ok(Self {
            feature_names: learner.feature_names,
            trees,
            base_margin: (base_score / (1.0 - base_score)).ln(),
        })
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Raw margin (log-odds) for one row.
    pub fn margin(&self, x: &[f64]) -> RespiraResult<f64> {
        if x.len() != self.feature_names.len() {
            return Err(RespiraError::Inference {
                reason: format!("expected {} features, got {}", self.feature_names.len(), x.len()),
            });
        }
        Ok(self.base_margin + self.trees.iter().map(|t| t.leaf_value(x)).sum::<f64>())
    }
}

impl Classifier for GradientBoostedClassifier {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, features: &FeatureVector) -> RespiraResult<f64> {
        let margin = self.margin(&features.values)?;
        Ok(1.0 / (1.0 + (-margin).exp()))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Two features, one stump on `a` plus a constant tree.
    fn stump_model(default_left: serde_json::Value) -> serde_json::Value {
        json!({
            "learner": {
                "feature_names": ["a", "b"],
                "learner_model_param": { "base_score": "5E-1" },
                "gradient_booster": {
                    "name": "gbtree",
                    "model": {
                        "trees": [
                            {
                                "left_children": [1, -1, -1],
                                "right_children": [2, -1, -1],
                                "split_indices": [0, 0, 0],
                                "split_conditions": [10.0, 1.0, -1.0],
                                "default_left": default_left
                            },
                            {
                                "left_children": [-1],
                                "right_children": [-1],
                                "split_indices": [0],
                                "split_conditions": [0.5],
                                "default_left": [0]
                            }
                        ]
                    }
                }
            }
        })
    }

    fn vector(values: Vec<f64>) -> FeatureVector {
        FeatureVector {
            contract_version: "test".to_string(),
            values,
        }
    }

    #[test]
    fn test_split_goes_left_below_threshold() {
        let model = GradientBoostedClassifier::from_json_str(&stump_model(json!([1, 0, 0])).to_string()).unwrap();
        assert_eq!(model.num_trees(), 2);
        assert!((model.margin(&[5.0, 0.0]).unwrap() - 1.5).abs() < 1e-12);
        assert!((model.margin(&[10.0, 0.0]).unwrap() - (-0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_probability_is_sigmoid_of_margin() {
        let model = GradientBoostedClassifier::from_json_str(&stump_model(json!([1, 0, 0])).to_string()).unwrap();
        let p = model.predict_proba(&vector(vec![5.0, 0.0])).unwrap();
        assert!((p - 1.0 / (1.0 + (-1.5f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_bracketed_base_score_is_accepted() {
        let mut doc = stump_model(json!([1, 0, 0]));
        doc["learner"]["learner_model_param"]["base_score"] = json!("[2.5E-1]");
        let model = GradientBoostedClassifier::from_json_str(&doc.to_string()).unwrap();
        let expected = (0.25f64 / 0.75).ln() + 1.5;
        assert!((model.margin(&[5.0, 0.0]).unwrap() - expected).abs() < 1e-12);

        doc["learner"]["learner_model_param"]["base_score"] = json!(0.25);
        let numeric = GradientBoostedClassifier::from_json_str(&doc.to_string()).unwrap();
        assert!((numeric.margin(&[5.0, 0.0]).unwrap() - expected).abs() < 1e-12);
    }

    /// Missing values follow the node's default branch.
    #[test]
    fn test_nan_follows_default_branch() {
        let left = GradientBoostedClassifier::from_json_str(&stump_model(json!([true, false, false])).to_string()).unwrap();
        assert!((left.margin(&[f64::NAN, 0.0]).unwrap() - 1.5).abs() < 1e-12);

        let right = GradientBoostedClassifier::from_json_str(&stump_model(json!([0, 0, 0])).to_string()).unwrap();
        assert!((right.margin(&[f64::NAN, 0.0]).unwrap() - (-0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_vector_length_is_inference_error() {
        let model = GradientBoostedClassifier::from_json_str(&stump_model(json!([1, 0, 0])).to_string()).unwrap();
        assert!(matches!(
            model.predict_proba(&vector(vec![1.0])),
            Err(RespiraError::Inference { .. })
        ));
    }

    #[test]
    fn test_malformed_trees_are_rejected() {
        let mut doc = stump_model(json!([1, 0, 0]));
        doc["learner"]["gradient_booster"]["model"]["trees"][0]["split_indices"] = json!([7, 0, 0]);
        assert!(matches!(
            GradientBoostedClassifier::from_json_str(&doc.to_string()),
            Err(RespiraError::ArtifactInvalid { .. })
        ));

        let mut doc = stump_model(json!([1, 0, 0]));
        doc["learner"]["gradient_booster"]["model"]["trees"][0]["left_children"] = json!([0, -1, -1]);
        assert!(GradientBoostedClassifier::from_json_str(&doc.to_string()).is_err(), "self-loop must be rejected");

        let mut doc = stump_model(json!([1, 0, 0]));
        doc["learner"]["gradient_booster"]["model"]["trees"][0]["default_left"] = json!([1]);
        assert!(GradientBoostedClassifier::from_json_str(&doc.to_string()).is_err());

        let mut doc = stump_model(json!([1, 0, 0]));
        doc["learner"]["learner_model_param"]["base_score"] = json!("1.5");
        assert!(GradientBoostedClassifier::from_json_str(&doc.to_string()).is_err());

        assert!(GradientBoostedClassifier::from_json_str("not json").is_err());
    }

    #[test]
    fn test_missing_file_is_model_unavailable() {
        let result = GradientBoostedClassifier::from_file(Path::new("/nonexistent/model.json"));
        assert!(matches!(result, Err(RespiraError::ModelUnavailable { .. })));
    }

    /// The shipped model scores the healthy reference patient as low risk.
    #[test]
    fn test_bundled_model_scores_healthy_adult_low() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models/model_xgb.json");
        let model = GradientBoostedClassifier::from_file(&path).unwrap();
        assert_eq!(model.feature_names().len(), 11);

        // Age, Gender, BMI, Smoking, Wheezing, FEV1, PEF, FEV1_Pct, PEF_Pct, SpO2, Pollution
        let healthy = vector(vec![25.0, 0.0, 22.9, 0.0, 0.0, 4.0, 500.0, 83.3, 57.1, 98.0, 12.0]);
        let p = model.predict_proba(&healthy).unwrap();
        assert!(p < 0.1, "healthy adult scored {p}");

        let obstructed = vector(vec![64.0, 0.0, 27.0, 2.0, 1.0, 1.6, 250.0, 45.0, 35.0, 92.0, 40.0]);
        let p = model.predict_proba(&obstructed).unwrap();
        assert!(p > 0.9, "obstructed smoker scored {p}");
    }
}
