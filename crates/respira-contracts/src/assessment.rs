//! Derived, request-scoped results of the scoring pipeline.
//!
//! None of these types are mutated after construction. `RiskAssessment` is
//! copied into the persisted `AssessmentRecord`; the rest live only for the
//! duration of one request.

use serde::{Deserialize, Serialize};

use crate::environment::EnvironmentalSnapshot;

/// Population-predicted lung function and body composition for one patient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClinicalBaseline {
    /// Predicted FEV1 in liters.
    pub predicted_fev1: f64,
    /// Predicted peak expiratory flow in L/min.
    pub predicted_pef: u32,
    /// Observed FEV1 as a percentage of `predicted_fev1`.
    pub fev1_pct: f64,
    /// Observed PEF as a percentage of `predicted_pef`.
    pub pef_pct: f64,
}

/// Output of the anomaly screener for one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub is_outlier: bool,
    /// Decision value of the isolation forest; negative means outlier.
    pub anomaly_score: f64,
    /// Ordered, human-readable reasons. Empty for inliers.
    #[serde(default)]
    pub flagged_features: Vec<String>,
}

impl AnomalyVerdict {
    /// An inlier verdict with a neutral score.
    pub fn inlier(anomaly_score: f64) -> Self {
        Self {
            is_outlier: false,
            anomaly_score,
            flagged_features: Vec::new(),
        }
    }
}

/// Coarse confidence label shown next to the risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustRating {
    High,
    Medium,
    Low,
}

impl TrustRating {
    pub fn as_str(self) -> &'static str {
        match self {
            TrustRating::High => "high",
            TrustRating::Medium => "medium",
            TrustRating::Low => "low",
        }
    }
}

/// Which branch of the decision engine produced the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// The classifier scored the request.
    Scored,
    /// A safety rule fired before the classifier was consulted.
    Overridden,
    /// No classifier was loaded at startup.
    Unavailable,
    /// The classifier raised during inference.
    Failed,
}

/// `[risk - uncertainty, risk + uncertainty]`, clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionInterval {
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl PredictionInterval {
    pub fn around(risk: f64, uncertainty: f64) -> Self {
        Self {
            lower_bound: (risk - uncertainty).max(0.0),
            upper_bound: (risk + uncertainty).min(1.0),
        }
    }
}

/// The primary output of the risk decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Always within `[0.01, 0.99]`.
    pub risk_score: f64,
    pub trust_rating: TrustRating,
    pub uncertainty_range: f64,
    pub prediction_interval: PredictionInterval,
    pub model_status: ModelStatus,
    /// Id of the safety rule that forced the score, if any.
    #[serde(default)]
    pub override_rule: Option<String>,
}

// ── Response envelope ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub risk_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustSignal {
    pub trust_rating: TrustRating,
    pub prediction_interval: PredictionInterval,
}

/// Body of a successful `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: Prediction,
    pub trust_signal: TrustSignal,
    pub environmental_data: EnvironmentalSnapshot,
    pub anomaly_detection: AnomalyVerdict,
}

impl PredictionResponse {
    pub fn assemble(
        assessment: &RiskAssessment,
        environment: EnvironmentalSnapshot,
        anomaly: AnomalyVerdict,
    ) -> Self {
        Self {
            prediction: Prediction {
                risk_score: assessment.risk_score,
            },
            trust_signal: TrustSignal {
                trust_rating: assessment.trust_rating,
                prediction_interval: assessment.prediction_interval,
            },
            environmental_data: environment,
            anomaly_detection: anomaly,
        }
    }
}
