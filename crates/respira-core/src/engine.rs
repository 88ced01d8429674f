//! The risk decision engine: the deterministic hybrid scorer.
//!
//! Every request walks the same stages:
//!
//!   ReceivedInput → FeatureEngineered → SafetyChecked → [Overridden | ModelScored]
//!     → EnvironmentAdjusted → Clamped
//!
//! The safety invariant is absolute: when the `SafetyPolicy` returns
//! `CriticalOverride`, the classifier is NEVER consulted. The code path to
//! `Classifier::predict_proba()` is only reachable after `Proceed`.
//!
//! The engine never fails. A missing or failing classifier degrades to a
//! neutral, low-trust score instead of an error.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use respira_contracts::{
    assessment::{AnomalyVerdict, ModelStatus, PredictionInterval, RiskAssessment, TrustRating},
    environment::EnvironmentalSnapshot,
    error::RespiraResult,
    features::{FeatureContract, FeatureRow},
    patient::PatientObservation,
    policy::{SafetyContext, SafetyVerdict},
};

use crate::{
    clinical,
    telemetry::{self, TrustEvent},
    traits::{Classifier, SafetyPolicy},
};

pub const MIN_RISK: f64 = 0.01;
pub const MAX_RISK: f64 = 0.99;

/// Score and uncertainty reported when a safety rule fires.
pub const OVERRIDE_RISK: f64 = MAX_RISK;
pub const OVERRIDE_UNCERTAINTY: f64 = 0.01;

/// Score and uncertainty reported when the classifier cannot be used.
pub const FALLBACK_RISK: f64 = 0.5;
pub const FALLBACK_UNCERTAINTY: f64 = 0.5;

const UNCERTAINTY_FLOOR: f64 = 0.05;
const UNCERTAINTY_SCALE: f64 = 0.2;
const HIGH_TRUST_BELOW: f64 = 0.1;

/// Tunables of the environmental adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// PM2.5 above which the penalty applies, µg/m³.
    pub pm25_threshold: f64,
    /// Added to the model probability when the threshold is exceeded.
    pub pm25_penalty: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            pm25_threshold: 50.0,
            pm25_penalty: 0.05,
        }
    }
}

/// Stage labels used in debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionStage {
    ReceivedInput,
    FeatureEngineered,
    SafetyChecked,
    Overridden,
    ModelScored,
    EnvironmentAdjusted,
    Clamped,
}

impl fmt::Display for DecisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecisionStage::ReceivedInput => "received_input",
            DecisionStage::FeatureEngineered => "feature_engineered",
            DecisionStage::SafetyChecked => "safety_checked",
            DecisionStage::Overridden => "overridden",
            DecisionStage::ModelScored => "model_scored",
            DecisionStage::EnvironmentAdjusted => "environment_adjusted",
            DecisionStage::Clamped => "clamped",
        };
        f.write_str(name)
    }
}

/// Uncertainty of a model score: widest at 0.5, floored at 0.05.
pub fn uncertainty_for(risk: f64) -> f64 {
    (UNCERTAINTY_SCALE * (1.0 - 2.0 * (risk - 0.5).abs())).max(UNCERTAINTY_FLOOR)
}

/// Engineer the named feature row for one observation.
///
/// Percent-predicted values are left empty when the observation has no
/// height; the contract encodes them as missing.
pub fn engineer_features(observation: &PatientObservation, environment: &EnvironmentalSnapshot) -> FeatureRow {
    let baseline = clinical::baseline(observation).ok();

    FeatureRow {
        age: f64::from(observation.age),
        gender: f64::from(observation.gender.model_code()),
        bmi: clinical::bmi_or_default(observation.weight_kg, observation.height_cm),
        smoking: f64::from(observation.smoking.model_code()),
        wheezing: if observation.wheezing { 1.0 } else { 0.0 },
        fev1: observation.fev1_liters,
        pef: observation.pef_lpm,
        fev1_pct: baseline.map(|b| b.fev1_pct),
        pef_pct: baseline.map(|b| b.pef_pct),
        spo2: observation.spo2_pct,
        pollution: environment.pm25,
    }
}

/// Intermediate score before the anomaly downgrade and final clamp.
struct Scored {
    risk: f64,
    uncertainty: f64,
    trust: TrustRating,
    status: ModelStatus,
    override_rule: Option<String>,
}

/// The hybrid scorer. Construct once at startup; shared by every request.
pub struct RiskEngine {
    contract: FeatureContract,
    policy: Arc<dyn SafetyPolicy>,
    classifier: Option<Arc<dyn Classifier>>,
    config: RiskConfig,
}

impl RiskEngine {
    /// Create an engine without a classifier. Every non-overridden request
    /// is scored with the fallback until one is attached.
    pub fn new(contract: FeatureContract, policy: Arc<dyn SafetyPolicy>, config: RiskConfig) -> Self {
        Self {
            contract,
            policy,
            classifier: None,
            config,
        }
    }

    /// Attach a classifier after checking its columns against the contract.
    ///
    /// # Errors
    ///
    /// `ArtifactInvalid` when the classifier was trained on different
    /// columns, or in a different order, than the contract declares.
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> RespiraResult<Self> {
        self.contract.check_columns(classifier.feature_names())?;
        self.classifier = Some(classifier);
        Ok(self)
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.contract
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn config(&self) -> RiskConfig {
        self.config
    }

    /// Score one validated observation.
    ///
    /// `anomaly` is the verdict of the outlier screen; an outlier never
    /// receives better than low trust.
    pub fn assess(
        &self,
        observation: &PatientObservation,
        environment: &EnvironmentalSnapshot,
        anomaly: &AnomalyVerdict,
    ) -> RiskAssessment {
        debug!(stage = %DecisionStage::ReceivedInput, age = observation.age, "risk assessment starting");

        // ── Stage 1: Feature engineering ─────────────────────────────────────
        let features = engineer_features(observation, environment);
        debug!(
            stage = %DecisionStage::FeatureEngineered,
            bmi = features.bmi,
            fev1_pct = ?features.fev1_pct,
            pef_pct = ?features.pef_pct,
            "features engineered"
        );

        // ── Stage 2: Safety override ─────────────────────────────────────────
        let ctx = SafetyContext { features };
        let verdict = self.policy.evaluate(&ctx);
        debug!(stage = %DecisionStage::SafetyChecked, verdict = ?verdict, "safety policy evaluated");

        let scored = match verdict {
            SafetyVerdict::CriticalOverride { rule_id, reason } => {
                telemetry::emit(&TrustEvent::CriticalOverride {
                    rule_id: rule_id.clone(),
                    reason,
                    features: ctx.features,
                });
                debug!(stage = %DecisionStage::Overridden, rule_id = %rule_id, "classifier bypassed");
                Scored {
                    risk: OVERRIDE_RISK,
                    uncertainty: OVERRIDE_UNCERTAINTY,
                    trust: TrustRating::High,
                    status: ModelStatus::Overridden,
                    override_rule: Some(rule_id),
                }
            }
            // Only reachable after Proceed.
            SafetyVerdict::Proceed => self.score_with_model(&ctx.features, environment),
        };

        // ── Anomaly downgrade ────────────────────────────────────────────────
        let trust = if anomaly.is_outlier { TrustRating::Low } else { scored.trust };

        // ── Clamp ────────────────────────────────────────────────────────────
        let risk = scored.risk.clamp(MIN_RISK, MAX_RISK);
        let uncertainty = scored.uncertainty.max(0.0);
        debug!(
            stage = %DecisionStage::Clamped,
            risk_score = risk,
            uncertainty,
            trust = trust.as_str(),
            "risk assessment complete"
        );

        RiskAssessment {
            risk_score: risk,
            trust_rating: trust,
            uncertainty_range: uncertainty,
            prediction_interval: PredictionInterval::around(risk, uncertainty),
            model_status: scored.status,
            override_rule: scored.override_rule,
        }
    }

    fn score_with_model(&self, features: &FeatureRow, environment: &EnvironmentalSnapshot) -> Scored {
        let Some(classifier) = &self.classifier else {
            return self.fallback(ModelStatus::Unavailable, "no classifier loaded".to_string());
        };

        let vector = self.contract.assemble(features);
        let probability = match classifier.predict_proba(&vector) {
            Ok(p) if p.is_finite() => p,
            Ok(p) => {
                return self.fallback(ModelStatus::Failed, format!("classifier returned non-finite probability {p}"));
            }
            Err(e) => return self.fallback(ModelStatus::Failed, e.to_string()),
        };
        debug!(stage = %DecisionStage::ModelScored, probability, "classifier scored request");

        // ── Environmental adjustment ─────────────────────────────────────────
        let mut risk = probability;
        if environment.pm25 > self.config.pm25_threshold {
            risk = (risk + self.config.pm25_penalty).min(MAX_RISK);
            debug!(
                stage = %DecisionStage::EnvironmentAdjusted,
                pm25 = environment.pm25,
                risk,
                "pollution penalty applied"
            );
        }

        let uncertainty = uncertainty_for(risk);
        let trust = if uncertainty < HIGH_TRUST_BELOW {
            TrustRating::High
        } else {
            TrustRating::Medium
        };

        Scored {
            risk,
            uncertainty,
            trust,
            status: ModelStatus::Scored,
            override_rule: None,
        }
    }

    fn fallback(&self, status: ModelStatus, reason: String) -> Scored {
        warn!(status = ?status, reason = %reason, "scoring without classifier");
        telemetry::emit(&TrustEvent::ModelFallback { reason });
        Scored {
            risk: FALLBACK_RISK,
            uncertainty: FALLBACK_UNCERTAINTY,
            trust: TrustRating::Low,
            status,
            override_rule: None,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use respira_contracts::{
        assessment::{AnomalyVerdict, ModelStatus, TrustRating},
        error::{RespiraError, RespiraResult},
        features::{FeatureContract, FeatureVector},
        policy::{SafetyContext, SafetyVerdict},
    };

    use super::*;
    use crate::test_support::{environment, observation};
    use crate::traits::{Classifier, SafetyPolicy};

    // ── Mock helpers ─────────────────────────────────────────────────────────

    /// Overrides when SpO2 is below 90, like the default clinical policy.
    struct SpO2Policy;

    impl SafetyPolicy for SpO2Policy {
        fn evaluate(&self, ctx: &SafetyContext) -> SafetyVerdict {
            if ctx.features.spo2 < 90.0 {
                SafetyVerdict::CriticalOverride {
                    rule_id: "critical-spo2".to_string(),
                    reason: "SpO2 below 90%".to_string(),
                }
            } else {
                SafetyVerdict::Proceed
            }
        }
    }

    /// A classifier returning a fixed probability and counting its calls.
    struct FixedClassifier {
        columns: Vec<String>,
        probability: RespiraResult<f64>,
        calls: Arc<Mutex<u32>>,
        seen: Arc<Mutex<Vec<FeatureVector>>>,
    }

    impl FixedClassifier {
        fn new(probability: RespiraResult<f64>) -> Self {
            Self {
                columns: FeatureContract::percent_predicted()
                    .columns()
                    .into_iter()
                    .map(String::from)
                    .collect(),
                probability,
                calls: Arc::new(Mutex::new(0)),
                seen: Arc::new(Mutex::new(vec![])),
            }
        }
    }

    impl Classifier for FixedClassifier {
        fn feature_names(&self) -> &[String] {
            &self.columns
        }

        fn predict_proba(&self, features: &FeatureVector) -> RespiraResult<f64> {
            *self.calls.lock().unwrap() += 1;
            self.seen.lock().unwrap().push(features.clone());
            match &self.probability {
                Ok(p) => Ok(*p),
                Err(e) => Err(RespiraError::Inference { reason: e.to_string() }),
            }
        }
    }

    fn engine_with(classifier: FixedClassifier) -> RiskEngine {
        RiskEngine::new(FeatureContract::percent_predicted(), Arc::new(SpO2Policy), RiskConfig::default())
            .with_classifier(Arc::new(classifier))
            .unwrap()
    }

    fn inlier() -> AnomalyVerdict {
        AnomalyVerdict::inlier(0.08)
    }

    // ── Test cases ────────────────────────────────────────────────────────────

    /// Core safety test: a critical override must prevent the classifier from
    /// being called, and forces maximal risk with high trust.
    #[test]
    fn test_override_bypasses_classifier() {
        let classifier = FixedClassifier::new(Ok(0.1));
        let calls = classifier.calls.clone();
        let engine = engine_with(classifier);

        let mut obs = observation();
        obs.spo2_pct = 88.0;
        let result = engine.assess(&obs, &environment(12.0), &inlier());

        assert_eq!(*calls.lock().unwrap(), 0, "predict_proba() must not be called on override");
        assert_eq!(result.risk_score, 0.99);
        assert_eq!(result.trust_rating, TrustRating::High);
        assert_eq!(result.uncertainty_range, 0.01);
        assert_eq!(result.model_status, ModelStatus::Overridden);
        assert_eq!(result.override_rule.as_deref(), Some("critical-spo2"));
    }

    #[test]
    fn test_override_with_outlier_is_low_trust() {
        let engine = engine_with(FixedClassifier::new(Ok(0.1)));
        let mut obs = observation();
        obs.spo2_pct = 72.0;
        let anomaly = AnomalyVerdict {
            is_outlier: true,
            anomaly_score: -0.2,
            flagged_features: vec!["Critical SpO2 (72%)".to_string()],
        };

        let result = engine.assess(&obs, &environment(12.0), &anomaly);
        assert_eq!(result.risk_score, 0.99);
        assert_eq!(result.trust_rating, TrustRating::Low);
    }

    #[test]
    fn test_confident_model_score_is_high_trust() {
        let engine = engine_with(FixedClassifier::new(Ok(0.04)));
        let result = engine.assess(&observation(), &environment(12.0), &inlier());

        assert_eq!(result.model_status, ModelStatus::Scored);
        assert!((result.risk_score - 0.04).abs() < 1e-12);
        assert_eq!(result.uncertainty_range, 0.05);
        assert_eq!(result.trust_rating, TrustRating::High);
        assert_eq!(result.prediction_interval.lower_bound, 0.0);
    }

    #[test]
    fn test_uncertain_model_score_is_medium_trust() {
        let engine = engine_with(FixedClassifier::new(Ok(0.5)));
        let result = engine.assess(&observation(), &environment(12.0), &inlier());

        assert!((result.uncertainty_range - 0.2).abs() < 1e-12);
        assert_eq!(result.trust_rating, TrustRating::Medium);
    }

    #[test]
    fn test_outlier_downgrades_model_trust() {
        let engine = engine_with(FixedClassifier::new(Ok(0.04)));
        let anomaly = AnomalyVerdict {
            is_outlier: true,
            anomaly_score: -0.05,
            flagged_features: vec!["Complex Multivariate Anomaly".to_string()],
        };
        let result = engine.assess(&observation(), &environment(12.0), &anomaly);
        assert_eq!(result.trust_rating, TrustRating::Low);
    }

    #[test]
    fn test_pollution_penalty_is_capped() {
        let engine = engine_with(FixedClassifier::new(Ok(0.3)));
        let result = engine.assess(&observation(), &environment(55.0), &inlier());
        assert!((result.risk_score - 0.35).abs() < 1e-12);

        let engine = engine_with(FixedClassifier::new(Ok(0.97)));
        let result = engine.assess(&observation(), &environment(55.0), &inlier());
        assert_eq!(result.risk_score, 0.99);

        // The threshold itself is not "above".
        let engine = engine_with(FixedClassifier::new(Ok(0.3)));
        let result = engine.assess(&observation(), &environment(50.0), &inlier());
        assert!((result.risk_score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_scores_are_clamped() {
        let engine = engine_with(FixedClassifier::new(Ok(0.0)));
        let result = engine.assess(&observation(), &environment(12.0), &inlier());
        assert_eq!(result.risk_score, MIN_RISK);

        let engine = engine_with(FixedClassifier::new(Ok(1.0)));
        let result = engine.assess(&observation(), &environment(12.0), &inlier());
        assert_eq!(result.risk_score, MAX_RISK);
        assert!(result.prediction_interval.upper_bound <= 1.0);
    }

    #[test]
    fn test_missing_classifier_falls_back() {
        let engine = RiskEngine::new(FeatureContract::percent_predicted(), Arc::new(SpO2Policy), RiskConfig::default());
        assert!(!engine.has_classifier());

        // Pollution does not move the fallback score.
        let result = engine.assess(&observation(), &environment(80.0), &inlier());
        assert_eq!(result.risk_score, 0.5);
        assert_eq!(result.uncertainty_range, 0.5);
        assert_eq!(result.trust_rating, TrustRating::Low);
        assert_eq!(result.model_status, ModelStatus::Unavailable);
        assert_eq!(result.prediction_interval.lower_bound, 0.0);
        assert_eq!(result.prediction_interval.upper_bound, 1.0);
    }

    #[test]
    fn test_failing_classifier_falls_back() {
        let engine = engine_with(FixedClassifier::new(Err(RespiraError::Inference {
            reason: "tree walk failed".to_string(),
        })));
        let result = engine.assess(&observation(), &environment(12.0), &inlier());
        assert_eq!(result.risk_score, 0.5);
        assert_eq!(result.model_status, ModelStatus::Failed);

        let engine = engine_with(FixedClassifier::new(Ok(f64::NAN)));
        let result = engine.assess(&observation(), &environment(12.0), &inlier());
        assert_eq!(result.model_status, ModelStatus::Failed);
    }

    /// A classifier trained on different columns is refused at construction.
    #[test]
    fn test_contract_mismatch_is_rejected() {
        let mut classifier = FixedClassifier::new(Ok(0.2));
        classifier.columns.swap(5, 6);
        let result = RiskEngine::new(FeatureContract::percent_predicted(), Arc::new(SpO2Policy), RiskConfig::default())
            .with_classifier(Arc::new(classifier));
        assert!(matches!(result, Err(RespiraError::ArtifactInvalid { .. })));
    }

    #[test]
    fn test_vector_follows_contract_order() {
        let classifier = FixedClassifier::new(Ok(0.2));
        let seen = classifier.seen.clone();
        let engine = engine_with(classifier);

        let mut obs = observation();
        obs.height_cm = None;
        engine.assess(&obs, &environment(21.5), &inlier());

        let seen = seen.lock().unwrap();
        let values = &seen[0].values;
        assert_eq!(values.len(), 11);
        assert_eq!(values[0], 25.0);
        assert_eq!(values[2], 22.0, "missing height falls back to default BMI");
        assert!(values[7].is_nan() && values[8].is_nan());
        assert_eq!(values[9], 98.0);
        assert_eq!(values[10], 21.5);
    }

    #[test]
    fn test_uncertainty_curve() {
        assert!((uncertainty_for(0.5) - 0.2).abs() < 1e-12);
        assert_eq!(uncertainty_for(0.99), 0.05);
        assert_eq!(uncertainty_for(0.01), 0.05);
        assert!((uncertainty_for(0.3) - 0.12).abs() < 1e-12);
    }
}
