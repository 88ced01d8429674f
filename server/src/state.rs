//! Startup wiring: every service object is constructed here, once, and
//! shared by all handlers through `AppContext`.

use std::{path::Path, sync::Arc};

use serde_json::Value;
use tracing::{info, warn};

use respira_audit::HashChainStore;
use respira_contracts::{
    error::{RespiraError, RespiraResult},
    features::FeatureContract,
    verify::VerificationReport,
};
use respira_core::{
    telemetry::{self, TrustEvent},
    traits::{AssessmentStore, OutlierDetector},
    PredictionService, RiskEngine,
};
use respira_ml::{AnomalyScreener, GradientBoostedClassifier};
use respira_policy::TomlSafetyPolicy;
use respira_services::{Explainer, OpenAiClient, OpenWeatherProvider};
use respira_verify::{xgboost_schema, ArtifactVerifier};

use crate::config::AppConfig;

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppContext {
    pub predictions: PredictionService,
    pub explainer: Explainer,
    pub ledger: Arc<HashChainStore>,
    pub environment_live: bool,
}

impl AppContext {
    /// Build every collaborator from `config`, fitting the anomaly screener.
    ///
    /// # Errors
    ///
    /// Any configuration problem, an unreadable policy, a journal that fails
    /// verification, or a model artifact that is present but does not match
    /// the feature contract.
    pub fn from_config(config: &AppConfig) -> RespiraResult<Self> {
        let detector = Arc::new(AnomalyScreener::fit(config.anomaly)?);
        Self::with_detector(config, detector)
    }

    /// As [`AppContext::from_config`] with a caller-supplied outlier screen.
    pub fn with_detector(config: &AppConfig, detector: Arc<dyn OutlierDetector>) -> RespiraResult<Self> {
        let contract = config.feature_contract()?;

        let policy = match &config.policy.path {
            Some(path) => TomlSafetyPolicy::from_file(path)?,
            None => TomlSafetyPolicy::builtin()?,
        };
        info!(rules = policy.rule_count(), "safety policy loaded");

        let mut engine = RiskEngine::new(contract.clone(), Arc::new(policy), config.risk);
        if let Some(classifier) = load_classifier(&config.model.path, &contract)? {
            engine = engine.with_classifier(Arc::new(classifier))?;
        }

        let ledger = Arc::new(match &config.store.journal {
            Some(path) => HashChainStore::open(config.store.ledger_id.clone(), path)?,
            None => HashChainStore::new(config.store.ledger_id.clone()),
        });

        let weather = OpenWeatherProvider::new(config.environment.clone())?;
        let environment_live = weather.has_api_key();
        if !environment_live {
            warn!("OPENWEATHERMAP_API_KEY not set; environmental data will use the offline fallback");
        }

        let explainer = match OpenAiClient::from_config(&config.explainer)? {
            Some(client) => {
                info!(model = client.model(), "explanations use the LLM");
                Explainer::with_generator(Arc::new(client))
            }
            None => {
                warn!("OPENAI_API_KEY not set; explanations use the rule-based responder");
                Explainer::offline()
            }
        };

        let store: Arc<dyn AssessmentStore> = ledger.clone();
        let predictions = PredictionService::new(Arc::new(engine), detector, Arc::new(weather), store);

        Ok(Self {
            predictions,
            explainer,
            ledger,
            environment_live,
        })
    }

    pub fn model_loaded(&self) -> bool {
        self.predictions.engine().has_classifier()
    }
}

/// Check a parsed artifact against `contract` and the XGBoost schema.
pub fn verify_artifact(document: &Value, contract: &FeatureContract) -> VerificationReport {
    ArtifactVerifier::for_xgboost(contract.clone()).verify(document, &xgboost_schema())
}

/// Load the classifier at `path`.
///
/// A missing or unreadable file is not fatal: the engine runs on its
/// fallback score. A file that is present but malformed, or trained on
/// other columns than `contract`, refuses startup.
pub fn load_classifier(path: &Path, contract: &FeatureContract) -> RespiraResult<Option<GradientBoostedClassifier>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            let reason = format!("cannot read model '{}': {}", path.display(), e);
            warn!(%reason, "classifier not loaded; scoring will use the fallback");
            telemetry::emit(&TrustEvent::ModelFallback { reason });
            return Ok(None);
        }
    };

    let document: Value = serde_json::from_str(&text).map_err(|e| RespiraError::ArtifactInvalid {
        reason: format!("model '{}' is not JSON: {}", path.display(), e),
    })?;

    let report = verify_artifact(&document, contract);
    if !report.passed {
        return Err(RespiraError::ArtifactInvalid {
            reason: format!(
                "model '{}' fails contract {}: {}",
                path.display(),
                contract.version,
                report.summary()
            ),
        });
    }

    let classifier = GradientBoostedClassifier::from_json_str(&text)?;
    info!(
        path = %path.display(),
        contract = %contract.version,
        trees = classifier.num_trees(),
        "classifier verified and loaded"
    );
    Ok(Some(classifier))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
