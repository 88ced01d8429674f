//! Per-request orchestration of `/predict`.
//!
//!   validate → anomaly screen → environment → risk engine → persist → respond
//!
//! Validation is the only step that can fail a request. The anomaly screen
//! is advisory, the environment lookup degrades to a fallback, the engine
//! degrades to a neutral score, and persistence failures are logged and
//! swallowed.

use std::sync::Arc;

use tracing::{error, info};

use respira_contracts::{
    assessment::PredictionResponse,
    error::{RespiraError, RespiraResult},
    patient::PatientObservation,
    record::AssessmentRecord,
};

use crate::{
    clinical,
    engine::RiskEngine,
    telemetry::{self, TrustEvent},
    traits::{AssessmentStore, EnvironmentProvider, OutlierDetector},
};

/// Result of one prediction: the wire response and the persisted row.
#[derive(Debug, Clone)]
pub struct PredictionOutcome {
    pub response: PredictionResponse,
    pub record: AssessmentRecord,
    /// False when the store rejected the record.
    pub persisted: bool,
}

/// Wires the collaborators of one prediction together.
///
/// Construct once at startup; every field is read-only and shared.
#[derive(Clone)]
pub struct PredictionService {
    engine: Arc<RiskEngine>,
    detector: Arc<dyn OutlierDetector>,
    environment: Arc<dyn EnvironmentProvider>,
    store: Arc<dyn AssessmentStore>,
}

impl PredictionService {
    pub fn new(
        engine: Arc<RiskEngine>,
        detector: Arc<dyn OutlierDetector>,
        environment: Arc<dyn EnvironmentProvider>,
        store: Arc<dyn AssessmentStore>,
    ) -> Self {
        Self {
            engine,
            detector,
            environment,
            store,
        }
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn AssessmentStore> {
        &self.store
    }

    /// Score one observation.
    ///
    /// # Errors
    ///
    /// `Validation` when any field is out of range. Nothing after validation
    /// fails the request.
    pub async fn predict(&self, observation: PatientObservation) -> RespiraResult<PredictionOutcome> {
        observation.validate()?;

        let anomaly = self.detector.detect(&observation);
        if anomaly.is_outlier {
            telemetry::emit(&TrustEvent::AnomalyDetected {
                anomaly_score: anomaly.anomaly_score,
                flagged_features: anomaly.flagged_features.clone(),
            });
        }

        let environment = self.environment.get_data(&observation.postal_code).await;
        let assessment = self.engine.assess(&observation, &environment, &anomaly);

        let bmi = clinical::bmi_or_default(observation.weight_kg, observation.height_cm);
        let record = AssessmentRecord::new(&observation, bmi, &assessment, &anomaly);
        let persisted = match self.persist(record.clone()).await {
            Ok(()) => true,
            Err(e) => {
                error!(record_id = %record.record_id, error = %e, "failed to persist assessment");
                false
            }
        };

        info!(
            record_id = %record.record_id,
            risk_score = assessment.risk_score,
            trust = assessment.trust_rating.as_str(),
            model_status = ?assessment.model_status,
            env_source = ?environment.source,
            outlier = anomaly.is_outlier,
            "prediction served"
        );

        Ok(PredictionOutcome {
            response: PredictionResponse::assemble(&assessment, environment, anomaly),
            record,
            persisted,
        })
    }

    /// Append on the blocking pool; a journaled store does file I/O.
    async fn persist(&self, record: AssessmentRecord) -> RespiraResult<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.append(&record))
            .await
            .map_err(|e| RespiraError::StoreWriteFailed {
                reason: format!("persistence task did not complete: {e}"),
            })?
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
