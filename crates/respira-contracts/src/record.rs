//! Persisted assessment rows and the read-only views derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    assessment::{AnomalyVerdict, ModelStatus, RiskAssessment, TrustRating},
    patient::{Gender, PatientObservation, SmokingStatus},
};

/// One row per prediction. Append-only: there is no update or delete path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub record_id: Uuid,
    /// The observation as submitted, with `patient_id` always resolved.
    #[serde(flatten)]
    pub observation: PatientObservation,
    pub bmi: f64,
    pub risk_score: f64,
    pub uncertainty: f64,
    pub trust_rating: TrustRating,
    pub model_status: ModelStatus,
    #[serde(default)]
    pub override_rule: Option<String>,
    #[serde(default)]
    pub flagged_features: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl AssessmentRecord {
    /// Build the audit row for one request, minting a patient id when the
    /// request did not link to an existing one.
    pub fn new(
        observation: &PatientObservation,
        bmi: f64,
        assessment: &RiskAssessment,
        anomaly: &AnomalyVerdict,
    ) -> Self {
        let mut observation = observation.clone();
        if observation.patient_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            observation.patient_id = Some(Uuid::new_v4().to_string());
        }

        Self {
            record_id: Uuid::new_v4(),
            observation,
            bmi,
            risk_score: assessment.risk_score,
            uncertainty: assessment.uncertainty_range,
            trust_rating: assessment.trust_rating,
            model_status: assessment.model_status,
            override_rule: assessment.override_rule.clone(),
            flagged_features: if anomaly.is_outlier {
                anomaly.flagged_features.clone()
            } else {
                Vec::new()
            },
            created_at: Utc::now(),
        }
    }

    pub fn patient_id(&self) -> &str {
        self.observation.patient_id.as_deref().unwrap_or_default()
    }
}

/// A distinct patient as listed by `GET /patients`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientReference {
    pub patient_id: String,
    pub patient_name: String,
    pub age: u32,
    pub zip_code: String,
    pub gender: Gender,
    pub smoking: SmokingStatus,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub last_visit: DateTime<Utc>,
}

impl From<&AssessmentRecord> for PatientReference {
    fn from(record: &AssessmentRecord) -> Self {
        let obs = &record.observation;
        Self {
            patient_id: record.patient_id().to_string(),
            patient_name: obs.patient_name.clone(),
            age: obs.age,
            zip_code: obs.postal_code.clone(),
            gender: obs.gender,
            smoking: obs.smoking,
            height: obs.height_cm,
            weight: obs.weight_kg,
            last_visit: record.created_at,
        }
    }
}

/// Dashboard summary served by `GET /stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentStats {
    pub total_patients: usize,
    pub high_risk_count: usize,
    pub avg_fev1: f64,
}
