//! # respira-contracts
//!
//! Shared types, feature contracts, and errors for the Respira risk-scoring
//! backend.
//!
//! Every crate in the workspace imports from here. Apart from input
//! validation and the total categorical mappings, no business logic lives in
//! this crate.

pub mod assessment;
pub mod environment;
pub mod error;
pub mod explain;
pub mod features;
pub mod patient;
pub mod policy;
pub mod record;
pub mod verify;


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use assessment::{AnomalyVerdict, ModelStatus, PredictionInterval, RiskAssessment, TrustRating};
    use error::RespiraError;
    use features::{FeatureContract, FeatureRow};
    use patient::{Gender, PatientObservation, SmokingStatus};
    use record::AssessmentRecord;

    // ── Categorical mappings ─────────────────────────────────────────────────

    #[test]
    fn smoking_status_codes_are_fixed() {
        assert_eq!(SmokingStatus::NonSmoker.model_code(), 0);
        assert_eq!(SmokingStatus::ExSmoker.model_code(), 1);
        assert_eq!(SmokingStatus::CurrentSmoker.model_code(), 2);
        assert_eq!(Gender::Male.model_code(), 0);
        assert_eq!(Gender::Female.model_code(), 1);
    }

    #[test]
    fn smoking_status_parses_form_spellings() {
        assert_eq!("Non-smoker".parse::<SmokingStatus>().unwrap(), SmokingStatus::NonSmoker);
        assert_eq!("ex_smoker".parse::<SmokingStatus>().unwrap(), SmokingStatus::ExSmoker);
        assert_eq!("Current Smoker".parse::<SmokingStatus>().unwrap(), SmokingStatus::CurrentSmoker);
    }

    /// Unknown categories are a typed error, never a silent index 0.
    #[test]
    fn unknown_category_is_rejected() {
        match "Occasional".parse::<SmokingStatus>() {
            Err(RespiraError::UnknownCategory { category, value }) => {
                assert_eq!(category, "smoking");
                assert_eq!(value, "Occasional");
            }
            other => panic!("expected UnknownCategory, got {:?}", other),
        }
        assert!("Other".parse::<Gender>().is_err());
    }

    #[test]
    fn observation_deserializes_from_intake_form_names() {
        let body = json!({
            "patient_name": "Jordan Doe",
            "age": 25,
            "fev1": 4.0,
            "pef": 500,
            "spo2": 98,
            "zip_code": "560001",
            "gender": "Male",
            "smoking": "Non-smoker",
            "height": 175.0
        });
        let obs: PatientObservation = serde_json::from_value(body).unwrap();
        assert_eq!(obs.smoking, SmokingStatus::NonSmoker);
        assert_eq!(obs.height_cm, Some(175.0));
        assert_eq!(obs.weight_kg, None);
        assert!(!obs.wheezing);
        assert!(obs.validate().is_ok());
    }

    #[test]
    fn observation_with_unknown_gender_fails_to_deserialize() {
        let mut body = serde_json::to_value(fixtures::observation()).unwrap();
        body["gender"] = json!("Unknown");
        assert!(serde_json::from_value::<PatientObservation>(body).is_err());
    }

    // ── Validation ───────────────────────────────────────────────────────────

    #[test]
    fn validation_collects_every_violation() {
        let mut obs = fixtures::observation();
        obs.age = 130;
        obs.spo2_pct = 65.0;
        obs.postal_code = "12AB".to_string();

        match obs.validate() {
            Err(RespiraError::Validation { errors }) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["age", "spo2", "zip_code"]);
            }
            other => panic!("expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn validation_rejects_nan_measurements() {
        let mut obs = fixtures::observation();
        obs.fev1_liters = f64::NAN;
        assert!(obs.validate().is_err());
    }

    #[test]
    fn validation_accepts_range_boundaries() {
        let mut obs = fixtures::observation();
        obs.fev1_liters = 0.5;
        obs.pef_lpm = 700.0;
        obs.spo2_pct = 70.0;
        obs.age = 120;
        assert!(obs.validate().is_ok());
    }

    // ── Feature contract ─────────────────────────────────────────────────────

    fn row() -> FeatureRow {
        FeatureRow {
            age: 25.0,
            gender: 0.0,
            bmi: 22.9,
            smoking: 0.0,
            wheezing: 0.0,
            fev1: 4.0,
            pef: 500.0,
            fev1_pct: None,
            pef_pct: Some(57.1),
            spo2: 98.0,
            pollution: 12.5,
        }
    }

    #[test]
    fn percent_predicted_contract_orders_columns() {
        let contract = FeatureContract::percent_predicted();
        assert_eq!(
            contract.columns(),
            vec!["Age", "Gender", "BMI", "Smoking", "Wheezing", "FEV1", "PEF", "FEV1_Pct", "PEF_Pct", "SpO2", "Pollution"]
        );

        let vector = contract.assemble(&row());
        assert_eq!(vector.values.len(), 11);
        assert_eq!(vector.values[6], 500.0);
        assert!(vector.values[7].is_nan(), "missing percent-predicted must be NaN");
        assert_eq!(vector.values[8], 57.1);
        assert_eq!(vector.contract_version, "respira-v2");
    }

    #[test]
    fn contract_column_check_reports_first_mismatch() {
        let contract = FeatureContract::raw_vitals();
        let mut columns: Vec<String> = contract.columns().iter().map(|s| s.to_string()).collect();
        assert!(contract.check_columns(&columns).is_ok());

        columns.swap(0, 1);
        let err = contract.check_columns(&columns).unwrap_err();
        assert!(err.to_string().contains("position 0"), "got: {err}");

        columns.pop();
        assert!(contract.check_columns(&columns).is_err());
    }

    #[test]
    fn unknown_contract_version_is_config_error() {
        assert!(matches!(
            FeatureContract::by_version("respira-v9"),
            Err(RespiraError::ConfigError { .. })
        ));
    }

    // ── Assessment helpers ───────────────────────────────────────────────────

    #[test]
    fn prediction_interval_is_clamped() {
        let interval = PredictionInterval::around(0.97, 0.05);
        assert_eq!(interval.upper_bound, 1.0);
        assert!((interval.lower_bound - 0.92).abs() < 1e-9);

        let interval = PredictionInterval::around(0.02, 0.05);
        assert_eq!(interval.lower_bound, 0.0);
    }

    #[test]
    fn record_mints_patient_id_and_drops_inlier_flags() {
        let assessment = RiskAssessment {
            risk_score: 0.2,
            trust_rating: TrustRating::Medium,
            uncertainty_range: 0.12,
            prediction_interval: PredictionInterval::around(0.2, 0.12),
            model_status: ModelStatus::Scored,
            override_rule: None,
        };
        let anomaly = AnomalyVerdict {
            is_outlier: false,
            anomaly_score: 0.1,
            flagged_features: vec!["ignored".to_string()],
        };
        let record = AssessmentRecord::new(&fixtures::observation(), 22.9, &assessment, &anomaly);

        assert!(!record.patient_id().is_empty());
        assert!(record.flagged_features.is_empty());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["zip_code"], "560001");
        assert_eq!(json["trust_rating"], "medium");
    }

    #[test]
    fn record_keeps_existing_patient_id() {
        let mut obs = fixtures::observation();
        obs.patient_id = Some("patient-7".to_string());
        let assessment = RiskAssessment {
            risk_score: 0.5,
            trust_rating: TrustRating::Low,
            uncertainty_range: 0.5,
            prediction_interval: PredictionInterval::around(0.5, 0.5),
            model_status: ModelStatus::Unavailable,
            override_rule: None,
        };
        let record = AssessmentRecord::new(&obs, 22.0, &assessment, &AnomalyVerdict::inlier(0.0));
        assert_eq!(record.patient_id(), "patient-7");
    }

    // ── Error display ────────────────────────────────────────────────────────

    #[test]
    fn error_messages_carry_context() {
        let err = RespiraError::Upstream {
            service: "openweathermap".to_string(),
            reason: "timeout".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("openweathermap"));
        assert!(msg.contains("timeout"));

        let err = RespiraError::Validation {
            errors: vec![error::FieldError::new("age", "too old")],
        };
        assert_eq!(err.to_string(), "validation failed on 1 field(s)");
    }
}
