//! The HTTP surface.
//!
//! | Route            | Handler     |
//! |------------------|-------------|
//! | `POST /predict`  | score one observation |
//! | `POST /explain`  | physician Q&A about a score |
//! | `GET /patients`  | distinct patients, `?query=` name filter |
//! | `GET /history`   | newest records, `?patient_id=` filter |
//! | `GET /stats`     | dashboard totals |
//! | `GET /health`    | liveness and artifact status |

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};

use respira_audit::queries;
use respira_contracts::{
    assessment::PredictionResponse,
    error::FieldError,
    explain::ExplanationFeatures,
    patient::PatientObservation,
    record::{AssessmentRecord, AssessmentStats, PatientReference},
};
use respira_services::parse_suggested_questions;

use crate::{
    error::{panic_response, ApiError},
    state::AppContext,
};

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/explain", post(explain))
        .route("/patients", get(patients))
        .route("/history", get(history))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .with_state(ctx)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::permissive())
}

async fn predict(
    State(ctx): State<AppContext>,
    body: Result<Json<PatientObservation>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let Json(observation) = body?;
    let outcome = ctx.predictions.predict(observation).await?;
    Ok(Json(outcome.response))
}

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub query: String,
    pub features: ExplanationFeatures,
    pub risk_score: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub text: String,
    pub suggested_questions: Vec<String>,
}

async fn explain(
    State(ctx): State<AppContext>,
    body: Result<Json<ExplainRequest>, JsonRejection>,
) -> Result<Json<ExplainResponse>, ApiError> {
    let Json(request) = body?;
    if !(0.0..=1.0).contains(&request.risk_score) {
        return Err(ApiError::Validation(vec![FieldError::new(
            "risk_score",
            "must be between 0 and 1",
        )]));
    }

    let text = ctx
        .explainer
        .explain(&request.query, &request.features, request.risk_score)
        .await;
    let suggested_questions = parse_suggested_questions(&text);
    Ok(Json(ExplainResponse {
        text,
        suggested_questions,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct PatientSearch {
    #[serde(default)]
    pub query: String,
}

async fn patients(
    State(ctx): State<AppContext>,
    Query(search): Query<PatientSearch>,
) -> Result<Json<Vec<PatientReference>>, ApiError> {
    let found = queries::search_patients(ctx.ledger.as_ref(), &search.query, queries::PATIENT_SEARCH_LIMIT)?;
    Ok(Json(found))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryFilter {
    pub patient_id: Option<String>,
}

async fn history(
    State(ctx): State<AppContext>,
    Query(filter): Query<HistoryFilter>,
) -> Result<Json<Vec<AssessmentRecord>>, ApiError> {
    let records = queries::history(ctx.ledger.as_ref(), filter.patient_id.as_deref(), queries::HISTORY_LIMIT)?;
    Ok(Json(records))
}

async fn stats(State(ctx): State<AppContext>) -> Result<Json<AssessmentStats>, ApiError> {
    Ok(Json(queries::stats(ctx.ledger.as_ref())?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub model_loaded: bool,
    pub feature_contract: String,
    pub ledger_verified: bool,
    pub ledger_records: usize,
    pub environment_live: bool,
    pub explainer_online: bool,
}

async fn health(State(ctx): State<AppContext>) -> Json<HealthReport> {
    let ledger_verified = ctx.ledger.verify_integrity();
    Json(HealthReport {
        status: if ledger_verified { "ok" } else { "degraded" }.to_string(),
        model_loaded: ctx.model_loaded(),
        feature_contract: ctx.predictions.engine().contract().version.clone(),
        ledger_verified,
        ledger_records: ctx.ledger.len(),
        environment_live: ctx.environment_live,
        explainer_online: ctx.explainer.is_online(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc};

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use respira_contracts::assessment::AnomalyVerdict;
    use respira_core::traits::OutlierDetector;
    use respira_ml::{AnomalyConfig, AnomalyScreener};

    use super::*;
    use crate::config::AppConfig;

    struct NeverOutlier;

    impl OutlierDetector for NeverOutlier {
        fn detect(&self, _observation: &PatientObservation) -> AnomalyVerdict {
            AnomalyVerdict::inlier(0.1)
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.model.path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../models/model_xgb.json");
        config
    }

    fn app() -> Router {
        router(AppContext::with_detector(&test_config(), Arc::new(NeverOutlier)).unwrap())
    }

    fn healthy() -> Value {
        json!({
            "patient_name": "Jordan Doe",
            "age": 25,
            "height": 175.0,
            "weight": 70.0,
            "gender": "Male",
            "smoking": "Non-smoker",
            "fev1": 4.0,
            "pef": 500,
            "spo2": 98,
            "wheezing": false,
            "shortness_of_breath": false,
            "zip_code": "560001",
            "medication_use": false
        })
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    // ── /predict ──────────────────────────────────────────────────────────────

    /// Healthy young adult: low risk from the model, no override.
    #[tokio::test]
    async fn test_predict_healthy_patient() {
        let app = app();
        let (status, body) = call(&app, post_json("/predict", &healthy())).await;

        assert_eq!(status, StatusCode::OK);
        let risk = body["prediction"]["risk_score"].as_f64().unwrap();
        assert!(risk < 0.3, "risk {risk}");
        assert!(risk >= 0.01);
        assert_ne!(body["trust_signal"]["trust_rating"], "low");
        assert_eq!(body["anomaly_detection"]["is_outlier"], false);
        assert_eq!(body["environmental_data"]["source"], "fallback");

        let (_, history) = call(&app, get("/history")).await;
        assert_eq!(history[0]["model_status"], "scored");
        assert!(history[0]["override_rule"].is_null());
    }

    /// Critical SpO2 forces the override regardless of the model.
    #[tokio::test]
    async fn test_predict_critical_spo2_override() {
        let app = app();
        let mut body = healthy();
        body["spo2"] = json!(88);

        let (status, body) = call(&app, post_json("/predict", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prediction"]["risk_score"], 0.99);
        assert_eq!(body["trust_signal"]["trust_rating"], "high");
        let interval = &body["trust_signal"]["prediction_interval"];
        assert!((interval["lower_bound"].as_f64().unwrap() - 0.98).abs() < 1e-9);
        assert_eq!(interval["upper_bound"], 1.0);
    }

    #[tokio::test]
    async fn test_predict_out_of_range_is_422() {
        let app = app();
        let mut body = healthy();
        body["spo2"] = json!(55);
        body["zip_code"] = json!("56");

        let (status, body) = call(&app, post_json("/predict", &body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
        let fields: Vec<&str> = body["error"]["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["spo2", "zip_code"]);

        // Nothing was persisted.
        let (_, stats) = call(&app, get("/stats")).await;
        assert_eq!(stats["total_patients"], 0);
    }

    #[tokio::test]
    async fn test_predict_unknown_category_is_422() {
        let mut body = healthy();
        body["smoking"] = json!("Vaper");
        let (status, body) = call(&app(), post_json("/predict", &body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "INVALID_BODY");
    }

    #[tokio::test]
    async fn test_predict_malformed_json_is_400() {
        let req = Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = call(&app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    /// Without a model every non-overridden request gets the neutral score.
    #[tokio::test]
    async fn test_predict_without_model_uses_fallback() {
        let mut config = test_config();
        config.model.path = "/nonexistent/model.json".into();
        let app = router(AppContext::with_detector(&config, Arc::new(NeverOutlier)).unwrap());

        let (status, body) = call(&app, post_json("/predict", &healthy())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prediction"]["risk_score"], 0.5);
        assert_eq!(body["trust_signal"]["trust_rating"], "low");

        let (_, health) = call(&app, get("/health")).await;
        assert_eq!(health["model_loaded"], false);
    }

    /// An implausible observation is flagged and never rated above low trust.
    #[tokio::test]
    async fn test_predict_extreme_vitals_flagged() {
        let screener = AnomalyScreener::fit(AnomalyConfig::default()).unwrap();
        let app = router(AppContext::with_detector(&test_config(), Arc::new(screener)).unwrap());

        let mut body = healthy();
        body["age"] = json!(120);
        body["fev1"] = json!(0.5);
        body["pef"] = json!(50);
        body["spo2"] = json!(70);

        let (status, body) = call(&app, post_json("/predict", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["anomaly_detection"]["is_outlier"], true);
        assert_eq!(body["trust_signal"]["trust_rating"], "low");
        assert!(!body["anomaly_detection"]["flagged_features"].as_array().unwrap().is_empty());
    }

    // ── /explain ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_explain_offline() {
        let request = json!({
            "query": "Why is this patient high risk?",
            "features": { "age": 70, "fev1": 1.2, "pef": 250, "spo2": 89, "smoking": "Current Smoker", "wheezing": true },
            "risk_score": 0.82
        });
        let (status, body) = call(&app(), post_json("/explain", &request)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["text"].as_str().unwrap().contains("High Risk Configuration"));
        assert_eq!(body["suggested_questions"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_explain_rejects_bad_score() {
        let request = json!({
            "query": "why",
            "features": { "age": 40, "fev1": 3.0, "pef": 400, "spo2": 97, "smoking": "Non-smoker" },
            "risk_score": 1.5
        });
        let (status, _) = call(&app(), post_json("/explain", &request)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    // ── Read views ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_patients_history_stats_after_predictions() {
        let app = app();

        let mut first = healthy();
        first["patient_id"] = json!("p-ada");
        first["patient_name"] = json!("Ada Lovelace");
        call(&app, post_json("/predict", &first)).await;

        let mut critical = first.clone();
        critical["spo2"] = json!(85);
        call(&app, post_json("/predict", &critical)).await;

        let mut other = healthy();
        other["patient_name"] = json!("Grace Hopper");
        other["fev1"] = json!(3.0);
        call(&app, post_json("/predict", &other)).await;

        let (status, patients) = call(&app, get("/patients")).await;
        assert_eq!(status, StatusCode::OK);
        let patients = patients.as_array().unwrap();
        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0]["patient_name"], "Grace Hopper");
        // A fresh id was minted for the unlinked request.
        assert!(!patients[0]["patient_id"].as_str().unwrap().is_empty());
        assert_eq!(patients[1]["patient_id"], "p-ada");

        let (_, found) = call(&app, get("/patients?query=lovelace")).await;
        assert_eq!(found.as_array().unwrap().len(), 1);

        let (_, history) = call(&app, get("/history?patient_id=p-ada")).await;
        let history = history.as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["override_rule"], "critical-spo2");

        let (_, stats) = call(&app, get("/stats")).await;
        assert_eq!(stats["total_patients"], 3);
        assert_eq!(stats["high_risk_count"], 1);
        assert_eq!(stats["avg_fev1"], 3.67);

        let (_, health) = call(&app, get("/health")).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["ledger_records"], 3);
        assert_eq!(health["ledger_verified"], true);
    }

    #[tokio::test]
    async fn test_health_reports_artifacts() {
        let (status, health) = call(&app(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["model_loaded"], true);
        assert_eq!(health["feature_contract"], "respira-v2");
        assert_eq!(health["explainer_online"], false);
    }
}
