//! Trust telemetry.
//!
//! Events a reviewer must be able to find after the fact: every anomaly flag,
//! every hard override, and every time the service scored without its model.
//! They are emitted as one JSON object per line on the `respira::telemetry`
//! tracing target so they can be routed separately from operational logs.

use serde::Serialize;
use tracing::warn;

use respira_contracts::features::FeatureRow;

pub const TELEMETRY_TARGET: &str = "respira::telemetry";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustEvent {
    AnomalyDetected {
        anomaly_score: f64,
        flagged_features: Vec<String>,
    },
    CriticalOverride {
        rule_id: String,
        reason: String,
        features: FeatureRow,
    },
    ModelFallback {
        reason: String,
    },
}

impl TrustEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TrustEvent::AnomalyDetected { .. } => "ANOMALY_DETECTED",
            TrustEvent::CriticalOverride { .. } => "CRITICAL_OVERRIDE",
            TrustEvent::ModelFallback { .. } => "MODEL_FALLBACK",
        }
    }
}

/// Log `event` at warn level on the telemetry target.
pub fn emit(event: &TrustEvent) {
    let payload = serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"unserializable\":\"{e}\"}}"));
    warn!(target: TELEMETRY_TARGET, event = event.name(), payload = %payload, "trust event");
}
