//! Trait seams of the scoring pipeline.
//!
//! Every collaborator the decision pipeline talks to sits behind one of these
//! traits so the service can be assembled from explicitly constructed objects
//! at startup and tested with fakes:
//!
//! - `Classifier`          — the trained risk model (read-only after load)
//! - `OutlierDetector`     — the fitted anomaly screener (read-only after fit)
//! - `SafetyPolicy`        — hard override rules evaluated before the model
//! - `EnvironmentProvider` — air-quality lookup, async, never fails
//! - `TextGenerator`       — external LLM used by the explanation engine
//! - `AssessmentStore`     — append-only persistence of assessment records
//!
//! All implementations must be `Send + Sync`: one instance serves every
//! in-flight request concurrently.

use futures_util::future::BoxFuture;

use respira_contracts::{
    assessment::AnomalyVerdict,
    environment::EnvironmentalSnapshot,
    error::RespiraResult,
    features::FeatureVector,
    patient::PatientObservation,
    policy::{SafetyContext, SafetyVerdict},
    record::AssessmentRecord,
};

/// A trained binary classifier producing the probability of high risk.
pub trait Classifier: Send + Sync {
    /// Column names the artifact was trained on, in input order.
    ///
    /// The engine compares these with its `FeatureContract` at startup.
    fn feature_names(&self) -> &[String];

    /// Probability of the positive (high-risk) class for one vector.
    ///
    /// `NaN` entries are missing values.
    fn predict_proba(&self, features: &FeatureVector) -> RespiraResult<f64>;
}

/// An unsupervised screen for physiologically implausible vitals.
pub trait OutlierDetector: Send + Sync {
    /// Classify one observation. Advisory only; never blocks a request.
    fn detect(&self, observation: &PatientObservation) -> AnomalyVerdict;
}

/// Hard clinical rules that take precedence over the learned model.
///
/// Implementations must be deterministic and free of I/O.
pub trait SafetyPolicy: Send + Sync {
    fn evaluate(&self, ctx: &SafetyContext) -> SafetyVerdict;
}

/// Maps a postal code to air-quality and weather metrics.
///
/// The contract is infallible: implementations absorb every upstream
/// failure into a deterministic fallback snapshot.
pub trait EnvironmentProvider: Send + Sync {
    fn get_data<'a>(&'a self, postal_code: &'a str) -> BoxFuture<'a, EnvironmentalSnapshot>;
}

/// An external text-generation service.
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt` under the `system` instructions.
    fn generate<'a>(&'a self, system: &'a str, prompt: &'a str) -> BoxFuture<'a, RespiraResult<String>>;
}

/// Append-only persistence for assessment records.
pub trait AssessmentStore: Send + Sync {
    /// Append one record. Records are never modified or deleted.
    fn append(&self, record: &AssessmentRecord) -> RespiraResult<()>;

    /// Up to `limit` records, newest first.
    fn recent(&self, limit: usize) -> RespiraResult<Vec<AssessmentRecord>>;
}
