//! # respira-core
//!
//! The deterministic scoring runtime of the Respira backend.
//!
//! This crate provides:
//! - The trait seams (`Classifier`, `OutlierDetector`, `SafetyPolicy`,
//!   `EnvironmentProvider`, `TextGenerator`, `AssessmentStore`)
//! - The clinical formula engine
//! - The `RiskEngine` that runs the hybrid override/model scorer in order
//! - The `PredictionService` that orchestrates one `/predict` request
//!
//! ## Usage
//!
//! ```rust,ignore
//! use respira_core::{RiskEngine, PredictionService, traits::{Classifier, SafetyPolicy}};
//! ```

pub mod clinical;
pub mod engine;
pub mod service;
pub mod telemetry;
pub mod traits;

pub use engine::{RiskConfig, RiskEngine};
pub use service::{PredictionOutcome, PredictionService};
