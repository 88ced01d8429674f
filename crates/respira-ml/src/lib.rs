//! # respira-ml
//!
//! Learned components of the Respira backend, all read-only after startup:
//!
//! - [`GradientBoostedClassifier`]: XGBoost JSON tree ensemble implementing
//!   [`Classifier`](respira_core::traits::Classifier)
//! - [`AnomalyScreener`]: isolation forest over core vitals implementing
//!   [`OutlierDetector`](respira_core::traits::OutlierDetector)
//! - [`CohortGenerator`]: the synthetic training cohort used offline
//!
//! Training is out of scope; models are produced offline and loaded here.

pub mod anomaly;
pub mod isolation;
pub mod synth;
pub mod xgboost;

pub use anomaly::{AnomalyConfig, AnomalyScreener};
pub use isolation::{ForestParams, IsolationForest};
pub use synth::{CohortGenerator, CohortRecord};
pub use xgboost::GradientBoostedClassifier;
