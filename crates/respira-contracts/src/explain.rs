//! Structured inputs to the explanation engine.

use serde::{Deserialize, Serialize};

use crate::patient::{PatientObservation, SmokingStatus};

/// The clinical facts an explanation may reference.
///
/// Wire names match `PatientObservation` so a client can post back the
/// features it submitted to `/predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationFeatures {
    pub age: u32,
    pub fev1: f64,
    pub pef: f64,
    pub spo2: f64,
    pub smoking: SmokingStatus,
    #[serde(default)]
    pub wheezing: bool,
    #[serde(default)]
    pub shortness_of_breath: bool,
    #[serde(default)]
    pub bmi: Option<f64>,
}

impl From<&PatientObservation> for ExplanationFeatures {
    fn from(obs: &PatientObservation) -> Self {
        Self {
            age: obs.age,
            fev1: obs.fev1_liters,
            pef: obs.pef_lpm,
            spo2: obs.spo2_pct,
            smoking: obs.smoking,
            wheezing: obs.wheezing,
            shortness_of_breath: obs.shortness_of_breath,
            bmi: None,
        }
    }
}
