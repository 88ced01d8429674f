//! Patient observation types and their validation rules.
//!
//! A `PatientObservation` is immutable once `validate()` passes. Nothing
//! downstream re-checks ranges; the decision engine only null-checks the
//! optional anthropometric fields.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FieldError, RespiraError, RespiraResult};

/// Biological sex used by the predicted-baseline regressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Integer code the classifier was trained with.
    pub fn model_code(self) -> u8 {
        match self {
            Gender::Male => 0,
            Gender::Female => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl FromStr for Gender {
    type Err = RespiraError;

    fn from_str(s: &str) -> RespiraResult<Self> {
        match s.trim() {
            "Male" | "male" | "M" => Ok(Gender::Male),
            "Female" | "female" | "F" => Ok(Gender::Female),
            other => Err(RespiraError::UnknownCategory {
                category: "gender".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Gender {
    type Error = RespiraError;

    fn try_from(value: String) -> RespiraResult<Self> {
        value.parse()
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tobacco exposure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum SmokingStatus {
    #[serde(rename = "Non-smoker")]
    NonSmoker,
    #[serde(rename = "Ex-smoker")]
    ExSmoker,
    #[serde(rename = "Current Smoker")]
    CurrentSmoker,
}

impl SmokingStatus {
    /// Integer code the classifier was trained with.
    pub fn model_code(self) -> u8 {
        match self {
            SmokingStatus::NonSmoker => 0,
            SmokingStatus::ExSmoker => 1,
            SmokingStatus::CurrentSmoker => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SmokingStatus::NonSmoker => "Non-smoker",
            SmokingStatus::ExSmoker => "Ex-smoker",
            SmokingStatus::CurrentSmoker => "Current Smoker",
        }
    }
}

impl FromStr for SmokingStatus {
    type Err = RespiraError;

    /// Accepts the wire names plus the common spellings seen in intake forms.
    /// Anything else is an error; there is no fallback category.
    fn from_str(s: &str) -> RespiraResult<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "non smoker" | "nonsmoker" | "never" | "never smoker" => Ok(SmokingStatus::NonSmoker),
            "ex smoker" | "exsmoker" | "former" | "former smoker" => Ok(SmokingStatus::ExSmoker),
            "current smoker" | "current" | "smoker" => Ok(SmokingStatus::CurrentSmoker),
            _ => Err(RespiraError::UnknownCategory {
                category: "smoking".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for SmokingStatus {
    type Error = RespiraError;

    fn try_from(value: String) -> RespiraResult<Self> {
        value.parse()
    }
}

impl fmt::Display for SmokingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One patient encounter as submitted to `POST /predict`.
///
/// Field names on the wire follow the intake form (`fev1`, `pef`, `spo2`,
/// `zip_code`, `height`, `weight`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientObservation {
    /// Links the encounter to an existing patient. A fresh id is minted at
    /// persistence time when absent.
    #[serde(default)]
    pub patient_id: Option<String>,
    pub patient_name: String,
    pub age: u32,
    #[serde(default, rename = "height")]
    pub height_cm: Option<f64>,
    #[serde(default, rename = "weight")]
    pub weight_kg: Option<f64>,
    pub gender: Gender,
    pub smoking: SmokingStatus,
    #[serde(rename = "fev1")]
    pub fev1_liters: f64,
    #[serde(rename = "pef")]
    pub pef_lpm: f64,
    #[serde(rename = "spo2")]
    pub spo2_pct: f64,
    #[serde(default)]
    pub wheezing: bool,
    #[serde(default)]
    pub shortness_of_breath: bool,
    #[serde(rename = "zip_code", alias = "postal_code")]
    pub postal_code: String,
    #[serde(default)]
    pub medication_use: bool,
}

/// Inclusive bounds for every ranged field.
pub mod limits {
    pub const AGE: (u32, u32) = (0, 120);
    pub const FEV1_LITERS: (f64, f64) = (0.5, 8.0);
    pub const PEF_LPM: (f64, f64) = (50.0, 700.0);
    pub const SPO2_PCT: (f64, f64) = (70.0, 100.0);
    pub const HEIGHT_CM: (f64, f64) = (50.0, 300.0);
    pub const WEIGHT_KG: (f64, f64) = (10.0, 500.0);
    pub const POSTAL_CODE_LEN: usize = 6;
}

impl PatientObservation {
    /// Check every field against its documented range.
    ///
    /// All violations are collected so a client sees the complete list in
    /// one round trip.
    pub fn validate(&self) -> RespiraResult<()> {
        let mut errors = Vec::new();

        if self.patient_name.trim().is_empty() {
            errors.push(FieldError::new("patient_name", "must not be empty"));
        }
        if !(limits::AGE.0..=limits::AGE.1).contains(&self.age) {
            errors.push(FieldError::new(
                "age",
                format!("must be between {} and {}", limits::AGE.0, limits::AGE.1),
            ));
        }
        check_range(&mut errors, "fev1", self.fev1_liters, limits::FEV1_LITERS);
        check_range(&mut errors, "pef", self.pef_lpm, limits::PEF_LPM);
        check_range(&mut errors, "spo2", self.spo2_pct, limits::SPO2_PCT);
        if let Some(height) = self.height_cm {
            check_range(&mut errors, "height", height, limits::HEIGHT_CM);
        }
        if let Some(weight) = self.weight_kg {
            check_range(&mut errors, "weight", weight, limits::WEIGHT_KG);
        }

        let code = &self.postal_code;
        if code.len() != limits::POSTAL_CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
            errors.push(FieldError::new(
                "zip_code",
                format!("must be exactly {} digits", limits::POSTAL_CODE_LEN),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RespiraError::Validation { errors })
        }
    }
}

fn check_range(errors: &mut Vec<FieldError>, field: &str, value: f64, (lo, hi): (f64, f64)) {
    // NaN fails `contains`, which is what we want.
    if !(lo..=hi).contains(&value) {
        errors.push(FieldError::new(field, format!("must be between {lo} and {hi}")));
    }
}
