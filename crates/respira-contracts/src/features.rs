//! The classifier input schema.
//!
//! Two historical schemas exist: a raw-vitals one and a percent-predicted
//! one that also carries SpO2 and pollution. They are not interchangeable, so
//! the schema is an explicit, versioned `FeatureContract` that is checked
//! against the loaded artifact's column list before any request is served.

use serde::{Deserialize, Serialize};

use crate::error::{RespiraError, RespiraResult};

/// Every feature any contract version may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureName {
    Age,
    Gender,
    Bmi,
    Smoking,
    Wheezing,
    Fev1,
    Pef,
    Fev1Pct,
    PefPct,
    Spo2,
    Pollution,
}

impl FeatureName {
    /// Column name in the training data and model artifact.
    pub fn column(self) -> &'static str {
        match self {
            FeatureName::Age => "Age",
            FeatureName::Gender => "Gender",
            FeatureName::Bmi => "BMI",
            FeatureName::Smoking => "Smoking",
            FeatureName::Wheezing => "Wheezing",
            FeatureName::Fev1 => "FEV1",
            FeatureName::Pef => "PEF",
            FeatureName::Fev1Pct => "FEV1_Pct",
            FeatureName::PefPct => "PEF_Pct",
            FeatureName::Spo2 => "SpO2",
            FeatureName::Pollution => "Pollution",
        }
    }
}

/// All engineered values for one request, keyed by name rather than position.
///
/// Percent-predicted values are `None` when height is unknown; they are
/// encoded as missing (NaN) in the assembled vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub age: f64,
    pub gender: f64,
    pub bmi: f64,
    pub smoking: f64,
    pub wheezing: f64,
    pub fev1: f64,
    pub pef: f64,
    pub fev1_pct: Option<f64>,
    pub pef_pct: Option<f64>,
    pub spo2: f64,
    pub pollution: f64,
}

impl FeatureRow {
    pub fn value(&self, name: FeatureName) -> f64 {
        match name {
            FeatureName::Age => self.age,
            FeatureName::Gender => self.gender,
            FeatureName::Bmi => self.bmi,
            FeatureName::Smoking => self.smoking,
            FeatureName::Wheezing => self.wheezing,
            FeatureName::Fev1 => self.fev1,
            FeatureName::Pef => self.pef,
            FeatureName::Fev1Pct => self.fev1_pct.unwrap_or(f64::NAN),
            FeatureName::PefPct => self.pef_pct.unwrap_or(f64::NAN),
            FeatureName::Spo2 => self.spo2,
            FeatureName::Pollution => self.pollution,
        }
    }
}

/// An ordered feature vector tagged with the contract that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub contract_version: String,
    /// `NaN` marks a missing value.
    pub values: Vec<f64>,
}

/// A versioned, ordered list of classifier inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureContract {
    pub version: String,
    pub features: Vec<FeatureName>,
}

impl FeatureContract {
    pub const RAW_VITALS: &'static str = "respira-v1";
    pub const PERCENT_PREDICTED: &'static str = "respira-v2";

    /// Raw vitals plus BMI, smoking and wheezing.
    pub fn raw_vitals() -> Self {
        use FeatureName::*;
        Self {
            version: Self::RAW_VITALS.to_string(),
            features: vec![Age, Gender, Bmi, Smoking, Wheezing, Fev1, Pef],
        }
    }

    /// Raw and percent-predicted lung function, SpO2 and pollution as direct
    /// model inputs. This is the contract the service scores with.
    pub fn percent_predicted() -> Self {
        use FeatureName::*;
        Self {
            version: Self::PERCENT_PREDICTED.to_string(),
            features: vec![
                Age, Gender, Bmi, Smoking, Wheezing, Fev1, Pef, Fev1Pct, PefPct, Spo2, Pollution,
            ],
        }
    }

    /// Look up a built-in contract by its version tag.
    pub fn by_version(version: &str) -> RespiraResult<Self> {
        match version {
            Self::RAW_VITALS => Ok(Self::raw_vitals()),
            Self::PERCENT_PREDICTED => Ok(Self::percent_predicted()),
            other => Err(RespiraError::ConfigError {
                reason: format!("unknown feature contract version '{other}'"),
            }),
        }
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.column()).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Check that `columns` names exactly this contract's features, in order.
    pub fn check_columns(&self, columns: &[String]) -> RespiraResult<()> {
        let expected = self.columns();
        if columns.len() != expected.len() {
            return Err(RespiraError::ArtifactInvalid {
                reason: format!(
                    "contract '{}' has {} features but artifact declares {}",
                    self.version,
                    expected.len(),
                    columns.len()
                ),
            });
        }
        for (position, (want, got)) in expected.iter().zip(columns).enumerate() {
            if want != got {
                return Err(RespiraError::ArtifactInvalid {
                    reason: format!(
                        "contract '{}' expects '{}' at position {} but artifact has '{}'",
                        self.version, want, position, got
                    ),
                });
            }
        }
        Ok(())
    }

    /// Lay out `row` in contract order.
    pub fn assemble(&self, row: &FeatureRow) -> FeatureVector {
        FeatureVector {
            contract_version: self.version.clone(),
            values: self.features.iter().map(|&f| row.value(f)).collect(),
        }
    }
}
