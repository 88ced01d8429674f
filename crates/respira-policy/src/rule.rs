//! Safety rule types and configuration schema.
//!
//! A `PolicyConfig` is deserialized from TOML and holds an ordered list of
//! `SafetyRule`s. Rules are evaluated in declaration order: the first
//! matching rule wins. If no rule matches, the request proceeds to the model.

use std::fmt;

use serde::{Deserialize, Serialize};

use respira_contracts::features::FeatureRow;

/// The decision a rule produces when it matches.
///
/// Expressed as a kebab-case string in TOML:
/// ```toml
/// verdict = "critical-override"
/// verdict = "proceed"
/// ```
///
/// `proceed` lets a narrow rule shadow a broader override declared after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleVerdict {
    CriticalOverride,
    Proceed,
}

/// A measurement a rule may test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFeature {
    Spo2,
    Pef,
    Fev1,
    Fev1Pct,
    PefPct,
    Age,
    Pm25,
}

impl RuleFeature {
    /// The value of this feature in `row`, or `None` when it is unknown
    /// (percent-predicted values without a height).
    pub fn read(self, row: &FeatureRow) -> Option<f64> {
        match self {
            RuleFeature::Spo2 => Some(row.spo2),
            RuleFeature::Pef => Some(row.pef),
            RuleFeature::Fev1 => Some(row.fev1),
            RuleFeature::Fev1Pct => row.fev1_pct,
            RuleFeature::PefPct => row.pef_pct,
            RuleFeature::Age => Some(row.age),
            RuleFeature::Pm25 => Some(row.pollution),
        }
    }
}

impl fmt::Display for RuleFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleFeature::Spo2 => "spo2",
            RuleFeature::Pef => "pef",
            RuleFeature::Fev1 => "fev1",
            RuleFeature::Fev1Pct => "fev1_pct",
            RuleFeature::PefPct => "pef_pct",
            RuleFeature::Age => "age",
            RuleFeature::Pm25 => "pm25",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Lt => value < threshold,
            Comparator::Le => value <= threshold,
            Comparator::Gt => value > threshold,
            Comparator::Ge => value >= threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

/// A single safety rule loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyRule {
    /// Stable identifier written to the assessment record.
    pub id: String,

    /// Human-readable explanation of the clinical condition.
    pub description: String,

    pub feature: RuleFeature,
    pub comparator: Comparator,
    pub threshold: f64,

    pub verdict: RuleVerdict,
}

impl SafetyRule {
    /// True if the rule's condition holds for `row`. Unknown values never
    /// match.
    pub fn matches(&self, row: &FeatureRow) -> bool {
        self.feature
            .read(row)
            .is_some_and(|value| self.comparator.holds(value, self.threshold))
    }
}

/// The top-level structure deserialized from a TOML policy file.
///
/// Example:
/// ```toml
/// [[rules]]
/// id = "critical-spo2"
/// description = "Oxygen saturation below 90% indicates hypoxaemia"
/// feature = "spo2"
/// comparator = "lt"
/// threshold = 90.0
/// verdict = "critical-override"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Ordered list of rules. First match wins.
    #[serde(default)]
    pub rules: Vec<SafetyRule>,
}
