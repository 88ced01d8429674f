//! TOML-driven safety policy implementation.
//!
//! `TomlSafetyPolicy` loads a `PolicyConfig` from a TOML string or file and
//! implements the `SafetyPolicy` trait from respira-core.
//!
//! Evaluation algorithm:
//!
//! 1. Iterate rules in declaration order.
//! 2. For the first rule whose condition holds on the engineered features,
//!    convert its `RuleVerdict` to a `SafetyVerdict` and return it.
//! 3. If no rule matched → `Proceed`; the classifier decides.

use std::path::Path;

use tracing::{debug, info};

use respira_contracts::{
    error::{RespiraError, RespiraResult},
    policy::{SafetyContext, SafetyVerdict},
};
use respira_core::traits::SafetyPolicy;

use crate::rule::{PolicyConfig, RuleVerdict};

/// The clinical overrides compiled into the binary.
pub const DEFAULT_POLICY: &str = include_str!("../policies/safety.toml");

/// A `SafetyPolicy` implementation that reads rules from a TOML document.
///
/// ```rust,ignore
/// use respira_policy::TomlSafetyPolicy;
///
/// let policy = TomlSafetyPolicy::from_file(Path::new("policies/safety.toml"))?;
/// ```
#[derive(Debug)]
pub struct TomlSafetyPolicy {
    config: PolicyConfig,
}

impl TomlSafetyPolicy {
    /// Parse `s` as TOML and build a `TomlSafetyPolicy`.
    ///
    /// Returns `RespiraError::ConfigError` if the TOML is malformed, does not
    /// match `PolicyConfig`, or declares the same rule id twice.
    pub fn from_toml_str(s: &str) -> RespiraResult<Self> {
        let config: PolicyConfig = toml::from_str(s).map_err(|e| RespiraError::ConfigError {
            reason: format!("failed to parse policy TOML: {}", e),
        })?;

        for (i, rule) in config.rules.iter().enumerate() {
            if config.rules[..i].iter().any(|r| r.id == rule.id) {
                return Err(RespiraError::ConfigError {
                    reason: format!("duplicate policy rule id '{}'", rule.id),
                });
            }
            if !rule.threshold.is_finite() {
                return Err(RespiraError::ConfigError {
                    reason: format!("rule '{}' has a non-finite threshold", rule.id),
                });
            }
        }

        Ok(Self { config })
    }

    /// Read the file at `path` and parse it as TOML policy configuration.
    pub fn from_file(path: &Path) -> RespiraResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| RespiraError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// The policy compiled into the binary: SpO2 < 90 and PEF < 200.
    pub fn builtin() -> RespiraResult<Self> {
        Self::from_toml_str(DEFAULT_POLICY)
    }

    pub fn rule_count(&self) -> usize {
        self.config.rules.len()
    }
}

impl SafetyPolicy for TomlSafetyPolicy {
    /// Evaluate the engineered features against the loaded rule set.
    ///
    /// Rules are tested in declaration order. The first rule whose condition
    /// holds is applied. If none does, returns `SafetyVerdict::Proceed`.
    fn evaluate(&self, ctx: &SafetyContext) -> SafetyVerdict {
        for rule in &self.config.rules {
            if !rule.matches(&ctx.features) {
                continue;
            }

            debug!(rule_id = %rule.id, feature = %rule.feature, "rule matched");

            return match rule.verdict {
                RuleVerdict::Proceed => SafetyVerdict::Proceed,
                RuleVerdict::CriticalOverride => {
                    let value = rule.feature.read(&ctx.features).unwrap_or(f64::NAN);
                    info!(rule_id = %rule.id, value, "critical override triggered");
                    SafetyVerdict::CriticalOverride {
                        rule_id: rule.id.clone(),
                        reason: format!(
                            "{}: {} = {} {} {}",
                            rule.description,
                            rule.feature,
                            value,
                            rule.comparator.symbol(),
                            rule.threshold
                        ),
                    }
                }
            };
        }

        SafetyVerdict::Proceed
    }
}
