//! # respira-policy
//!
//! A TOML-driven, first-match-wins safety override policy for Respira.
//!
//! ## Overview
//!
//! This crate provides [`TomlSafetyPolicy`], which implements the
//! [`SafetyPolicy`](respira_core::traits::SafetyPolicy) trait. Rules compare
//! one engineered feature against a threshold; the first rule that holds
//! decides. If no rule holds, the request proceeds to the classifier.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use respira_policy::TomlSafetyPolicy;
//!
//! let policy = TomlSafetyPolicy::builtin()?;
//! // Pass `Arc::new(policy)` to `respira_core::RiskEngine::new(...)`.
//! ```

pub mod engine;
pub mod rule;

pub use engine::{TomlSafetyPolicy, DEFAULT_POLICY};
pub use rule::{Comparator, PolicyConfig, RuleFeature, RuleVerdict, SafetyRule};

// ── Tests ─────────────────────────────────────────────────────────────────────
