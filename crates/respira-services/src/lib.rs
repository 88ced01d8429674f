//! # respira-services
//!
//! Implementations of the outward-facing trait seams of `respira-core`:
//!
//! - [`environment::OpenWeatherProvider`]: `EnvironmentProvider` over the
//!   OpenWeatherMap APIs, degrading to a postal-code-seeded fallback
//! - [`llm::OpenAiClient`]: `TextGenerator` over OpenAI-compatible chat
//!   completions
//! - [`explain::Explainer`]: physician Q&A with a rule-based offline
//!   responder and the suggested-questions trailer
//!
//! None of these ever surface an upstream failure to the request path.

pub mod environment;
pub mod explain;
pub mod llm;

pub use environment::{fallback_snapshot, EnvironmentConfig, OpenWeatherProvider};
pub use explain::{parse_suggested_questions, Explainer};
pub use llm::{ExplainerConfig, OpenAiClient};
