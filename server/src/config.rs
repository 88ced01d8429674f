//! `respira.toml` plus environment overrides.
//!
//! Every key is optional. Secrets are never read from the file: API keys
//! come from `OPENWEATHERMAP_API_KEY` and `OPENAI_API_KEY` only.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use respira_contracts::{
    error::{RespiraError, RespiraResult},
    features::FeatureContract,
};
use respira_core::RiskConfig;
use respira_ml::AnomalyConfig;
use respira_services::{EnvironmentConfig, ExplainerConfig};

pub const DEFAULT_CONFIG_PATH: &str = "respira.toml";

pub const WEATHER_KEY_VAR: &str = "OPENWEATHERMAP_API_KEY";
pub const LLM_KEY_VAR: &str = "OPENAI_API_KEY";
pub const BIND_VAR: &str = "RESPIRA_BIND";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub policy: PolicyConfig,
    pub risk: RiskConfig,
    pub anomaly: AnomalyConfig,
    pub environment: EnvironmentConfig,
    pub explainer: ExplainerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// Feature contract version the artifact must have been trained on.
    pub contract: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/model_xgb.json"),
            contract: FeatureContract::PERCENT_PREDICTED.to_string(),
        }
    }
}

/// `[policy]`. The embedded rule set is used when `path` is absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub path: Option<PathBuf>,
}

/// `[store]`. Without a journal the ledger lives in memory only.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub ledger_id: String,
    pub journal: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ledger_id: "respira".to_string(),
            journal: None,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> RespiraResult<Self> {
        toml::from_str(s).map_err(|e| RespiraError::ConfigError {
            reason: format!("failed to parse configuration: {e}"),
        })
    }

    /// Load `path`, falling back to defaults when it does not exist and was
    /// not asked for explicitly, then apply the process environment.
    pub fn load(path: &Path, explicit: bool) -> RespiraResult<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| RespiraError::ConfigError {
                reason: format!("failed to read '{}': {}", path.display(), e),
            })?;
            info!(path = %path.display(), "configuration loaded");
            Self::from_toml_str(&contents)?
        } else if explicit {
            return Err(RespiraError::ConfigError {
                reason: format!("configuration file '{}' not found", path.display()),
            });
        } else {
            debug!(path = %path.display(), "no configuration file; using defaults");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Fill secrets and overrides from `lookup`. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(WEATHER_KEY_VAR) {
            self.environment.api_key = Some(key);
        }
        if let Some(key) = get(LLM_KEY_VAR) {
            self.explainer.api_key = Some(key);
        }
        if let Some(bind) = get(BIND_VAR) {
            self.server.bind = bind;
        }
    }

    pub fn feature_contract(&self) -> RespiraResult<FeatureContract> {
        FeatureContract::by_version(&self.model.contract)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
