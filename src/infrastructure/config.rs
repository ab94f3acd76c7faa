use crate::domain::error::{AppError, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Service configuration, layered defaults < `clbp.toml` < `CLBP_*` env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub database_path: PathBuf,
    /// Directory where model blobs are materialized for the scorer.
    pub models_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub python_bin: String,
    pub predict_script: PathBuf,
    pub scorer_timeout_secs: u64,
    pub max_concurrent_scorers: usize,
    /// CORS origin for the clinical frontend; unset allows any origin
    /// (development mode).
    pub allowed_origin: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 5001,
            database_path: PathBuf::from("data/clbp.db"),
            models_dir: PathBuf::from("data/models_store"),
            reports_dir: PathBuf::from("data/reports"),
            python_bin: "python3".to_string(),
            predict_script: PathBuf::from("scripts/predict.py"),
            scorer_timeout_secs: 120,
            max_concurrent_scorers: 4,
            allowed_origin: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("clbp.toml"))
            .merge(Env::prefixed("CLBP_"))
            .extract()
            .map_err(|e| AppError::Internal(format!("Failed to load configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.python_bin, "python3");
        assert!(config.max_concurrent_scorers >= 1);
        assert!(config.scorer_timeout_secs > 0);
    }
}
