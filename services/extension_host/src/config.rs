//! services/extension_host/src/config.rs
//!
//! Configuration for the extension host, loaded from environment variables at
//! startup. A `.env` file is honoured for local development.

use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the SynthStyle backend, without a trailing slash.
    pub api_url: String,
    /// The JSON file that stands in for the extension's local storage area.
    pub storage_path: PathBuf,
    pub remote_timeout: Duration,
    pub cache_sweep_interval: Duration,
    /// Where try-on models live when the catalog has no explicit URL.
    pub model_base_url: Option<String>,
    pub log_level: Level,
}

fn parse_u64(var: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let api_url = std::env::var("SYNTHSTYLE_API_URL")
            .unwrap_or_else(|_| "http://localhost:5000".to_string())
            .trim_end_matches('/')
            .to_string();
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "SYNTHSTYLE_API_URL".to_string(),
                format!("'{}' is not an http(s) URL", api_url),
            ));
        }

        let storage_path = std::env::var("SYNTHSTYLE_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("synthstyle-storage.json"));

        let remote_timeout = Duration::from_millis(parse_u64("REMOTE_TIMEOUT_MS", 5_000)?);

        let sweep_minutes = parse_u64("CACHE_SWEEP_MINUTES", 60)?;
        if sweep_minutes == 0 {
            return Err(ConfigError::InvalidValue(
                "CACHE_SWEEP_MINUTES".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let cache_sweep_interval = Duration::from_secs(sweep_minutes * 60);

        let model_base_url = std::env::var("MODEL_BASE_URL")
            .ok()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            api_url,
            storage_path,
            remote_timeout,
            cache_sweep_interval,
            model_base_url,
            log_level,
        })
    }
}
