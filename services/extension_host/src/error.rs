//! services/extension_host/src/error.rs

use crate::config::ConfigError;
use synthstyle_core::PortError;

/// Fatal errors that stop the extension host.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bridge error: {0}")]
    Bridge(String),
}
