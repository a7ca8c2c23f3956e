//! services/api/src/error.rs
//!
//! Defines the primary error type for the API service and the JSON error body
//! returned by every route.

use crate::config::ConfigError;
use axum::{http::StatusCode, Json};
use serde::Serialize;
use synthstyle_core::ports::PortError;
use tracing::error;
use utoipa::ToSchema;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

//=========================================================================================
// HTTP Error Responses
//=========================================================================================

/// The body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
}

pub type HttpError = (StatusCode, Json<ErrorBody>);

pub fn http_error(status: StatusCode, message: impl Into<String>) -> HttpError {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

/// Maps a port failure onto its HTTP status. Server-side failures are logged and
/// reported with a generic message.
pub fn port_error(e: PortError) -> HttpError {
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Invalid(_) => StatusCode::BAD_REQUEST,
        PortError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PortError::StorageUnavailable(_) | PortError::Timeout | PortError::Unexpected(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {:?}", e);
        return http_error(status, "Internal server error");
    }
    http_error(status, e.to_string())
}
