//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use crate::error::http_error;
use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Reads the auth session id from the `Cookie` header.
pub fn session_id_from(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

/// Middleware that validates the auth session cookie and extracts the account id.
///
/// If valid, inserts the account id into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(auth_session_id) = session_id_from(req.headers()).map(str::to_string) else {
        return http_error(StatusCode::UNAUTHORIZED, "Authentication required").into_response();
    };

    match state.db.validate_auth_session(&auth_session_id).await {
        Ok(account_id) => {
            req.extensions_mut().insert(account_id);
            next.run(req).await
        }
        Err(e) => {
            debug!("Rejected auth session: {}", e);
            http_error(StatusCode::UNAUTHORIZED, "Authentication required").into_response()
        }
    }
}
