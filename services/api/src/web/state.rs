//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;
use synthstyle_core::ports::{ProfileRepository, StyleAdvisor};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn ProfileRepository>,
    /// `None` when no LLM is configured; style advice then answers 503.
    pub advisor: Option<Arc<dyn StyleAdvisor>>,
}
