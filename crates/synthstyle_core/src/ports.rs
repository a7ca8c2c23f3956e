//! crates/synthstyle_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases, browser
//! storage or HTTP clients.

use crate::domain::{
    AuthSession, BodyMeasurements, Preferences, PreferenceRecord, ProductRecord, Purchase,
    StyleAdvice, UserAccount, UserProfile, VerificationResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid input: {0}")]
    Invalid(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Operation timed out")]
    Timeout,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Extension Storage Ports
//=========================================================================================

/// The extension's local key-value store. Values are JSON documents.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> PortResult<()>;
    async fn remove(&self, key: &str) -> PortResult<()>;
    async fn clear(&self) -> PortResult<()>;
}

/// The per-user documents that are mirrored on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteResource {
    Preferences,
    UserProfile,
}

/// The backend as seen by the extension.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns `None` when the backend holds no document for the user.
    async fn fetch(&self, resource: RemoteResource, user_id: &str) -> PortResult<Option<Value>>;
    async fn push(&self, resource: RemoteResource, user_id: &str, value: Value) -> PortResult<Value>;
    async fn clear(&self, user_id: &str) -> PortResult<()>;
}

//=========================================================================================
// Backend Persistence Port
//=========================================================================================

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    // --- Preferences ---
    async fn upsert_preferences(
        &self,
        user_id: &str,
        preferences: &Preferences,
    ) -> PortResult<PreferenceRecord>;

    async fn get_preferences(&self, user_id: &str) -> PortResult<Option<PreferenceRecord>>;

    // --- Profiles ---
    async fn upsert_profile(&self, user_id: &str, profile: &UserProfile) -> PortResult<UserProfile>;

    async fn get_profile(&self, user_id: &str) -> PortResult<Option<UserProfile>>;

    /// Appends a purchase and stores the recomputed sustainability score.
    async fn record_purchase(&self, user_id: &str, purchase: Purchase) -> PortResult<UserProfile>;

    async fn clear_user_data(&self, user_id: &str) -> PortResult<()>;

    // --- Accounts ---
    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
    ) -> PortResult<UserAccount>;

    async fn get_account_by_email(&self, email: &str) -> PortResult<UserAccount>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<AuthSession>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Products ---
    async fn get_product(&self, product_id: &str) -> PortResult<ProductRecord>;

    async fn search_products(
        &self,
        query: Option<&str>,
        category: Option<&str>,
        brand: Option<&str>,
        limit: usize,
    ) -> PortResult<Vec<ProductRecord>>;

    async fn save_product(&self, product: &ProductRecord) -> PortResult<ProductRecord>;
}

//=========================================================================================
// External Capabilities
//=========================================================================================

#[async_trait]
pub trait SustainabilityVerifier: Send + Sync {
    async fn verify(&self, product_id: &str) -> PortResult<VerificationResult>;
}

#[async_trait]
pub trait BodyScanner: Send + Sync {
    /// Derives body measurements from an opaque capture-stream handle.
    async fn measure(&self, stream: &str) -> PortResult<BodyMeasurements>;
}

#[async_trait]
pub trait TryOnModelCatalog: Send + Sync {
    async fn model_url(&self, product_id: &str) -> PortResult<Option<String>>;
}

#[async_trait]
pub trait StyleAdvisor: Send + Sync {
    async fn advise(
        &self,
        preferences: &Preferences,
        profile: Option<&UserProfile>,
    ) -> PortResult<StyleAdvice>;
}
