//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::{http_error, port_error, ErrorBody, HttpError};
use crate::web::{auth, state::AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use synthstyle_core::domain::{
    Preferences, PreferenceRecord, ProductRecord, Purchase, StyleAdvice, SustainabilityMetrics,
    UserProfile,
};
use tracing::{debug, info};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

/// Search results are capped at this many products.
pub const SEARCH_LIMIT: usize = 20;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        save_preferences_handler,
        get_preferences_handler,
        save_profile_handler,
        get_profile_handler,
        clear_user_handler,
        record_purchase_handler,
        get_product_handler,
        search_products_handler,
        update_product_handler,
        recompute_sustainability_handler,
        style_advice_handler,
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
    ),
    components(
        schemas(
            SavePreferencesRequest,
            SaveProfileRequest,
            PurchaseRequest,
            StyleAdviceRequest,
            ErrorBody,
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::AuthResponse,
        )
    ),
    tags(
        (name = "SynthStyle API", description = "Preferences, profiles, products and style advice for the SynthStyle extension.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavePreferencesRequest {
    pub user_id: String,
    #[schema(value_type = Object)]
    pub preferences: Preferences,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveProfileRequest {
    pub user_id: String,
    #[schema(value_type = Object)]
    pub profile: UserProfile,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub user_id: String,
    pub product_id: String,
    pub price: f64,
    pub sustainability_score: f64,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StyleAdviceRequest {
    pub user_id: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductQuery {
    pub query: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
}

fn require_user_id(user_id: &str) -> Result<(), HttpError> {
    if user_id.trim().is_empty() {
        return Err(http_error(StatusCode::BAD_REQUEST, "userId is required"));
    }
    Ok(())
}

/// Treats blank query parameters as absent.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

//=========================================================================================
// Preferences
//=========================================================================================

/// Create or replace a user's preferences.
#[utoipa::path(
    post,
    path = "/api/preferences",
    request_body = SavePreferencesRequest,
    responses(
        (status = 200, description = "The stored preference record"),
        (status = 400, description = "Invalid preferences", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn save_preferences_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SavePreferencesRequest>,
) -> Result<Json<PreferenceRecord>, HttpError> {
    require_user_id(&req.user_id)?;
    req.preferences.validate().map_err(port_error)?;
    let record = state
        .db
        .upsert_preferences(&req.user_id, &req.preferences)
        .await
        .map_err(port_error)?;
    debug!("Saved preferences for {}.", req.user_id);
    Ok(Json(record))
}

/// Fetch a user's preferences, or `null` when none are stored.
#[utoipa::path(
    get,
    path = "/api/preferences/{user_id}",
    params(("user_id" = String, Path, description = "The extension's user id.")),
    responses(
        (status = 200, description = "The preference record or null"),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn get_preferences_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Option<PreferenceRecord>>, HttpError> {
    let record = state.db.get_preferences(&user_id).await.map_err(port_error)?;
    Ok(Json(record))
}

//=========================================================================================
// Profiles
//=========================================================================================

/// Create or replace a user's profile.
#[utoipa::path(
    post,
    path = "/api/user/profile",
    request_body = SaveProfileRequest,
    responses(
        (status = 200, description = "The stored profile"),
        (status = 400, description = "Missing user id", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn save_profile_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveProfileRequest>,
) -> Result<Json<UserProfile>, HttpError> {
    require_user_id(&req.user_id)?;
    let mut profile = req.profile;
    profile.recompute_sustainability_score();
    let saved = state
        .db
        .upsert_profile(&req.user_id, &profile)
        .await
        .map_err(port_error)?;
    Ok(Json(saved))
}

/// Fetch a user's profile, or `null` when none is stored.
#[utoipa::path(
    get,
    path = "/api/user/profile/{user_id}",
    params(("user_id" = String, Path, description = "The extension's user id.")),
    responses(
        (status = 200, description = "The profile or null"),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Option<UserProfile>>, HttpError> {
    let profile = state.db.get_profile(&user_id).await.map_err(port_error)?;
    Ok(Json(profile))
}

/// Delete every document stored for a user.
#[utoipa::path(
    post,
    path = "/api/user/clear/{user_id}",
    params(("user_id" = String, Path, description = "The extension's user id.")),
    responses(
        (status = 204, description = "User data removed"),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn clear_user_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, HttpError> {
    state.db.clear_user_data(&user_id).await.map_err(port_error)?;
    info!("Cleared stored data for {}.", user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Record a purchase and recompute the user's sustainability score.
#[utoipa::path(
    post,
    path = "/api/user/purchases",
    request_body = PurchaseRequest,
    responses(
        (status = 200, description = "The updated profile"),
        (status = 400, description = "Invalid purchase", body = ErrorBody),
        (status = 401, description = "Not logged in", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn record_purchase_handler(
    State(state): State<Arc<AppState>>,
    Extension(account_id): Extension<Uuid>,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<UserProfile>, HttpError> {
    require_user_id(&req.user_id)?;
    if !(0.0..=100.0).contains(&req.sustainability_score) || req.price < 0.0 {
        return Err(http_error(
            StatusCode::BAD_REQUEST,
            "price must be positive and sustainabilityScore between 0 and 100",
        ));
    }
    let purchase = Purchase {
        product_id: req.product_id,
        purchased_at: Utc::now(),
        price: req.price,
        sustainability_score: req.sustainability_score,
    };
    let profile = state
        .db
        .record_purchase(&req.user_id, purchase)
        .await
        .map_err(port_error)?;
    debug!("Account {} recorded a purchase for {}.", account_id, req.user_id);
    Ok(Json(profile))
}

//=========================================================================================
// Products
//=========================================================================================

/// Fetch one product.
#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = String, Path, description = "The product id.")),
    responses(
        (status = 200, description = "The product"),
        (status = 404, description = "Unknown product", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn get_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProductRecord>, HttpError> {
    let product = state.db.get_product(&id).await.map_err(port_error)?;
    Ok(Json(product))
}

/// Search products by free text, category and brand.
#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductQuery),
    responses(
        (status = 200, description = "Up to 20 matching products"),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn search_products_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProductQuery>,
) -> Result<Json<Vec<ProductRecord>>, HttpError> {
    let products = state
        .db
        .search_products(
            non_blank(&params.query),
            non_blank(&params.category),
            non_blank(&params.brand),
            SEARCH_LIMIT,
        )
        .await
        .map_err(port_error)?;
    Ok(Json(products))
}

/// Create or replace a product. The overall sustainability score is recomputed.
#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = String, Path, description = "The product id.")),
    request_body(content_type = "application/json", description = "The product record."),
    responses(
        (status = 200, description = "The stored product"),
        (status = 401, description = "Not logged in", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn update_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut product): Json<ProductRecord>,
) -> Result<impl IntoResponse, HttpError> {
    product.id = id;
    let score = product.sustainability.recompute();
    let saved = state.db.save_product(&product).await.map_err(port_error)?;
    info!("Saved product {} with score {}.", saved.id, score);
    Ok(Json(saved))
}

/// Recompute and persist a product's overall sustainability score.
#[utoipa::path(
    post,
    path = "/api/products/{id}/sustainability",
    params(("id" = String, Path, description = "The product id.")),
    responses(
        (status = 200, description = "The recomputed sustainability metrics"),
        (status = 404, description = "Unknown product", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn recompute_sustainability_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SustainabilityMetrics>, HttpError> {
    let mut product = state.db.get_product(&id).await.map_err(port_error)?;
    product.sustainability.recompute();
    let saved = state.db.save_product(&product).await.map_err(port_error)?;
    Ok(Json(saved.sustainability))
}

//=========================================================================================
// Style Advice
//=========================================================================================

/// Ask the style advisor for suggestions based on the user's stored data.
#[utoipa::path(
    post,
    path = "/api/ai/style-advice",
    request_body = StyleAdviceRequest,
    responses(
        (status = 200, description = "Style advice"),
        (status = 503, description = "No advisor configured or advisor unreachable", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn style_advice_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StyleAdviceRequest>,
) -> Result<Json<StyleAdvice>, HttpError> {
    let Some(advisor) = state.advisor.as_ref() else {
        return Err(http_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Style advice is not configured",
        ));
    };
    require_user_id(&req.user_id)?;

    let preferences = state
        .db
        .get_preferences(&req.user_id)
        .await
        .map_err(port_error)?
        .map(|record| record.preferences)
        .unwrap_or_default();
    let profile = state.db.get_profile(&req.user_id).await.map_err(port_error)?;

    let advice = advisor
        .advise(&preferences, profile.as_ref())
        .await
        .map_err(port_error)?;
    Ok(Json(advice))
}
