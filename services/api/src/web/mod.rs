pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_auth;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use self::state::AppState;

/// Builds the complete application: public routes, cookie-protected routes and the
/// Swagger UI. CORS is layered on by the binary.
pub fn app(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/api/preferences", post(rest::save_preferences_handler))
        .route("/api/preferences/{user_id}", get(rest::get_preferences_handler))
        .route("/api/user/profile", post(rest::save_profile_handler))
        .route("/api/user/profile/{user_id}", get(rest::get_profile_handler))
        .route("/api/user/clear/{user_id}", post(rest::clear_user_handler))
        .route("/api/products", get(rest::search_products_handler))
        .route("/api/products/{id}", get(rest::get_product_handler))
        .route(
            "/api/products/{id}/sustainability",
            post(rest::recompute_sustainability_handler),
        )
        .route("/api/ai/style-advice", post(rest::style_advice_handler))
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/user/purchases", post(rest::record_purchase_handler))
        .route("/api/products/{id}", put(rest::update_product_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", rest::ApiDoc::openapi()))
}
