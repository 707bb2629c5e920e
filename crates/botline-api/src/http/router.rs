//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/tenants", get(handlers::tenant::list_tenants))
        .route("/tenants/{id}", get(handlers::tenant::get_tenant))
        .route("/tenants/{id}/start", post(handlers::tenant::start_tenant))
        .route("/tenants/{id}/stop", post(handlers::tenant::stop_tenant))
        .route("/tenants/{id}/reset", post(handlers::tenant::reset_tenant))
        .route("/tenants/{id}/messages", post(handlers::tenant::send_message))
        .route("/tenants/{id}/inbound", post(handlers::tenant::inject_inbound));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
