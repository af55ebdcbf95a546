//! HTTP server assembly.
//!
//! - `/health`, `/ready`, `/metrics` at the root
//! - the operation table from [`routes`] under `/api`
//! - correlation ids, request tracing and CORS on everything

pub mod health;
pub mod routes;
pub mod state;

pub use routes::{Operation, api_router};
pub use state::AppState;

use axum::{Router, routing::get};
use enrollment_web::{correlation_id_layer, handlers::health_check};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the complete router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .nest("/api", api_router())
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
