//! API routes

use axum::{routing::get, Router};

use super::handlers::{self, AppState};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/metrics", get(handlers::get_metrics))
        .route("/api/v1/ranking", get(handlers::get_ranking))
        .route("/api/v1/alerts/state", get(handlers::get_alert_state))
        .with_state(state)
}
