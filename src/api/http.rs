//! HTTP server setup with Axum

use std::sync::Arc;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::rest::{events, sessions, stacks};
use super::state::AppState;

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Events
        .route(
            "/api/v2/events",
            get(events::list_events).post(events::submit_events),
        )
        .route("/api/v2/events/hide-by-ip", post(events::hide_by_ip))
        .route("/api/v2/events/:id", get(events::get_event))
        .route("/api/v2/events/:id/navigation", get(events::get_navigation))
        .route(
            "/api/v2/projects/:project/events/by-ref/:reference",
            get(events::get_by_reference),
        )
        // Sessions and stacks
        .route("/api/v2/sessions/open", get(sessions::open_sessions))
        .route("/api/v2/stacks/:id/events", get(stacks::list_stack_events))
        .route("/api/v2/stacks/:id/mark-fixed", post(stacks::mark_fixed))
        .route("/api/v2/stacks/:id/mark-not-fixed", post(stacks::mark_not_fixed))
        .route("/api/v2/refresh", post(events::refresh))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
