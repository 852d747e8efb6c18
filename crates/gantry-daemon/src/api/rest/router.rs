//! API router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health and status
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::daemon_status))
        // Applications
        .route("/applications", get(handlers::list_applications))
        .route("/applications/:name", get(handlers::get_application))
        .route("/applications/:name", put(handlers::upsert_application))
        .route("/applications/:name", delete(handlers::delete_application))
        .route(
            "/applications/:name/reconcile",
            post(handlers::reconcile_application),
        )
        // Endpoints
        .route("/endpoints", get(handlers::list_endpoints))
        .route("/endpoints/:name", get(handlers::get_endpoint))
        .route("/endpoints/:name", put(handlers::upsert_endpoint))
        .route("/endpoints/:name", delete(handlers::delete_endpoint))
        .route(
            "/endpoints/:name/reconcile",
            post(handlers::reconcile_endpoint),
        )
        .route("/endpoints/:name/metrics", get(handlers::endpoint_metrics))
        // Events
        .route("/events", get(handlers::get_events));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}
