//! Health and status handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::store::{ApplicationStore, EndpointStore};
use axum::{extract::State, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness probe
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Daemon status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime: String,
    pub applications: usize,
    pub endpoints: usize,
}

/// Daemon status with resource counts
pub async fn daemon_status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let applications = state.store.list_applications().await?.len();
    let endpoints = state.store.list_endpoints().await?.len();

    Ok(Json(StatusResponse {
        version: state.version.clone(),
        uptime: state.uptime(),
        applications,
        endpoints,
    }))
}
