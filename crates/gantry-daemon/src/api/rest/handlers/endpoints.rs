//! Endpoint resource handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::store::EndpointStore;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use gantry_gateway::ApiMetrics;
use gantry_types::{EndpointResource, EndpointSpec, ResourceKind, ResourceName, ResourcePhase};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::applications::{DeleteResponse, TriggerResponse};

/// An endpoint with its derived lifecycle phase
#[derive(Debug, Serialize)]
pub struct EndpointView {
    #[serde(flatten)]
    pub resource: EndpointResource,
    pub phase: ResourcePhase,
}

impl From<EndpointResource> for EndpointView {
    fn from(resource: EndpointResource) -> Self {
        let phase = resource.phase();
        Self { resource, phase }
    }
}

/// List all declared endpoints
pub async fn list_endpoints(State(state): State<AppState>) -> ApiResult<Json<Vec<EndpointView>>> {
    let endpoints = state.store.list_endpoints().await?;
    Ok(Json(endpoints.into_iter().map(Into::into).collect()))
}

/// Get one endpoint
pub async fn get_endpoint(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<EndpointView>> {
    let name = ResourceName::new(name);
    let resource = state
        .store
        .get_endpoint(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("endpoint {name}")))?;
    Ok(Json(resource.into()))
}

/// Declare or update an endpoint
pub async fn upsert_endpoint(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(spec): Json<EndpointSpec>,
) -> ApiResult<Json<EndpointView>> {
    if spec.context_path.is_empty() {
        return Err(ApiError::BadRequest("context_path must be set".into()));
    }

    let name = ResourceName::new(name);
    let resource = state.store.upsert_endpoint(&name, spec).await?;

    tracing::info!(
        name = %name,
        generation = resource.meta.generation,
        "endpoint declared"
    );
    state.dispatcher.clone().trigger(ResourceKind::Endpoint, name).await;

    Ok(Json(resource.into()))
}

/// Request deletion
pub async fn delete_endpoint(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let name = ResourceName::new(name);
    let known = state.store.request_endpoint_deletion(&name).await?;
    if !known {
        return Err(ApiError::NotFound(format!("endpoint {name}")));
    }

    state.dispatcher.clone().trigger(ResourceKind::Endpoint, name).await;

    Ok(Json(DeleteResponse { deleting: true }))
}

/// Trigger an immediate reconcile pass
pub async fn reconcile_endpoint(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TriggerResponse>> {
    let name = ResourceName::new(name);
    if state.store.get_endpoint(&name).await?.is_none() {
        return Err(ApiError::NotFound(format!("endpoint {name}")));
    }

    state.dispatcher.clone().trigger(ResourceKind::Endpoint, name).await;

    Ok(Json(TriggerResponse { triggered: true }))
}

/// Metrics query parameters
#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    /// Sampling window in seconds
    #[serde(default = "default_window")]
    pub window_secs: u64,
}

fn default_window() -> u64 {
    60
}

/// Gateway-side response-time stats for a deployed endpoint
pub async fn endpoint_metrics(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<ApiMetrics>> {
    let name = ResourceName::new(name);
    let resource = state
        .store
        .get_endpoint(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("endpoint {name}")))?;

    let api_id = resource
        .status
        .remote_id
        .ok_or_else(|| ApiError::Conflict(format!("endpoint {name} has no remote API yet")))?;

    let metrics = state
        .gateway
        .api_metrics(&api_id, Duration::from_secs(query.window_secs))
        .await
        .map_err(|e| {
            if e.is_not_found() {
                ApiError::NotFound(format!("remote API for endpoint {name}"))
            } else {
                ApiError::Internal(e.to_string())
            }
        })?;

    Ok(Json(metrics))
}
