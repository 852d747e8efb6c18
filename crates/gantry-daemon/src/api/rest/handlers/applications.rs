//! Application resource handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::store::ApplicationStore;
use axum::{
    extract::{Path, State},
    Json,
};
use gantry_types::{AppResource, AppSpec, ResourceKind, ResourceName, ResourcePhase};
use serde::Serialize;

/// An application with its derived lifecycle phase
#[derive(Debug, Serialize)]
pub struct ApplicationView {
    #[serde(flatten)]
    pub resource: AppResource,
    pub phase: ResourcePhase,
}

impl From<AppResource> for ApplicationView {
    fn from(resource: AppResource) -> Self {
        let phase = resource.phase();
        Self { resource, phase }
    }
}

/// Deletion acknowledgement; cleanup happens in the background
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleting: bool,
}

/// Reconcile trigger acknowledgement
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub triggered: bool,
}

/// List all declared applications
pub async fn list_applications(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ApplicationView>>> {
    let applications = state.store.list_applications().await?;
    Ok(Json(applications.into_iter().map(Into::into).collect()))
}

/// Get one application
pub async fn get_application(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ApplicationView>> {
    let name = ResourceName::new(name);
    let resource = state
        .store
        .get_application(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("application {name}")))?;
    Ok(Json(resource.into()))
}

/// Declare or update an application; a spec change bumps the generation
/// and a reconcile pass is triggered either way
pub async fn upsert_application(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(spec): Json<AppSpec>,
) -> ApiResult<Json<ApplicationView>> {
    let name = ResourceName::new(name);
    let resource = state.store.upsert_application(&name, spec).await?;

    tracing::info!(
        name = %name,
        generation = resource.meta.generation,
        "application declared"
    );
    state
        .dispatcher
        .clone()
        .trigger(ResourceKind::Application, name)
        .await;

    Ok(Json(resource.into()))
}

/// Request deletion; the resource disappears once remote cleanup is done
pub async fn delete_application(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let name = ResourceName::new(name);
    let known = state.store.request_application_deletion(&name).await?;
    if !known {
        return Err(ApiError::NotFound(format!("application {name}")));
    }

    state
        .dispatcher
        .clone()
        .trigger(ResourceKind::Application, name)
        .await;

    Ok(Json(DeleteResponse { deleting: true }))
}

/// Trigger an immediate reconcile pass
pub async fn reconcile_application(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TriggerResponse>> {
    let name = ResourceName::new(name);
    if state.store.get_application(&name).await?.is_none() {
        return Err(ApiError::NotFound(format!("application {name}")));
    }

    state
        .dispatcher
        .clone()
        .trigger(ResourceKind::Application, name)
        .await;

    Ok(Json(TriggerResponse { triggered: true }))
}
