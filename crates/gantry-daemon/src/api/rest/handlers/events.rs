//! Event handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Query, State},
    Json,
};
use gantry_types::GantryEventEnvelope;
use serde::Deserialize;

/// Event listing parameters
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Most recent reconciliation events, newest last
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<Vec<GantryEventEnvelope>>> {
    Ok(Json(state.events.recent(query.limit).await))
}
