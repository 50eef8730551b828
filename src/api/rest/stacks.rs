//! Stack endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::events::UpdatedCount;
use super::{ApiError, ApiResponse};
use crate::api::state::AppState;
use crate::types::{Event, PagingOptions};

#[derive(Debug, Deserialize)]
pub struct StackParams {
    pub organization: String,
}

/// POST /api/v2/stacks/:id/mark-fixed
pub async fn mark_fixed(
    state: State<Arc<AppState>>,
    path: Path<String>,
    params: Query<StackParams>,
) -> Result<Json<ApiResponse<UpdatedCount>>, ApiError> {
    set_fixed(state, path, params, true).await
}

/// POST /api/v2/stacks/:id/mark-not-fixed
pub async fn mark_not_fixed(
    state: State<Arc<AppState>>,
    path: Path<String>,
    params: Query<StackParams>,
) -> Result<Json<ApiResponse<UpdatedCount>>, ApiError> {
    set_fixed(state, path, params, false).await
}

async fn set_fixed(
    State(state): State<Arc<AppState>>,
    Path(stack_id): Path<String>,
    Query(params): Query<StackParams>,
    is_fixed: bool,
) -> Result<Json<ApiResponse<UpdatedCount>>, ApiError> {
    if params.organization.is_empty() {
        return Err(ApiError::bad_request("organization is required"));
    }

    // Large stacks take a while; keep the runtime threads free.
    let store = state.store.clone();
    let updated = tokio::task::spawn_blocking(move || {
        store.update_fixed_by_stack(&params.organization, &stack_id, is_fixed, true)
    })
    .await??;

    Ok(Json(ApiResponse::new(
        UpdatedCount { updated },
        state.current_sequence_id(),
    )))
}

#[derive(Debug, Deserialize)]
pub struct StackEventsParams {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// GET /api/v2/stacks/:id/events - A stack's events, hidden ones included
pub async fn list_stack_events(
    State(state): State<Arc<AppState>>,
    Path(stack_id): Path<String>,
    Query(params): Query<StackEventsParams>,
) -> Result<Json<ApiResponse<Vec<Event>>>, ApiError> {
    let paging = PagingOptions {
        page: params.page,
        limit: params.limit,
    };
    let results = state.store.get_by_stack_id(&stack_id, paging)?;
    Ok(Json(ApiResponse::with_total(
        results.documents,
        state.current_sequence_id(),
        results.total,
    )))
}
