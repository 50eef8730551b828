//! Session endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;

use super::{ApiError, ApiResponse};
use crate::api::state::AppState;
use crate::types::{Event, PagingOptions};

#[derive(Debug, Deserialize)]
pub struct OpenSessionsParams {
    /// How long ago a session must have started, in minutes
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

fn default_window_minutes() -> i64 {
    30
}

/// GET /api/v2/sessions/open - Sessions not ended that started before the window
pub async fn open_sessions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OpenSessionsParams>,
) -> Result<Json<ApiResponse<Vec<Event>>>, ApiError> {
    if params.window_minutes <= 0 {
        return Err(ApiError::bad_request("window_minutes must be positive"));
    }
    let cutoff = Duration::try_minutes(params.window_minutes)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| ApiError::bad_request("window_minutes is out of range"))?;
    let paging = PagingOptions {
        page: params.page,
        limit: params.limit,
    };

    let results = state.store.get_open_sessions(cutoff, paging)?;
    Ok(Json(ApiResponse::with_total(
        results.documents,
        state.current_sequence_id(),
        results.total,
    )))
}
