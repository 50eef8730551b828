//! Event endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, ApiResponse};
use crate::api::state::AppState;
use crate::types::{Event, PagingOptions, PreviousAndNextEventIds};
use crate::utils::derive_stack_id;

/// Payloads without a version are treated as current clients
const DEFAULT_API_VERSION: u32 = 2;

/// Query parameters for submitting events
#[derive(Debug, Deserialize)]
pub struct SubmitParams {
    pub organization: String,
    pub project: String,
    /// Stack for every event in the payload; derived per event when absent
    pub stack: Option<String>,
    /// Client API version
    #[serde(default = "default_api_version")]
    pub version: u32,
}

fn default_api_version() -> u32 {
    DEFAULT_API_VERSION
}

#[derive(Debug, Serialize)]
pub struct SubmitResult {
    pub accepted: usize,
    pub skipped: usize,
    pub ids: Vec<String>,
}

/// POST /api/v2/events - Parse a payload and store its events
pub async fn submit_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SubmitParams>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<ApiResponse<SubmitResult>>), ApiError> {
    if params.organization.is_empty() || params.project.is_empty() {
        return Err(ApiError::bad_request("organization and project are required"));
    }
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let store = state.store.clone();
    let parser = state.parser.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<SubmitResult, ApiError> {
        let outcome = parser.parse(&body, params.version, user_agent.as_deref())?;
        let events: Vec<Event> = outcome
            .events
            .into_iter()
            .map(|mut event| {
                event.organization_id = params.organization.clone();
                event.project_id = params.project.clone();
                event.stack_id = match &params.stack {
                    Some(stack) if !stack.is_empty() => stack.clone(),
                    _ => derive_stack_id(&event),
                };
                event
            })
            .collect();

        let added = store.add_many(events, true)?;
        Ok(SubmitResult {
            accepted: added.len(),
            skipped: outcome.skipped,
            ids: added.into_iter().map(|e| e.id).collect(),
        })
    })
    .await??;

    info!(
        accepted = result.accepted,
        skipped = result.skipped,
        "Accepted event submission"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(result, state.current_sequence_id())),
    ))
}

/// Query parameters for listing events
#[derive(Debug, Deserialize)]
pub struct ListEventsParams {
    /// One organization id, or several separated by commas
    pub organization: String,
    /// Structured query, e.g. `stack:abc date:[now-1h TO now]`
    #[serde(default)]
    pub q: String,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// GET /api/v2/events - Events of one or more organizations, newest first
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListEventsParams>,
) -> Result<Json<ApiResponse<Vec<Event>>>, ApiError> {
    let organizations: Vec<String> = params
        .organization
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let paging = PagingOptions {
        page: params.page,
        limit: params.limit,
    };

    let results = state
        .store
        .get_by_organization_ids(&organizations, &params.q, paging)?;
    Ok(Json(ApiResponse::with_total(
        results.documents,
        state.current_sequence_id(),
        results.total,
    )))
}

/// GET /api/v2/events/:id - Get single event
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Event>>, ApiError> {
    match state.store.get_by_id(&id)? {
        Some(event) => Ok(Json(ApiResponse::new(event, state.current_sequence_id()))),
        None => Err(ApiError::not_found(format!("Event '{}' not found", id))),
    }
}

/// GET /api/v2/events/:id/navigation - Neighbouring events in the stack
pub async fn get_navigation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PreviousAndNextEventIds>>, ApiError> {
    let ids = state.store.get_previous_and_next_event_ids(&id)?;
    Ok(Json(ApiResponse::new(ids, state.current_sequence_id())))
}

/// GET /api/v2/projects/:project/events/by-ref/:reference
pub async fn get_by_reference(
    State(state): State<Arc<AppState>>,
    Path((project, reference)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Vec<Event>>>, ApiError> {
    let results = state.store.get_by_reference_id(&project, &reference)?;
    Ok(Json(ApiResponse::with_total(
        results.documents,
        state.current_sequence_id(),
        results.total,
    )))
}

#[derive(Debug, Deserialize)]
pub struct HideByIpRequest {
    pub organization: String,
    pub ip: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UpdatedCount {
    pub updated: usize,
}

/// POST /api/v2/events/hide-by-ip - Hide a client's events in a window
pub async fn hide_by_ip(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HideByIpRequest>,
) -> Result<Json<ApiResponse<UpdatedCount>>, ApiError> {
    if request.start > request.end {
        return Err(ApiError::bad_request("start must not be after end"));
    }

    let store = state.store.clone();
    let updated = tokio::task::spawn_blocking(move || {
        store.hide_all_by_client_ip_and_date(
            &request.organization,
            &request.ip,
            request.start,
            request.end,
        )
    })
    .await??;

    Ok(Json(ApiResponse::new(
        UpdatedCount { updated },
        state.current_sequence_id(),
    )))
}

/// POST /api/v2/refresh - Make every accepted write searchable
pub async fn refresh(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.store.refresh()?;
    Ok(StatusCode::NO_CONTENT)
}
