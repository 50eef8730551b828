//! REST API module for HTTP endpoints
//!
//! - `POST /api/v2/events` - Submit a payload in any supported format
//! - `GET /api/v2/events` - List or query an organization's events
//! - `GET /api/v2/events/:id` - Get single event
//! - `GET /api/v2/events/:id/navigation` - Previous and next event ids
//! - `POST /api/v2/events/hide-by-ip` - Hide events from one client IP
//! - `GET /api/v2/sessions/open` - Unclosed sessions started before a window
//! - `POST /api/v2/stacks/:id/mark-fixed` - Mark a stack's events fixed
//! - `POST /api/v2/stacks/:id/mark-not-fixed` - Reopen a stack's events
//! - `POST /api/v2/refresh` - Make pending writes searchable

pub mod events;
pub mod sessions;
pub mod stacks;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::task::JoinError;
use tracing::error;

use crate::event_store::StoreError;
use crate::parser::ParseError;
use crate::search::IndexError;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Current sequence ID for cache invalidation
    pub sequence_id: u64,
    /// Total count (for paginated responses)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, sequence_id: u64) -> Self {
        Self {
            data,
            sequence_id,
            total: None,
        }
    }

    pub fn with_total(data: T, sequence_id: u64, total: u64) -> Self {
        Self {
            data,
            sequence_id,
            total: Some(total),
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.to_string(),
            status,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "INDEX_UNAVAILABLE", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CANCELLED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match &e {
            StoreError::Index(IndexError::Unavailable(_)) => ApiError::unavailable(e.to_string()),
            StoreError::Index(IndexError::Rejected { .. }) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "REJECTED", e.to_string())
            }
            StoreError::Query(_) | StoreError::InvalidEvent(_) => ApiError::bad_request(e.to_string()),
            StoreError::Cancelled { .. } => ApiError::conflict(e.to_string()),
            StoreError::Index(IndexError::Serialization(_)) => {
                error!(error = %e, "Index failure");
                ApiError::internal(e.to_string())
            }
        }
    }
}

impl From<ParseError> for ApiError {
    fn from(e: ParseError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl From<JoinError> for ApiError {
    fn from(e: JoinError) -> Self {
        error!(error = %e, "Background task failed");
        ApiError::internal("background task failed")
    }
}
