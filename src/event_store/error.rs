//! Store error types

use thiserror::Error;

use crate::search::{IndexError, QueryError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("invalid query: {0}")]
    Query(#[from] QueryError),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("operation cancelled after {processed} documents")]
    Cancelled { processed: usize },
}

impl StoreError {
    /// Index failures the caller may retry; everything else is final
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Index(e) if e.is_retryable())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
