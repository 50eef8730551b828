//! Event search
//!
//! This module provides everything the store needs to find events:
//! - A [`Filter`] expression model evaluated against events
//! - A query-string parser with relative date math
//! - The [`IndexClient`] seam and an in-memory, refresh-gated index

mod date_math;
mod filter;
mod index;
mod query;

use thiserror::Error;

pub use date_math::parse_date_expr;
pub use filter::{Field, Filter, SortKey};
pub use index::{
    EventPatch, InMemoryIndex, IndexClient, IndexError, IndexResult, SearchRequest, SearchResponse,
};
pub use query::parse_query;

/// A query string that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unknown query field '{0}'")]
    UnknownField(String),

    #[error("field '{0}' has no value")]
    MissingValue(String),

    #[error("unbalanced range for field '{0}', expected [lower TO upper]")]
    UnbalancedRange(String),

    #[error("unterminated quoted string")]
    UnterminatedQuote,

    #[error("invalid value '{value}' for field '{field}'")]
    InvalidValue { field: String, value: String },

    #[error("invalid date expression '{expr}': {reason}")]
    InvalidDate { expr: String, reason: String },
}
