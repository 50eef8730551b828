//! Paging, sorting, and result envelope types shared by store queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Page size used when a caller does not ask for one
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// 1-based page number plus page size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingOptions {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl PagingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Requested page, never below 1
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    /// Requested limit, falling back to `default` and capped at `max`
    pub fn resolved_limit(&self, default: usize, max: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, max.max(1))
    }

    /// Number of documents to skip for a given page size
    pub fn offset(&self, limit: usize) -> usize {
        (self.page() - 1).saturating_mul(limit)
    }
}

/// One page of matches plus the total match count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindResults<T> {
    pub documents: Vec<T>,
    pub total: u64,
    pub page: usize,
    pub has_more: bool,
}

impl<T> FindResults<T> {
    pub fn empty(page: usize) -> Self {
        Self {
            documents: Vec::new(),
            total: 0,
            page,
            has_more: false,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Neighbours of an event inside its stack, in chronological order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreviousAndNextEventIds {
    pub previous: Option<String>,
    pub next: Option<String>,
}

/// Listing direction on `(occurrence date, id)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Newest first
    #[default]
    Descending,
    /// Oldest first
    Ascending,
}

/// Inclusive occurrence-date window; open ends are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}
