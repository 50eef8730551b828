//! Data types shared across the upgrade pipeline, parser, and event store
//!
//! This module contains the canonical event model and the small value types
//! used by store queries.

mod event;
mod paging;
mod request_info;
mod version;

pub use event::{data_keys, Event, EventKind, SessionState};
pub use paging::{
    DateRange, FindResults, PagingOptions, PreviousAndNextEventIds, SortOrder, DEFAULT_PAGE_LIMIT,
};
pub use request_info::RequestInfo;
pub use version::{SchemaVersion, VersionParseError};
