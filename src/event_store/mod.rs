//! Event Store
//!
//! This module provides persistence and retrieval of canonical events on
//! top of a search index:
//! - `EventStore`: writes, lookups, listings, and session queries
//! - Previous/next navigation within a stack
//! - Bulk fixed/hidden mutations with cooperative cancellation
//! - Change notifications for writes callers want announced
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//! ┌─────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ Parser  │───►│ add_many()   │───►│ IndexClient  │───►│ notifier     │
//! │ events  │    │ validate, id │    │ index()      │    │ (optional)   │
//! └─────────┘    └──────────────┘    └──────────────┘    └──────────────┘
//!
//! Read Path:
//! ┌───────────────┐    ┌──────────────┐    ┌─────────────────────────┐
//! │ refresh()     │───►│ search()     │───►│ (date, id) desc, paged  │
//! │ (barrier)     │    │ filter       │    │                         │
//! └───────────────┘    └──────────────┘    └─────────────────────────┘
//! ```
//!
//! Writes are only searchable after a refresh; `get_by_id` is realtime.

mod bulk;
mod config;
mod error;
mod navigation;
mod notify;
mod store;

pub use bulk::CancellationFlag;
pub use config::{StoreConfig, BULK_BATCH_SIZE_ENV, MAX_PAGE_LIMIT_ENV};
pub use error::{StoreError, StoreResult};
pub use notify::{
    BroadcastNotifier, ChangeKind, ChangeMessage, ChangeNotifier, EntityChanged, NullNotifier,
};
pub use store::EventStore;
