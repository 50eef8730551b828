//! Errorstack
//!
//! Ingestion and storage for error and telemetry events: legacy payloads
//! are upgraded to the current schema, parsed into canonical events, and
//! kept in a searchable store with paging, previous/next navigation,
//! session tracking, and bulk updates.
//!
//! # Modules
//!
//! - `types`: Core data structures (Event, SchemaVersion, paging types)
//! - `upgrade`: Versioned document upgrade pipeline for legacy payloads
//! - `parser`: Payload decoders chosen by client version
//! - `search`: Query language, filters, and the search-index client
//! - `event_store`: Store operations over an index client
//! - `api`: HTTP endpoints and server lifecycle
//! - `utils`: Id generation and key naming
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use errorstack::{EventParser, EventStore, InMemoryIndex, UpgradePipeline};
//!
//! let parser = EventParser::with_default_decoders(Arc::new(UpgradePipeline::with_default_steps()));
//! let store = EventStore::new(Arc::new(InMemoryIndex::new()));
//!
//! let mut events = parser.parse_events(r#"{"type":"log","message":"hello"}"#, 2, None);
//! for event in &mut events {
//!     event.organization_id = "org".into();
//!     event.project_id = "proj".into();
//!     event.stack_id = "stack".into();
//! }
//! store.add_many(events, false).unwrap();
//! store.refresh().unwrap();
//! ```

pub mod api;
pub mod event_store;
pub mod parser;
pub mod search;
pub mod types;
pub mod upgrade;
pub mod utils;

// Re-export commonly used items at crate root
pub use event_store::{EventStore, StoreConfig, StoreError, StoreResult};
pub use parser::{EventParser, ParseError, ParseOutcome};
pub use search::{parse_query, Filter, InMemoryIndex, IndexClient, IndexError, QueryError};
pub use types::{
    DateRange, Event, EventKind, FindResults, PagingOptions, PreviousAndNextEventIds,
    SchemaVersion, SessionState, SortOrder,
};
pub use upgrade::{UpgradeContext, UpgradePipeline, CURRENT_SCHEMA_VERSION};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
