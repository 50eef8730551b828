//! Legacy payload upgrades
//!
//! Older clients submit error reports in earlier document schemas. The
//! upgrade pipeline rewrites a batch of raw JSON documents, in place and in
//! version order, until it matches the current canonical event shape.
//!
//! ```text
//! raw text ──▶ UpgradeContext ──▶ UpgradePipeline::upgrade ──▶ canonical JSON
//!                 (version)         (steps > version, ascending)
//! ```

pub mod context;
pub mod pipeline;
pub mod steps;

use thiserror::Error;

use crate::types::SchemaVersion;

pub use context::{UpgradeContext, UpgradeDocument};
pub use pipeline::UpgradePipeline;
pub use steps::{default_steps, UpgradeStep};

/// Version produced by the last registered step
pub const CURRENT_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(2, 0, 0, 0);

/// Oldest schema any step knows how to read
pub const LEGACY_BASE_VERSION: SchemaVersion = SchemaVersion::new(1, 0, 0, 0);

/// Failure while rewriting a single document
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("field '{field}' holds malformed embedded JSON: {source}")]
    EmbeddedJson {
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

impl UpgradeError {
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        UpgradeError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type UpgradeResult<T> = Result<T, UpgradeError>;
