//! Schema version numbers
//!
//! Client payloads declare the schema they were produced with as a dotted
//! version (`1.0.0.500`, `2.0`, `v2.0.0-beta1`). Missing components are zero.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A four-component schema version, ordered component by component.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

/// Error returned when a version string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid schema version '{input}': {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: &'static str,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }

    /// Parse a version, returning `None` instead of an error
    pub fn parse_lenient(input: &str) -> Option<Self> {
        input.parse().ok()
    }
}

impl FromStr for SchemaVersion {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let err = |reason| VersionParseError {
            input: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        // Pre-release and build metadata suffixes do not take part in ordering.
        let core = trimmed
            .split(|c| c == '-' || c == '+')
            .next()
            .unwrap_or_default();
        if core.is_empty() {
            return Err(err("empty version"));
        }

        let mut parts = [0u32; 4];
        let mut count = 0;
        for component in core.split('.') {
            if count == parts.len() {
                return Err(err("more than four components"));
            }
            parts[count] = component
                .parse()
                .map_err(|_| err("component is not a number"))?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SchemaVersion> for String {
    fn from(version: SchemaVersion) -> Self {
        version.to_string()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}
