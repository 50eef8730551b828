//! Registered schema upgrade steps
//!
//! Each step rewrites a single legacy document in place and declares the
//! schema version it upgrades the batch *to*. Steps are registered
//! statically, in ascending target order, by [`default_steps`].

mod v1_r500;
mod v1_r844;
mod v1_r850;
mod v2;

use serde_json::{Map, Value};

use crate::types::SchemaVersion;

use super::{UpgradeError, UpgradeResult, LEGACY_BASE_VERSION};

pub use v1_r500::DecodeExceptionPropertiesStep;
pub use v1_r844::NormalizeRequestInfoStep;
pub use v1_r850::RenameExtendedDataKeysStep;
pub use v2::CanonicalEventStep;

/// A single forward transformation of the document schema
pub trait UpgradeStep: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Version a batch is at after this step ran
    fn target_version(&self) -> SchemaVersion;

    /// Whether a batch currently at `current` needs this step
    fn applies(&self, current: SchemaVersion) -> bool {
        current >= LEGACY_BASE_VERSION && current < self.target_version()
    }

    /// Rewrite one document in place
    fn upgrade_document(&self, document: &mut Map<String, Value>) -> UpgradeResult<()>;
}

/// All built-in steps, in ascending target order
pub fn default_steps() -> Vec<Box<dyn UpgradeStep>> {
    vec![
        Box::new(DecodeExceptionPropertiesStep),
        Box::new(NormalizeRequestInfoStep),
        Box::new(RenameExtendedDataKeysStep),
        Box::new(CanonicalEventStep),
    ]
}

/// Visit a legacy error and every error in its `Inner` chain. Some clients
/// wrapped the error in an `Error` object; that one is visited too.
pub(crate) fn for_each_error_level(
    error: &mut Map<String, Value>,
    visit: &mut dyn FnMut(&mut Map<String, Value>) -> UpgradeResult<()>,
) -> UpgradeResult<()> {
    visit(error)?;
    if let Some(Value::Object(wrapped)) = error.get_mut("Error") {
        for_each_error_level(wrapped, visit)?;
    }
    match error.get_mut("Inner") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Object(inner)) => for_each_error_level(inner, visit),
        Some(_) => Err(UpgradeError::invalid_field("Inner", "expected an object")),
    }
}

/// Decode a value that older clients sent as a JSON-encoded string
pub(crate) fn decode_embedded_json(field: &str, value: &mut Value) -> UpgradeResult<()> {
    if let Value::String(text) = value {
        let trimmed = text.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            *value = serde_json::from_str(trimmed).map_err(|source| UpgradeError::EmbeddedJson {
                field: field.to_string(),
                source,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_steps_are_ascending() {
        let steps = default_steps();
        assert_eq!(steps.len(), 4);
        for pair in steps.windows(2) {
            assert!(pair[0].target_version() < pair[1].target_version());
        }
    }

    #[test]
    fn test_applies_only_below_target() {
        let step = NormalizeRequestInfoStep;
        assert!(step.applies(SchemaVersion::new(1, 0, 0, 500)));
        assert!(!step.applies(step.target_version()));
        assert!(!step.applies(SchemaVersion::new(2, 0, 0, 0)));
        assert!(!step.applies(SchemaVersion::new(0, 9, 0, 0)));
    }

    #[test]
    fn test_error_levels_include_wrapped_error() {
        let mut doc = serde_json::json!({
            "Message": "top",
            "Error": {"Message": "wrapped", "Inner": {"Message": "inner"}}
        });
        let mut seen = Vec::new();
        for_each_error_level(doc.as_object_mut().unwrap(), &mut |level| {
            if let Some(message) = level.get("Message").and_then(Value::as_str) {
                seen.push(message.to_string());
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["top", "wrapped", "inner"]);
    }
}
