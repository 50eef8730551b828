//! 1.0.0.500: exception properties sent as encoded JSON strings

use serde_json::{Map, Value};

use crate::types::SchemaVersion;
use crate::upgrade::UpgradeResult;

use super::{decode_embedded_json, for_each_error_level, UpgradeStep};

/// Early clients double-encoded `ExtendedData.ExtraExceptionProperties`
/// as a JSON string on every error level. Decode it into an object.
pub struct DecodeExceptionPropertiesStep;

const FIELD: &str = "ExtraExceptionProperties";

impl UpgradeStep for DecodeExceptionPropertiesStep {
    fn name(&self) -> &'static str {
        "v1_r500_decode_exception_properties"
    }

    fn target_version(&self) -> SchemaVersion {
        SchemaVersion::new(1, 0, 0, 500)
    }

    fn upgrade_document(&self, document: &mut Map<String, Value>) -> UpgradeResult<()> {
        for_each_error_level(document, &mut |level| {
            if let Some(Value::Object(extended)) = level.get_mut("ExtendedData") {
                if let Some(value) = extended.get_mut(FIELD) {
                    decode_embedded_json(FIELD, value)?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_nested_levels() {
        let mut doc = json!({
            "Message": "outer",
            "ExtendedData": {"ExtraExceptionProperties": "{\"Code\":7}"},
            "Inner": {
                "Message": "inner",
                "ExtendedData": {"ExtraExceptionProperties": "{\"Path\":\"/tmp\"}"}
            }
        });

        DecodeExceptionPropertiesStep
            .upgrade_document(doc.as_object_mut().unwrap())
            .unwrap();

        assert_eq!(doc["ExtendedData"]["ExtraExceptionProperties"], json!({"Code": 7}));
        assert_eq!(
            doc["Inner"]["ExtendedData"]["ExtraExceptionProperties"],
            json!({"Path": "/tmp"})
        );
    }

    #[test]
    fn test_plain_strings_are_left_alone() {
        let mut doc = json!({"ExtendedData": {"ExtraExceptionProperties": "n/a"}});
        DecodeExceptionPropertiesStep
            .upgrade_document(doc.as_object_mut().unwrap())
            .unwrap();
        assert_eq!(doc["ExtendedData"]["ExtraExceptionProperties"], json!("n/a"));
    }

    #[test]
    fn test_broken_encoding_is_an_error() {
        let mut doc = json!({"ExtendedData": {"ExtraExceptionProperties": "{broken"}});
        let err = DecodeExceptionPropertiesStep
            .upgrade_document(doc.as_object_mut().unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("ExtraExceptionProperties"));
    }
}
