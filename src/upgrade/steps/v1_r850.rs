//! 1.0.0.850: extended data key renames

use serde_json::{Map, Value};

use crate::types::SchemaVersion;
use crate::upgrade::UpgradeResult;

use super::{for_each_error_level, UpgradeStep};

/// Renames `ExtendedData.TraceInfo` to `TraceLog` on the document and
/// `ExtendedData.ExtraExceptionProperties` to `__ExceptionInfo` on every
/// error level.
pub struct RenameExtendedDataKeysStep;

impl UpgradeStep for RenameExtendedDataKeysStep {
    fn name(&self) -> &'static str {
        "v1_r850_rename_extended_data_keys"
    }

    fn target_version(&self) -> SchemaVersion {
        SchemaVersion::new(1, 0, 0, 850)
    }

    fn upgrade_document(&self, document: &mut Map<String, Value>) -> UpgradeResult<()> {
        if let Some(Value::Object(extended)) = document.get_mut("ExtendedData") {
            rename_key(extended, "TraceInfo", "TraceLog");
        }

        for_each_error_level(document, &mut |level| {
            if let Some(Value::Object(extended)) = level.get_mut("ExtendedData") {
                rename_key(extended, "ExtraExceptionProperties", "__ExceptionInfo");
            }
            Ok(())
        })
    }
}

fn rename_key(map: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = map.remove(from) {
        map.insert(to.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_renames_keys() {
        let mut doc = json!({
            "ExtendedData": {"TraceInfo": ["line 1"], "ExtraExceptionProperties": {"A": 1}},
            "Inner": {"ExtendedData": {"ExtraExceptionProperties": {"B": 2}}}
        });

        RenameExtendedDataKeysStep
            .upgrade_document(doc.as_object_mut().unwrap())
            .unwrap();

        assert_eq!(
            doc["ExtendedData"],
            json!({"TraceLog": ["line 1"], "__ExceptionInfo": {"A": 1}})
        );
        assert_eq!(doc["Inner"]["ExtendedData"], json!({"__ExceptionInfo": {"B": 2}}));
    }
}
