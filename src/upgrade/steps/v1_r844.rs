//! 1.0.0.844: request cookie and post data shapes

use serde_json::{Map, Value};

use crate::types::SchemaVersion;
use crate::upgrade::{UpgradeError, UpgradeResult};

use super::{decode_embedded_json, UpgradeStep};

/// `RequestInfo.Cookies` used to be a list of `{Name, Value}` pairs and
/// `RequestInfo.PostData` an encoded JSON string. Both become plain objects.
pub struct NormalizeRequestInfoStep;

impl UpgradeStep for NormalizeRequestInfoStep {
    fn name(&self) -> &'static str {
        "v1_r844_normalize_request_info"
    }

    fn target_version(&self) -> SchemaVersion {
        SchemaVersion::new(1, 0, 0, 844)
    }

    fn upgrade_document(&self, document: &mut Map<String, Value>) -> UpgradeResult<()> {
        let request = match document.get_mut("RequestInfo") {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::Object(request)) => request,
            Some(_) => {
                return Err(UpgradeError::invalid_field(
                    "RequestInfo",
                    "expected an object",
                ))
            }
        };

        if let Some(cookies) = request.get_mut("Cookies") {
            if let Value::Array(pairs) = cookies {
                let mut map = Map::new();
                for pair in pairs.iter() {
                    let name = pair.get("Name").and_then(Value::as_str).ok_or_else(|| {
                        UpgradeError::invalid_field("RequestInfo.Cookies", "cookie without a Name")
                    })?;
                    let value = pair.get("Value").cloned().unwrap_or(Value::Null);
                    map.insert(name.to_string(), value);
                }
                *cookies = Value::Object(map);
            }
        }

        if let Some(post_data) = request.get_mut("PostData") {
            decode_embedded_json("RequestInfo.PostData", post_data)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cookie_pairs_become_map() {
        let mut doc = json!({
            "RequestInfo": {
                "Cookies": [{"Name": "session", "Value": "abc"}, {"Name": "theme", "Value": "dark"}],
                "PostData": "{\"Amount\":12}"
            }
        });

        NormalizeRequestInfoStep
            .upgrade_document(doc.as_object_mut().unwrap())
            .unwrap();

        assert_eq!(
            doc["RequestInfo"]["Cookies"],
            json!({"session": "abc", "theme": "dark"})
        );
        assert_eq!(doc["RequestInfo"]["PostData"], json!({"Amount": 12}));
    }

    #[test]
    fn test_missing_request_info_is_fine() {
        let mut doc = json!({"Message": "no request"});
        NormalizeRequestInfoStep
            .upgrade_document(doc.as_object_mut().unwrap())
            .unwrap();
        assert_eq!(doc, json!({"Message": "no request"}));
    }

    #[test]
    fn test_nameless_cookie_is_an_error() {
        let mut doc = json!({"RequestInfo": {"Cookies": [{"Value": "orphan"}]}});
        assert!(NormalizeRequestInfoStep
            .upgrade_document(doc.as_object_mut().unwrap())
            .is_err());
    }
}
