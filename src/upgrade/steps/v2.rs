//! 2.0.0.0: restructure a legacy error report into a canonical event
//!
//! Legacy reports are the error itself at the top level, with request,
//! environment and client details alongside:
//!
//! ```text
//! { "Message", "Type", "StackTrace", "Inner", "ExtendedData",
//!   "OccurrenceDate", "Tags", "RequestInfo", "EnvironmentInfo", ... }
//! ```
//!
//! The canonical shape keeps only event-level fields at the top and moves
//! everything else under `data`:
//!
//! ```text
//! { "type": "error", "date", "tags", "message",
//!   "data": { "@error", "@request", "@environment", "@submission_client", ... } }
//! ```

use serde_json::{Map, Value};

use crate::types::{data_keys, SchemaVersion};
use crate::upgrade::{UpgradeError, UpgradeResult};
use crate::utils::{snake_case, snake_case_keys};

use super::UpgradeStep;

pub struct CanonicalEventStep;

/// Keys that make up one error level in the legacy shape
const ERROR_KEYS: &[&str] = &[
    "Message",
    "Type",
    "Code",
    "StackTrace",
    "TargetMethod",
    "Modules",
    "Inner",
    "ExtendedData",
];

/// Server-assigned fields; the store assigns fresh values on ingest
const SERVER_KEYS: &[&str] = &[
    "Id",
    "OrganizationId",
    "ProjectId",
    "ErrorStackId",
    "IsFixed",
    "IsHidden",
    "Created",
];

const EXCEPTION_INFO: &str = "__ExceptionInfo";
const TRACE_LOG: &str = "TraceLog";

impl UpgradeStep for CanonicalEventStep {
    fn name(&self) -> &'static str {
        "v2_canonical_event"
    }

    fn target_version(&self) -> SchemaVersion {
        SchemaVersion::new(2, 0, 0, 0)
    }

    fn upgrade_document(&self, document: &mut Map<String, Value>) -> UpgradeResult<()> {
        let mut legacy = std::mem::take(document);
        for key in SERVER_KEYS {
            legacy.remove(*key);
        }

        // A few clients wrapped the error in an `Error` object.
        match legacy.remove("Error") {
            None | Some(Value::Null) => {}
            Some(Value::Object(wrapped)) => {
                for (key, value) in wrapped {
                    legacy.entry(key).or_insert(value);
                }
            }
            Some(_) => return Err(UpgradeError::invalid_field("Error", "expected an object")),
        }

        let mut error = Map::new();
        for key in ERROR_KEYS {
            if let Some(value) = legacy.remove(*key) {
                error.insert((*key).to_string(), value);
            }
        }

        let mut out = Map::new();
        let mut data = Map::new();

        out.insert("type".to_string(), Value::String("error".to_string()));

        match legacy.remove("OccurrenceDate") {
            None | Some(Value::Null) => {}
            Some(date @ Value::String(_)) => {
                out.insert("date".to_string(), date);
            }
            Some(_) => return Err(UpgradeError::invalid_field("OccurrenceDate", "expected a string")),
        }

        match legacy.remove("Tags") {
            None | Some(Value::Null) => {}
            Some(Value::Array(tags)) if !tags.is_empty() => {
                out.insert("tags".to_string(), Value::Array(tags));
            }
            Some(Value::Array(_)) => {}
            Some(_) => return Err(UpgradeError::invalid_field("Tags", "expected an array")),
        }

        // Document-level extended data: trace log gets its own slot, the
        // error's own properties stay with the error below.
        if let Some(Value::Object(mut extended)) = error.remove("ExtendedData") {
            if let Some(trace) = extended.remove(TRACE_LOG) {
                data.insert(data_keys::TRACE_LOG.to_string(), trace);
            }
            let exception_info = extended.remove(EXCEPTION_INFO);
            data.extend(extended);
            if let Some(info) = exception_info {
                let mut error_data = Map::new();
                error_data.insert(EXCEPTION_INFO.to_string(), info);
                error.insert("ExtendedData".to_string(), Value::Object(error_data));
            }
        }

        let converted = convert_error(error)?;
        if let Some(message) = converted.get("message").cloned() {
            out.insert("message".to_string(), message);
        }
        data.insert(data_keys::ERROR.to_string(), Value::Object(converted));

        if let Some(request) = take_object(&mut legacy, "RequestInfo")? {
            data.insert(data_keys::REQUEST.to_string(), Value::Object(convert_info(request)));
        }
        if let Some(environment) = take_object(&mut legacy, "EnvironmentInfo")? {
            data.insert(
                data_keys::ENVIRONMENT.to_string(),
                Value::Object(convert_info(environment)),
            );
        }
        if let Some(client) = take_object(&mut legacy, "ExceptionlessClientInfo")? {
            data.insert(
                data_keys::SUBMISSION_CLIENT.to_string(),
                Value::Object(convert_info(client)),
            );
        }

        if let Some(identity) = take_string(&mut legacy, "UserName") {
            data.insert(
                data_keys::USER.to_string(),
                serde_json::json!({ "identity": identity }),
            );
        }

        let email = take_string(&mut legacy, "UserEmail");
        let description = take_string(&mut legacy, "UserDescription");
        if email.is_some() || description.is_some() {
            let mut user_description = Map::new();
            if let Some(email) = email {
                user_description.insert("email_address".to_string(), Value::String(email));
            }
            if let Some(description) = description {
                user_description.insert("description".to_string(), Value::String(description));
            }
            data.insert(
                data_keys::USER_DESCRIPTION.to_string(),
                Value::Object(user_description),
            );
        }

        // Anything left over is kept rather than silently lost.
        for (key, value) in legacy {
            if !value.is_null() {
                out.insert(snake_case(&key), value);
            }
        }

        out.insert("data".to_string(), Value::Object(data));
        *document = out;
        Ok(())
    }
}

/// Convert one legacy error level and its inner chain
fn convert_error(mut legacy: Map<String, Value>) -> UpgradeResult<Map<String, Value>> {
    let mut error = Map::new();

    for (from, to) in [("Message", "message"), ("Type", "type"), ("Code", "code")] {
        if let Some(value) = legacy.remove(from).filter(|v| !v.is_null()) {
            error.insert(to.to_string(), value);
        }
    }

    for (from, to) in [
        ("StackTrace", "stack_trace"),
        ("TargetMethod", "target_method"),
        ("Modules", "modules"),
    ] {
        if let Some(value) = legacy.remove(from).filter(|v| !v.is_null()) {
            error.insert(to.to_string(), snake_case_deep(value));
        }
    }

    if let Some(Value::Object(mut extended)) = legacy.remove("ExtendedData") {
        if let Some(info) = extended.remove(EXCEPTION_INFO) {
            extended.insert("@ext".to_string(), info);
        }
        if !extended.is_empty() {
            error.insert("data".to_string(), Value::Object(extended));
        }
    }

    match legacy.remove("Inner") {
        None | Some(Value::Null) => {}
        Some(Value::Object(inner)) => {
            error.insert("inner".to_string(), Value::Object(convert_error(inner)?));
        }
        Some(_) => return Err(UpgradeError::invalid_field("Inner", "expected an object")),
    }

    Ok(error)
}

/// Request, environment and client info: snake_case the known fields and
/// move their own extended data under `data`
fn convert_info(info: Map<String, Value>) -> Map<String, Value> {
    let mut info = snake_case_keys(info);
    if let Some(extended) = info.remove("extended_data") {
        if extended.as_object().map_or(false, |m| !m.is_empty()) {
            info.insert("data".to_string(), extended);
        }
    }
    info.retain(|_, v| !v.is_null());
    info
}

/// Snake_case every key of a structural value (stack frames, modules)
fn snake_case_deep(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (snake_case(&k), snake_case_deep(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(snake_case_deep).collect()),
        other => other,
    }
}

fn take_object(
    map: &mut Map<String, Value>,
    key: &str,
) -> UpgradeResult<Option<Map<String, Value>>> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(object)) => Ok(Some(object)),
        Some(_) => Err(UpgradeError::invalid_field(key, "expected an object")),
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upgrade(mut doc: Value) -> Value {
        CanonicalEventStep
            .upgrade_document(doc.as_object_mut().unwrap())
            .unwrap();
        doc
    }

    #[test]
    fn test_restructures_legacy_error() {
        let doc = upgrade(json!({
            "Id": "52f1e2d1f2ae3b0b6c8f2e11",
            "OrganizationId": "org",
            "ProjectId": "proj",
            "ErrorStackId": "stack",
            "IsFixed": true,
            "OccurrenceDate": "2014-02-05T10:27:45.123-06:00",
            "Tags": ["Critical"],
            "Message": "Object reference not set",
            "Type": "System.NullReferenceException",
            "StackTrace": [{"Name": "Main", "LineNumber": 12, "DeclaringType": "Program"}],
            "ExtendedData": {"TraceLog": ["step 1"], "Version": "3.1"},
            "RequestInfo": {"HttpMethod": "GET", "ClientIpAddress": "10.0.0.1", "ExtendedData": {}},
            "ExceptionlessClientInfo": {"Version": "1.0.0.850", "Platform": ".NET"},
            "UserEmail": "jane@example.com",
            "UserDescription": "clicked save"
        }));

        assert_eq!(doc["type"], "error");
        assert_eq!(doc["date"], "2014-02-05T10:27:45.123-06:00");
        assert_eq!(doc["tags"], json!(["Critical"]));
        assert_eq!(doc["message"], "Object reference not set");
        assert!(doc.get("Id").is_none());
        assert!(doc.get("IsFixed").is_none());
        assert!(doc.get("ErrorStackId").is_none());

        let data = &doc["data"];
        assert_eq!(data["@error"]["type"], "System.NullReferenceException");
        assert_eq!(data["@error"]["stack_trace"][0]["line_number"], 12);
        assert_eq!(data["@error"]["stack_trace"][0]["declaring_type"], "Program");
        assert_eq!(data["@trace"], json!(["step 1"]));
        assert_eq!(data["Version"], "3.1");
        assert_eq!(data["@request"], json!({"http_method": "GET", "client_ip_address": "10.0.0.1"}));
        assert_eq!(data["@submission_client"]["platform"], ".NET");
        assert_eq!(
            data["@user_description"],
            json!({"email_address": "jane@example.com", "description": "clicked save"})
        );
    }

    #[test]
    fn test_inner_errors_are_nested() {
        let doc = upgrade(json!({
            "Message": "outer",
            "ExtendedData": {"__ExceptionInfo": {"HResult": 5}},
            "Inner": {
                "Message": "inner",
                "Type": "System.IO.IOException",
                "ExtendedData": {"__ExceptionInfo": {"Path": "/tmp"}}
            }
        }));

        let error = &doc["data"]["@error"];
        assert_eq!(error["message"], "outer");
        assert_eq!(error["data"]["@ext"], json!({"HResult": 5}));
        assert_eq!(error["inner"]["message"], "inner");
        assert_eq!(error["inner"]["data"]["@ext"], json!({"Path": "/tmp"}));
    }

    #[test]
    fn test_malformed_fields_are_errors() {
        let mut doc = json!({"Message": "x", "Inner": "not an object"});
        assert!(CanonicalEventStep
            .upgrade_document(doc.as_object_mut().unwrap())
            .is_err());

        let mut doc = json!({"Message": "x", "OccurrenceDate": 12});
        assert!(CanonicalEventStep
            .upgrade_document(doc.as_object_mut().unwrap())
            .is_err());

        let mut doc = json!({"Message": "x", "Tags": "a,b"});
        assert!(CanonicalEventStep
            .upgrade_document(doc.as_object_mut().unwrap())
            .is_err());
    }
}
