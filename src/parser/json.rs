//! Canonical JSON event decoding

use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{data_keys, Event, EventKind};

use super::{EventDecoder, ParseOutcome, ParseRequest, Specificity};

/// Why a single canonical document could not become an event
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("document does not match the event schema: {0}")]
    Schema(#[from] serde_json::Error),
}

/// Wire shape of a canonical event document
#[derive(Debug, Deserialize)]
struct CanonicalEvent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    date: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reference_id: Option<String>,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    count: Option<i64>,
    #[serde(default)]
    data: Map<String, Value>,
}

/// Decode one canonical document into an event with no owner ids yet
pub fn decode_canonical(node: &Value) -> Result<Event, DecodeError> {
    if !node.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    let doc = CanonicalEvent::deserialize(node)?;

    let kind = match doc.kind.as_deref().map(str::trim) {
        Some(kind) if !kind.is_empty() => EventKind::from(kind),
        _ if doc.data.contains_key(data_keys::ERROR) => EventKind::Error,
        _ => EventKind::Log,
    };
    let date = doc
        .date
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let mut event = Event::new("", "", "", kind, date);
    event.source = doc.source;
    event.message = doc.message;
    event.tags = doc.tags;
    event.reference_id = doc.reference_id;
    event.value = doc.value;
    event.count = doc.count;
    event.data = doc.data;

    if matches!(
        event.kind,
        EventKind::Session | EventKind::SessionEnd | EventKind::SessionHeartbeat
    ) {
        event.session_id = event
            .data
            .get(data_keys::SESSION_ID)
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| event.reference_id.clone());
    }
    event.ensure_session_state();

    Ok(event)
}

/// Decode an already-split batch, skipping documents that do not decode
pub(crate) fn decode_documents<'a>(nodes: impl IntoIterator<Item = &'a Value>) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    for node in nodes {
        match decode_canonical(node) {
            Ok(event) => outcome.events.push(event),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping undecodable document");
                outcome.skipped += 1;
            }
        }
    }
    outcome
}

/// Decoder for payloads already in the canonical schema
pub struct JsonEventDecoder;

impl EventDecoder for JsonEventDecoder {
    fn name(&self) -> &'static str {
        "json"
    }

    fn matches(&self, request: &ParseRequest<'_>) -> Option<Specificity> {
        (request.api_version >= 2 && request.is_json()).then_some(Specificity::Default)
    }

    fn decode(&self, request: &ParseRequest<'_>) -> Option<ParseOutcome> {
        let outcome = match serde_json::from_str::<Value>(request.input.trim()) {
            Ok(Value::Array(items)) => decode_documents(items.iter()),
            Ok(node) => decode_documents(std::iter::once(&node)),
            Err(e) => {
                tracing::debug!(error = %e, "Payload is not valid JSON");
                ParseOutcome {
                    events: Vec::new(),
                    skipped: 1,
                }
            }
        };
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_decodes_canonical_fields() {
        let event = decode_canonical(&json!({
            "type": "404",
            "source": "/missing",
            "date": "2014-02-05T10:27:45-06:00",
            "tags": ["web"],
            "message": "not found",
            "reference_id": "ref-1",
            "count": 3,
            "data": {"@request": {"client_ip_address": "10.0.0.9"}}
        }))
        .unwrap();

        assert_eq!(event.kind, EventKind::NotFound);
        assert_eq!(event.source.as_deref(), Some("/missing"));
        assert_eq!(
            event.occurrence_date,
            Utc.with_ymd_and_hms(2014, 2, 5, 16, 27, 45).unwrap()
        );
        assert_eq!(event.tags, vec!["web".to_string()]);
        assert_eq!(event.reference_id.as_deref(), Some("ref-1"));
        assert_eq!(event.count, Some(3));
        assert_eq!(event.client_ip_address(), Some("10.0.0.9"));
        assert!(event.id.is_empty());
    }

    #[test]
    fn test_infers_kind_and_date() {
        let before = Utc::now();
        let error = decode_canonical(&json!({"data": {"@error": {"message": "x"}}})).unwrap();
        assert_eq!(error.kind, EventKind::Error);
        assert!(error.occurrence_date >= before);

        let log = decode_canonical(&json!({"message": "hello"})).unwrap();
        assert_eq!(log.kind, EventKind::Log);
    }

    #[test]
    fn test_session_events_get_state() {
        let event = decode_canonical(&json!({
            "type": "session",
            "date": "2020-01-01T00:00:00Z",
            "reference_id": "abc"
        }))
        .unwrap();
        assert_eq!(event.session_id.as_deref(), Some("abc"));
        assert_eq!(event.session_start(), Some(event.occurrence_date));
        assert!(!event.is_session_end());

        let explicit = decode_canonical(&json!({
            "type": "session",
            "reference_id": "abc",
            "data": {"@session_id": "s-9"}
        }))
        .unwrap();
        assert_eq!(explicit.session_id.as_deref(), Some("s-9"));
    }

    #[test]
    fn test_bad_documents_are_skipped() {
        let request = ParseRequest::new(
            r#"[{"type":"log"}, {"date":"yesterday"}, 7, {"tags":"oops"}]"#,
            2,
            None,
        );
        let outcome = JsonEventDecoder.decode(&request).unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.skipped, 3);

        let broken = ParseRequest::new("{ nope", 2, None);
        let outcome = JsonEventDecoder.decode(&broken).unwrap();
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_only_matches_json_on_v2() {
        assert!(JsonEventDecoder
            .matches(&ParseRequest::new("{}", 1, None))
            .is_none());
        assert!(JsonEventDecoder
            .matches(&ParseRequest::new("hello", 2, None))
            .is_none());
        assert_eq!(
            JsonEventDecoder.matches(&ParseRequest::new(" [{}]", 2, None)),
            Some(Specificity::Default)
        );
    }
}
