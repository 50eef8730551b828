//! Event and stack identifier generation

use uuid::Uuid;

use crate::types::{data_keys, Event};

/// New event id: a UUID v7 in lowercase simple (32 hex chars) form.
///
/// v7 ids lead with a millisecond timestamp, so they sort roughly by
/// creation time and always break ties between identical occurrence dates.
pub fn new_event_id() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Stack id for an event submitted without one.
///
/// Name-based (UUID v5) over the project, the event type, the error type
/// and the message or source, so repeats of the same problem land on the
/// same stack.
pub fn derive_stack_id(event: &Event) -> String {
    let error_type = event
        .data
        .get(data_keys::ERROR)
        .and_then(|e| e.get("type"))
        .and_then(|t| t.as_str())
        .unwrap_or_default();
    let subject = event
        .message
        .as_deref()
        .or(event.source.as_deref())
        .unwrap_or_default();

    let signature = format!(
        "{}\u{1f}{}\u{1f}{}\u{1f}{}",
        event.project_id, event.kind, error_type, subject
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, signature.as_bytes())
        .simple()
        .to_string()
}
