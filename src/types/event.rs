//! Canonical event types
//!
//! An [`Event`] is a single occurrence reported by a client, grouped into a
//! stack (problem bucket) inside a project and organization. Events are
//! created by the parser and only ever mutated through the store's bulk and
//! session operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::request_info::RequestInfo;

/// Well-known keys inside [`Event::data`]
pub mod data_keys {
    pub const ERROR: &str = "@error";
    pub const REQUEST: &str = "@request";
    pub const ENVIRONMENT: &str = "@environment";
    pub const USER: &str = "@user";
    pub const USER_DESCRIPTION: &str = "@user_description";
    pub const SUBMISSION_CLIENT: &str = "@submission_client";
    pub const SESSION_ID: &str = "@session_id";
    pub const TRACE_LOG: &str = "@trace";
}

/// Kind of event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// An exception report
    Error,
    /// A missing resource (`404`)
    NotFound,
    /// A log message
    Log,
    /// A feature usage counter
    FeatureUsage,
    /// A client session; carries [`SessionState`]
    Session,
    /// Explicit end-of-session marker
    SessionEnd,
    /// Keep-alive for a running session
    SessionHeartbeat,
    /// Any type string this build does not know about, kept verbatim
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Error => "error",
            EventKind::NotFound => "404",
            EventKind::Log => "log",
            EventKind::FeatureUsage => "usage",
            EventKind::Session => "session",
            EventKind::SessionEnd => "sessionend",
            EventKind::SessionHeartbeat => "heartbeat",
            EventKind::Other(kind) => kind,
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self, EventKind::Session)
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => EventKind::Error,
            "404" => EventKind::NotFound,
            "log" => EventKind::Log,
            "usage" => EventKind::FeatureUsage,
            "session" => EventKind::Session,
            "sessionend" => EventKind::SessionEnd,
            "heartbeat" => EventKind::SessionHeartbeat,
            _ => EventKind::Other(value.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        EventKind::from(value.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness of a session event
///
/// `session_start` is the last time the session was seen active. It only
/// moves forward, and a session that has ended never reopens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_start: DateTime<Utc>,
    #[serde(default)]
    pub is_session_end: bool,
}

impl SessionState {
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self {
            session_start,
            is_session_end: false,
        }
    }

    /// Record activity; returns whether anything changed
    pub fn advance(&mut self, last_activity: DateTime<Utc>, is_session_end: bool) -> bool {
        if self.is_session_end {
            return false;
        }

        let mut changed = false;
        if last_activity > self.session_start {
            self.session_start = last_activity;
            changed = true;
        }
        if is_session_end {
            self.is_session_end = true;
            changed = true;
        }
        changed
    }

    /// Open iff not ended and last seen at or after `cutoff`
    pub fn is_open_at(&self, cutoff: DateTime<Utc>) -> bool {
        !self.is_session_end && self.session_start >= cutoff
    }
}

/// A canonical, parsed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Assigned by the store when the event is first persisted
    #[serde(default)]
    pub id: String,

    pub organization_id: String,
    pub project_id: String,
    pub stack_id: String,

    /// Client-reported time of the occurrence
    #[serde(rename = "date")]
    pub occurrence_date: DateTime<Utc>,

    #[serde(rename = "type")]
    pub kind: EventKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Client correlation id; not unique
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,

    #[serde(default)]
    pub is_fixed: bool,

    #[serde(default)]
    pub is_hidden: bool,

    /// Ingestion time
    #[serde(default = "Utc::now")]
    pub created_utc: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl Event {
    pub fn new(
        organization_id: impl Into<String>,
        project_id: impl Into<String>,
        stack_id: impl Into<String>,
        kind: EventKind,
        occurrence_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            organization_id: organization_id.into(),
            project_id: project_id.into(),
            stack_id: stack_id.into(),
            occurrence_date,
            kind,
            source: None,
            message: None,
            tags: Vec::new(),
            reference_id: None,
            session_id: None,
            session: None,
            value: None,
            count: None,
            is_fixed: false,
            is_hidden: false,
            created_utc: Utc::now(),
            data: Map::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn is_session(&self) -> bool {
        self.kind.is_session()
    }

    /// Make sure a session event carries session state, starting at its
    /// occurrence date
    pub fn ensure_session_state(&mut self) {
        if self.is_session() && self.session.is_none() {
            self.session = Some(SessionState::new(self.occurrence_date));
        }
    }

    /// Last-active time for session events
    pub fn session_start(&self) -> Option<DateTime<Utc>> {
        self.session.map(|s| s.session_start)
    }

    pub fn is_session_end(&self) -> bool {
        self.session.map(|s| s.is_session_end).unwrap_or(false)
    }

    /// Advance the session's last-active time and optionally close it.
    ///
    /// Returns false for non-session events and for sessions that are
    /// already closed.
    pub fn update_session_start(&mut self, last_activity: DateTime<Utc>, is_session_end: bool) -> bool {
        if !self.is_session() {
            return false;
        }
        self.ensure_session_state();
        match self.session.as_mut() {
            Some(session) => session.advance(last_activity, is_session_end),
            None => false,
        }
    }

    /// Request details stored under `data.@request`
    pub fn request_info(&self) -> Option<RequestInfo> {
        self.data
            .get(data_keys::REQUEST)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_request_info(&mut self, info: &RequestInfo) -> Result<(), serde_json::Error> {
        self.data
            .insert(data_keys::REQUEST.to_string(), serde_json::to_value(info)?);
        Ok(())
    }

    /// Client IP from the request info without deserializing all of it
    pub fn client_ip_address(&self) -> Option<&str> {
        self.data
            .get(data_keys::REQUEST)
            .and_then(|r| r.get("client_ip_address"))
            .and_then(Value::as_str)
    }

    /// Serialize event to a single JSON line
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize event from a JSON line
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn session_event(start: DateTime<Utc>) -> Event {
        let mut event = Event::new("org", "proj", "stack", EventKind::Session, start)
            .with_session_id("s-1");
        event.ensure_session_state();
        event
    }

    #[test]
    fn test_event_kind_serialization() {
        assert_eq!(serde_json::to_string(&EventKind::NotFound).unwrap(), "\"404\"");
        let parsed: EventKind = serde_json::from_str("\"session\"").unwrap();
        assert_eq!(parsed, EventKind::Session);
        let custom: EventKind = serde_json::from_str("\"deploy\"").unwrap();
        assert_eq!(custom, EventKind::Other("deploy".to_string()));
        assert_eq!(custom.to_string(), "deploy");
    }

    #[test]
    fn test_event_serialization() {
        let date = Utc::now();
        let event = Event::new("org", "proj", "stack", EventKind::Error, date)
            .with_message("boom")
            .with_tag("critical");

        let line = event.to_json_line().unwrap();
        assert!(line.contains("\"type\":\"error\""));
        assert!(line.contains("\"message\":\"boom\""));
        assert!(!line.contains("session"));

        let parsed = Event::from_json_line(&line).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_session_start_only_moves_forward() {
        let start = Utc::now() - Duration::minutes(10);
        let mut event = session_event(start);

        assert!(!event.update_session_start(start - Duration::minutes(1), false));
        assert_eq!(event.session_start(), Some(start));

        assert!(event.update_session_start(start + Duration::minutes(5), false));
        assert_eq!(event.session_start(), Some(start + Duration::minutes(5)));
    }

    #[test]
    fn test_closed_session_never_reopens() {
        let start = Utc::now() - Duration::minutes(10);
        let mut event = session_event(start);

        assert!(event.update_session_start(start + Duration::minutes(1), true));
        assert!(event.is_session_end());
        assert!(!event.update_session_start(start + Duration::minutes(2), false));
        assert!(event.is_session_end());
        assert_eq!(event.session_start(), Some(start + Duration::minutes(1)));
    }

    #[test]
    fn test_non_session_events_ignore_session_updates() {
        let mut event = Event::new("org", "proj", "stack", EventKind::Log, Utc::now());
        assert!(!event.update_session_start(Utc::now(), true));
        assert!(event.session.is_none());
    }

    #[test]
    fn test_session_open_window() {
        let now = Utc::now();
        let state = SessionState::new(now - Duration::minutes(5));
        assert!(state.is_open_at(now - Duration::minutes(30)));
        assert!(!state.is_open_at(now - Duration::minutes(1)));
    }

    #[test]
    fn test_request_info_accessors() {
        let mut event = Event::new("org", "proj", "stack", EventKind::Error, Utc::now());
        assert!(event.request_info().is_none());

        let info = RequestInfo {
            client_ip_address: Some("10.0.0.1".to_string()),
            path: Some("/checkout".to_string()),
            ..Default::default()
        };
        event.set_request_info(&info).unwrap();

        assert_eq!(event.client_ip_address(), Some("10.0.0.1"));
        assert_eq!(event.request_info(), Some(info));
        assert_eq!(event.data[data_keys::REQUEST]["path"], json!("/checkout"));
    }
}
