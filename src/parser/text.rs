//! Plain text payloads: one log event per line

use chrono::Utc;

use crate::types::{Event, EventKind};

use super::{EventDecoder, ParseOutcome, ParseRequest, Specificity};

pub struct PlainTextDecoder;

impl EventDecoder for PlainTextDecoder {
    fn name(&self) -> &'static str {
        "text"
    }

    fn matches(&self, request: &ParseRequest<'_>) -> Option<Specificity> {
        (!request.is_json()).then_some(Specificity::Default)
    }

    fn decode(&self, request: &ParseRequest<'_>) -> Option<ParseOutcome> {
        let now = Utc::now();
        let events = request
            .input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| Event::new("", "", "", EventKind::Log, now).with_message(line))
            .collect();
        Some(ParseOutcome { events, skipped: 0 })
    }
}
