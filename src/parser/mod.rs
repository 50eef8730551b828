//! Event parsing
//!
//! Turns submitted payload text into canonical [`Event`]s. Several decoders
//! are registered; for each payload the candidates are ranked by how
//! specifically they match the submitting client and the first one that
//! accepts the payload wins.

mod json;
mod legacy;
mod text;

use std::cmp::Reverse;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::types::{Event, SchemaVersion};
use crate::upgrade::UpgradePipeline;

pub use json::{decode_canonical, DecodeError, JsonEventDecoder};
pub use legacy::LegacyErrorDecoder;
pub use text::PlainTextDecoder;

/// Payload-level parse failure. Per-document failures are counted in
/// [`ParseOutcome::skipped`] instead.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("payload is empty")]
    EmptyInput,

    #[error("no decoder accepts payloads for api version {api_version} from '{user_agent}'")]
    NoDecoder {
        api_version: u32,
        user_agent: String,
    },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Submitting client, parsed from a `product/version` user agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub product: String,
    pub version: Option<SchemaVersion>,
}

impl ClientIdentity {
    pub fn parse(user_agent: &str) -> Option<Self> {
        let user_agent = user_agent.trim();
        if user_agent.is_empty() {
            return None;
        }
        let (product, version) = match user_agent.split_once('/') {
            Some((product, version)) => (product, SchemaVersion::parse_lenient(version)),
            None => (user_agent, None),
        };
        Some(Self {
            product: product.trim().to_ascii_lowercase(),
            version,
        })
    }
}

/// Everything a decoder gets to look at
#[derive(Debug, Clone)]
pub struct ParseRequest<'a> {
    pub input: &'a str,
    pub api_version: u32,
    pub user_agent: Option<&'a str>,
    pub client: Option<ClientIdentity>,
}

impl<'a> ParseRequest<'a> {
    pub fn new(input: &'a str, api_version: u32, user_agent: Option<&'a str>) -> Self {
        Self {
            input,
            api_version,
            user_agent,
            client: user_agent.and_then(ClientIdentity::parse),
        }
    }

    /// Whether the payload looks like JSON
    pub fn is_json(&self) -> bool {
        let trimmed = self.input.trim_start();
        trimmed.starts_with('{') || trimmed.starts_with('[')
    }
}

/// How closely a decoder matches a request; higher wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    Default,
    Family,
    Exact,
}

/// Events decoded from one payload, plus the count of documents dropped
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub events: Vec<Event>,
    pub skipped: usize,
}

/// A payload decoder
pub trait EventDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// How specifically this decoder matches the request, or `None`
    fn matches(&self, request: &ParseRequest<'_>) -> Option<Specificity>;

    /// Decode the payload. `None` hands the payload to the next candidate.
    fn decode(&self, request: &ParseRequest<'_>) -> Option<ParseOutcome>;
}

/// Registry of decoders
pub struct EventParser {
    decoders: Vec<Box<dyn EventDecoder>>,
}

impl EventParser {
    pub fn new() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Legacy, JSON and plain-text decoders, in that order
    pub fn with_default_decoders(pipeline: Arc<UpgradePipeline>) -> Self {
        let mut parser = Self::new();
        parser.register_decoder(Box::new(LegacyErrorDecoder::new(pipeline)));
        parser.register_decoder(Box::new(JsonEventDecoder));
        parser.register_decoder(Box::new(PlainTextDecoder));
        parser
    }

    pub fn register_decoder(&mut self, decoder: Box<dyn EventDecoder>) {
        self.decoders.push(decoder);
    }

    pub fn decoder_count(&self) -> usize {
        self.decoders.len()
    }

    /// Parse a payload, reporting how many documents were skipped
    pub fn parse(
        &self,
        input: &str,
        api_version: u32,
        user_agent: Option<&str>,
    ) -> ParseResult<ParseOutcome> {
        if input.trim().is_empty() {
            return Err(ParseError::EmptyInput);
        }

        let request = ParseRequest::new(input, api_version, user_agent);

        let mut candidates: Vec<(Specificity, &dyn EventDecoder)> = self
            .decoders
            .iter()
            .filter_map(|d| d.matches(&request).map(|s| (s, d.as_ref())))
            .collect();
        // Stable sort keeps registration order among equals.
        candidates.sort_by_key(|(specificity, _)| Reverse(*specificity));

        for (specificity, decoder) in candidates {
            debug!(
                decoder = decoder.name(),
                specificity = ?specificity,
                api_version,
                "Trying decoder"
            );
            if let Some(outcome) = decoder.decode(&request) {
                if outcome.skipped > 0 {
                    warn!(
                        decoder = decoder.name(),
                        skipped = outcome.skipped,
                        parsed = outcome.events.len(),
                        "Skipped malformed documents"
                    );
                }
                return Ok(outcome);
            }
        }

        Err(ParseError::NoDecoder {
            api_version,
            user_agent: user_agent.unwrap_or_default().to_string(),
        })
    }

    /// Parse a payload into events. Never fails; failures are logged and
    /// yield no events.
    pub fn parse_events(&self, input: &str, api_version: u32, user_agent: Option<&str>) -> Vec<Event> {
        match self.parse(input, api_version, user_agent) {
            Ok(outcome) => outcome.events,
            Err(e) => {
                error!(error = %e, "Failed to parse payload");
                Vec::new()
            }
        }
    }
}

impl Default for EventParser {
    fn default() -> Self {
        Self::with_default_decoders(Arc::new(UpgradePipeline::with_default_steps()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use chrono::Utc;

    struct FixedDecoder {
        name: &'static str,
        specificity: Specificity,
        accept: bool,
    }

    impl EventDecoder for FixedDecoder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn matches(&self, _request: &ParseRequest<'_>) -> Option<Specificity> {
            Some(self.specificity)
        }

        fn decode(&self, _request: &ParseRequest<'_>) -> Option<ParseOutcome> {
            if !self.accept {
                return None;
            }
            let event = Event::new("", "", "", EventKind::Log, Utc::now()).with_message(self.name);
            Some(ParseOutcome {
                events: vec![event],
                skipped: 0,
            })
        }
    }

    fn fixed(name: &'static str, specificity: Specificity, accept: bool) -> Box<dyn EventDecoder> {
        Box::new(FixedDecoder {
            name,
            specificity,
            accept,
        })
    }

    fn winner(parser: &EventParser) -> String {
        let events = parser.parse_events("payload", 2, Some("test/1.0"));
        events[0].message.clone().unwrap_or_default()
    }

    #[test]
    fn test_client_identity() {
        let client = ClientIdentity::parse("Exceptionless/1.0.0.844").unwrap();
        assert_eq!(client.product, "exceptionless");
        assert_eq!(client.version, Some(SchemaVersion::new(1, 0, 0, 844)));

        let bare = ClientIdentity::parse("curl").unwrap();
        assert_eq!(bare.version, None);
        assert!(ClientIdentity::parse("  ").is_none());
    }

    #[test]
    fn test_most_specific_decoder_wins() {
        let mut parser = EventParser::new();
        parser.register_decoder(fixed("default", Specificity::Default, true));
        parser.register_decoder(fixed("family", Specificity::Family, true));
        parser.register_decoder(fixed("exact", Specificity::Exact, true));
        assert_eq!(winner(&parser), "exact");
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let mut parser = EventParser::new();
        parser.register_decoder(fixed("first", Specificity::Family, true));
        parser.register_decoder(fixed("second", Specificity::Family, true));
        assert_eq!(winner(&parser), "first");
    }

    #[test]
    fn test_declining_decoder_falls_through() {
        let mut parser = EventParser::new();
        parser.register_decoder(fixed("exact", Specificity::Exact, false));
        parser.register_decoder(fixed("default", Specificity::Default, true));
        assert_eq!(winner(&parser), "default");
    }

    #[test]
    fn test_no_decoder_and_empty_input() {
        let parser = EventParser::new();
        assert!(matches!(
            parser.parse("payload", 2, None),
            Err(ParseError::NoDecoder { .. })
        ));
        assert!(matches!(parser.parse("   ", 2, None), Err(ParseError::EmptyInput)));
        assert!(parser.parse_events("payload", 2, None).is_empty());
    }

    #[test]
    fn test_default_parser_routes_by_shape() {
        let parser = EventParser::default();
        assert_eq!(parser.decoder_count(), 3);

        let json = parser
            .parse(r#"{"type":"log","message":"json"}"#, 2, None)
            .unwrap();
        assert_eq!(json.events[0].message.as_deref(), Some("json"));

        let text = parser.parse("line one\nline two\n", 2, None).unwrap();
        assert_eq!(text.events.len(), 2);
        assert_eq!(text.events[1].message.as_deref(), Some("line two"));
    }
}
