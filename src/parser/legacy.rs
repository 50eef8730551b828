//! Decoder for legacy (1.x) client payloads

use std::sync::Arc;

use crate::types::SchemaVersion;
use crate::upgrade::{UpgradeContext, UpgradePipeline, LEGACY_BASE_VERSION};

use super::json::decode_documents;
use super::{EventDecoder, ParseOutcome, ParseRequest, Specificity};

const LEGACY_PRODUCT: &str = "exceptionless";

/// Upgrades 1.x payloads to the canonical schema, then decodes them
pub struct LegacyErrorDecoder {
    pipeline: Arc<UpgradePipeline>,
}

impl LegacyErrorDecoder {
    pub fn new(pipeline: Arc<UpgradePipeline>) -> Self {
        Self { pipeline }
    }

    fn declared_version(request: &ParseRequest<'_>) -> Option<SchemaVersion> {
        request
            .client
            .as_ref()
            .filter(|c| c.product == LEGACY_PRODUCT)
            .and_then(|c| c.version)
    }
}

impl EventDecoder for LegacyErrorDecoder {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn matches(&self, request: &ParseRequest<'_>) -> Option<Specificity> {
        if !request.is_json() {
            return None;
        }
        match Self::declared_version(request) {
            Some(version) if version.major == 1 => Some(Specificity::Family),
            _ if request.api_version == 1 => Some(Specificity::Default),
            _ => None,
        }
    }

    fn decode(&self, request: &ParseRequest<'_>) -> Option<ParseOutcome> {
        // Version 1 of the API only ever carried legacy documents; without a
        // client version, run every step.
        let declared = Self::declared_version(request)
            .or_else(|| (request.api_version == 1).then_some(LEGACY_BASE_VERSION));
        let mut ctx = UpgradeContext::with_declared(request.input, declared, request.user_agent);

        if !self.pipeline.upgrade(&mut ctx) {
            return Some(ParseOutcome {
                events: Vec::new(),
                skipped: ctx.documents().len().max(1),
            });
        }

        // Newer-than-current batches pass through untouched; whatever does
        // not decode counts as skipped.
        let invalid = ctx.invalid_count();
        let mut outcome = decode_documents(ctx.valid_documents());
        outcome.skipped += invalid;
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;

    fn decoder() -> LegacyErrorDecoder {
        LegacyErrorDecoder::new(Arc::new(UpgradePipeline::with_default_steps()))
    }

    #[test]
    fn test_matches_legacy_clients() {
        let d = decoder();
        assert_eq!(
            d.matches(&ParseRequest::new("{}", 2, Some("exceptionless/1.0.0.844"))),
            Some(Specificity::Family)
        );
        assert_eq!(
            d.matches(&ParseRequest::new("{}", 1, None)),
            Some(Specificity::Default)
        );
        assert!(d
            .matches(&ParseRequest::new("{}", 2, Some("exceptionless/2.0.0.0")))
            .is_none());
        assert!(d.matches(&ParseRequest::new("text", 1, None)).is_none());
    }

    #[test]
    fn test_upgrades_then_decodes() {
        let input = r#"[
            {"Message":"first","Type":"System.Exception","OccurrenceDate":"2014-01-01T00:00:00Z",
             "RequestInfo":{"ClientIpAddress":"10.1.1.1"}},
            {"Message":"second","Inner":"broken"}
        ]"#;
        let outcome = decoder()
            .decode(&ParseRequest::new(input, 1, Some("exceptionless/1.0.0.850")))
            .unwrap();

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.skipped, 1);
        let event = &outcome.events[0];
        assert_eq!(event.kind, EventKind::Error);
        assert_eq!(event.message.as_deref(), Some("first"));
        assert_eq!(event.client_ip_address(), Some("10.1.1.1"));
    }

    #[test]
    fn test_unparseable_payload_counts_as_skipped() {
        let outcome = decoder()
            .decode(&ParseRequest::new("{ broken", 1, None))
            .unwrap();
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.skipped, 1);
    }
}
