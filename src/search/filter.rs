//! Filter expressions evaluated against events

use std::ops::Bound;

use chrono::{DateTime, Utc};

use crate::types::{DateRange, Event};

/// Event fields a filter can address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Organization,
    Project,
    Stack,
    Kind,
    Date,
    SessionStart,
    Fixed,
    Hidden,
    SessionEnd,
    Reference,
    Session,
    ClientIp,
    Tag,
}

/// Composite sort key: occurrence date, then id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub date: DateTime<Utc>,
    pub id: String,
}

impl SortKey {
    pub fn new(date: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            date,
            id: id.into(),
        }
    }

    pub fn of(event: &Event) -> Self {
        Self::new(event.occurrence_date, event.id.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Term { field: Field, value: String },
    Flag { field: Field, value: bool },
    DateRange {
        field: Field,
        lower: Bound<DateTime<Utc>>,
        upper: Bound<DateTime<Utc>>,
    },
    /// Range over `(date, id)`, used for navigation
    KeyRange {
        lower: Bound<SortKey>,
        upper: Bound<SortKey>,
    },
    Exists(Field),
    /// Free text against message, source and tags
    Text(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn term(field: Field, value: impl Into<String>) -> Self {
        Filter::Term {
            field,
            value: value.into(),
        }
    }

    pub fn flag(field: Field, value: bool) -> Self {
        Filter::Flag { field, value }
    }

    /// Occurrence date within `range`, both ends inclusive
    pub fn occurred_within(range: &DateRange) -> Self {
        if range.is_unbounded() {
            return Filter::All;
        }
        Filter::DateRange {
            field: Field::Date,
            lower: range.start.map_or(Bound::Unbounded, Bound::Included),
            upper: range.end.map_or(Bound::Unbounded, Bound::Included),
        }
    }

    /// Conjunction, flattening nested `And`s and dropping `All`
    pub fn and(self, other: Filter) -> Self {
        let mut parts = Vec::new();
        for part in [self, other] {
            match part {
                Filter::All => {}
                Filter::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => Filter::All,
            1 => parts.remove(0),
            _ => Filter::And(parts),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Filter::Not(inner) => *inner,
            other => Filter::Not(Box::new(other)),
        }
    }

    /// Value of a term on `field` that every match must carry, if any
    pub fn pinned_term(&self, field: Field) -> Option<&str> {
        match self {
            Filter::Term { field: f, value } if *f == field => Some(value),
            Filter::And(parts) => parts.iter().find_map(|p| p.pinned_term(field)),
            _ => None,
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Filter::All => true,
            Filter::Term { field, value } => term_matches(event, *field, value),
            Filter::Flag { field, value } => flag_value(event, *field) == Some(*value),
            Filter::DateRange {
                field,
                lower,
                upper,
            } => date_value(event, *field).map_or(false, |d| in_bounds(&d, lower, upper)),
            Filter::KeyRange { lower, upper } => in_bounds(&SortKey::of(event), lower, upper),
            Filter::Exists(field) => exists(event, *field),
            Filter::Text(text) => text_matches(event, text),
            Filter::And(parts) => parts.iter().all(|p| p.matches(event)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(event)),
            Filter::Not(inner) => !inner.matches(event),
        }
    }
}

fn term_matches(event: &Event, field: Field, value: &str) -> bool {
    match field {
        Field::Id => event.id == value,
        Field::Organization => event.organization_id == value,
        Field::Project => event.project_id == value,
        Field::Stack => event.stack_id == value,
        Field::Kind => event.kind.as_str().eq_ignore_ascii_case(value),
        Field::Reference => event.reference_id.as_deref() == Some(value),
        Field::Session => event.session_id.as_deref() == Some(value),
        Field::ClientIp => event.client_ip_address() == Some(value),
        Field::Tag => event.tags.iter().any(|t| t.eq_ignore_ascii_case(value)),
        Field::Date | Field::SessionStart | Field::Fixed | Field::Hidden | Field::SessionEnd => {
            false
        }
    }
}

fn flag_value(event: &Event, field: Field) -> Option<bool> {
    match field {
        Field::Fixed => Some(event.is_fixed),
        Field::Hidden => Some(event.is_hidden),
        Field::SessionEnd => event.session.map(|s| s.is_session_end),
        _ => None,
    }
}

fn date_value(event: &Event, field: Field) -> Option<DateTime<Utc>> {
    match field {
        Field::Date => Some(event.occurrence_date),
        Field::SessionStart => event.session_start(),
        _ => None,
    }
}

fn exists(event: &Event, field: Field) -> bool {
    match field {
        Field::Reference => event.reference_id.is_some(),
        Field::Session => event.session_id.is_some(),
        Field::SessionStart | Field::SessionEnd => event.session.is_some(),
        Field::ClientIp => event.client_ip_address().is_some(),
        Field::Tag => !event.tags.is_empty(),
        _ => true,
    }
}

fn in_bounds<T: Ord>(value: &T, lower: &Bound<T>, upper: &Bound<T>) -> bool {
    let above = match lower {
        Bound::Included(l) => value >= l,
        Bound::Excluded(l) => value > l,
        Bound::Unbounded => true,
    };
    let below = match upper {
        Bound::Included(u) => value <= u,
        Bound::Excluded(u) => value < u,
        Bound::Unbounded => true,
    };
    above && below
}

fn text_matches(event: &Event, text: &str) -> bool {
    let needles = tokenize(text);
    if needles.is_empty() {
        return true;
    }

    let mut haystack = Vec::new();
    for field in [event.message.as_deref(), event.source.as_deref()]
        .into_iter()
        .flatten()
    {
        haystack.extend(tokenize(field));
    }
    for tag in &event.tags {
        haystack.extend(tokenize(tag));
    }

    // Partial token match, so `timeout` finds `TimeoutException`.
    needles
        .iter()
        .all(|needle| haystack.iter().any(|token| token.contains(needle.as_str())))
}

/// Split text into lowercase tokens on whitespace and punctuation
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| s.len() >= 2)
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventKind, RequestInfo};
    use chrono::Duration;

    fn event() -> Event {
        let mut event = Event::new("org", "proj", "stack", EventKind::Error, Utc::now())
            .with_message("Connection TimeoutException while saving")
            .with_tag("Database");
        event.id = "e1".to_string();
        event
            .set_request_info(&RequestInfo {
                client_ip_address: Some("10.0.0.1".to_string()),
                ..Default::default()
            })
            .unwrap();
        event
    }

    #[test]
    fn test_terms_and_flags() {
        let e = event();
        assert!(Filter::term(Field::Stack, "stack").matches(&e));
        assert!(!Filter::term(Field::Stack, "other").matches(&e));
        assert!(Filter::term(Field::Kind, "ERROR").matches(&e));
        assert!(Filter::term(Field::Tag, "database").matches(&e));
        assert!(Filter::term(Field::ClientIp, "10.0.0.1").matches(&e));
        assert!(Filter::flag(Field::Fixed, false).matches(&e));
        assert!(!Filter::flag(Field::Hidden, true).matches(&e));
        assert!(!Filter::flag(Field::SessionEnd, false).matches(&e));
    }

    #[test]
    fn test_date_range_bounds() {
        let e = event();
        let at = e.occurrence_date;
        let inclusive = Filter::DateRange {
            field: Field::Date,
            lower: Bound::Included(at),
            upper: Bound::Included(at),
        };
        assert!(inclusive.matches(&e));

        let exclusive = Filter::DateRange {
            field: Field::Date,
            lower: Bound::Excluded(at),
            upper: Bound::Unbounded,
        };
        assert!(!exclusive.matches(&e));

        let within = Filter::occurred_within(&DateRange::between(
            at - Duration::minutes(1),
            at + Duration::minutes(1),
        ));
        assert!(within.matches(&e));
    }

    #[test]
    fn test_key_range_breaks_ties_on_id() {
        let e = event();
        let same_date_bigger_id = SortKey::new(e.occurrence_date, "e2");
        let before = Filter::KeyRange {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(same_date_bigger_id),
        };
        assert!(before.matches(&e));
    }

    #[test]
    fn test_text_is_partial_and_conjunctive() {
        let e = event();
        assert!(Filter::Text("timeout".into()).matches(&e));
        assert!(Filter::Text("timeout saving".into()).matches(&e));
        assert!(!Filter::Text("timeout deadlock".into()).matches(&e));
        assert!(Filter::Text("datab".into()).matches(&e));
    }

    #[test]
    fn test_and_flattens_and_pins() {
        let filter = Filter::term(Field::Organization, "org")
            .and(Filter::All)
            .and(Filter::term(Field::Stack, "stack").and(Filter::flag(Field::Fixed, true)));
        match &filter {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected filter {:?}", other),
        }
        assert_eq!(filter.pinned_term(Field::Stack), Some("stack"));
        assert_eq!(filter.pinned_term(Field::Project), None);
        assert_eq!(Filter::All.and(Filter::All), Filter::All);
    }

    #[test]
    fn test_negation() {
        let e = event();
        let not_fixed = Filter::flag(Field::Fixed, true).negate();
        assert!(not_fixed.matches(&e));
        assert_eq!(not_fixed.negate(), Filter::flag(Field::Fixed, true));
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("Hello, World! This is a TEST.");
        assert!(tokens.contains(&"hello".to_string()));
        assert!(tokens.contains(&"test".to_string()));
        assert!(!tokens.contains(&"a".to_string()));
        assert!(tokens.contains(&"is".to_string()));
    }
}
