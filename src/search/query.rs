//! Query string parsing
//!
//! A small Lucene-like grammar: whitespace-separated clauses, implicitly
//! ANDed.
//!
//! ```text
//! stack:abc project:p1 date:[now-1h TO now+1h] -fixed:true "disk full"
//! ```
//!
//! `[a TO b]` is inclusive, `{a TO b}` exclusive, `*` leaves an end open.
//! A leading `-` negates a clause. Bare words are free-text terms.

use std::ops::Bound;

use chrono::{DateTime, Utc};

use super::date_math::parse_date_expr;
use super::filter::{Field, Filter};
use super::QueryError;

#[derive(Debug, Clone, PartialEq)]
enum ClauseValue {
    Single(String),
    Range {
        lower: String,
        upper: String,
        lower_inclusive: bool,
        upper_inclusive: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    negated: bool,
    field: Option<String>,
    value: ClauseValue,
}

/// Parse a query string into a filter. `now` anchors relative dates.
pub fn parse_query(query: &str, now: DateTime<Utc>) -> Result<Filter, QueryError> {
    let mut filter = Filter::All;
    for clause in lex(query)? {
        let part = build(clause, now)?;
        filter = filter.and(part);
    }
    Ok(filter)
}

fn lex(query: &str) -> Result<Vec<Clause>, QueryError> {
    let chars: Vec<char> = query.chars().collect();
    let mut clauses = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }

        let negated = chars[i] == '-' && chars.get(i + 1).map_or(false, |c| !c.is_whitespace());
        if negated {
            i += 1;
        }

        if chars[i] == '"' {
            let (text, next) = read_quoted(&chars, i)?;
            i = next;
            clauses.push(Clause {
                negated,
                field: None,
                value: ClauseValue::Single(text),
            });
            continue;
        }

        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() && chars[i] != ':' {
            i += 1;
        }
        let word: String = chars[start..i].iter().collect();

        if i < chars.len() && chars[i] == ':' {
            i += 1;
            let (value, next) = read_value(&chars, i, &word)?;
            i = next;
            clauses.push(Clause {
                negated,
                field: Some(word),
                value,
            });
        } else if word == "AND" && !negated {
            // Clauses are already conjunctive.
        } else {
            clauses.push(Clause {
                negated,
                field: None,
                value: ClauseValue::Single(word),
            });
        }
    }

    Ok(clauses)
}

fn read_quoted(chars: &[char], open: usize) -> Result<(String, usize), QueryError> {
    let mut i = open + 1;
    let mut text = String::new();
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((text, i + 1)),
            '\\' if i + 1 < chars.len() => {
                text.push(chars[i + 1]);
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(QueryError::UnterminatedQuote)
}

fn read_value(chars: &[char], start: usize, field: &str) -> Result<(ClauseValue, usize), QueryError> {
    match chars.get(start) {
        None => Err(QueryError::MissingValue(field.to_string())),
        Some(c) if c.is_whitespace() => Err(QueryError::MissingValue(field.to_string())),
        Some('"') => {
            let (text, next) = read_quoted(chars, start)?;
            Ok((ClauseValue::Single(text), next))
        }
        Some(&open) if open == '[' || open == '{' => {
            let close = chars[start + 1..]
                .iter()
                .position(|c| *c == ']' || *c == '}')
                .map(|p| start + 1 + p)
                .ok_or_else(|| QueryError::UnbalancedRange(field.to_string()))?;
            let inner: String = chars[start + 1..close].iter().collect();
            let (lower, upper) = split_range(&inner)
                .ok_or_else(|| QueryError::UnbalancedRange(field.to_string()))?;
            Ok((
                ClauseValue::Range {
                    lower,
                    upper,
                    lower_inclusive: open == '[',
                    upper_inclusive: chars[close] == ']',
                },
                close + 1,
            ))
        }
        Some(_) => {
            let mut i = start;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            Ok((ClauseValue::Single(chars[start..i].iter().collect()), i))
        }
    }
}

fn split_range(inner: &str) -> Option<(String, String)> {
    let mut parts = inner.split_whitespace();
    let lower = parts.next()?;
    if parts.next()? != "TO" {
        return None;
    }
    let upper = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((lower.to_string(), upper.to_string()))
}

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Term(Field),
    Flag(Field),
    Date(Field),
}

fn resolve_field(name: &str) -> Option<FieldKind> {
    let kind = match name.to_ascii_lowercase().as_str() {
        "id" => FieldKind::Term(Field::Id),
        "organization" | "org" | "organization_id" => FieldKind::Term(Field::Organization),
        "project" | "project_id" => FieldKind::Term(Field::Project),
        "stack" | "stack_id" => FieldKind::Term(Field::Stack),
        "type" => FieldKind::Term(Field::Kind),
        "reference" | "reference_id" => FieldKind::Term(Field::Reference),
        "session" | "session_id" => FieldKind::Term(Field::Session),
        "ip" | "client_ip" => FieldKind::Term(Field::ClientIp),
        "tag" | "tags" => FieldKind::Term(Field::Tag),
        "fixed" | "is_fixed" => FieldKind::Flag(Field::Fixed),
        "hidden" | "is_hidden" => FieldKind::Flag(Field::Hidden),
        "session_end" | "is_session_end" => FieldKind::Flag(Field::SessionEnd),
        "date" => FieldKind::Date(Field::Date),
        "session_start" => FieldKind::Date(Field::SessionStart),
        _ => return None,
    };
    Some(kind)
}

fn build(clause: Clause, now: DateTime<Utc>) -> Result<Filter, QueryError> {
    let Clause {
        negated,
        field,
        value,
    } = clause;

    let filter = match field {
        None => match value {
            ClauseValue::Single(text) => Filter::Text(text),
            ClauseValue::Range { .. } => return Err(QueryError::UnbalancedRange(String::new())),
        },
        Some(name) => {
            let kind = resolve_field(&name).ok_or_else(|| QueryError::UnknownField(name.clone()))?;
            build_field(&name, kind, value, now)?
        }
    };

    Ok(if negated { filter.negate() } else { filter })
}

fn build_field(
    name: &str,
    kind: FieldKind,
    value: ClauseValue,
    now: DateTime<Utc>,
) -> Result<Filter, QueryError> {
    let invalid = |value: &str| QueryError::InvalidValue {
        field: name.to_string(),
        value: value.to_string(),
    };

    match (kind, value) {
        (FieldKind::Term(field), ClauseValue::Single(v)) if v == "*" => Ok(Filter::Exists(field)),
        (FieldKind::Term(field), ClauseValue::Single(v)) => Ok(Filter::term(field, v)),
        (FieldKind::Flag(field), ClauseValue::Single(v)) => match v.to_ascii_lowercase().as_str() {
            "true" => Ok(Filter::flag(field, true)),
            "false" => Ok(Filter::flag(field, false)),
            _ => Err(invalid(&v)),
        },
        (FieldKind::Date(field), ClauseValue::Single(v)) => {
            if v == "*" {
                return Ok(Filter::Exists(field));
            }
            Ok(Filter::DateRange {
                field,
                lower: Bound::Included(parse_date_expr(&v, now, false)?),
                upper: Bound::Included(parse_date_expr(&v, now, true)?),
            })
        }
        (
            FieldKind::Date(field),
            ClauseValue::Range {
                lower,
                upper,
                lower_inclusive,
                upper_inclusive,
            },
        ) => {
            let lower = match lower.as_str() {
                "*" => Bound::Unbounded,
                expr if lower_inclusive => Bound::Included(parse_date_expr(expr, now, false)?),
                expr => Bound::Excluded(parse_date_expr(expr, now, true)?),
            };
            let upper = match upper.as_str() {
                "*" => Bound::Unbounded,
                expr if upper_inclusive => Bound::Included(parse_date_expr(expr, now, true)?),
                expr => Bound::Excluded(parse_date_expr(expr, now, false)?),
            };
            Ok(Filter::DateRange {
                field,
                lower,
                upper,
            })
        }
        (_, ClauseValue::Range { lower, upper, .. }) => {
            Err(invalid(&format!("[{} TO {}]", lower, upper)))
        }
    }
}
