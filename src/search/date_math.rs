//! Date expressions used in range queries
//!
//! An expression is an anchor followed by any number of operations:
//!
//! ```text
//! now-1h          one hour ago
//! now/d           start of today (end of today when rounding up)
//! 2024-03-01||+1M an absolute anchor plus one month
//! 2024-03-01T12:00:00Z
//! ```
//!
//! Units: `s`, `m`, `h`, `d`, `w`, `M` (month), `y`.

use chrono::{
    DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};

use super::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Unit {
    fn parse(c: char) -> Option<Self> {
        match c {
            's' => Some(Unit::Second),
            'm' => Some(Unit::Minute),
            'h' | 'H' => Some(Unit::Hour),
            'd' => Some(Unit::Day),
            'w' => Some(Unit::Week),
            'M' => Some(Unit::Month),
            'y' => Some(Unit::Year),
            _ => None,
        }
    }
}

/// Evaluate an expression relative to `now`.
///
/// With `round_up`, a rounded or date-only expression resolves to the last
/// millisecond of its unit instead of the first, so inclusive upper bounds
/// cover the whole unit.
pub fn parse_date_expr(
    expr: &str,
    now: DateTime<Utc>,
    round_up: bool,
) -> Result<DateTime<Utc>, QueryError> {
    let expr = expr.trim();
    let invalid = |reason: &str| QueryError::InvalidDate {
        expr: expr.to_string(),
        reason: reason.to_string(),
    };

    let (mut value, math) = if let Some(rest) = expr.strip_prefix("now") {
        (now, rest)
    } else {
        let (anchor, rest) = match expr.split_once("||") {
            Some((anchor, rest)) => (anchor, rest),
            None => (expr, ""),
        };
        let date_only = rest.is_empty() && round_up;
        (parse_absolute(anchor, date_only).ok_or_else(|| invalid("unrecognised date"))?, rest)
    };

    let chars: Vec<char> = math.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let op = chars[i];
        i += 1;
        match op {
            '+' | '-' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let amount: i64 = if start == i {
                    1
                } else {
                    chars[start..i]
                        .iter()
                        .collect::<String>()
                        .parse()
                        .map_err(|_| invalid("amount out of range"))?
                };
                let unit = chars
                    .get(i)
                    .copied()
                    .and_then(Unit::parse)
                    .ok_or_else(|| invalid("missing or unknown unit"))?;
                i += 1;
                let amount = if op == '-' { -amount } else { amount };
                value = add(value, amount, unit).ok_or_else(|| invalid("date out of range"))?;
            }
            '/' => {
                let unit = chars
                    .get(i)
                    .copied()
                    .and_then(Unit::parse)
                    .ok_or_else(|| invalid("missing or unknown rounding unit"))?;
                i += 1;
                value = if round_up {
                    round_up_to(value, unit)
                } else {
                    round_down(value, unit)
                }
                .ok_or_else(|| invalid("date out of range"))?;
            }
            _ => return Err(invalid("expected '+', '-' or '/'")),
        }
    }

    Ok(value)
}

fn parse_absolute(text: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
    if end_of_day {
        round_up_to(start, Unit::Day)
    } else {
        Some(start)
    }
}

fn add(value: DateTime<Utc>, amount: i64, unit: Unit) -> Option<DateTime<Utc>> {
    let months = |n: i64| -> Option<DateTime<Utc>> {
        let magnitude = Months::new(u32::try_from(n.unsigned_abs()).ok()?);
        if n >= 0 {
            value.checked_add_months(magnitude)
        } else {
            value.checked_sub_months(magnitude)
        }
    };
    match unit {
        Unit::Second => value.checked_add_signed(Duration::try_seconds(amount)?),
        Unit::Minute => value.checked_add_signed(Duration::try_minutes(amount)?),
        Unit::Hour => value.checked_add_signed(Duration::try_hours(amount)?),
        Unit::Day => value.checked_add_signed(Duration::try_days(amount)?),
        Unit::Week => value.checked_add_signed(Duration::try_weeks(amount)?),
        Unit::Month => months(amount),
        Unit::Year => months(amount.checked_mul(12)?),
    }
}

fn round_down(value: DateTime<Utc>, unit: Unit) -> Option<DateTime<Utc>> {
    let naive = value.naive_utc();
    let date = naive.date();
    let floored = match unit {
        Unit::Second => date.and_hms_opt(naive.hour(), naive.minute(), naive.second()),
        Unit::Minute => date.and_hms_opt(naive.hour(), naive.minute(), 0),
        Unit::Hour => date.and_hms_opt(naive.hour(), 0, 0),
        Unit::Day => date.and_hms_opt(0, 0, 0),
        Unit::Week => {
            let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
            monday.and_hms_opt(0, 0, 0)
        }
        Unit::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?.and_hms_opt(0, 0, 0),
        Unit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)?.and_hms_opt(0, 0, 0),
    }?;
    Some(Utc.from_utc_datetime(&floored))
}

fn round_up_to(value: DateTime<Utc>, unit: Unit) -> Option<DateTime<Utc>> {
    let start = round_down(value, unit)?;
    add(start, 1, unit)?.checked_sub_signed(Duration::milliseconds(1))
}
