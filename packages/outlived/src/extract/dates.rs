//! Date parsing for infobox cells and intro parentheticals.
//!
//! Recognises "August 9, 1995" and "9 August 1995", each optionally
//! followed by "BC" or "BCE". The first date in the text wins; cells often
//! carry places, ages and hidden ISO spans after it.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{DateError, DateResult};
use crate::types::date::{Date, MONTH_NAMES};

static MONTH_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(?i:({}))\s+(\d+),\s*(\d+)(?:\s+(BCE?)\b)?",
        MONTH_NAMES.join("|")
    ))
    .expect("month-first date pattern")
});

static DAY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(\d+)\s+(?i:({}))\s+(\d+)(?:\s+(BCE?)\b)?",
        MONTH_NAMES.join("|")
    ))
    .expect("day-first date pattern")
});

// Same layouts with any word in the month position, to tell an unknown
// month from text with no date at all.
static ANY_MONTH_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\p{L}+)\.?\s+\d+,\s*\d+").expect("month-first shape"));

static ANY_DAY_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\s+(\p{L}+)\.?\s+\d+").expect("day-first shape"));

/// Month number for an English month name, ignoring case.
pub fn month_from_name(name: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name.trim()))
        .map(|i| i as u32 + 1)
}

/// Parse the first date found in `text`.
pub fn parse_date(text: &str) -> DateResult<Date> {
    let month_first = MONTH_FIRST.captures(text);
    let day_first = DAY_FIRST.captures(text);

    let start = |c: &Captures<'_>| c.get(0).map_or(usize::MAX, |m| m.start());
    match (month_first, day_first) {
        (Some(mf), Some(df)) if start(&df) < start(&mf) => from_day_first(&df),
        (Some(mf), _) => from_month_first(&mf),
        (None, Some(df)) => from_day_first(&df),
        (None, None) => Err(no_known_month(text)),
    }
}

/// Build a date from its textual components.
///
/// `bce` negates the year. The day is checked against the month length of
/// that year.
pub fn parse_date_parts(year: &str, month: &str, day: &str, bce: bool) -> DateResult<Date> {
    let month = month_from_name(month).ok_or_else(|| DateError::UnknownMonth {
        name: month.to_string(),
    })?;
    let day: u32 = day.trim().parse().map_err(|_| DateError::InvalidNumber {
        field: "day",
        value: day.to_string(),
    })?;
    let year: i32 = year.trim().parse().map_err(|_| DateError::InvalidNumber {
        field: "year",
        value: year.to_string(),
    })?;
    Date::new(if bce { -year } else { year }, month, day)
}

fn from_month_first(c: &Captures<'_>) -> DateResult<Date> {
    parse_date_parts(&c[3], &c[1], &c[2], c.get(4).is_some())
}

fn from_day_first(c: &Captures<'_>) -> DateResult<Date> {
    parse_date_parts(&c[3], &c[2], &c[1], c.get(4).is_some())
}

fn no_known_month(text: &str) -> DateError {
    let candidate = ANY_MONTH_FIRST
        .captures(text)
        .or_else(|| ANY_DAY_FIRST.captures(text));
    match candidate {
        Some(c) => DateError::UnknownMonth {
            name: c[1].to_string(),
        },
        None => DateError::NoMatch {
            text: text.to_string(),
        },
    }
}
