//! Historical calendar dates.
//!
//! Years are numbered the way biographies write them: `44` is AD 44, `-44`
//! is 44 BC and there is no year zero. Internally a date is a proleptic
//! Gregorian [`NaiveDate`] on the astronomical scale (1 BC is year 0), so
//! leap years and day arithmetic agree with each other across the era
//! boundary.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{DateError, DateResult};

/// English month names, January first.
pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Largest absolute year accepted.
pub const MAX_YEAR: i32 = 200_000;

/// Name of a month, `1` is January.
pub fn month_name(month: u32) -> Option<&'static str> {
    MONTH_NAMES.get(month.checked_sub(1)? as usize).copied()
}

/// Converts a historical year to the astronomical year (1 BC is 0).
pub fn astronomical_year(year: i32) -> i32 {
    if year < 0 {
        year + 1
    } else {
        year
    }
}

/// Whether a historical year has a February 29th.
pub fn is_leap_year(year: i32) -> bool {
    let y = astronomical_year(year);
    y % 4 == 0 && (y % 100 != 0 || y % 400 == 0)
}

/// Days in a month of a historical year, `None` for months outside 1-12.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let days = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => return None,
    };
    Some(days)
}

/// A validated calendar date with a signed historical year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "DateParts", into = "DateParts")]
pub struct Date(NaiveDate);

/// Wire form of a [`Date`]: `{"y": -44, "m": 3, "d": 15}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateParts {
    pub y: i32,
    pub m: u32,
    pub d: u32,
}

impl Date {
    /// Build a date, rejecting year zero and days the month does not have.
    pub fn new(year: i32, month: u32, day: u32) -> DateResult<Self> {
        if year == 0 {
            return Err(DateError::YearZero);
        }
        if year.abs() > MAX_YEAR {
            return Err(DateError::YearOutOfRange { year });
        }
        let last = days_in_month(year, month).ok_or(DateError::MonthOutOfRange { month })?;
        if day == 0 || day > last {
            return Err(DateError::DayOutOfRange { year, month, day });
        }
        NaiveDate::from_ymd_opt(astronomical_year(year), month, day)
            .map(Self)
            .ok_or(DateError::DayOutOfRange { year, month, day })
    }

    /// Historical year, negative for BC.
    pub fn year(&self) -> i32 {
        let y = self.0.year();
        if y <= 0 {
            y - 1
        } else {
            y
        }
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn is_bce(&self) -> bool {
        self.year() < 0
    }

    /// The underlying proleptic Gregorian date.
    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// Whole days from `self` to `later` (negative if `later` is earlier).
    pub fn days_until(&self, later: &Date) -> i64 {
        (later.0 - self.0).num_days()
    }

    /// "March 15, 44 BC" style rendering, as it appears in article text.
    pub fn long_form(&self) -> String {
        let month = MONTH_NAMES[self.month() as usize - 1];
        if self.is_bce() {
            format!("{} {}, {} BC", month, self.day(), -self.year())
        } else {
            format!("{} {}, {}", month, self.day(), self.year())
        }
    }

    /// Parse the `YYYY-MM-DD` rendering produced by `Display`.
    ///
    /// The year may carry a leading `-` for BC and is not zero padded.
    pub fn from_iso(text: &str) -> DateResult<Self> {
        let invalid = || DateError::InvalidIso {
            text: text.to_string(),
        };
        let trimmed = text.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let mut parts = rest.splitn(3, '-');
        let (Some(y), Some(m), Some(d)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        if [y, m, d]
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(invalid());
        }
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        let day: u32 = d.parse().map_err(|_| invalid())?;
        Date::new(if negative { -year } else { year }, month, day)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}-{:02}", self.year(), self.month(), self.day())
    }
}

impl FromStr for Date {
    type Err = DateError;

    fn from_str(s: &str) -> DateResult<Self> {
        Date::from_iso(s)
    }
}

impl TryFrom<DateParts> for Date {
    type Error = DateError;

    fn try_from(parts: DateParts) -> DateResult<Self> {
        Date::new(parts.y, parts.m, parts.d)
    }
}

impl From<Date> for DateParts {
    fn from(date: Date) -> Self {
        Self {
            y: date.year(),
            m: date.month(),
            d: date.day(),
        }
    }
}

/// A lifespan split into whole years and the days left over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifespan {
    pub years: u32,
    pub days: u32,
}

impl Lifespan {
    /// Span from `born` to `died`, `None` if `died` is earlier.
    ///
    /// A year is counted at each anniversary; someone born on February 29th
    /// has their anniversary on February 28th in common years.
    pub fn between(born: &Date, died: &Date) -> Option<Self> {
        if died < born {
            return None;
        }
        let start = born.as_naive();
        let end = died.as_naive();
        let mut years = (end.year() - start.year()).max(0) as u32;
        loop {
            let anniversary = start.checked_add_months(Months::new(years.checked_mul(12)?))?;
            if anniversary <= end {
                let days = (end - anniversary).num_days();
                return Some(Self {
                    years,
                    days: u32::try_from(days).ok()?,
                });
            }
            years = years.checked_sub(1)?;
        }
    }
}

impl fmt::Display for Lifespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let years = if self.years == 1 { "year" } else { "years" };
        let days = if self.days == 1 { "day" } else { "days" };
        write!(f, "{} {}, {} {}", self.years, years, self.days, days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leap_years() {
        assert!(!is_leap_year(1900));
        assert!(is_leap_year(1904));
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(2001));
        // 1 BC is astronomical year 0
        assert!(is_leap_year(-1));
        assert!(!is_leap_year(-4));
        assert!(is_leap_year(-5));
    }

    #[test]
    fn test_february_validation() {
        assert!(Date::new(1900, 2, 29).is_err());
        assert!(Date::new(1904, 2, 29).is_ok());
        assert!(Date::new(2000, 2, 29).is_ok());
        for year in [1900, 1904, 2000, 2001, -44] {
            assert_eq!(
                Date::new(year, 2, 30),
                Err(DateError::DayOutOfRange {
                    year,
                    month: 2,
                    day: 30
                })
            );
        }
    }

    #[test]
    fn test_rejects_bad_parts() {
        assert_eq!(Date::new(0, 1, 1), Err(DateError::YearZero));
        assert_eq!(
            Date::new(1950, 13, 1),
            Err(DateError::MonthOutOfRange { month: 13 })
        );
        assert!(Date::new(1950, 4, 31).is_err());
        assert!(Date::new(1950, 4, 0).is_err());
        assert!(Date::new(MAX_YEAR + 1, 1, 1).is_err());
    }

    #[test]
    fn test_bce_accessors() {
        let ides = Date::new(-44, 3, 15).unwrap();
        assert_eq!(ides.year(), -44);
        assert_eq!(ides.month(), 3);
        assert_eq!(ides.day(), 15);
        assert!(ides.is_bce());
        assert_eq!(ides.as_naive().year(), -43);
    }

    #[test]
    fn test_ordering_across_era() {
        let bc = Date::new(-1, 12, 31).unwrap();
        let ad = Date::new(1, 1, 1).unwrap();
        assert!(bc < ad);
        assert_eq!(bc.days_until(&ad), 1);
    }

    #[test]
    fn test_days_until() {
        let a = Date::new(2003, 1, 1).unwrap();
        let b = Date::new(2005, 1, 1).unwrap();
        assert_eq!(a.days_until(&b), 731);
        assert_eq!(b.days_until(&a), -731);

        let feb = Date::new(1900, 2, 1).unwrap();
        let mar = Date::new(1900, 3, 1).unwrap();
        assert_eq!(feb.days_until(&mar), 28);

        let feb = Date::new(1904, 2, 1).unwrap();
        let mar = Date::new(1904, 3, 1).unwrap();
        assert_eq!(feb.days_until(&mar), 29);
    }

    #[test]
    fn test_iso_rendering() {
        assert_eq!(Date::new(1942, 8, 1).unwrap().to_string(), "1942-08-01");
        assert_eq!(Date::new(-44, 3, 15).unwrap().to_string(), "-44-03-15");
        assert_eq!(Date::new(7, 1, 2).unwrap().to_string(), "7-01-02");
    }

    #[test]
    fn test_iso_parsing() {
        assert_eq!(
            Date::from_iso("1942-08-01").unwrap(),
            Date::new(1942, 8, 1).unwrap()
        );
        assert_eq!(
            "-44-03-15".parse::<Date>().unwrap(),
            Date::new(-44, 3, 15).unwrap()
        );
        assert!(Date::from_iso("1942-08").is_err());
        assert!(Date::from_iso("1942-8-x").is_err());
        assert!(Date::from_iso("+1942-08-01").is_err());
        assert!(Date::from_iso("1900-02-29").is_err());
    }

    #[test]
    fn test_long_form() {
        assert_eq!(Date::new(1942, 8, 1).unwrap().long_form(), "August 1, 1942");
        assert_eq!(
            Date::new(-44, 3, 15).unwrap().long_form(),
            "March 15, 44 BC"
        );
    }

    #[test]
    fn test_serde_parts() {
        let date = Date::new(-44, 3, 15).unwrap();
        let json = serde_json::to_value(date).unwrap();
        assert_eq!(json, serde_json::json!({"y": -44, "m": 3, "d": 15}));

        let back: Date = serde_json::from_value(json).unwrap();
        assert_eq!(back, date);

        let bad = serde_json::from_value::<Date>(serde_json::json!({"y": 1900, "m": 2, "d": 29}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_lifespan() {
        let born = Date::new(1942, 8, 1).unwrap();
        let died = Date::new(1995, 8, 9).unwrap();
        let span = Lifespan::between(&born, &died).unwrap();
        assert_eq!(span, Lifespan { years: 53, days: 8 });
        assert_eq!(span.to_string(), "53 years, 8 days");

        let born = Date::new(2000, 3, 10).unwrap();
        let died = Date::new(2001, 3, 9).unwrap();
        assert_eq!(
            Lifespan::between(&born, &died).unwrap(),
            Lifespan { years: 0, days: 364 }
        );

        let died = Date::new(2001, 3, 11).unwrap();
        assert_eq!(
            Lifespan::between(&born, &died).unwrap().to_string(),
            "1 year, 1 day"
        );

        assert!(Lifespan::between(&died, &born).is_none());
    }

    #[test]
    fn test_lifespan_leap_day_birthday() {
        let born = Date::new(2000, 2, 29).unwrap();
        let died = Date::new(2001, 2, 28).unwrap();
        assert_eq!(
            Lifespan::between(&born, &died).unwrap(),
            Lifespan { years: 1, days: 0 }
        );
    }

    #[test]
    fn test_month_name() {
        assert_eq!(month_name(1), Some("January"));
        assert_eq!(month_name(12), Some("December"));
        assert_eq!(month_name(0), None);
        assert_eq!(month_name(13), None);
    }
}
