//! Calendar month value used for subscription intervals and query windows.
//!
//! A `Month` carries no day-of-month: it is backed by a `NaiveDate` pinned to
//! the first of the month, which is also how it is stored in Postgres.

use chrono::{Datelike, NaiveDate};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing the `MM-YYYY` textual form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonthParseError {
    #[error("month is empty")]
    Empty,
    #[error("expected MM-YYYY, got {0:?}")]
    Format(String),
    #[error("month out of range in {0:?}")]
    OutOfRange(String),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct Month(NaiveDate);

impl Month {
    /// Build a month from a calendar year and a 1-based month number.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    /// Normalize any date to the month containing it.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.with_day(1).unwrap_or(date))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    /// Number of distinct calendar months from `self` to `last`, counting both ends.
    ///
    /// Callers must ensure `self <= last`; the result is not clamped.
    pub fn months_through(&self, last: Month) -> i64 {
        let years = i64::from(last.year()) - i64::from(self.year());
        let months = i64::from(last.month()) - i64::from(self.month());
        years * 12 + months + 1
    }
}

impl FromStr for Month {
    type Err = MonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(MonthParseError::Empty);
        }

        let (month, year) = raw
            .split_once('-')
            .ok_or_else(|| MonthParseError::Format(raw.to_string()))?;

        let all_digits = |part: &str, len: usize| {
            part.len() == len && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !all_digits(month, 2) || !all_digits(year, 4) {
            return Err(MonthParseError::Format(raw.to_string()));
        }

        let month: u32 = month
            .parse()
            .map_err(|_| MonthParseError::Format(raw.to_string()))?;
        let year: i32 = year
            .parse()
            .map_err(|_| MonthParseError::Format(raw.to_string()))?;

        Month::new(year, month).ok_or_else(|| MonthParseError::OutOfRange(raw.to_string()))
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:04}", self.month(), self.year())
    }
}

impl From<Month> for NaiveDate {
    fn from(month: Month) -> Self {
        month.0
    }
}

/// Inclusive query window `[start, end]` over which costs are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: Month,
    pub end: Month,
}

impl Period {
    /// Returns `None` when `start` is after `end`.
    pub fn new(start: Month, end: Month) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn months(&self) -> i64 {
        self.start.months_through(self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_month_year() {
        let month: Month = "03-2024".parse().unwrap();
        assert_eq!(month.year(), 2024);
        assert_eq!(month.month(), 3);
        assert_eq!(month.first_day(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let month: Month = "  12-2023 ".parse().unwrap();
        assert_eq!(month, Month::new(2023, 12).unwrap());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("".parse::<Month>(), Err(MonthParseError::Empty));
        assert!(matches!("3-2024".parse::<Month>(), Err(MonthParseError::Format(_))));
        assert!(matches!("2024-03".parse::<Month>(), Err(MonthParseError::Format(_))));
        assert!(matches!("03/2024".parse::<Month>(), Err(MonthParseError::Format(_))));
        assert!(matches!("+3-2024".parse::<Month>(), Err(MonthParseError::Format(_))));
        assert!(matches!("13-2024".parse::<Month>(), Err(MonthParseError::OutOfRange(_))));
        assert!(matches!("00-2024".parse::<Month>(), Err(MonthParseError::OutOfRange(_))));
    }

    #[test]
    fn test_display_round_trips_through_json() {
        let month = Month::new(2024, 7).unwrap();
        assert_eq!(month.to_string(), "07-2024");

        let json = serde_json::to_string(&month).unwrap();
        assert_eq!(json, "\"07-2024\"");
        let back: Month = serde_json::from_str(&json).unwrap();
        assert_eq!(back, month);
    }

    #[test]
    fn test_from_date_normalizes_to_first_of_month() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(Month::from_date(date), Month::new(2024, 2).unwrap());
    }

    #[test]
    fn test_months_through_is_inclusive() {
        let jan = Month::new(2024, 1).unwrap();
        let mar = Month::new(2024, 3).unwrap();
        let nov_prev = Month::new(2023, 11).unwrap();

        assert_eq!(jan.months_through(jan), 1);
        assert_eq!(jan.months_through(mar), 3);
        assert_eq!(nov_prev.months_through(mar), 5);
    }

    #[test]
    fn test_period_requires_ordered_bounds() {
        let mar = Month::new(2024, 3).unwrap();
        let dec = Month::new(2024, 12).unwrap();
        assert_eq!(Period::new(mar, dec).map(|p| p.months()), Some(10));
        assert_eq!(Period::new(mar, mar).map(|p| p.months()), Some(1));
        assert!(Period::new(dec, mar).is_none());
    }

    #[test]
    fn test_ordering_is_chronological() {
        let dec_2023 = Month::new(2023, 12).unwrap();
        let jan_2024 = Month::new(2024, 1).unwrap();
        assert!(dec_2023 < jan_2024);
    }
}
