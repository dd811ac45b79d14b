//! Calendar months as `YYYY-MM` values and inclusive month ranges.
//!
//! Lexicographic order on the `YYYY-MM` rendering equals chronological
//! order, which is what the backend relies on for its date filters.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// One calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self, ProtoError> {
        if !(0..=9999).contains(&year) || !(1..=12).contains(&month) {
            return Err(ProtoError::InvalidMonth(format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    /// The current UTC month.
    pub fn current() -> Self {
        let today = Utc::now().date_naive();
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    fn first_day(&self) -> NaiveDate {
        // Fields are validated on construction, day 1 always exists.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Month `n` steps earlier.
    pub fn minus(&self, n: u32) -> Self {
        self.first_day()
            .checked_sub_months(Months::new(n))
            .map(Self::from_date)
            .unwrap_or(*self)
    }

    /// The `n` months ending at (and including) `self`, oldest first.
    pub fn trailing(&self, n: u32) -> Vec<Month> {
        if n == 0 {
            return Vec::new();
        }
        (0..n).rev().map(|back| self.minus(back)).collect()
    }
}

impl FromStr for Month {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let shape_ok = bytes.len() == 7
            && bytes[4] == b'-'
            && bytes[..4].iter().all(u8::is_ascii_digit)
            && bytes[5..].iter().all(u8::is_ascii_digit);
        if !shape_ok {
            return Err(ProtoError::InvalidMonth(s.to_string()));
        }
        let year: i32 = s[..4]
            .parse()
            .map_err(|_| ProtoError::InvalidMonth(s.to_string()))?;
        let month: u32 = s[5..]
            .parse()
            .map_err(|_| ProtoError::InvalidMonth(s.to_string()))?;
        Self::new(year, month).map_err(|_| ProtoError::InvalidMonth(s.to_string()))
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl TryFrom<String> for Month {
    type Error = ProtoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Month> for String {
    fn from(value: Month) -> Self {
        value.to_string()
    }
}

/// Inclusive `start..=end` month range. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: Month,
    end: Month,
}

impl DateRange {
    pub fn new(start: Month, end: Month) -> Result<Self, ProtoError> {
        if start > end {
            return Err(ProtoError::InvertedRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// A range covering a single month.
    pub fn single(month: Month) -> Self {
        Self {
            start: month,
            end: month,
        }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, ProtoError> {
        Self::new(start.parse()?, end.parse()?)
    }

    pub fn start(&self) -> Month {
        self.start
    }

    pub fn end(&self) -> Month {
        self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let m: Month = "2025-01".parse().unwrap();
        assert_eq!(m.year(), 2025);
        assert_eq!(m.month(), 1);
        assert_eq!(m.to_string(), "2025-01");
    }

    #[test]
    fn test_rejects_malformed_months() {
        for bad in ["2025-1", "2025-13", "2025-00", "25-01", "2025/01", "2025-01-01", ""] {
            assert!(bad.parse::<Month>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_order_matches_string_order() {
        let a: Month = "2024-12".parse().unwrap();
        let b: Month = "2025-01".parse().unwrap();
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn test_trailing_window_crosses_year() {
        let end: Month = "2025-03".parse().unwrap();
        let window = end.trailing(12);
        assert_eq!(window.len(), 12);
        assert_eq!(window.first().unwrap().to_string(), "2024-04");
        assert_eq!(window.last().unwrap().to_string(), "2025-03");
        assert!(window.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_range_rejects_inverted() {
        let err = DateRange::parse("2025-02", "2025-01").unwrap_err();
        assert!(matches!(err, ProtoError::InvertedRange { .. }));
    }

    #[test]
    fn test_serde_as_string() {
        let m: Month = serde_json::from_str("\"2025-06\"").unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"2025-06\"");
        assert!(serde_json::from_str::<Month>("\"June\"").is_err());
    }
}
