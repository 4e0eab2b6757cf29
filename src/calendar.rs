//! UK local-government financial calendar.
//!
//! The financial year runs from 1 April to 31 March and is written `YYYY/YY`, e.g. `2024/25`.
//! Every grouping by year, quarter, month or week in this crate goes through these functions so
//! that bucket boundaries are identical everywhere.

use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The first calendar month of the financial year.
const FIRST_MONTH: u32 = 4;

/// A financial year, identified by the calendar year in which it starts.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FinancialYear {
    start_year: i32,
}

impl FinancialYear {
    pub const fn new(start_year: i32) -> Self {
        Self { start_year }
    }

    /// The calendar year in which this financial year begins.
    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    /// The financial year immediately before this one.
    pub fn previous(&self) -> Self {
        Self::new(self.start_year.saturating_sub(1))
    }

    /// Inclusive bounds: 1 April of the start year through 31 March of the following year.
    ///
    /// A bound beyond the dates chrono can represent is clamped to `NaiveDate::MIN` or
    /// `NaiveDate::MAX`.
    pub fn bounds(&self) -> (NaiveDate, NaiveDate) {
        let clamp = || {
            if self.start_year > 0 {
                NaiveDate::MAX
            } else {
                NaiveDate::MIN
            }
        };
        let start = NaiveDate::from_ymd_opt(self.start_year, FIRST_MONTH, 1).unwrap_or_else(clamp);
        let end = self
            .start_year
            .checked_add(1)
            .and_then(|year| NaiveDate::from_ymd_opt(year, 3, 31))
            .unwrap_or_else(clamp);
        (start, end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        financial_year(date) == *self
    }
}

impl Display for FinancialYear {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{:02}",
            self.start_year,
            (i64::from(self.start_year) + 1).rem_euclid(100)
        )
    }
}

impl FromStr for FinancialYear {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (start, end) = trimmed
            .split_once('/')
            .with_context(|| format!("Financial year '{trimmed}' is not in the form YYYY/YY"))?;
        let start_year: i32 = start
            .parse()
            .with_context(|| format!("Invalid start year in financial year '{trimmed}'"))?;
        let end_suffix: i32 = end
            .parse()
            .with_context(|| format!("Invalid end year in financial year '{trimmed}'"))?;
        let Some(end_year) = start_year.checked_add(1) else {
            bail!("Financial year '{trimmed}' is out of range");
        };
        if end.len() != 2 || end_suffix != end_year.rem_euclid(100) {
            bail!("Financial year '{trimmed}' must end in the year after it starts");
        }
        if NaiveDate::from_ymd_opt(start_year, FIRST_MONTH, 1).is_none()
            || NaiveDate::from_ymd_opt(end_year, 3, 31).is_none()
        {
            bail!("Financial year '{trimmed}' is out of range");
        }
        Ok(Self::new(start_year))
    }
}

impl Serialize for FinancialYear {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FinancialYear {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FinancialYear::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl schemars::JsonSchema for FinancialYear {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "FinancialYear".into()
    }

    fn inline_schema() -> bool {
        true
    }

    fn json_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
        schemars::json_schema!({
            "type": "string",
            "pattern": "^[0-9]{4}/[0-9]{2}$"
        })
    }
}

/// Returns the financial year that `date` falls in.
///
/// # Examples
/// ```
/// # use council_spend_audit::calendar::financial_year;
/// # use chrono::NaiveDate;
/// let march = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
/// let april = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
/// assert_eq!(financial_year(march).to_string(), "2023/24");
/// assert_eq!(financial_year(april).to_string(), "2024/25");
/// ```
pub fn financial_year(date: NaiveDate) -> FinancialYear {
    if date.month() >= FIRST_MONTH {
        FinancialYear::new(date.year())
    } else {
        FinancialYear::new(date.year() - 1)
    }
}

/// Returns the financial quarter, 1 through 4. Q1 is April to June and Q4 is January to March.
pub fn quarter(date: NaiveDate) -> u8 {
    // Shift so that April is month zero.
    let shifted = (date.month() + 12 - FIRST_MONTH) % 12;
    (shifted / 3 + 1) as u8
}

/// A sortable calendar-month key, `YYYY-MM`.
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// A display label for a calendar month, e.g. `Apr 2024`.
pub fn month_label(date: NaiveDate) -> String {
    date.format("%b %Y").to_string()
}

/// The ISO-8601 week containing `date` as (ISO year, week number).
pub fn iso_week(date: NaiveDate) -> (i32, u32) {
    let week = date.iso_week();
    (week.year(), week.week())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_financial_year_april_boundary() {
        assert_eq!(financial_year(d(2024, 3, 31)).to_string(), "2023/24");
        assert_eq!(financial_year(d(2024, 4, 1)).to_string(), "2024/25");
    }

    #[test]
    fn test_financial_year_century_rollover() {
        assert_eq!(financial_year(d(2099, 5, 1)).to_string(), "2099/00");
        assert_eq!(financial_year(d(2009, 12, 1)).to_string(), "2009/10");
    }

    #[test]
    fn test_quarters() {
        assert_eq!(quarter(d(2024, 4, 1)), 1);
        assert_eq!(quarter(d(2024, 6, 30)), 1);
        assert_eq!(quarter(d(2024, 7, 1)), 2);
        assert_eq!(quarter(d(2024, 10, 15)), 3);
        assert_eq!(quarter(d(2024, 12, 31)), 3);
        assert_eq!(quarter(d(2025, 1, 1)), 4);
        assert_eq!(quarter(d(2025, 3, 31)), 4);
    }

    #[test]
    fn test_parse_financial_year() {
        let fy = FinancialYear::from_str("2023/24").unwrap();
        assert_eq!(fy.start_year(), 2023);
        assert_eq!(fy.to_string(), "2023/24");
        assert!(FinancialYear::from_str("2023/25").is_err());
        assert!(FinancialYear::from_str("2023-24").is_err());
        assert!(FinancialYear::from_str("2023/2024").is_err());
    }

    #[test]
    fn test_parse_rejects_unrepresentable_years() {
        let err = FinancialYear::from_str("2147483647/48").unwrap_err();
        assert!(err.to_string().contains("out of range"));
        let err = FinancialYear::from_str("999999/00").unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(serde_json::from_str::<FinancialYear>("\"999999/00\"").is_err());
    }

    #[test]
    fn test_bounds_clamp_at_calendar_limits() {
        let (start, end) = FinancialYear::new(i32::MAX).bounds();
        assert_eq!((start, end), (NaiveDate::MAX, NaiveDate::MAX));
        let (start, end) = FinancialYear::new(i32::MIN).bounds();
        assert_eq!((start, end), (NaiveDate::MIN, NaiveDate::MIN));
        assert_eq!(FinancialYear::new(i32::MAX).to_string(), "2147483647/48");
    }

    #[test]
    fn test_bounds_and_contains() {
        let fy = FinancialYear::new(2023);
        assert_eq!(fy.bounds(), (d(2023, 4, 1), d(2024, 3, 31)));
        assert!(fy.contains(d(2024, 3, 31)));
        assert!(!fy.contains(d(2024, 4, 1)));
        assert_eq!(fy.previous(), FinancialYear::new(2022));
    }

    #[test]
    fn test_serde() {
        let json = serde_json::to_string(&FinancialYear::new(2024)).unwrap();
        assert_eq!(json, "\"2024/25\"");
        let fy: FinancialYear = serde_json::from_str(&json).unwrap();
        assert_eq!(fy, FinancialYear::new(2024));
    }

    #[test]
    fn test_month_and_week_keys() {
        assert_eq!(month_key(d(2024, 4, 9)), "2024-04");
        assert_eq!(month_label(d(2024, 4, 9)), "Apr 2024");
        // 2024-12-30 belongs to ISO week 1 of 2025.
        assert_eq!(iso_week(d(2024, 12, 30)), (2025, 1));
    }
}
