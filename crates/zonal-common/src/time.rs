//! Date handling for dated raster collections.

use chrono::{DateTime, Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

/// An inclusive range of calendar dates.
///
/// The range may be inverted (`end < start`); it then contains no dates and
/// spans no years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The whole calendar year `[year-01-01, year-12-31]`.
    pub fn year(year: i32) -> CommonResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| CommonError::InvalidDate(format!("year {} out of range", year)))?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| CommonError::InvalidDate(format!("year {} out of range", year)))?;
        Ok(Self { start, end })
    }

    /// Parse a date range: "2000-01-01/2002-12-31".
    pub fn parse(s: &str) -> CommonResult<Self> {
        let (start, end) = s.split_once('/').ok_or_else(|| {
            CommonError::InvalidDate(format!("{}. Expected 'start/end'", s))
        })?;
        Ok(Self {
            start: parse_date(start.trim())?,
            end: parse_date(end.trim())?,
        })
    }

    /// Check whether a date falls inside the range (both ends inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Whether the range is inverted and therefore contains nothing.
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn start_year(&self) -> i32 {
        self.start.year()
    }

    pub fn end_year(&self) -> i32 {
        self.end.year()
    }
}

/// Parse a calendar date from "YYYY-MM-DD" or a full RFC 3339 timestamp.
pub fn parse_date(s: &str) -> CommonResult<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }

    Err(CommonError::InvalidDate(s.to_string()))
}
