//! Expansion of a date range into calendar years.

use zonal_common::DateRange;

/// Years `[start.year, end.year]` in ascending order.
///
/// An inverted range yields no years.
pub fn expand_years(range: &DateRange) -> Vec<i32> {
    year_span(range.start_year(), range.end_year())
}

/// Years from `start` to `end` inclusive, empty when `end < start`.
pub fn year_span(start: i32, end: i32) -> Vec<i32> {
    if end < start {
        return Vec::new();
    }
    (start..=end).collect()
}
