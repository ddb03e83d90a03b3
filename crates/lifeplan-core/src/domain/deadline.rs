//! Relative-date deadline resolution (C2).

use chrono::{Duration, NaiveDate};

use super::error::DeadlineError;

/// Parse a strict `YYYY-MM-DD` date, rejecting date-times and other formats.
pub fn parse_iso_date(raw: &str) -> Result<NaiveDate, DeadlineError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| DeadlineError::InvalidEventDate)
}

/// `event_date + (offset_days + grace_days)` days.
pub fn compute_deadline(event_date: NaiveDate, offset_days: i64, grace_days: i64) -> NaiveDate {
    event_date + Duration::days(offset_days + grace_days)
}
