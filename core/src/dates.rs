//! Date and clock-time parsing.
//!
//! The storefront passes booking dates around either as ISO dates
//! (`YYYY-MM-DD`, API and storage) or as US dates (`MM/DD/YYYY`, URL
//! parameters and the date picker), and slot times as `HH:mm` strings.

use chrono::{NaiveDate, NaiveTime, Weekday};
use thiserror::Error;

/// Errors from parsing booking dates and slot times.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateParseError {
    /// The date matched neither `YYYY-MM-DD` nor `MM/DD/YYYY`
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// The time was not a valid `HH:mm` clock time
    #[error("Invalid time: {0}")]
    InvalidTime(String),
}

/// Parse a booking date in `YYYY-MM-DD` or `MM/DD/YYYY` form.
///
/// # Errors
///
/// Returns [`DateParseError::InvalidDate`] when neither format matches.
pub fn parse_booking_date(input: &str) -> Result<NaiveDate, DateParseError> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y"))
        .map_err(|_| DateParseError::InvalidDate(input.to_string()))
}

/// Parse a slot time of day (`HH:mm`, leading zero optional).
///
/// # Errors
///
/// Returns [`DateParseError::InvalidTime`] for anything else.
pub fn parse_slot_time(input: &str) -> Result<NaiveTime, DateParseError> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M")
        .map_err(|_| DateParseError::InvalidTime(input.to_string()))
}

/// Format a date the way the API expects it (`YYYY-MM-DD`).
#[must_use]
pub fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Format a date the way booking links carry it (`MM/DD/YYYY`).
#[must_use]
pub fn us_date(date: NaiveDate) -> String {
    date.format("%m/%d/%Y").to_string()
}

/// Parse a weekday name as used in slot day lists.
///
/// Accepts full and three-letter English names in any case
/// (`"Monday"`, `"mon"`, `"TUE"`).
#[must_use]
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    name.trim().parse::<Weekday>().ok()
}
