//! Booking links
//!
//! Product pages deep-link into the booking flow with query parameters:
//! `package`, `date` (`MM/DD/YYYY`), `adults`, `children`, `slot`, `time`
//! and `recover=true`. Unknown parameters are ignored and malformed values
//! are dropped individually, so a half-broken link still pre-fills what it can.

use chrono::NaiveDate;
use reqwest::Url;
use std::str::FromStr;
use thiserror::Error;
use tourbook_core::catalog::{PackageId, SlotId};
use tourbook_core::dates::{parse_booking_date, parse_slot_time};
use tracing::debug;

/// Errors parsing a booking link
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Not a URL at all
    #[error("Invalid booking link: {0}")]
    InvalidUrl(String),
}

/// Pre-filled booking flow parameters carried by a URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingLink {
    /// Package to pre-select once availability is known
    pub package: Option<PackageId>,
    /// Tour date
    pub date: Option<NaiveDate>,
    /// Adult participants
    pub adults: Option<u32>,
    /// Child participants
    pub children: Option<u32>,
    /// Slot to pre-select
    pub slot: Option<SlotId>,
    /// Slot time (`HH:mm`)
    pub time: Option<String>,
    /// Restore the stored abandoned cart
    pub recover: bool,
}

impl BookingLink {
    /// Extract booking parameters from `url`'s query string.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let mut link = Self::default();
        for (name, value) in url.query_pairs() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match name.as_ref() {
                "package" => link.package = Some(PackageId::new(value)),
                "date" => link.date = lenient("date", value, parse_booking_date(value).ok()),
                "adults" => link.adults = lenient("adults", value, value.parse().ok()),
                "children" => link.children = lenient("children", value, value.parse().ok()),
                "slot" => link.slot = Some(SlotId::new(value)),
                "time" => {
                    link.time = lenient(
                        "time",
                        value,
                        parse_slot_time(value).ok().map(|_| value.to_string()),
                    );
                }
                "recover" => link.recover = value.eq_ignore_ascii_case("true"),
                _ => {},
            }
        }
        link
    }

    /// Whether the link carries anything for the flow
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn lenient<T>(name: &str, raw: &str, parsed: Option<T>) -> Option<T> {
    if parsed.is_none() {
        debug!(parameter = name, value = raw, "Ignoring malformed booking link parameter");
    }
    parsed
}

impl FromStr for BookingLink {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Url::parse(s)
            .map(|url| Self::from_url(&url))
            .map_err(|e| LinkError::InvalidUrl(e.to_string()))
    }
}
