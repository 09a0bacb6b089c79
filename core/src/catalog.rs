//! Catalog types: products, packages, time slots and availability records.
//!
//! Field names follow the REST API's JSON (camelCase, with the slot's
//! capitalised `Time` array and `available` capacity).

use crate::bookability::{DEFAULT_CUTOFF_HOURS, evaluate};
use crate::dates::{iso_date, parse_slot_time, parse_weekday};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a server-issued identifier
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a bookable product (a tour, an experience)
    ProductId
);
string_id!(
    /// Identifier of a priced package under a product
    PackageId
);
string_id!(
    /// Identifier of a recurring time slot under a package
    SlotId
);

/// A recurring time-of-day + weekday template under a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    /// Slot identifier
    pub id: SlotId,
    /// Clock times (`HH:mm`) the slot runs at
    #[serde(rename = "Time", default)]
    pub times: Vec<String>,
    /// Weekday names the slot runs on
    #[serde(default)]
    pub days: Vec<String>,
    /// Total seats
    #[serde(rename = "available", default)]
    pub capacity: u32,
    /// Seats already booked
    #[serde(default)]
    pub booked: u32,
    /// Minimum lead time in hours, defaults to 24
    #[serde(rename = "cutoffTime", default, skip_serializing_if = "Option::is_none")]
    pub cutoff_hours: Option<u32>,
}

impl TimeSlot {
    /// Seats still free. Never negative, even if the server overbooked.
    #[must_use]
    pub const fn available_seats(&self) -> u32 {
        self.capacity.saturating_sub(self.booked)
    }

    /// Cutoff window of this slot, falling back to the default.
    #[must_use]
    pub fn effective_cutoff_hours(&self) -> u32 {
        self.cutoff_hours.unwrap_or(DEFAULT_CUTOFF_HOURS)
    }

    /// Whether the slot runs on the weekday of `date`.
    #[must_use]
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday();
        self.days
            .iter()
            .any(|day| parse_weekday(day) == Some(weekday))
    }

    /// Times of this slot on `date` that are still bookable at `now`.
    ///
    /// Unparseable times are skipped (they fail closed).
    #[must_use]
    pub fn bookable_times(&self, date: NaiveDate, now: NaiveDateTime) -> Vec<String> {
        let cutoff = self.effective_cutoff_hours();
        self.times
            .iter()
            .filter(|time| {
                parse_slot_time(time)
                    .is_ok_and(|t| evaluate(date.and_time(t), cutoff, now).is_bookable)
            })
            .cloned()
            .collect()
    }

    /// Whether `time` is one of this slot's times and still bookable at `now`.
    #[must_use]
    pub fn is_time_bookable(&self, date: NaiveDate, time: &str, now: NaiveDateTime) -> bool {
        self.times.iter().any(|t| t == time)
            && crate::bookability::is_slot_bookable(
                &iso_date(date),
                time,
                self.effective_cutoff_hours(),
                now,
            )
            .is_bookable
    }
}

/// A priced, bookable variant of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    /// Package identifier
    pub id: PackageId,
    /// Display name
    pub name: String,
    /// Price per participant
    pub base_price: f64,
    /// ISO currency code
    pub currency: String,
    /// Maximum participants per booking
    pub max_people: u32,
    /// Slot templates
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
}

impl Package {
    /// Summary view used by package pickers.
    #[must_use]
    pub fn summary(&self) -> PackageSummary {
        PackageSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            max_people: self.max_people,
            base_price: self.base_price,
            currency: self.currency.clone(),
        }
    }
}

/// Package fields returned by the availability endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    /// Package identifier
    pub id: PackageId,
    /// Display name
    pub name: String,
    /// Maximum participants per booking
    pub max_people: u32,
    /// Price per participant
    pub base_price: f64,
    /// ISO currency code
    pub currency: String,
}

impl PackageSummary {
    /// Total price for a party, rounded to cents.
    #[must_use]
    pub fn total_for(&self, adults: u32, children: u32) -> f64 {
        let total = self.base_price * f64::from(adults + children);
        (total * 100.0).round() / 100.0
    }
}

/// Availability status of a package on a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityStatus {
    /// Open for booking
    Available,
    /// No seats left
    SoldOut,
    /// Closed by the operator
    Closed,
    /// Any status this client does not know about
    #[serde(untagged)]
    Other(String),
}

/// One availability record for a product on a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRecord {
    /// Status of the package on that date
    pub status: AvailabilityStatus,
    /// The package the record refers to
    pub package: PackageSummary,
}
