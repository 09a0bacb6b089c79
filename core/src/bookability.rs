//! Slot bookability - the single source of truth for the cutoff policy.
//!
//! A slot can be booked until `cutoff_hours` before it starts. Every screen
//! that accepts or rejects a slot (slot listing, booking-flow validation)
//! goes through [`is_slot_bookable`] so they can never disagree.
//!
//! `now` is the local wall-clock time (see
//! [`local_now`](crate::environment::local_now)); there is no reconciliation
//! with server time.

use crate::dates::{parse_booking_date, parse_slot_time};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Default lead time in hours when a slot does not specify one.
pub const DEFAULT_CUTOFF_HOURS: u32 = 24;

/// Reason reported for slots whose start time is not in the future.
pub const REASON_STARTED: &str = "This time slot has already started or passed";

/// Reason reported when the date or time could not be understood.
pub const REASON_UNVERIFIABLE: &str = "Unable to verify slot availability";

/// Outcome of a bookability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookability {
    /// Whether the slot may still be booked
    pub is_bookable: bool,
    /// Human readable reason, empty when bookable
    pub reason: String,
}

impl Bookability {
    /// A bookable result with an empty reason.
    #[must_use]
    pub const fn bookable() -> Self {
        Self {
            is_bookable: true,
            reason: String::new(),
        }
    }

    /// A rejected result with the given reason.
    #[must_use]
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            is_bookable: false,
            reason: reason.into(),
        }
    }
}

/// Reason reported while the cutoff window is active.
#[must_use]
pub fn cutoff_reason(cutoff_hours: u32) -> String {
    format!("Booking closed. Must book at least {cutoff_hours} hours before the slot time")
}

/// Decide whether the slot at `date` + `time` can still be booked at `now`.
///
/// `date` is `YYYY-MM-DD` or `MM/DD/YYYY`, `time` is `HH:mm`. Unparseable
/// input fails closed with [`REASON_UNVERIFIABLE`].
#[must_use]
pub fn is_slot_bookable(
    date: &str,
    time: &str,
    cutoff_hours: u32,
    now: NaiveDateTime,
) -> Bookability {
    let (Ok(day), Ok(clock_time)) = (parse_booking_date(date), parse_slot_time(time)) else {
        return Bookability::blocked(REASON_UNVERIFIABLE);
    };

    evaluate(day.and_time(clock_time), cutoff_hours, now)
}

/// Same policy as [`is_slot_bookable`] for an already parsed slot start.
#[must_use]
pub fn evaluate(slot_start: NaiveDateTime, cutoff_hours: u32, now: NaiveDateTime) -> Bookability {
    let Some(cutoff) = slot_start.checked_sub_signed(Duration::hours(i64::from(cutoff_hours)))
    else {
        return Bookability::blocked(REASON_UNVERIFIABLE);
    };

    if now < cutoff {
        return Bookability::bookable();
    }

    if now >= slot_start {
        Bookability::blocked(REASON_STARTED)
    } else {
        Bookability::blocked(cutoff_reason(cutoff_hours))
    }
}
