//! Availability Query Layer
//!
//! Turns raw backend availability into what the booking flow can offer:
//! packages that are `AVAILABLE` on a date, and slots of a package that run
//! on that weekday and still have a time outside the cutoff window.
//!
//! Failures never leave the caller pending: every query resolves to an
//! explicit outcome, and "nothing to offer" is distinct from "request failed".

use chrono::{FixedOffset, NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::sync::Arc;
use tourbook_api::BookingApi;
use tourbook_core::catalog::{
    AvailabilityRecord, AvailabilityStatus, PackageId, PackageSummary, ProductId, TimeSlot,
};
use tourbook_core::environment::{Clock, local_now};
use tracing::warn;

/// Result of [`AvailabilityService::packages_for_date`]
#[derive(Debug, Clone, PartialEq)]
pub enum PackagesOutcome {
    /// Packages bookable on the date, in backend order
    Available(Vec<PackageSummary>),
    /// The backend answered, but nothing is available
    NoneAvailable,
    /// The request failed
    Failed(String),
}

/// Result of [`AvailabilityService::slots_for_package`]
#[derive(Debug, Clone, PartialEq)]
pub enum SlotsOutcome {
    /// Slots with at least one bookable time
    Available(Vec<TimeSlot>),
    /// The backend answered, but no slot can be booked
    NoneAvailable,
    /// The request failed
    Failed(String),
}

/// Keep `AVAILABLE` records, first occurrence per package.
#[must_use]
pub fn select_available_packages(records: Vec<AvailabilityRecord>) -> Vec<PackageSummary> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| record.status == AvailabilityStatus::Available)
        .filter(|record| seen.insert(record.package.id.clone()))
        .map(|record| record.package)
        .collect()
}

/// Keep slots that run on `date`'s weekday and have a time bookable at `now`.
#[must_use]
pub fn select_bookable_slots(
    slots: Vec<TimeSlot>,
    date: NaiveDate,
    now: NaiveDateTime,
) -> Vec<TimeSlot> {
    slots
        .into_iter()
        .filter(|slot| slot.runs_on(date))
        .filter(|slot| !slot.bookable_times(date, now).is_empty())
        .collect()
}

/// Availability queries against the backend.
#[derive(Clone)]
pub struct AvailabilityService {
    api: Arc<dyn BookingApi>,
    clock: Arc<dyn Clock>,
    utc_offset: FixedOffset,
}

impl AvailabilityService {
    /// Create a service evaluating cutoffs in the `utc_offset` local time
    #[must_use]
    pub fn new(api: Arc<dyn BookingApi>, clock: Arc<dyn Clock>, utc_offset: FixedOffset) -> Self {
        Self {
            api,
            clock,
            utc_offset,
        }
    }

    /// Local wall-clock time used for cutoff evaluation
    #[must_use]
    pub fn local_now(&self) -> NaiveDateTime {
        local_now(self.clock.as_ref(), self.utc_offset)
    }

    /// Packages bookable for `product_id` on `date`.
    pub async fn packages_for_date(
        &self,
        product_id: &ProductId,
        date: NaiveDate,
    ) -> PackagesOutcome {
        match self.api.product_availability(product_id, date, date).await {
            Ok(records) => {
                let packages = select_available_packages(records);
                if packages.is_empty() {
                    PackagesOutcome::NoneAvailable
                } else {
                    PackagesOutcome::Available(packages)
                }
            }
            Err(error) => {
                warn!(%product_id, %date, %error, "Failed to load package availability");
                PackagesOutcome::Failed(error.to_string())
            }
        }
    }

    /// Slots of `package_id` bookable on `date`.
    pub async fn slots_for_package(&self, package_id: &PackageId, date: NaiveDate) -> SlotsOutcome {
        match self.api.package_slots(package_id, date).await {
            Ok(slots) => {
                let slots = select_bookable_slots(slots, date, self.local_now());
                if slots.is_empty() {
                    SlotsOutcome::NoneAvailable
                } else {
                    SlotsOutcome::Available(slots)
                }
            }
            Err(error) => {
                warn!(%package_id, %date, %error, "Failed to load package slots");
                SlotsOutcome::Failed(error.to_string())
            }
        }
    }
}

impl std::fmt::Debug for AvailabilityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityService")
            .field("utc_offset", &self.utc_offset)
            .finish_non_exhaustive()
    }
}
