//! # Tourbook Testing
//!
//! Testing utilities and helpers for the Tourbook booking client.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - Mock implementations of the backend and payment widget
//! - A recording analytics sink
//! - [`ReducerTest`], a Given/When/Then harness for reducers
//! - proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use tourbook_testing::{MockBookingApi, test_clock};
//!
//! #[tokio::test]
//! async fn lists_packages() {
//!     let api = MockBookingApi::new();
//!     api.respond_availability(Ok(vec![record("pkg-1", AvailabilityStatus::Available)]));
//!
//!     let service = AvailabilityService::new(Arc::new(api), Arc::new(test_clock()), utc());
//!     let outcome = service.packages_for_date(&product, date).await;
//!     assert!(matches!(outcome, PackagesOutcome::Available(_)));
//! }
//! ```

use chrono::{DateTime, Utc};
use tourbook_core::environment::Clock;

pub mod api_mocks;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::TimeDelta;
    use std::sync::{Arc, Mutex, PoisonError};
    use tourbook_core::environment::{Analytics, AnalyticsEvent};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tourbook_testing::mocks::FixedClock;
    /// use tourbook_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the code under test.
    ///
    /// ```
    /// use tourbook_testing::mocks::{ManualClock, test_clock};
    /// use tourbook_core::environment::Clock;
    /// use std::time::Duration;
    ///
    /// let clock = ManualClock::new(test_clock().now());
    /// let start = clock.now();
    /// clock.advance(Duration::from_secs(3));
    /// assert_eq!((clock.now() - start).num_seconds(), 3);
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move time forward
        pub fn advance(&self, by: std::time::Duration) {
            let by = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time = time.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC);
        }

        /// Jump to an absolute time (may go backwards)
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Analytics sink that keeps every event for assertions
    #[derive(Debug, Clone, Default)]
    pub struct RecordingAnalytics {
        events: Arc<Mutex<Vec<AnalyticsEvent>>>,
    }

    impl RecordingAnalytics {
        /// Create an empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Events tracked so far, in order
        #[must_use]
        pub fn events(&self) -> Vec<AnalyticsEvent> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of `BookingStarted` events
        #[must_use]
        pub fn started_count(&self) -> usize {
            self.events()
                .iter()
                .filter(|event| matches!(event, AnalyticsEvent::BookingStarted { .. }))
                .count()
        }
    }

    impl Analytics for RecordingAnalytics {
        fn track(&self, event: AnalyticsEvent) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use chrono::{FixedOffset, NaiveDate, Offset, Utc};

    /// Install a `tracing` subscriber that writes through the test harness.
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tourbook=debug")),
            )
            .with_test_writer()
            .try_init();
    }

    /// UTC as a fixed offset
    #[must_use]
    pub fn utc() -> FixedOffset {
        Utc.fix()
    }

    /// Calendar date shorthand
    ///
    /// # Panics
    ///
    /// Panics if the date does not exist.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date")
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
    use proptest::prelude::*;
    use tourbook_core::cart::{CartSnapshot, CartStatus};
    use tourbook_core::catalog::{PackageId, ProductId, SlotId};

    /// Dates between 2020 and 2035
    pub fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (2020i32..2035, 1u32..=12, 1u32..=28)
            .prop_filter_map("valid date", |(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
    }

    /// Whole-minute times of day
    pub fn arb_time() -> impl Strategy<Value = NaiveTime> {
        (0u32..24, 0u32..60)
            .prop_filter_map("valid time", |(h, m)| NaiveTime::from_hms_opt(h, m, 0))
    }

    /// Timestamps with second precision (what JSON round-trips exactly)
    pub fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
        (1_577_836_800i64..2_051_222_400).prop_filter_map("valid timestamp", |secs| {
            Utc.timestamp_opt(secs, 0).single()
        })
    }

    /// Arbitrary snapshots with plausible field contents
    pub fn arb_cart_snapshot() -> impl Strategy<Value = CartSnapshot> {
        (
            "[a-z0-9-]{1,12}",
            "[a-z]{1,8}@[a-z]{1,8}\\.com",
            "[A-Za-z ]{0,20}",
            "[0-9+ ]{0,14}",
            proptest::option::of("[a-z0-9-]{1,8}"),
            proptest::option::of(arb_date()),
            (0u32..10, 0u32..10),
            0u32..100_000,
            any::<bool>(),
            arb_timestamp(),
        )
            .prop_map(
                |(product, email, name, phone, package, date, party, cents, open, at)| {
                    let (adults, children) = party;
                    let mut cart = CartSnapshot::new(ProductId::new(product), email, at);
                    cart.customer_name = name;
                    cart.customer_phone = phone;
                    cart.package_id = package.clone().map(PackageId::new);
                    cart.slot_id = package.map(|p| SlotId::new(format!("{p}-slot")));
                    cart.selected_date = date.map(|d| d.format("%Y-%m-%d").to_string());
                    cart.adults = adults;
                    cart.children = children;
                    cart.total_amount = f64::from(cents) / 100.0;
                    cart.status = if open { CartStatus::Open } else { CartStatus::Closed };
                    cart
                },
            )
    }
}

// Re-export commonly used items
pub use api_mocks::{ApiCall, MockBookingApi, MockPaymentWidget};
pub use mocks::{FixedClock, ManualClock, RecordingAnalytics, test_clock};
pub use reducer_test::{ReducerTest, assertions};
