//! Clock-driven trailing debounce.
//!
//! [`Effect::debounce`](tourbook_core::effect::Effect::debounce) covers
//! debouncing inside a reducer. Components that are not reducers (the cart
//! sync engine) need the same behavior with explicit state they can cancel
//! and flush on demand, and that tests can drive with a manual clock instead
//! of real timers.
//!
//! A [`Debouncer`] holds at most one pending value. Scheduling replaces the
//! pending value and pushes its deadline back; [`Debouncer::take_due`]
//! releases it once the injected clock reaches the deadline.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tourbook_core::environment::Clock;

#[derive(Debug)]
struct Pending<T> {
    value: T,
    due: DateTime<Utc>,
}

/// Trailing debouncer over values of type `T`.
pub struct Debouncer<T> {
    delay: TimeDelta,
    clock: Arc<dyn Clock>,
    pending: Option<Pending<T>>,
}

impl<T> Debouncer<T> {
    /// Create an idle debouncer with the given quiet period.
    #[must_use]
    pub fn new(delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            delay: TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX),
            clock,
            pending: None,
        }
    }

    /// Schedule `value`, replacing any pending one and restarting the quiet period.
    ///
    /// Returns `true` when a pending value was superseded.
    pub fn schedule(&mut self, value: T) -> bool {
        let due = self
            .clock
            .now()
            .checked_add_signed(self.delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.pending.replace(Pending { value, due }).is_some()
    }

    /// Drop the pending value without releasing it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|pending| pending.value)
    }

    /// Release the pending value immediately, regardless of its deadline.
    pub fn flush(&mut self) -> Option<T> {
        self.cancel()
    }

    /// Release the pending value if its quiet period has elapsed.
    pub fn take_due(&mut self) -> Option<T> {
        let now = self.clock.now();
        match &self.pending {
            Some(pending) if now >= pending.due => self.cancel(),
            _ => None,
        }
    }

    /// Whether a value is waiting.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// When the pending value becomes due.
    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.pending.as_ref().map(|pending| pending.due)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Debouncer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}
