//! Analytics sink that writes events to the tracing pipeline.

use tourbook_core::environment::{Analytics, AnalyticsEvent};
use tracing::info;

/// Emits each [`AnalyticsEvent`] as an `info` event on the `tourbook::analytics` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalytics;

impl Analytics for TracingAnalytics {
    fn track(&self, event: AnalyticsEvent) {
        match event {
            AnalyticsEvent::BookingStarted {
                product_id,
                package_id,
            } => {
                info!(
                    target: "tourbook::analytics",
                    event = "booking_started",
                    %product_id,
                    package_id = package_id.as_deref().unwrap_or(""),
                );
            }
            AnalyticsEvent::BookingCompleted {
                product_id,
                booking_code,
            } => {
                info!(
                    target: "tourbook::analytics",
                    event = "booking_completed",
                    %product_id,
                    %booking_code,
                );
            }
        }
    }
}
