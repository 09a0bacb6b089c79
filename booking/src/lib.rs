//! Tourbook booking flow
//!
//! Availability queries and the four-step booking state machine of a tour
//! storefront, built on the Tourbook reducer runtime.
//!
//! # Architecture
//!
//! ```text
//!   customer input / booking link
//!               │
//!               ▼
//!   ┌───────────────────────┐   debounced, request-id tagged
//!   │  BookingFlowReducer   │ ─────────────────────────────▶ AvailabilityService ──▶ BookingApi
//!   └───────────────────────┘                                        │
//!        │           │                                     Bookability Evaluator
//!        │           │ snapshots (after email blur)
//!        │           ▼
//!        │    CartSyncEngine ──▶ CartSnapshotStore (immediate)
//!        │           ├────────▶ CartBroadcaster   (5 s debounce)
//!        │           └────────▶ POST /abandoned-carts (3 s debounce)
//!        ▼
//!   POST /bookings → create-order → PaymentWidget → verify
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let env = BookingEnvironment::new(api, clock, cart_sync, analytics, payment_widget);
//! let store = Store::new(BookingFlowState::new(product_id), BookingFlowReducer::new(), env);
//!
//! store.send(BookingFlowAction::SelectDate(Some(date))).await?;
//! store.send(BookingFlowAction::SetAdults(2)).await?;
//! store.send(BookingFlowAction::Next).await?;
//! ```

#![forbid(unsafe_code)]

pub mod analytics;
pub mod availability;
pub mod config;
pub mod flow;
pub mod link;

pub use analytics::TracingAnalytics;
pub use availability::{AvailabilityService, PackagesOutcome, SlotsOutcome};
pub use config::{Config, ConfigError};
pub use flow::{
    BookingEnvironment, BookingFlowAction, BookingFlowReducer, BookingFlowState, Query, Step,
};
pub use link::{BookingLink, LinkError};
