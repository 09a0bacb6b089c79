//! # Tourbook API Client
//!
//! REST client for the booking backend plus the payment widget contract.
//!
//! ## Example
//!
//! ```no_run
//! use tourbook_api::{BookingApi, BookingApiClient};
//! use tourbook_core::catalog::ProductId;
//! use chrono::NaiveDate;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Base URL from TOURBOOK_API_URL, or the local default
//!     let client = BookingApiClient::from_env()?;
//!
//!     let date = NaiveDate::from_ymd_opt(2025, 3, 1).ok_or("bad date")?;
//!     let records = client
//!         .product_availability(&ProductId::new("prod-1"), date, date)
//!         .await?;
//!
//!     println!("{} availability records", records.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Endpoints
//!
//! - `GET /availability/product/:id?startDate&endDate`
//! - `GET /availability/package/:id/slots?date`
//! - `GET /abandoned-carts/status?email&productId`
//! - `POST /abandoned-carts`
//! - `POST /bookings`
//! - `POST /payments/create-order`, `POST /payments/verify`

pub mod client;
pub mod error;
pub mod payment;
pub mod types;

// Re-export main types for convenience
pub use client::{BookingApi, BookingApiClient, DEFAULT_API_URL};
pub use error::ApiError;
pub use payment::{PaymentAuthorization, PaymentWidget};
pub use types::{
    BookingRecord, CreateBookingRequest, CreateOrderRequest, CustomerData, PaymentOrder,
    PaymentVerification, SaveCartRequest, ServerCart, VerifyPaymentRequest,
};
