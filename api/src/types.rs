//! Wire types for the booking backend REST API
//!
//! Every body is camelCase JSON. Response envelopes (`{ availability: [...] }`,
//! `{ slots: [...] }`) are unwrapped by the client and never leak to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tourbook_core::cart::{CartSnapshot, CartStatus};
use tourbook_core::catalog::{AvailabilityRecord, PackageId, ProductId, SlotId, TimeSlot};

/// `GET /availability/product/:id` envelope
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityResponse {
    /// One record per package and date
    #[serde(default)]
    pub availability: Vec<AvailabilityRecord>,
}

/// `GET /availability/package/:id/slots` envelope
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SlotsResponse {
    /// Slot templates of the package
    #[serde(default)]
    pub slots: Vec<TimeSlot>,
}

/// Customer part of an abandoned-cart record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CustomerData {
    /// Customer name
    #[serde(default)]
    pub name: String,
    /// Customer email
    #[serde(default)]
    pub email: String,
    /// Customer phone
    #[serde(default)]
    pub phone: String,
    /// Adult participants
    #[serde(default)]
    pub adults: u32,
    /// Child participants
    #[serde(default)]
    pub children: u32,
    /// Selected date, ISO `YYYY-MM-DD`
    #[serde(default)]
    pub selected_date: Option<String>,
    /// Selected clock time, `HH:mm`
    #[serde(default)]
    pub selected_time_slot: Option<String>,
    /// Computed total
    #[serde(default)]
    pub total_amount: f64,
}

/// `POST /abandoned-carts` body
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveCartRequest {
    /// Customer email (identity)
    pub email: String,
    /// Product (identity)
    pub product_id: ProductId,
    /// Selected package
    pub package_id: Option<PackageId>,
    /// Selected slot
    pub slot_id: Option<SlotId>,
    /// Contact details and selection
    pub customer_data: CustomerData,
    /// `closed` once the cart was booked or dismissed
    #[serde(default)]
    pub status: CartStatus,
    /// Client-side modification time
    pub updated_at: DateTime<Utc>,
}

impl From<&CartSnapshot> for SaveCartRequest {
    fn from(cart: &CartSnapshot) -> Self {
        Self {
            email: cart.customer_email.clone(),
            product_id: cart.product_id.clone(),
            package_id: cart.package_id.clone(),
            slot_id: cart.slot_id.clone(),
            customer_data: CustomerData {
                name: cart.customer_name.clone(),
                email: cart.customer_email.clone(),
                phone: cart.customer_phone.clone(),
                adults: cart.adults,
                children: cart.children,
                selected_date: cart.selected_date.clone(),
                selected_time_slot: cart.selected_time_slot.clone(),
                total_amount: cart.total_amount,
            },
            status: cart.status,
            updated_at: cart.updated_at,
        }
    }
}

/// Abandoned-cart record as stored by the backend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerCart {
    /// Customer email
    pub email: String,
    /// Product
    pub product_id: ProductId,
    /// Selected package
    #[serde(default)]
    pub package_id: Option<PackageId>,
    /// Selected slot
    #[serde(default)]
    pub slot_id: Option<SlotId>,
    /// Contact details and selection
    #[serde(default)]
    pub customer_data: CustomerData,
    /// Lifecycle status (`open` or `closed`)
    #[serde(default)]
    pub status: CartStatus,
    /// Last modification known to the backend
    pub updated_at: DateTime<Utc>,
}

impl ServerCart {
    /// Convert into the local snapshot shape.
    #[must_use]
    pub fn into_snapshot(self) -> CartSnapshot {
        let data = self.customer_data;
        CartSnapshot {
            product_id: self.product_id,
            package_id: self.package_id,
            slot_id: self.slot_id,
            customer_name: data.name,
            customer_email: self.email,
            customer_phone: data.phone,
            adults: data.adults,
            children: data.children,
            selected_date: data.selected_date,
            selected_time_slot: data.selected_time_slot,
            total_amount: data.total_amount,
            status: self.status,
            updated_at: self.updated_at,
        }
    }
}

/// `POST /bookings` body
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    /// Product booked
    pub product_id: ProductId,
    /// Package booked
    pub package_id: PackageId,
    /// Slot booked, when the package has slots
    pub slot_id: Option<SlotId>,
    /// Booking date, ISO `YYYY-MM-DD`
    pub booking_date: String,
    /// Clock time, `HH:mm`
    pub time_slot: Option<String>,
    /// Adult participants
    pub adults: u32,
    /// Child participants
    pub children: u32,
    /// Customer name
    pub customer_name: String,
    /// Customer email
    pub customer_email: String,
    /// Customer phone
    pub customer_phone: String,
    /// Free-form notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Total to charge
    pub total_amount: f64,
    /// ISO currency code
    pub currency: String,
}

/// Booking record returned by `POST /bookings`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    /// Backend identifier
    pub id: String,
    /// Customer-facing booking code
    pub booking_code: String,
}

/// `POST /payments/create-order` body
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Booking being paid
    pub booking_id: String,
    /// Amount in major units
    pub amount: f64,
    /// ISO currency code
    pub currency: String,
}

/// Payment order handed to the payment widget
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    /// Provider order id
    pub order_id: String,
    /// Amount as the provider reports it
    pub amount: f64,
    /// ISO currency code
    pub currency: String,
    /// Public key the widget must use
    #[serde(default)]
    pub key_id: Option<String>,
}

/// `POST /payments/verify` body
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    /// Provider order id
    pub order_id: String,
    /// Provider payment id
    pub payment_id: String,
    /// Provider signature over order and payment
    pub signature: String,
    /// Booking being paid
    pub booking_id: String,
}

/// Result of `POST /payments/verify`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerification {
    /// Whether the signature checked out
    pub success: bool,
    /// Booking code, once confirmed
    #[serde(default)]
    pub booking_code: Option<String>,
    /// Backend message, typically on failure
    #[serde(default)]
    pub message: Option<String>,
}
