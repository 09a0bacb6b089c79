//! In-memory backend and payment widget for tests
//!
//! - [`MockBookingApi`]: canned responses per endpoint, recorded calls
//! - [`MockPaymentWidget`]: approves or declines every checkout

#![allow(clippy::missing_panics_doc)] // Poisoned locks are recovered, nothing here panics

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tourbook_api::{
    ApiError, BookingApi, BookingRecord, CreateBookingRequest, CreateOrderRequest,
    PaymentAuthorization, PaymentOrder, PaymentVerification, PaymentWidget, SaveCartRequest,
    VerifyPaymentRequest,
};
use tourbook_core::cart::CartSnapshot;
use tourbook_core::catalog::{AvailabilityRecord, PackageId, ProductId, TimeSlot};

/// A request received by [`MockBookingApi`]
#[derive(Clone, Debug, PartialEq)]
pub enum ApiCall {
    /// `GET /availability/product/:id`
    ProductAvailability {
        /// Product queried
        product_id: ProductId,
        /// First date of the range
        start: NaiveDate,
    },
    /// `GET /availability/package/:id/slots`
    PackageSlots {
        /// Package queried
        package_id: PackageId,
        /// Date queried
        date: NaiveDate,
    },
    /// `GET /abandoned-carts/status`
    CartStatus {
        /// Customer email
        email: String,
        /// Product
        product_id: ProductId,
    },
    /// `POST /abandoned-carts`
    SaveCart(SaveCartRequest),
    /// `POST /bookings`
    CreateBooking(CreateBookingRequest),
    /// `POST /payments/create-order`
    CreateOrder(CreateOrderRequest),
    /// `POST /payments/verify`
    VerifyPayment(VerifyPaymentRequest),
}

#[derive(Debug)]
struct Responses {
    availability: Result<Vec<AvailabilityRecord>, ApiError>,
    availability_by_date: HashMap<NaiveDate, Result<Vec<AvailabilityRecord>, ApiError>>,
    availability_latency: HashMap<NaiveDate, Duration>,
    slots: Result<Vec<TimeSlot>, ApiError>,
    server_cart: Result<Option<CartSnapshot>, ApiError>,
    save_cart: Result<(), ApiError>,
    booking: Result<BookingRecord, ApiError>,
    order: Result<PaymentOrder, ApiError>,
    verification: Result<PaymentVerification, ApiError>,
}

impl Default for Responses {
    fn default() -> Self {
        Self {
            availability: Ok(Vec::new()),
            availability_by_date: HashMap::new(),
            availability_latency: HashMap::new(),
            slots: Ok(Vec::new()),
            server_cart: Ok(None),
            save_cart: Ok(()),
            booking: Ok(BookingRecord {
                id: "bk_1".to_string(),
                booking_code: "TB-0001".to_string(),
            }),
            order: Ok(PaymentOrder {
                order_id: "order_1".to_string(),
                amount: 0.0,
                currency: "USD".to_string(),
                key_id: None,
            }),
            verification: Ok(PaymentVerification {
                success: true,
                booking_code: None,
                message: None,
            }),
        }
    }
}

/// In-memory [`BookingApi`] for fast, deterministic tests.
///
/// Every endpoint answers with a configurable canned result (empty lists and
/// successful payments by default). Clones share responses and the call log.
///
/// # Example
///
/// ```
/// use tourbook_testing::{ApiCall, MockBookingApi};
/// use tourbook_api::BookingApi;
/// use tourbook_core::catalog::ProductId;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let api = MockBookingApi::new();
/// let product = ProductId::new("prod-1");
/// assert!(api.abandoned_cart_status("ada@example.com", &product).await.unwrap().is_none());
/// assert_eq!(api.calls().len(), 1);
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockBookingApi {
    responses: Arc<Mutex<Responses>>,
    calls: Arc<Mutex<Vec<ApiCall>>>,
}

impl MockBookingApi {
    /// Create a mock with default responses
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn responses(&self) -> MutexGuard<'_, Responses> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ApiCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Answer availability queries for any date
    pub fn respond_availability(&self, result: Result<Vec<AvailabilityRecord>, ApiError>) {
        self.responses().availability = result;
    }

    /// Answer availability queries for one date, optionally after a delay
    pub fn respond_availability_on(
        &self,
        date: NaiveDate,
        result: Result<Vec<AvailabilityRecord>, ApiError>,
        latency: Duration,
    ) {
        let mut responses = self.responses();
        responses.availability_by_date.insert(date, result);
        responses.availability_latency.insert(date, latency);
    }

    /// Answer slot queries
    pub fn respond_slots(&self, result: Result<Vec<TimeSlot>, ApiError>) {
        self.responses().slots = result;
    }

    /// Answer cart status queries
    pub fn respond_server_cart(&self, result: Result<Option<CartSnapshot>, ApiError>) {
        self.responses().server_cart = result;
    }

    /// Answer cart saves
    pub fn respond_save_cart(&self, result: Result<(), ApiError>) {
        self.responses().save_cart = result;
    }

    /// Answer booking creation
    pub fn respond_booking(&self, result: Result<BookingRecord, ApiError>) {
        self.responses().booking = result;
    }

    /// Answer payment order creation
    pub fn respond_order(&self, result: Result<PaymentOrder, ApiError>) {
        self.responses().order = result;
    }

    /// Answer payment verification
    pub fn respond_verification(&self, result: Result<PaymentVerification, ApiError>) {
        self.responses().verification = result;
    }

    /// Every request received, in order
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bodies of every `POST /abandoned-carts`
    #[must_use]
    pub fn saved_carts(&self) -> Vec<SaveCartRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::SaveCart(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Number of availability queries received
    #[must_use]
    pub fn availability_queries(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ApiCall::ProductAvailability { .. }))
            .count()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl BookingApi for MockBookingApi {
    async fn product_availability(
        &self,
        product_id: &ProductId,
        start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<AvailabilityRecord>, ApiError> {
        self.record(ApiCall::ProductAvailability {
            product_id: product_id.clone(),
            start,
        });
        let (result, latency) = {
            let responses = self.responses();
            let result = responses
                .availability_by_date
                .get(&start)
                .unwrap_or(&responses.availability)
                .clone();
            (result, responses.availability_latency.get(&start).copied())
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        result
    }

    async fn package_slots(
        &self,
        package_id: &PackageId,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, ApiError> {
        self.record(ApiCall::PackageSlots {
            package_id: package_id.clone(),
            date,
        });
        self.responses().slots.clone()
    }

    async fn abandoned_cart_status(
        &self,
        email: &str,
        product_id: &ProductId,
    ) -> Result<Option<CartSnapshot>, ApiError> {
        self.record(ApiCall::CartStatus {
            email: email.to_string(),
            product_id: product_id.clone(),
        });
        self.responses().server_cart.clone()
    }

    async fn save_abandoned_cart(&self, request: &SaveCartRequest) -> Result<(), ApiError> {
        self.record(ApiCall::SaveCart(request.clone()));
        self.responses().save_cart.clone()
    }

    async fn create_booking(
        &self,
        request: &CreateBookingRequest,
    ) -> Result<BookingRecord, ApiError> {
        self.record(ApiCall::CreateBooking(request.clone()));
        self.responses().booking.clone()
    }

    async fn create_payment_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<PaymentOrder, ApiError> {
        self.record(ApiCall::CreateOrder(request.clone()));
        self.responses().order.clone()
    }

    async fn verify_payment(
        &self,
        request: &VerifyPaymentRequest,
    ) -> Result<PaymentVerification, ApiError> {
        self.record(ApiCall::VerifyPayment(request.clone()));
        self.responses().verification.clone()
    }
}

/// Payment widget that settles every checkout the same way
#[derive(Clone, Debug, Default)]
pub struct MockPaymentWidget {
    decline: Arc<Mutex<Option<String>>>,
    checkouts: Arc<Mutex<Vec<PaymentOrder>>>,
}

impl MockPaymentWidget {
    /// Widget approving every order
    #[must_use]
    pub fn approving() -> Self {
        Self::default()
    }

    /// Widget declining every order with `reason`
    #[must_use]
    pub fn declining(reason: impl Into<String>) -> Self {
        let widget = Self::default();
        widget.set_decline(Some(reason.into()));
        widget
    }

    /// Switch between approving (`None`) and declining
    pub fn set_decline(&self, reason: Option<String>) {
        *self.decline.lock().unwrap_or_else(PoisonError::into_inner) = reason;
    }

    /// Orders presented so far
    #[must_use]
    pub fn checkouts(&self) -> Vec<PaymentOrder> {
        self.checkouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PaymentWidget for MockPaymentWidget {
    async fn checkout(&self, order: &PaymentOrder) -> Result<PaymentAuthorization, ApiError> {
        self.checkouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(order.clone());
        let decline = self
            .decline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match decline {
            Some(reason) => Err(ApiError::PaymentCancelled(reason)),
            None => Ok(PaymentAuthorization {
                order_id: order.order_id.clone(),
                payment_id: format!("pay_{}", order.order_id),
                signature: "mock-signature".to_string(),
            }),
        }
    }
}
