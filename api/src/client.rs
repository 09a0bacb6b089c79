//! Booking backend client implementation

use crate::error::ApiError;
use crate::types::{
    AvailabilityResponse, BookingRecord, CreateBookingRequest, CreateOrderRequest, PaymentOrder,
    PaymentVerification, SaveCartRequest, ServerCart, SlotsResponse, VerifyPaymentRequest,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tourbook_core::cart::CartSnapshot;
use tourbook_core::catalog::{AvailabilityRecord, PackageId, ProductId, TimeSlot};
use tourbook_core::dates::iso_date;

/// Base URL used when `TOURBOOK_API_URL` is not set
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Operations the booking client needs from the backend.
///
/// Implemented over HTTP by [`BookingApiClient`] and by in-memory mocks in
/// tests. Every method is a single request with no retry.
#[async_trait]
pub trait BookingApi: Send + Sync {
    /// Availability records of a product on one date
    /// (`GET /availability/product/:id?startDate&endDate`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for transport failures, non-2xx responses and
    /// malformed bodies.
    async fn product_availability(
        &self,
        product_id: &ProductId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AvailabilityRecord>, ApiError>;

    /// Slot templates of a package (`GET /availability/package/:id/slots?date`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for transport failures, non-2xx responses and
    /// malformed bodies.
    async fn package_slots(
        &self,
        package_id: &PackageId,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, ApiError>;

    /// Server shadow copy of a cart (`GET /abandoned-carts/status`).
    /// `Ok(None)` when the backend has no record.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for transport failures, non-2xx responses other
    /// than 404, and malformed bodies.
    async fn abandoned_cart_status(
        &self,
        email: &str,
        product_id: &ProductId,
    ) -> Result<Option<CartSnapshot>, ApiError>;

    /// Store the server shadow copy of a cart (`POST /abandoned-carts`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for transport failures and non-2xx responses.
    async fn save_abandoned_cart(&self, request: &SaveCartRequest) -> Result<(), ApiError>;

    /// Create a booking (`POST /bookings`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for transport failures, non-2xx responses and
    /// malformed bodies.
    async fn create_booking(&self, request: &CreateBookingRequest)
    -> Result<BookingRecord, ApiError>;

    /// Open a payment order for a booking (`POST /payments/create-order`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for transport failures, non-2xx responses and
    /// malformed bodies.
    async fn create_payment_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<PaymentOrder, ApiError>;

    /// Verify a completed payment (`POST /payments/verify`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for transport failures, non-2xx responses and
    /// malformed bodies. A rejected signature is `Ok` with `success: false`.
    async fn verify_payment(
        &self,
        request: &VerifyPaymentRequest,
    ) -> Result<PaymentVerification, ApiError>;
}

/// HTTP client for the booking backend
#[derive(Clone, Debug)]
pub struct BookingApiClient {
    client: Client,
    base_url: Url,
}

impl BookingApiClient {
    /// Create a client with base URL from `TOURBOOK_API_URL`, falling back to
    /// [`DEFAULT_API_URL`]
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` if the configured URL does not parse
    pub fn from_env() -> Result<Self, ApiError> {
        let base_url =
            std::env::var("TOURBOOK_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(&base_url)
    }

    /// Create a client for an explicit base URL
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` if `base_url` does not parse or cannot
    /// carry path segments
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    /// Base URL requests are resolved against
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append percent-encoded path segments to the base URL
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        decode(response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        decode(response).await
    }
}

/// Map a response to its JSON body or an [`ApiError::Status`]
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if status.is_success() {
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::ResponseParseFailed(e.to_string()))?;
        // Some endpoints answer 201/204 with an empty body.
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| ApiError::ResponseParseFailed(e.to_string()))
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl BookingApi for BookingApiClient {
    #[tracing::instrument(skip_all, fields(product_id = %product_id, %start, %end))]
    async fn product_availability(
        &self,
        product_id: &ProductId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AvailabilityRecord>, ApiError> {
        let url = self.endpoint(&["availability", "product", product_id.as_str()])?;
        let (start, end) = (iso_date(start), iso_date(end));
        let response: AvailabilityResponse = self
            .get(url, &[("startDate", start.as_str()), ("endDate", end.as_str())])
            .await?;
        Ok(response.availability)
    }

    #[tracing::instrument(skip_all, fields(package_id = %package_id, %date))]
    async fn package_slots(
        &self,
        package_id: &PackageId,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, ApiError> {
        let url = self.endpoint(&["availability", "package", package_id.as_str(), "slots"])?;
        let date = iso_date(date);
        let response: SlotsResponse = self.get(url, &[("date", date.as_str())]).await?;
        Ok(response.slots)
    }

    #[tracing::instrument(skip_all, fields(product_id = %product_id))]
    async fn abandoned_cart_status(
        &self,
        email: &str,
        product_id: &ProductId,
    ) -> Result<Option<CartSnapshot>, ApiError> {
        let url = self.endpoint(&["abandoned-carts", "status"])?;
        let result: Result<Option<ServerCart>, ApiError> = self
            .get(url, &[("email", email), ("productId", product_id.as_str())])
            .await;
        match result {
            Ok(cart) => Ok(cart.map(ServerCart::into_snapshot)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    #[tracing::instrument(skip_all, fields(product_id = %request.product_id))]
    async fn save_abandoned_cart(&self, request: &SaveCartRequest) -> Result<(), ApiError> {
        let url = self.endpoint(&["abandoned-carts"])?;
        let _: serde_json::Value = self.post(url, request).await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(product_id = %request.product_id))]
    async fn create_booking(
        &self,
        request: &CreateBookingRequest,
    ) -> Result<BookingRecord, ApiError> {
        let url = self.endpoint(&["bookings"])?;
        self.post(url, request).await
    }

    #[tracing::instrument(skip_all, fields(booking_id = %request.booking_id))]
    async fn create_payment_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<PaymentOrder, ApiError> {
        let url = self.endpoint(&["payments", "create-order"])?;
        self.post(url, request).await
    }

    #[tracing::instrument(skip_all, fields(booking_id = %request.booking_id))]
    async fn verify_payment(
        &self,
        request: &VerifyPaymentRequest,
    ) -> Result<PaymentVerification, ApiError> {
        let url = self.endpoint(&["payments", "verify"])?;
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        match response.status() {
            // The backend reports a bad signature as 400 with a verification body.
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                match serde_json::from_str::<PaymentVerification>(&body) {
                    Ok(verification) => Ok(verification),
                    Err(_) => Err(ApiError::Status {
                        status: StatusCode::BAD_REQUEST.as_u16(),
                        message: body,
                    }),
                }
            }
            _ => decode(response).await,
        }
    }
}
