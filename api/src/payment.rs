//! Payment widget contract
//!
//! The payment provider's checkout UI runs outside this workspace. The booking
//! flow only needs to hand it an order and get back the provider's proof of
//! payment, which the backend then verifies.

use crate::error::ApiError;
use crate::types::{PaymentOrder, VerifyPaymentRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Proof of payment returned by the provider widget
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    /// Provider order id, echoed back
    pub order_id: String,
    /// Provider payment id
    pub payment_id: String,
    /// Provider signature over order and payment
    pub signature: String,
}

impl PaymentAuthorization {
    /// Build the verification request for the booking being paid.
    #[must_use]
    pub fn verification_for(&self, booking_id: impl Into<String>) -> VerifyPaymentRequest {
        VerifyPaymentRequest {
            order_id: self.order_id.clone(),
            payment_id: self.payment_id.clone(),
            signature: self.signature.clone(),
            booking_id: booking_id.into(),
        }
    }
}

/// Client-side checkout widget of the payment provider.
#[async_trait]
pub trait PaymentWidget: Send + Sync {
    /// Present checkout for `order` and wait for the customer.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::PaymentCancelled`] when the customer closes the
    /// widget or the provider declines the payment.
    async fn checkout(&self, order: &PaymentOrder) -> Result<PaymentAuthorization, ApiError>;
}
