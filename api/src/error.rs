//! Error types for the booking backend client

use thiserror::Error;

/// Errors that can occur when talking to the booking backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Base URL could not be parsed or joined with an endpoint path
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    /// HTTP request failed (connection refused, DNS, TLS, ...)
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Response body did not match the expected shape
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// Backend answered with a non-success status
    #[error("API error (status {status}): {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or backend message
        message: String,
    },

    /// The customer closed or failed the payment widget
    #[error("Payment not completed: {0}")]
    PaymentCancelled(String),
}

impl ApiError {
    /// Whether the backend reported that the resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}
