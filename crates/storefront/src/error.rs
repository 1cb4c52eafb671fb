//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side failures to
//! Sentry before responding. All API handlers return `Result<T, AppError>`;
//! the body is always `{"error": "<shopper-facing message>"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::cart::CartError;
use crate::checkout::{CheckoutError, TRY_AGAIN};
use crate::commerce::CommerceError;
use crate::payments::PaymentError;
use crate::services::{KlaviyoError, ReviewError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Commerce backend operation failed.
    #[error("Commerce error: {0}")]
    Commerce(#[from] CommerceError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    #[error("Newsletter error: {0}")]
    Newsletter(#[from] KlaviyoError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An optional integration is not configured.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Checkout(err) => match err {
                CheckoutError::Validation(_) | CheckoutError::Rejected(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                CheckoutError::Busy(_) => StatusCode::CONFLICT,
                CheckoutError::Transport(_) => StatusCode::BAD_GATEWAY,
                CheckoutError::Payment(err) => payment_status(err),
            },
            Self::Cart(err) => match err {
                CartError::Rejected(_) | CartError::InvalidQuantity => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                CartError::Transport(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Commerce(err) => match err {
                CommerceError::NotFound(_) => StatusCode::NOT_FOUND,
                CommerceError::Unauthorized(_) => StatusCode::FORBIDDEN,
                CommerceError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                CommerceError::UserError(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Payment(err) => payment_status(err),
            Self::Review(err) => match err {
                ReviewError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Newsletter(_) => StatusCode::BAD_GATEWAY,
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// The message shown to the shopper.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Checkout(err) => err.to_string(),
            Self::Cart(err) => err.to_string(),
            Self::Commerce(err) => err
                .rejection_message()
                .unwrap_or_else(|| TRY_AGAIN.to_string()),
            Self::Payment(err) => err.to_string(),
            Self::Review(ReviewError::Invalid(message)) => message.clone(),
            Self::Review(_) => "We couldn't submit your review. Please try again.".to_string(),
            Self::Newsletter(_) => {
                "We couldn't sign you up right now. Please try again later.".to_string()
            }
            Self::Session(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(message) | Self::BadRequest(message) | Self::Unavailable(message) => {
                message.clone()
            }
        }
    }
}

const fn payment_status(err: &PaymentError) -> StatusCode {
    match err {
        PaymentError::Declined(_) | PaymentError::Cancelled => StatusCode::PAYMENT_REQUIRED,
        PaymentError::MissingToken => StatusCode::UNPROCESSABLE_ENTITY,
        PaymentError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PaymentError::Provider { .. } | PaymentError::Http(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server-side failures to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = %status, "Request refused");
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for shopper actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}
