//! Checkout error taxonomy.

use thiserror::Error;

use crate::cart::CartError;
use crate::commerce::CommerceError;
use crate::payments::PaymentError;

/// Generic message for failures the shopper cannot act on.
pub const TRY_AGAIN: &str = "Something went wrong. Please try again.";

/// Errors surfaced by checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Input failed a precondition; no backend call was made.
    #[error("{0}")]
    Validation(String),

    /// Another operation of the same kind is still in flight.
    #[error("{0}")]
    Busy(&'static str),

    /// The backend refused the request; the message is shown verbatim.
    #[error("{0}")]
    Rejected(String),

    /// The backend could not be reached or answered with garbage.
    #[error("Something went wrong. Please try again.")]
    Transport(#[source] CommerceError),

    /// The payment adapter failed.
    #[error("{0}")]
    Payment(#[from] PaymentError),
}

impl From<CommerceError> for CheckoutError {
    fn from(err: CommerceError) -> Self {
        err.rejection_message()
            .map_or_else(|| Self::Transport(err), Self::Rejected)
    }
}

impl From<CartError> for CheckoutError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::Rejected(message) => Self::Rejected(message),
            CartError::Transport(source) => Self::Transport(source),
            CartError::InvalidQuantity => Self::Validation(CartError::InvalidQuantity.to_string()),
        }
    }
}
