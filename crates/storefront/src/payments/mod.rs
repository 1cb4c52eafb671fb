//! Payment gateway adapters.
//!
//! Each backend gateway id maps to a [`PaymentAdapter`] that collects payment
//! and reports a provider-neutral [`PaymentOutcome`]. Checkout only ever sees
//! the trait; provider types stay in the adapter modules.
//!
//! - [`CardAdapter`]: payment intents confirmed with a browser-collected token
//! - [`WalletAdapter`]: provider-hosted approval, captured server-side
//! - [`OfflineAdapter`]: cash on delivery, bank transfer, cheque

mod card;
pub mod memory;
mod offline;
mod paypal;
mod registry;
mod stripe;
mod wallet;

use async_trait::async_trait;
use copperleaf_core::{PaymentStatus, Price};
use serde::Serialize;
use thiserror::Error;

pub use card::CardAdapter;
pub use memory::InMemoryPayments;
pub use offline::OfflineAdapter;
pub use paypal::PayPalClient;
pub use registry::PaymentRegistry;
pub use stripe::StripeClient;
pub use wallet::WalletAdapter;

/// Errors from payment providers.
///
/// Display strings are shown to shoppers.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The provider declined the payment.
    #[error("{0}")]
    Declined(String),

    /// The shopper did not approve the payment.
    #[error("Payment was cancelled. You have not been charged.")]
    Cancelled,

    /// The browser did not send the token the adapter needs.
    #[error("Please enter your payment details.")]
    MissingToken,

    /// No adapter is configured for the gateway.
    #[error("This payment method is not available.")]
    Unavailable(String),

    /// The provider returned an unexpected error.
    #[error("The payment provider could not be reached. Please try again.")]
    Provider { status: u16, message: String },

    /// HTTP request failed.
    #[error("The payment provider could not be reached. Please try again.")]
    Http(#[from] reqwest::Error),
}

/// What checkout asks an adapter to collect.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: Price,
    /// Payment method token from the processor's browser SDK.
    pub payment_token: Option<String>,
    /// Provider order id the shopper approved in the wallet widget.
    pub wallet_order_id: Option<String>,
    /// Where the provider sends the shopper after an off-site step.
    pub return_url: String,
    pub email: Option<String>,
}

/// Normalized result of collecting payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Funds secured (or no online capture); create the order.
    Completed { transaction_id: Option<String> },
    /// The shopper must finish payment with the provider first.
    Redirect {
        url: String,
        payment_intent_id: String,
    },
}

/// One gateway's payment collection.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Backend gateway id this adapter serves.
    fn gateway_id(&self) -> &str;

    /// Collect payment for `request`.
    async fn initiate(&self, request: PaymentRequest) -> Result<PaymentOutcome, PaymentError>;
}

/// Parameters for creating a payment intent.
#[derive(Debug, Clone)]
pub struct IntentParams {
    pub amount: Price,
    pub payment_method_types: Vec<String>,
    /// Confirm immediately with this payment method.
    pub payment_method: Option<String>,
    pub return_url: Option<String>,
    pub receipt_email: Option<String>,
}

/// A processor payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Amount in minor units.
    pub amount: i64,
    pub currency: String,
    /// Off-site URL when the intent requires shopper action.
    #[serde(skip)]
    pub next_action_url: Option<String>,
    /// Processor's decline message, if any.
    #[serde(skip)]
    pub last_error: Option<String>,
}

/// The processor's payment-intents API.
#[async_trait]
pub trait PaymentIntents: Send + Sync {
    async fn create_intent(&self, params: &IntentParams) -> Result<PaymentIntent, PaymentError>;

    async fn update_amount(&self, id: &str, amount: Price) -> Result<PaymentIntent, PaymentError>;

    async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError>;
}

/// The wallet provider's orders API.
#[async_trait]
pub trait WalletOrders: Send + Sync {
    /// Create a provider order for the hosted widget; returns its id.
    async fn create_order(&self, amount: Price) -> Result<String, PaymentError>;

    /// Amount the provider order was created for.
    async fn order_amount(&self, order_id: &str) -> Result<Price, PaymentError>;

    /// Capture an approved order; returns the capture id.
    async fn capture_order(&self, order_id: &str) -> Result<String, PaymentError>;
}
