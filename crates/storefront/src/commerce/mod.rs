//! Commerce backend client: products, session cart, checkout and orders.
//!
//! # Architecture
//!
//! - [`CommerceBackend`] is the seam the cart store, checkout orchestrator and
//!   confirmation poller depend on; nothing above this module sees GraphQL.
//! - [`CatalogClient`] talks to a WooGraphQL-compatible endpoint using
//!   `graphql_client` request/response envelopes over `reqwest` 0.13.
//! - [`InMemoryCommerce`] implements the same trait against in-process data
//!   for tests and local development without a backend.
//! - The backend owns the durable session cart; [`BackendSession`] carries the
//!   session token the backend issues so consecutive calls hit the same cart.
//! - Product reads are cached in `moka` for 5 minutes; cart, checkout and
//!   order calls are never cached.

mod client;
mod conversions;
pub mod memory;
mod queries;
pub mod types;

use async_trait::async_trait;
use copperleaf_core::{OrderId, ProductId};
use thiserror::Error;
use tokio::sync::RwLock;

pub use client::CatalogClient;
pub use memory::InMemoryCommerce;
pub use types::*;

/// Errors that can occur when interacting with the commerce backend.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status without a parseable GraphQL body.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller is not allowed to read the resource (e.g. order key mismatch).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Business rule rejection (invalid coupon, out of stock, ...).
    #[error("User error: {0}")]
    UserError(String),
}

impl CommerceError {
    /// The message a shopper should see when the backend rejected the request.
    ///
    /// Returns `None` for transport-level failures where the backend never
    /// produced a message of its own.
    #[must_use]
    pub fn rejection_message(&self) -> Option<String> {
        match self {
            Self::UserError(message) | Self::Unauthorized(message) | Self::NotFound(message) => {
                Some(message.clone())
            }
            Self::GraphQL(errors) => {
                let messages: Vec<&str> = errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .filter(|m| !m.is_empty())
                    .collect();
                if messages.is_empty() {
                    None
                } else {
                    Some(messages.join("; "))
                }
            }
            Self::Http(_) | Self::Status { .. } | Self::Parse(_) | Self::RateLimited(_) => None,
        }
    }
}

/// A GraphQL error returned by the backend.
#[derive(Debug, Clone)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Source locations in the query.
    pub locations: Vec<GraphQLErrorLocation>,
    /// Path to the error in the response.
    pub path: Vec<serde_json::Value>,
}

impl GraphQLError {
    /// An error carrying only a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: vec![],
            path: vec![],
        }
    }
}

/// Location in a GraphQL query where an error occurred.
#[derive(Debug, Clone)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i64,
    /// Column number (1-indexed).
    pub column: i64,
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    if errors.is_empty() {
        return "(no error details provided)".to_string();
    }

    errors
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let mut parts = Vec::new();

            if !e.message.is_empty() {
                parts.push(e.message.clone());
            }

            if !e.path.is_empty() {
                let path_str = e
                    .path
                    .iter()
                    .map(|p| match p {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(".");
                parts.push(format!("path: {path_str}"));
            }

            if let Some(loc) = e.locations.first() {
                parts.push(format!("at line {}:{}", loc.line, loc.column));
            }

            if parts.is_empty() {
                format!("[error {}]: (no details)", i + 1)
            } else {
                parts.join(" ")
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Backend session
// =============================================================================

/// Session token continuity with the backend's session cart.
///
/// The backend issues a token on the first cart interaction and may rotate it
/// on any response; every call made on behalf of one shopper must send the
/// latest token back.
#[derive(Debug, Default)]
pub struct BackendSession {
    token: RwLock<Option<String>>,
}

impl BackendSession {
    /// A session with no token yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A session resuming a previously issued token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// The current token, if the backend has issued one.
    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Record a token returned by the backend.
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }
}

// =============================================================================
// Backend trait
// =============================================================================

/// Operations the storefront needs from the commerce backend.
///
/// Every cart and checkout call takes the shopper's [`BackendSession`]; order
/// reads are authorized by the order key instead.
#[async_trait]
pub trait CommerceBackend: Send + Sync {
    /// Paginated product listing.
    async fn products(&self, query: &ProductQuery) -> Result<ProductConnection, CommerceError>;

    /// A single product with reviews and related products.
    async fn product(&self, slug: &str) -> Result<ProductDetail, CommerceError>;

    /// The session cart with aggregates and shipping rates.
    async fn cart(&self, session: &BackendSession) -> Result<Cart, CommerceError>;

    /// Add a product line to the session cart.
    async fn add_item(
        &self,
        session: &BackendSession,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart, CommerceError>;

    /// Set the quantity of an existing line.
    async fn update_item_quantity(
        &self,
        session: &BackendSession,
        key: &str,
        quantity: u32,
    ) -> Result<Cart, CommerceError>;

    /// Remove lines by key.
    async fn remove_items(
        &self,
        session: &BackendSession,
        keys: &[String],
    ) -> Result<Cart, CommerceError>;

    /// Remove every line.
    async fn empty_cart(&self, session: &BackendSession) -> Result<Cart, CommerceError>;

    /// Store billing/shipping details on the session customer so shipping
    /// rates and taxes are computed for the destination.
    async fn update_customer(
        &self,
        session: &BackendSession,
        update: &CustomerUpdate,
    ) -> Result<(), CommerceError>;

    /// Choose a shipping rate for the session cart.
    async fn update_shipping_method(
        &self,
        session: &BackendSession,
        rate_id: &str,
    ) -> Result<Cart, CommerceError>;

    /// Apply a coupon code.
    async fn apply_coupon(
        &self,
        session: &BackendSession,
        code: &str,
    ) -> Result<AppliedCoupon, CommerceError>;

    /// Remove coupon codes.
    async fn remove_coupons(
        &self,
        session: &BackendSession,
        codes: &[String],
    ) -> Result<(), CommerceError>;

    /// Payment gateways enabled in the backend.
    async fn payment_gateways(
        &self,
        session: &BackendSession,
    ) -> Result<Vec<PaymentGateway>, CommerceError>;

    /// Create an order from the session cart.
    async fn create_order(
        &self,
        session: &BackendSession,
        input: &CheckoutInput,
    ) -> Result<OrderResult, CommerceError>;

    /// Read an order, authorized by its key.
    ///
    /// Implementations must return [`CommerceError::Unauthorized`] when the key
    /// does not match, without revealing any order data.
    async fn order(&self, id: OrderId, key: &str) -> Result<Order, CommerceError>;

    /// Mark an order paid after out-of-band payment verification.
    ///
    /// Calling this for an order that is already paid returns it unchanged.
    async fn finalize_order(
        &self,
        id: OrderId,
        transaction_id: &str,
    ) -> Result<Order, CommerceError>;
}
