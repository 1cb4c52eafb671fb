//! Checkout orchestration.
//!
//! [`state`] holds the pure reducer; [`CheckoutOrchestrator`] is the async
//! shell that talks to the backend and payment adapters and feeds results
//! back through it.

mod debounce;
mod error;
mod orchestrator;
pub mod state;
mod validation;

use copperleaf_core::{OrderId, OrderKey};
use serde::{Deserialize, Serialize};

pub use debounce::Debouncer;
pub use error::{CheckoutError, TRY_AGAIN};
pub(crate) use orchestrator::record_purchase;
pub use orchestrator::{
    CheckoutOrchestrator, CheckoutServices, PAYMENT_INTENT_META_KEY, PaymentDetails,
    PlaceOrderOutcome,
};
pub use state::{CheckoutAction, CheckoutPhase, CheckoutState, Notification, reduce};
pub use validation::validate_order;

/// An order created unpaid while the shopper finishes payment off-site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPayment {
    pub order_id: OrderId,
    pub order_key: OrderKey,
    pub payment_intent_id: String,
}

/// Path of the receipt page for an order.
#[must_use]
pub fn receipt_path(order_id: OrderId, order_key: &OrderKey) -> String {
    format!(
        "/orders/{order_id}?key={}",
        urlencoding::encode(order_key.as_str())
    )
}
