//! Wallet payments approved in the provider's hosted widget.

use std::sync::Arc;

use async_trait::async_trait;
use copperleaf_core::Price;
use tracing::{info, instrument, warn};

use super::{PaymentAdapter, PaymentError, PaymentOutcome, PaymentRequest, WalletOrders};

const AMOUNT_MISMATCH: &str =
    "Your order total changed after the payment was approved. Please approve the payment again.";

/// Whether two amounts charge the same number of minor units in one currency.
fn same_amount(a: Price, b: Price) -> bool {
    a.currency_code == b.currency_code
        && a.minor_units().is_some()
        && a.minor_units() == b.minor_units()
}

/// Captures a provider order the shopper approved in the widget.
///
/// The widget needs a provider order id up front; that comes from
/// [`WalletOrders::create_order`] via the payments API route.
pub struct WalletAdapter {
    gateway_id: String,
    orders: Arc<dyn WalletOrders>,
}

impl WalletAdapter {
    #[must_use]
    pub fn new(gateway_id: impl Into<String>, orders: Arc<dyn WalletOrders>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            orders,
        }
    }
}

#[async_trait]
impl PaymentAdapter for WalletAdapter {
    fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    #[instrument(skip(self, request), fields(gateway = %self.gateway_id))]
    async fn initiate(&self, request: PaymentRequest) -> Result<PaymentOutcome, PaymentError> {
        let order_id = request
            .wallet_order_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(PaymentError::Cancelled)?;

        let approved = self.orders.order_amount(&order_id).await?;
        if !same_amount(approved, request.amount) {
            warn!(
                wallet_order = %order_id,
                approved = %approved,
                expected = %request.amount,
                "Wallet order amount does not match the order total"
            );
            return Err(PaymentError::Declined(AMOUNT_MISMATCH.to_string()));
        }

        let capture_id = self.orders.capture_order(&order_id).await?;
        info!(wallet_order = %order_id, capture = %capture_id, "Wallet payment captured");
        Ok(PaymentOutcome::Completed {
            transaction_id: Some(capture_id),
        })
    }
}
