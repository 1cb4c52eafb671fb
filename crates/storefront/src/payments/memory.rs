//! In-process payment provider used by tests and local development.
//!
//! Implements both [`PaymentIntents`] and [`WalletOrders`] so the full
//! checkout and confirmation flow can run without provider credentials.

use std::collections::HashMap;

use async_trait::async_trait;
use copperleaf_core::{PaymentStatus, Price};
use tokio::sync::Mutex;

use super::{IntentParams, PaymentError, PaymentIntent, PaymentIntents, WalletOrders};

/// How confirmed card intents behave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CardBehavior {
    #[default]
    Succeed,
    /// Require an off-site authentication step.
    RequireAction,
    Decline,
}

#[derive(Debug, Clone, Copy)]
struct WalletOrder {
    amount: Price,
    approved: bool,
}

#[derive(Debug, Default)]
struct State {
    card_behavior: CardBehavior,
    intents: HashMap<String, PaymentIntent>,
    captures: usize,
    wallet_orders: HashMap<String, WalletOrder>,
    next_id: u64,
}

impl State {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{:06}", self.next_id)
    }
}

/// In-memory card processor and wallet provider.
#[derive(Debug, Default)]
pub struct InMemoryPayments {
    state: Mutex<State>,
}

fn not_found(id: &str) -> PaymentError {
    PaymentError::Provider {
        status: 404,
        message: format!("No such payment: {id}"),
    }
}

impl InMemoryPayments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change how subsequent confirmed card intents behave.
    pub async fn set_card_behavior(&self, behavior: CardBehavior) {
        self.state.lock().await.card_behavior = behavior;
    }

    /// Move an intent to a new status (e.g. the shopper finished 3-D Secure).
    pub async fn set_intent_status(&self, id: &str, status: PaymentStatus) {
        if let Some(intent) = self.state.lock().await.intents.get_mut(id) {
            intent.status = status;
            intent.next_action_url = None;
        }
    }

    /// Look up an intent.
    pub async fn intent(&self, id: &str) -> Option<PaymentIntent> {
        self.state.lock().await.intents.get(id).cloned()
    }

    /// Amount an open wallet order was created for.
    pub async fn wallet_order_amount(&self, order_id: &str) -> Option<Price> {
        self.state
            .lock()
            .await
            .wallet_orders
            .get(order_id)
            .map(|order| order.amount)
    }

    /// Number of wallet orders captured so far.
    pub async fn wallet_captures(&self) -> usize {
        self.state.lock().await.captures
    }

    /// Mark a wallet order as approved by the shopper.
    pub async fn approve(&self, order_id: &str) {
        if let Some(order) = self.state.lock().await.wallet_orders.get_mut(order_id) {
            order.approved = true;
        }
    }
}

#[async_trait]
impl PaymentIntents for InMemoryPayments {
    async fn create_intent(&self, params: &IntentParams) -> Result<PaymentIntent, PaymentError> {
        let amount = params.amount.minor_units().ok_or_else(|| PaymentError::Provider {
            status: 400,
            message: "Invalid amount".to_string(),
        })?;
        let mut state = self.state.lock().await;
        let id = state.next("pi");

        let (status, next_action_url, last_error) = match (&params.payment_method, state.card_behavior) {
            (None, _) => (PaymentStatus::RequiresPaymentMethod, None, None),
            (Some(_), CardBehavior::Succeed) => (PaymentStatus::Succeeded, None, None),
            (Some(_), CardBehavior::RequireAction) => (
                PaymentStatus::RequiresAction,
                Some(format!("https://payments.invalid/authenticate/{id}")),
                None,
            ),
            (Some(_), CardBehavior::Decline) => {
                return Err(PaymentError::Declined("Your card was declined.".to_string()));
            }
        };

        let intent = PaymentIntent {
            client_secret: Some(format!("{id}_secret")),
            id: id.clone(),
            status,
            amount,
            currency: params.amount.currency_code.lowercase_code(),
            next_action_url,
            last_error,
        };
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn update_amount(&self, id: &str, amount: Price) -> Result<PaymentIntent, PaymentError> {
        let minor = amount.minor_units().ok_or_else(|| PaymentError::Provider {
            status: 400,
            message: "Invalid amount".to_string(),
        })?;
        let mut state = self.state.lock().await;
        let intent = state.intents.get_mut(id).ok_or_else(|| not_found(id))?;
        intent.amount = minor;
        Ok(intent.clone())
    }

    async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError> {
        self.intent(id).await.ok_or_else(|| not_found(id))
    }
}

#[async_trait]
impl WalletOrders for InMemoryPayments {
    async fn create_order(&self, amount: Price) -> Result<String, PaymentError> {
        let mut state = self.state.lock().await;
        let id = state.next("WALLET");
        state.wallet_orders.insert(
            id.clone(),
            WalletOrder {
                amount,
                approved: false,
            },
        );
        Ok(id)
    }

    async fn order_amount(&self, order_id: &str) -> Result<Price, PaymentError> {
        self.state
            .lock()
            .await
            .wallet_orders
            .get(order_id)
            .map(|order| order.amount)
            .ok_or(PaymentError::Cancelled)
    }

    async fn capture_order(&self, order_id: &str) -> Result<String, PaymentError> {
        let mut state = self.state.lock().await;
        match state.wallet_orders.get(order_id).copied() {
            Some(WalletOrder { approved: true, .. }) => {
                state.wallet_orders.remove(order_id);
                state.captures += 1;
                Ok(state.next("CAPTURE"))
            }
            Some(_) | None => Err(PaymentError::Cancelled),
        }
    }
}
