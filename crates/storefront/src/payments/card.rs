//! Card payments through payment intents.

use std::sync::Arc;

use async_trait::async_trait;
use copperleaf_core::PaymentStatus;
use tracing::{info, instrument};

use super::{
    IntentParams, PaymentAdapter, PaymentError, PaymentIntents, PaymentOutcome, PaymentRequest,
};

/// Confirms a payment intent with the token collected by the browser SDK.
pub struct CardAdapter {
    gateway_id: String,
    intents: Arc<dyn PaymentIntents>,
}

impl CardAdapter {
    #[must_use]
    pub fn new(gateway_id: impl Into<String>, intents: Arc<dyn PaymentIntents>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            intents,
        }
    }
}

#[async_trait]
impl PaymentAdapter for CardAdapter {
    fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    #[instrument(skip(self, request), fields(gateway = %self.gateway_id, amount = %request.amount))]
    async fn initiate(&self, request: PaymentRequest) -> Result<PaymentOutcome, PaymentError> {
        let token = request
            .payment_token
            .filter(|t| !t.trim().is_empty())
            .ok_or(PaymentError::MissingToken)?;

        let intent = self
            .intents
            .create_intent(&IntentParams {
                amount: request.amount,
                payment_method_types: vec!["card".to_string()],
                payment_method: Some(token),
                return_url: Some(request.return_url),
                receipt_email: request.email,
            })
            .await?;

        match (intent.status, intent.next_action_url) {
            (PaymentStatus::Succeeded, _) => {
                info!(payment_intent = %intent.id, "Card payment succeeded");
                Ok(PaymentOutcome::Completed {
                    transaction_id: Some(intent.id),
                })
            }
            (PaymentStatus::RequiresAction, Some(url)) => {
                info!(payment_intent = %intent.id, "Card payment requires shopper action");
                Ok(PaymentOutcome::Redirect {
                    url,
                    payment_intent_id: intent.id,
                })
            }
            _ => Err(PaymentError::Declined(intent.last_error.unwrap_or_else(
                || "Your card could not be charged. Please try another card.".to_string(),
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use copperleaf_core::{CurrencyCode, Price};
    use rust_decimal::Decimal;

    use super::*;
    use crate::payments::memory::{CardBehavior, InMemoryPayments};

    fn request(token: Option<&str>) -> PaymentRequest {
        PaymentRequest {
            amount: Price::new(Decimal::new(5999, 2), CurrencyCode::USD),
            payment_token: token.map(str::to_string),
            wallet_order_id: None,
            return_url: "https://shop.test/checkout/confirm".to_string(),
            email: Some("ada@example.org".to_string()),
        }
    }

    #[tokio::test]
    async fn test_succeeded_intent_completes() {
        let payments = Arc::new(InMemoryPayments::new());
        let adapter = CardAdapter::new("stripe", payments.clone());
        let outcome = adapter.initiate(request(Some("pm_card_visa"))).await.unwrap();
        let PaymentOutcome::Completed {
            transaction_id: Some(id),
        } = outcome
        else {
            panic!("expected completed outcome");
        };
        assert_eq!(payments.intent(&id).await.unwrap().amount, 5999);
    }

    #[tokio::test]
    async fn test_requires_action_redirects() {
        let payments = Arc::new(InMemoryPayments::new());
        payments.set_card_behavior(CardBehavior::RequireAction).await;
        let adapter = CardAdapter::new("stripe", payments);
        let outcome = adapter.initiate(request(Some("pm_card_3ds"))).await.unwrap();
        assert!(matches!(outcome, PaymentOutcome::Redirect { .. }));
    }

    #[tokio::test]
    async fn test_decline_and_missing_token() {
        let payments = Arc::new(InMemoryPayments::new());
        payments.set_card_behavior(CardBehavior::Decline).await;
        let adapter = CardAdapter::new("stripe", payments.clone());
        let err = adapter.initiate(request(Some("pm_card_declined"))).await.unwrap_err();
        assert_eq!(err.to_string(), "Your card was declined.");

        let err = adapter.initiate(request(None)).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingToken));
    }
}
