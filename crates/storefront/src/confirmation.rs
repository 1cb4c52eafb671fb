//! Server-side verification of off-site payments.
//!
//! When a card payment needs an off-site step the order is created unpaid and
//! the shopper is sent to the processor. On return, [`ConfirmationPoller`]
//! asks the processor for the intent status and, once it has succeeded, marks
//! the order paid and clears the cart. Definitive outcomes are memoized per
//! `(order_id, payment_intent_id)` in the shopper session so reloading the
//! confirmation page never finalizes or clears twice.

use std::sync::Arc;

use copperleaf_core::{CurrencyCode, OrderId, PaymentStatus, Price};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::checkout::{PendingPayment, TRY_AGAIN, receipt_path, record_purchase};
use crate::commerce::CommerceBackend;
use crate::payments::PaymentIntents;
use crate::services::analytics::AnalyticsSink;
use crate::session::ShopperSession;

const PAYMENT_RECEIVED: &str = "Thank you! Your payment was received.";
const PAYMENT_NOT_COMPLETED: &str =
    "Your payment was not completed. Your cart has been kept so you can try again.";
const PAYMENT_PROCESSING: &str =
    "Your payment is still processing. Please refresh this page in a moment.";
const UNKNOWN_PAYMENT: &str =
    "We couldn't find that payment. If you were charged, please contact us.";
const CARDS_UNAVAILABLE: &str = "Card payments are not available right now.";

/// Result of verifying an off-site payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
    pub message: String,
    /// Receipt page for a verified order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
}

impl VerifyOutcome {
    fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            receipt_url: None,
        }
    }
}

enum Settlement {
    /// Will not change on retry; memoize.
    Final(VerifyOutcome),
    /// May change on retry.
    Transient(VerifyOutcome),
}

/// Verifies returning off-site payments.
pub struct ConfirmationPoller {
    backend: Arc<dyn CommerceBackend>,
    intents: Option<Arc<dyn PaymentIntents>>,
    analytics: Arc<dyn AnalyticsSink>,
    currency: CurrencyCode,
}

impl ConfirmationPoller {
    #[must_use]
    pub fn new(
        backend: Arc<dyn CommerceBackend>,
        intents: Option<Arc<dyn PaymentIntents>>,
        analytics: Arc<dyn AnalyticsSink>,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            backend,
            intents,
            analytics,
            currency,
        }
    }

    /// Verify the payment for `order_id` and finalize the order if it succeeded.
    ///
    /// Only the shopper's own pending payment can be verified. Concurrent
    /// calls for one shopper are serialized.
    #[instrument(skip(self, shopper), fields(shopper_id = %shopper.id(), order_id = %order_id))]
    pub async fn verify(
        &self,
        shopper: &ShopperSession,
        order_id: OrderId,
        payment_intent_id: &str,
    ) -> VerifyOutcome {
        let key = (order_id, payment_intent_id.to_string());
        let mut memo = shopper.confirmations().lock().await;
        if let Some(outcome) = memo.get(&key) {
            return outcome.clone();
        }

        let Some(pending) = shopper
            .pending_payment()
            .await
            .filter(|p| p.order_id == order_id && p.payment_intent_id == payment_intent_id)
        else {
            warn!(payment_intent_id, "No matching pending payment for shopper");
            return VerifyOutcome::failure(UNKNOWN_PAYMENT);
        };

        match self.settle(shopper, &pending).await {
            Settlement::Final(outcome) => {
                memo.insert(key, outcome.clone());
                outcome
            }
            Settlement::Transient(outcome) => outcome,
        }
    }

    /// Verify the shopper's pending off-site payment.
    ///
    /// `payment_intent_id` is the id the provider appended to the return URL;
    /// when absent the pending payment's own intent is checked.
    pub async fn verify_pending(
        &self,
        shopper: &ShopperSession,
        payment_intent_id: Option<&str>,
    ) -> VerifyOutcome {
        let Some(pending) = shopper.pending_payment().await else {
            warn!(shopper_id = %shopper.id(), "Confirmation without a pending payment");
            return VerifyOutcome::failure(UNKNOWN_PAYMENT);
        };
        let intent_id = payment_intent_id.unwrap_or(pending.payment_intent_id.as_str());
        self.verify(shopper, pending.order_id, intent_id).await
    }

    async fn settle(&self, shopper: &ShopperSession, pending: &PendingPayment) -> Settlement {
        let Some(intents) = &self.intents else {
            return Settlement::Transient(VerifyOutcome::failure(CARDS_UNAVAILABLE));
        };

        let intent = match intents.retrieve_intent(&pending.payment_intent_id).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(error = %e, "Failed to retrieve payment intent");
                return Settlement::Transient(VerifyOutcome::failure(TRY_AGAIN));
            }
        };

        match intent.status {
            PaymentStatus::Succeeded => {}
            PaymentStatus::Processing => {
                return Settlement::Transient(VerifyOutcome::failure(PAYMENT_PROCESSING));
            }
            status => {
                info!(?status, "Off-site payment not completed");
                shopper.checkout().payment_failed(PAYMENT_NOT_COMPLETED).await;
                return Settlement::Final(VerifyOutcome::failure(PAYMENT_NOT_COMPLETED));
            }
        }

        let order = match self
            .backend
            .finalize_order(pending.order_id, &intent.id)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                error!(error = %e, "Payment succeeded but the order could not be finalized");
                return Settlement::Transient(VerifyOutcome::failure(TRY_AGAIN));
            }
        };

        let total = Price::parse_display(&order.total, self.currency)
            .unwrap_or_else(|_| Price::from_minor_units(intent.amount, self.currency));
        record_purchase(
            &self.analytics,
            &shopper.id().to_string(),
            shopper.cart(),
            order.id,
            total,
        )
        .await;
        if let Err(e) = shopper.cart().clear_cart().await {
            warn!(error = %e, "Order finalized but the cart could not be cleared");
        }
        shopper.checkout().payment_confirmed(order.id).await;
        info!(transaction_id = %intent.id, "Off-site payment verified");

        Settlement::Final(VerifyOutcome {
            success: true,
            message: PAYMENT_RECEIVED.to_string(),
            receipt_url: Some(receipt_path(pending.order_id, &pending.order_key)),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use copperleaf_core::{OrderStatus, ProductId};
    use uuid::Uuid;

    use super::*;
    use crate::checkout::{CheckoutServices, PaymentDetails, PlaceOrderOutcome};
    use crate::commerce::{AddressPatch, InMemoryCommerce};
    use crate::config::CheckoutConfig;
    use crate::payments::memory::CardBehavior;
    use crate::payments::{InMemoryPayments, PaymentRegistry, WalletOrders};
    use crate::services::analytics::NoopAnalytics;
    use crate::session::ShopperSessions;

    struct Harness {
        backend: InMemoryCommerce,
        payments: Arc<InMemoryPayments>,
        poller: ConfirmationPoller,
        shopper: Arc<ShopperSession>,
        pending: PendingPayment,
    }

    /// A shopper redirected off-site to authenticate a card payment.
    async fn redirected() -> Harness {
        let backend = InMemoryCommerce::with_sample_catalog(CurrencyCode::USD);
        let payments = Arc::new(InMemoryPayments::new());
        payments.set_card_behavior(CardBehavior::RequireAction).await;
        let intents: Arc<dyn PaymentIntents> = Arc::clone(&payments) as Arc<dyn PaymentIntents>;
        let services = CheckoutServices {
            backend: Arc::new(backend.clone()),
            payments: Arc::new(PaymentRegistry::new(
                Some(Arc::clone(&intents)),
                Some(Arc::clone(&payments) as Arc<dyn WalletOrders>),
            )),
            analytics: Arc::new(NoopAnalytics),
        };
        let poller = ConfirmationPoller::new(
            Arc::clone(&services.backend),
            Some(intents),
            Arc::new(NoopAnalytics),
            CurrencyCode::USD,
        );
        let sessions = ShopperSessions::new(services, CheckoutConfig::default(), "http://localhost:3000");
        let shopper = sessions.get_or_create(Uuid::new_v4(), None).await;

        shopper.cart().add_to_cart(ProductId::new(103), 1).await.unwrap();
        shopper.checkout().initialize().await.unwrap();
        shopper
            .checkout()
            .update_billing(AddressPatch {
                first_name: Some("Ada".to_string()),
                last_name: Some("Lovelace".to_string()),
                email: Some("ada@example.com".to_string()),
                ..AddressPatch::default()
            })
            .await;
        let outcome = shopper
            .checkout()
            .place_order(PaymentDetails {
                payment_token: Some("pm_card_visa".to_string()),
                wallet_order_id: None,
            })
            .await
            .unwrap();
        let PlaceOrderOutcome::Redirect { pending, .. } = outcome else {
            panic!("expected a redirect");
        };
        shopper.set_pending_payment(pending.clone()).await;

        Harness {
            backend,
            payments,
            poller,
            shopper,
            pending,
        }
    }

    #[tokio::test]
    async fn test_succeeded_payment_finalizes_once() {
        let h = redirected().await;
        h.payments
            .set_intent_status(&h.pending.payment_intent_id, PaymentStatus::Succeeded)
            .await;

        let first = h
            .poller
            .verify(&h.shopper, h.pending.order_id, &h.pending.payment_intent_id)
            .await;
        assert!(first.success);
        assert_eq!(
            first.receipt_url.as_deref(),
            Some(receipt_path(h.pending.order_id, &h.pending.order_key).as_str())
        );
        let order = h.backend.stored_order(h.pending.order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert!(h.shopper.cart().cart().await.is_empty());

        let empty_calls = h.backend.call_count("empty_cart").await;
        let second = h
            .poller
            .verify(&h.shopper, h.pending.order_id, &h.pending.payment_intent_id)
            .await;
        assert_eq!(second, first);
        assert_eq!(h.backend.call_count("finalize_order").await, 1);
        assert_eq!(h.backend.call_count("empty_cart").await, empty_calls);
    }

    #[tokio::test]
    async fn test_abandoned_payment_keeps_cart() {
        let h = redirected().await;
        h.payments
            .set_intent_status(&h.pending.payment_intent_id, PaymentStatus::Canceled)
            .await;

        let outcome = h
            .poller
            .verify(&h.shopper, h.pending.order_id, &h.pending.payment_intent_id)
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, PAYMENT_NOT_COMPLETED);
        assert!(!h.shopper.cart().cart().await.is_empty());
        assert_eq!(h.backend.call_count("finalize_order").await, 0);

        let state = h.shopper.checkout().state().await;
        assert_eq!(state.phase, crate::checkout::CheckoutPhase::Ready);
    }

    #[tokio::test]
    async fn test_processing_payment_is_rechecked() {
        let h = redirected().await;
        h.payments
            .set_intent_status(&h.pending.payment_intent_id, PaymentStatus::Processing)
            .await;

        let outcome = h
            .poller
            .verify(&h.shopper, h.pending.order_id, &h.pending.payment_intent_id)
            .await;
        assert_eq!(outcome.message, PAYMENT_PROCESSING);

        h.payments
            .set_intent_status(&h.pending.payment_intent_id, PaymentStatus::Succeeded)
            .await;
        let outcome = h
            .poller
            .verify(&h.shopper, h.pending.order_id, &h.pending.payment_intent_id)
            .await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_verify_pending_uses_stored_intent() {
        let h = redirected().await;
        h.payments
            .set_intent_status(&h.pending.payment_intent_id, PaymentStatus::Succeeded)
            .await;

        let outcome = h.poller.verify_pending(&h.shopper, None).await;
        assert!(outcome.success);

        // Reloading the confirmation page after success hits the memo.
        let again = h
            .poller
            .verify_pending(&h.shopper, Some(&h.pending.payment_intent_id))
            .await;
        assert_eq!(again, outcome);
        assert_eq!(h.backend.call_count("finalize_order").await, 1);
    }

    #[tokio::test]
    async fn test_verify_pending_without_pending_payment() {
        let h = redirected().await;
        h.shopper.clear_pending_payment().await;
        let outcome = h.poller.verify_pending(&h.shopper, None).await;
        assert_eq!(outcome, VerifyOutcome::failure(UNKNOWN_PAYMENT));
    }

    #[tokio::test]
    async fn test_foreign_payment_is_refused() {
        let h = redirected().await;
        let outcome = h
            .poller
            .verify(&h.shopper, h.pending.order_id, "pi_someone_else")
            .await;
        assert_eq!(outcome, VerifyOutcome::failure(UNKNOWN_PAYMENT));
        assert_eq!(h.backend.call_count("finalize_order").await, 0);
    }
}
