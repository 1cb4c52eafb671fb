//! The async shell around the checkout reducer.

use std::sync::Arc;

use copperleaf_core::{OrderId, OrderKey, Price};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::debounce::Debouncer;
use super::error::CheckoutError;
use super::state::{
    CheckoutAction, CheckoutPhase, CheckoutState, Notification, PAYMENT_METHOD_CHANGED, reduce,
};
use super::validation::validate_order;
use super::{PendingPayment, receipt_path};
use crate::cart::CartStore;
use crate::commerce::{
    AddressPatch, Cart, CheckoutInput, CommerceBackend, CustomerUpdate, MetaEntry, PaymentGateway,
};
use crate::config::CheckoutConfig;
use crate::payments::{PaymentError, PaymentOutcome, PaymentRegistry, PaymentRequest};
use crate::services::analytics::{self, AnalyticsEvent, AnalyticsItem, AnalyticsSink};

/// Order meta key linking an unpaid order to its payment intent.
pub const PAYMENT_INTENT_META_KEY: &str = "_payment_intent_id";

/// Application-wide collaborators checkout needs.
#[derive(Clone)]
pub struct CheckoutServices {
    pub backend: Arc<dyn CommerceBackend>,
    pub payments: Arc<PaymentRegistry>,
    pub analytics: Arc<dyn AnalyticsSink>,
}

/// What the browser collected for the selected gateway.
#[derive(Debug, Clone, Default)]
pub struct PaymentDetails {
    pub payment_token: Option<String>,
    pub wallet_order_id: Option<String>,
}

/// Result of a successful order submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceOrderOutcome {
    /// Paid (or offline); show the receipt.
    Completed {
        order_id: OrderId,
        order_key: OrderKey,
        receipt_url: String,
    },
    /// Send the shopper to the provider; verify on return.
    Redirect { url: String, pending: PendingPayment },
}

/// Drives one shopper's checkout.
pub struct CheckoutOrchestrator {
    inner: Arc<Inner>,
    debouncer: Debouncer,
}

struct Inner {
    services: CheckoutServices,
    cart: Arc<CartStore>,
    analytics_client_id: String,
    return_url: String,
    state: Mutex<CheckoutState>,
}

impl Inner {
    async fn dispatch(&self, action: CheckoutAction) -> CheckoutState {
        let mut state = self.state.lock().await;
        let current = std::mem::take(&mut *state);
        *state = reduce(current, action);
        state.clone()
    }

    async fn refetch_cart(&self) -> Result<CheckoutState, CheckoutError> {
        let cart = self.services.backend.cart(self.cart.session()).await?;
        self.cart.sync(cart.clone()).await;
        Ok(self.dispatch(CheckoutAction::CartRefreshed(cart)).await)
    }

    /// Push the current addresses to the backend and pick up new rates.
    async fn recalculate(&self, generation: u64) {
        let (billing, shipping) = {
            let state = self.state.lock().await;
            (
                state.billing.clone(),
                state
                    .ship_to_different_address
                    .then(|| state.shipping.clone()),
            )
        };

        let result = self
            .push_customer(CustomerUpdate { billing, shipping })
            .await;

        match result {
            Ok(_) => {
                self.dispatch(CheckoutAction::RecalculationFinished(generation))
                    .await;
            }
            Err(e) => {
                warn!(error = %e, generation, "Shipping recalculation failed");
                self.dispatch(CheckoutAction::RecalculationFailed {
                    generation,
                    message: e.to_string(),
                })
                .await;
            }
        }
    }

    async fn push_customer(&self, update: CustomerUpdate) -> Result<CheckoutState, CheckoutError> {
        self.services
            .backend
            .update_customer(self.cart.session(), &update)
            .await?;
        self.refetch_cart().await
    }

    async fn fail_order(&self, err: CheckoutError) -> CheckoutError {
        self.dispatch(CheckoutAction::OrderFailed(err.to_string()))
            .await;
        err
    }
}

impl CheckoutOrchestrator {
    #[must_use]
    pub fn new(
        services: CheckoutServices,
        cart: Arc<CartStore>,
        analytics_client_id: impl Into<String>,
        return_url: impl Into<String>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                services,
                cart,
                analytics_client_id: analytics_client_id.into(),
                return_url: return_url.into(),
                state: Mutex::new(CheckoutState::new(config.currency)),
            }),
            debouncer: Debouncer::new(config.address_debounce),
        }
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> CheckoutState {
        self.inner.state.lock().await.clone()
    }

    /// Remove and return queued notifications.
    pub async fn take_notifications(&self) -> Vec<Notification> {
        std::mem::take(&mut self.inner.state.lock().await.notifications)
    }

    /// Enter checkout: load the cart and the available payment gateways.
    ///
    /// Address drafts survive re-entry; a finished checkout starts over.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart or gateways cannot be loaded.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<CheckoutState, CheckoutError> {
        if self.debouncer.cancel() {
            self.inner
                .dispatch(CheckoutAction::RecalculationCancelled)
                .await;
        }
        {
            let phase = self.inner.state.lock().await.phase;
            if matches!(
                phase,
                CheckoutPhase::Completed | CheckoutPhase::AwaitingPayment | CheckoutPhase::EmptyCart
            ) {
                self.inner.dispatch(CheckoutAction::Reset).await;
            }
        }
        self.inner.dispatch(CheckoutAction::CartLoading).await;

        let loaded = self.load().await;

        match loaded {
            Ok((cart, gateways)) => {
                let payments = &self.inner.services.payments;
                let gateways = gateways
                    .into_iter()
                    .filter(|g| payments.supports(&g.id))
                    .collect();
                Ok(self
                    .inner
                    .dispatch(CheckoutAction::Initialized { cart, gateways })
                    .await)
            }
            Err(e) => {
                self.inner
                    .dispatch(CheckoutAction::CartLoadFailed(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    async fn load(&self) -> Result<(Cart, Vec<PaymentGateway>), CheckoutError> {
        let cart = self.inner.cart.refresh().await?;
        let gateways = self
            .inner
            .services
            .backend
            .payment_gateways(self.inner.cart.session())
            .await?;
        Ok((cart, gateways))
    }

    /// Leave checkout; a pending address recalculation is dropped.
    pub async fn leave(&self) {
        if self.debouncer.cancel() {
            self.inner
                .dispatch(CheckoutAction::RecalculationCancelled)
                .await;
        }
    }

    /// Edit the billing address.
    pub async fn update_billing(&self, patch: AddressPatch) -> CheckoutState {
        let recalculate = patch.affects_rates();
        let state = self
            .inner
            .dispatch(CheckoutAction::BillingEdited(patch))
            .await;
        if recalculate && !state.ship_to_different_address {
            return self.schedule_recalculation().await;
        }
        state
    }

    /// Edit the separate shipping address.
    pub async fn update_shipping(&self, patch: AddressPatch) -> CheckoutState {
        let recalculate = patch.affects_rates();
        let state = self
            .inner
            .dispatch(CheckoutAction::ShippingEdited(patch))
            .await;
        if recalculate && state.ship_to_different_address {
            return self.schedule_recalculation().await;
        }
        state
    }

    /// Toggle shipping to an address other than billing.
    pub async fn set_ship_to_different_address(&self, value: bool) -> CheckoutState {
        let changed = self.inner.state.lock().await.ship_to_different_address != value;
        let state = self
            .inner
            .dispatch(CheckoutAction::ShipToDifferentAddressSet(value))
            .await;
        if changed {
            return self.schedule_recalculation().await;
        }
        state
    }

    pub async fn set_order_notes(&self, notes: String) -> CheckoutState {
        self.inner
            .dispatch(CheckoutAction::OrderNotesSet(notes))
            .await
    }

    async fn schedule_recalculation(&self) -> CheckoutState {
        let state = self
            .inner
            .dispatch(CheckoutAction::RecalculationScheduled)
            .await;
        let generation = state.recalculation;
        let inner = Arc::clone(&self.inner);
        self.debouncer.schedule(async move {
            inner.recalculate(generation).await;
        });
        state
    }

    /// Choose a shipping rate.
    ///
    /// The displayed total updates immediately; the backend is then told about
    /// the choice. A backend failure queues a warning and keeps the local total.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `rate_id` is not currently offered.
    #[instrument(skip(self))]
    pub async fn select_shipping_rate(&self, rate_id: &str) -> Result<CheckoutState, CheckoutError> {
        {
            let mut state = self.inner.state.lock().await;
            if !state.shipping_rates.iter().any(|r| r.id == rate_id) {
                return Err(CheckoutError::Validation(
                    "That shipping method is not available.".to_string(),
                ));
            }
            let current = std::mem::take(&mut *state);
            *state = reduce(
                current,
                CheckoutAction::ShippingRateSelected(rate_id.to_string()),
            );
        }

        let confirmed = self
            .inner
            .services
            .backend
            .update_shipping_method(self.inner.cart.session(), rate_id)
            .await;

        match confirmed {
            Ok(cart) => {
                self.inner.cart.sync(cart.clone()).await;
                Ok(self
                    .inner
                    .dispatch(CheckoutAction::CartRefreshed(cart))
                    .await)
            }
            Err(e) => {
                warn!(error = %e, "Backend did not confirm shipping rate");
                Ok(self
                    .inner
                    .dispatch(CheckoutAction::Notify(Notification::warning(
                        "We couldn't confirm your shipping method with the store. Your total may change.",
                    )))
                    .await)
            }
        }
    }

    /// Apply a coupon code.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Busy`] while another coupon operation is in
    /// flight, or the backend's rejection verbatim.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, code: &str) -> Result<CheckoutState, CheckoutError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CheckoutError::Validation(
                "Please enter a coupon code.".to_string(),
            ));
        }
        self.begin_coupon().await?;

        let result = match self
            .inner
            .services
            .backend
            .apply_coupon(self.inner.cart.session(), code)
            .await
        {
            Ok(_) => self.inner.refetch_cart().await,
            Err(e) => Err(e.into()),
        };

        self.finish_coupon(result, format!("Coupon \"{code}\" applied."))
            .await
    }

    /// Remove an applied coupon.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Busy`] while another coupon operation is in
    /// flight, or the backend error.
    #[instrument(skip(self))]
    pub async fn remove_coupon(&self, code: &str) -> Result<CheckoutState, CheckoutError> {
        self.begin_coupon().await?;

        let result = match self
            .inner
            .services
            .backend
            .remove_coupons(self.inner.cart.session(), &[code.to_string()])
            .await
        {
            Ok(_) => self.inner.refetch_cart().await,
            Err(e) => Err(e.into()),
        };

        self.finish_coupon(result, format!("Coupon \"{code}\" removed."))
            .await
    }

    async fn begin_coupon(&self) -> Result<(), CheckoutError> {
        let mut state = self.inner.state.lock().await;
        if state.loading.coupon {
            return Err(CheckoutError::Busy("A coupon update is already in progress."));
        }
        let current = std::mem::take(&mut *state);
        *state = reduce(current, CheckoutAction::CouponStarted);
        Ok(())
    }

    async fn finish_coupon(
        &self,
        result: Result<CheckoutState, CheckoutError>,
        success: String,
    ) -> Result<CheckoutState, CheckoutError> {
        match result {
            Ok(_) => Ok(self
                .inner
                .dispatch(CheckoutAction::CouponFinished(Notification::success(success)))
                .await),
            Err(e) => {
                self.inner
                    .dispatch(CheckoutAction::CouponFinished(Notification::error(
                        e.to_string(),
                    )))
                    .await;
                Err(e)
            }
        }
    }

    /// Choose a payment gateway.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the gateway is not offered.
    pub async fn select_payment_method(
        &self,
        gateway_id: &str,
    ) -> Result<CheckoutState, CheckoutError> {
        let mut state = self.inner.state.lock().await;
        if !state.payment_gateways.iter().any(|g| g.id == gateway_id) {
            return Err(CheckoutError::Validation(
                "That payment method is not available.".to_string(),
            ));
        }
        let current = std::mem::take(&mut *state);
        *state = reduce(
            current,
            CheckoutAction::PaymentMethodSelected(gateway_id.to_string()),
        );
        Ok(state.clone())
    }

    /// Validate, collect payment and create the order.
    ///
    /// # Errors
    ///
    /// Validation failures return before any backend or provider call.
    /// Payment and backend failures return checkout to `Ready` with an error
    /// notification queued.
    #[instrument(skip(self, payment))]
    pub async fn place_order(
        &self,
        payment: PaymentDetails,
    ) -> Result<PlaceOrderOutcome, CheckoutError> {
        let snapshot = {
            let mut state = self.inner.state.lock().await;
            if let Err(e) = validate_order(&state) {
                if matches!(e, CheckoutError::Validation(_)) {
                    let current = std::mem::take(&mut *state);
                    *state = reduce(
                        current,
                        CheckoutAction::Notify(Notification::error(e.to_string())),
                    );
                }
                return Err(e);
            }
            let current = std::mem::take(&mut *state);
            *state = reduce(current, CheckoutAction::OrderSubmitted);
            state.clone()
        };
        let Some(method) = snapshot.payment_method.clone() else {
            return Err(self
                .inner
                .fail_order(CheckoutError::Validation(
                    "Please choose a payment method.".to_string(),
                ))
                .await);
        };

        let Ok(amount) = Price::parse_display(&snapshot.displayed_total, snapshot.currency) else {
            return Err(self
                .inner
                .fail_order(CheckoutError::Validation(
                    "We couldn't compute your order total. Please refresh and try again."
                        .to_string(),
                ))
                .await);
        };

        let Some(adapter) = self.inner.services.payments.get(&method) else {
            return Err(self
                .inner
                .fail_order(PaymentError::Unavailable(method).into())
                .await);
        };

        let outcome = adapter
            .initiate(PaymentRequest {
                amount,
                payment_token: payment.payment_token,
                wallet_order_id: payment.wallet_order_id,
                return_url: self.inner.return_url.clone(),
                email: Some(snapshot.billing.email.clone()).filter(|e| !e.is_empty()),
            })
            .await;

        {
            let mut state = self.inner.state.lock().await;
            if state.payment_epoch != snapshot.payment_epoch
                || state.payment_method.as_deref() != Some(method.as_str())
            {
                warn!(
                    gateway = %method,
                    outcome = ?outcome,
                    "Payment method changed while payment was in flight, discarding result"
                );
                let current = std::mem::take(&mut *state);
                *state = reduce(current, CheckoutAction::OrderSuperseded);
                return Err(CheckoutError::Validation(PAYMENT_METHOD_CHANGED.to_string()));
            }
        }

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.inner.fail_order(e.into()).await),
        };

        let (transaction_id, meta_data) = match &outcome {
            PaymentOutcome::Completed { transaction_id } => (transaction_id.clone(), vec![]),
            PaymentOutcome::Redirect {
                payment_intent_id, ..
            } => (
                None,
                vec![MetaEntry {
                    key: PAYMENT_INTENT_META_KEY.to_string(),
                    value: payment_intent_id.clone(),
                }],
            ),
        };

        let input = CheckoutInput {
            billing: snapshot.billing.clone(),
            shipping: snapshot.effective_shipping().clone(),
            ship_to_different_address: snapshot.ship_to_different_address,
            payment_method: method.clone(),
            shipping_method: snapshot.selected_rate.clone(),
            customer_note: Some(snapshot.order_notes.trim().to_string()).filter(|n| !n.is_empty()),
            is_paid: transaction_id.is_some(),
            transaction_id,
            meta_data,
        };

        let created = match self
            .inner
            .services
            .backend
            .create_order(self.inner.cart.session(), &input)
            .await
        {
            Ok(created) => created,
            Err(e) => return Err(self.inner.fail_order(e.into()).await),
        };
        info!(order_id = %created.order_id, gateway = %method, "Order created");

        match outcome {
            PaymentOutcome::Completed { .. } => {
                record_purchase(
                    &self.inner.services.analytics,
                    &self.inner.analytics_client_id,
                    &self.inner.cart,
                    created.order_id,
                    amount,
                )
                .await;
                if let Err(e) = self.inner.cart.clear_cart().await {
                    warn!(error = %e, "Order placed but the cart could not be cleared");
                }
                self.inner
                    .dispatch(CheckoutAction::OrderCompleted(created.order_id))
                    .await;
                Ok(PlaceOrderOutcome::Completed {
                    receipt_url: receipt_path(created.order_id, &created.order_key),
                    order_id: created.order_id,
                    order_key: created.order_key,
                })
            }
            PaymentOutcome::Redirect {
                url,
                payment_intent_id,
            } => {
                self.inner
                    .dispatch(CheckoutAction::OrderAwaitingPayment(created.order_id))
                    .await;
                Ok(PlaceOrderOutcome::Redirect {
                    url,
                    pending: PendingPayment {
                        order_id: created.order_id,
                        order_key: created.order_key,
                        payment_intent_id,
                    },
                })
            }
        }
    }

    /// An off-site payment for `order_id` was verified.
    pub async fn payment_confirmed(&self, order_id: OrderId) {
        self.inner
            .dispatch(CheckoutAction::OrderCompleted(order_id))
            .await;
    }

    /// An off-site payment did not complete; the shopper may try again.
    pub async fn payment_failed(&self, message: impl Into<String>) {
        self.inner
            .dispatch(CheckoutAction::OrderFailed(message.into()))
            .await;
    }
}

/// Report a purchase of the current cart contents.
pub(crate) async fn record_purchase(
    sink: &Arc<dyn AnalyticsSink>,
    client_id: &str,
    cart: &CartStore,
    order_id: OrderId,
    total: Price,
) {
    let items = purchase_items(cart, total).await;
    analytics::emit(
        sink,
        client_id,
        AnalyticsEvent::Purchase {
            transaction_id: order_id.to_string(),
            value: total.amount,
            items,
        },
    );
}

async fn purchase_items(cart: &CartStore, total: Price) -> Vec<AnalyticsItem> {
    cart.items()
        .await
        .into_iter()
        .map(|item| AnalyticsItem {
            item_id: item.product_id.to_string(),
            price: Price::parse_display(&item.unit_price_display, total.currency_code)
                .map(|p| p.amount)
                .unwrap_or_default(),
            item_name: item.name,
            quantity: item.quantity,
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use copperleaf_core::{CurrencyCode, OrderStatus, ProductId};
    use tokio::sync::Notify;

    use super::*;
    use crate::checkout::error::TRY_AGAIN;
    use crate::checkout::state::NotificationLevel;
    use crate::commerce::memory::Failure;
    use crate::commerce::{BackendSession, InMemoryCommerce, ShippingRate};
    use crate::payments::memory::CardBehavior;
    use crate::payments::{InMemoryPayments, PaymentAdapter, PaymentIntents, WalletOrders};
    use crate::services::analytics::NoopAnalytics;

    struct Harness {
        backend: InMemoryCommerce,
        payments: Arc<InMemoryPayments>,
        cart: Arc<CartStore>,
        checkout: CheckoutOrchestrator,
    }

    fn providers(payments: &Arc<InMemoryPayments>) -> PaymentRegistry {
        PaymentRegistry::new(
            Some(Arc::clone(payments) as Arc<dyn PaymentIntents>),
            Some(Arc::clone(payments) as Arc<dyn WalletOrders>),
        )
    }

    fn build(backend: &InMemoryCommerce, registry: PaymentRegistry) -> (Arc<CartStore>, CheckoutOrchestrator) {
        let backend_dyn: Arc<dyn CommerceBackend> = Arc::new(backend.clone());
        let cart = Arc::new(CartStore::new(
            Arc::clone(&backend_dyn),
            Arc::new(BackendSession::new()),
            Arc::new(NoopAnalytics),
            "shopper-1",
            CurrencyCode::USD,
        ));
        let checkout = CheckoutOrchestrator::new(
            CheckoutServices {
                backend: backend_dyn,
                payments: Arc::new(registry),
                analytics: Arc::new(NoopAnalytics),
            },
            Arc::clone(&cart),
            "shopper-1",
            "http://localhost:3000/checkout/confirm",
            CheckoutConfig::default(),
        );
        (cart, checkout)
    }

    /// A kyusu ($49.99) in the cart, checkout initialized.
    async fn harness() -> Harness {
        let backend = InMemoryCommerce::with_sample_catalog(CurrencyCode::USD);
        let payments = Arc::new(InMemoryPayments::new());
        let (cart, checkout) = build(&backend, providers(&payments));
        cart.add_to_cart(ProductId::new(103), 1).await.unwrap();
        checkout.initialize().await.unwrap();
        Harness {
            backend,
            payments,
            cart,
            checkout,
        }
    }

    async fn fill_billing(checkout: &CheckoutOrchestrator) {
        checkout
            .update_billing(AddressPatch {
                first_name: Some("Ada".to_string()),
                last_name: Some("Lovelace".to_string()),
                email: Some("ada@example.com".to_string()),
                ..AddressPatch::default()
            })
            .await;
    }

    fn card() -> PaymentDetails {
        PaymentDetails {
            payment_token: Some("pm_card_visa".to_string()),
            wallet_order_id: None,
        }
    }

    #[tokio::test]
    async fn test_initialize_with_empty_cart() {
        let backend = InMemoryCommerce::with_sample_catalog(CurrencyCode::USD);
        let payments = Arc::new(InMemoryPayments::new());
        let (_cart, checkout) = build(&backend, providers(&payments));

        let state = checkout.initialize().await.unwrap();
        assert_eq!(state.phase, CheckoutPhase::EmptyCart);
        assert!(!state.loading.cart);
    }

    #[tokio::test]
    async fn test_initialize_offers_only_supported_gateways() {
        let backend = InMemoryCommerce::with_sample_catalog(CurrencyCode::USD);
        let (cart, checkout) = build(&backend, PaymentRegistry::new(None, None));
        cart.add_to_cart(ProductId::new(103), 1).await.unwrap();

        let state = checkout.initialize().await.unwrap();
        assert_eq!(state.phase, CheckoutPhase::Ready);
        let ids: Vec<&str> = state.payment_gateways.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["cod"]);
        assert_eq!(state.payment_method.as_deref(), Some("cod"));
        assert_eq!(state.selected_rate.as_deref(), Some("flat_rate:1"));
        assert_eq!(state.displayed_total, "$59.99");
    }

    #[tokio::test]
    async fn test_reentry_keeps_drafts_and_falls_back_to_offered_rate() {
        let h = harness().await;
        fill_billing(&h.checkout).await;
        h.checkout.select_shipping_rate("local_pickup:2").await.unwrap();

        h.backend
            .set_shipping_rates(vec![ShippingRate {
                id: "flat_rate:1".to_string(),
                label: "Flat rate".to_string(),
                cost: "10.00".to_string(),
            }])
            .await;
        let state = h.checkout.initialize().await.unwrap();

        assert_eq!(state.billing.first_name, "Ada");
        assert_eq!(state.selected_rate.as_deref(), Some("flat_rate:1"));
        assert_eq!(state.displayed_total, "$59.99");
    }

    #[tokio::test]
    async fn test_place_order_without_rate_makes_no_calls() {
        let backend = InMemoryCommerce::with_sample_catalog(CurrencyCode::USD);
        backend.set_shipping_rates(vec![]).await;
        let payments = Arc::new(InMemoryPayments::new());
        let (cart, checkout) = build(&backend, providers(&payments));
        cart.add_to_cart(ProductId::new(103), 1).await.unwrap();
        checkout.initialize().await.unwrap();
        fill_billing(&checkout).await;

        let calls_before = backend.calls().await.len();
        let err = checkout.place_order(card()).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Please choose a shipping method."
        );
        assert_eq!(backend.calls().await.len(), calls_before);
        assert!(payments.intent("pi_000001").await.is_none());
        let state = checkout.state().await;
        assert_eq!(state.phase, CheckoutPhase::Ready);
        assert_eq!(state.notifications.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_order_completes_and_clears_cart() {
        let h = harness().await;
        fill_billing(&h.checkout).await;
        h.checkout.select_payment_method("cod").await.unwrap();

        let outcome = h.checkout.place_order(PaymentDetails::default()).await.unwrap();
        let PlaceOrderOutcome::Completed {
            order_id,
            receipt_url,
            ..
        } = outcome
        else {
            panic!("expected a completed order");
        };

        assert!(receipt_url.starts_with(&format!("/orders/{order_id}?key=wc_order_")));
        let order = h.backend.stored_order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, "$59.99");
        assert!(h.cart.cart().await.is_empty());
        assert_eq!(h.checkout.state().await.phase, CheckoutPhase::Completed);
    }

    #[tokio::test]
    async fn test_card_order_is_created_paid() {
        let h = harness().await;
        fill_billing(&h.checkout).await;
        assert_eq!(h.checkout.state().await.payment_method.as_deref(), Some("stripe"));

        let outcome = h.checkout.place_order(card()).await.unwrap();
        let PlaceOrderOutcome::Completed { order_id, .. } = outcome else {
            panic!("expected a completed order");
        };

        let order = h.backend.stored_order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.transaction_id.as_deref(), Some("pi_000001"));
        let intent = h.payments.intent("pi_000001").await.unwrap();
        assert_eq!(intent.amount, 5999);
    }

    #[tokio::test]
    async fn test_card_requiring_action_redirects_and_keeps_cart() {
        let h = harness().await;
        fill_billing(&h.checkout).await;
        h.payments.set_card_behavior(CardBehavior::RequireAction).await;

        let outcome = h.checkout.place_order(card()).await.unwrap();
        let PlaceOrderOutcome::Redirect { url, pending } = outcome else {
            panic!("expected a redirect");
        };

        assert!(url.contains("authenticate"));
        assert_eq!(pending.payment_intent_id, "pi_000001");
        let order = h.backend.stored_order(pending.order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!h.cart.cart().await.is_empty());
        assert_eq!(h.checkout.state().await.phase, CheckoutPhase::AwaitingPayment);
    }

    #[tokio::test]
    async fn test_declined_card_returns_to_ready() {
        let h = harness().await;
        fill_billing(&h.checkout).await;
        h.payments.set_card_behavior(CardBehavior::Decline).await;

        let err = h.checkout.place_order(card()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Payment(PaymentError::Declined(_))));

        let state = h.checkout.state().await;
        assert_eq!(state.phase, CheckoutPhase::Ready);
        assert!(!state.loading.order);
        assert_eq!(
            state.notifications.last().map(|n| n.level),
            Some(NotificationLevel::Error)
        );
        assert_eq!(h.backend.call_count("create_order").await, 0);
    }

    #[tokio::test]
    async fn test_coupon_apply_then_remove_restores_totals() {
        let h = harness().await;

        let state = h.checkout.apply_coupon(" welcome10 ").await.unwrap();
        assert_eq!(state.applied_coupons.len(), 1);
        assert_eq!(state.displayed_total, "$54.99");
        assert!(!state.loading.coupon);

        let state = h.checkout.remove_coupon("welcome10").await.unwrap();
        assert!(state.applied_coupons.is_empty());
        assert_eq!(state.displayed_total, "$59.99");
    }

    #[tokio::test]
    async fn test_rejected_coupon_message_is_verbatim() {
        let h = harness().await;
        let message = "Coupon \"nope\" does not exist!";
        h.backend
            .fail("apply_coupon", Failure::Rejected(message.to_string()))
            .await;

        let err = h.checkout.apply_coupon("nope").await.unwrap_err();
        assert_eq!(err.to_string(), message);

        let state = h.checkout.state().await;
        assert!(!state.loading.coupon);
        assert_eq!(state.notifications.last().unwrap().message, message);
    }

    #[tokio::test]
    async fn test_coupon_while_busy_makes_no_call() {
        let h = harness().await;
        h.checkout.inner.dispatch(CheckoutAction::CouponStarted).await;

        let err = h.checkout.apply_coupon("welcome10").await.unwrap_err();
        assert!(matches!(err, CheckoutError::Busy(_)));
        assert_eq!(h.backend.call_count("apply_coupon").await, 0);
    }

    #[tokio::test]
    async fn test_unconfirmed_rate_keeps_local_total() {
        let h = harness().await;
        h.backend
            .fail("update_shipping_method", Failure::Transport)
            .await;

        let state = h.checkout.select_shipping_rate("local_pickup:2").await.unwrap();
        assert_eq!(state.selected_rate.as_deref(), Some("local_pickup:2"));
        assert_eq!(state.displayed_total, "$49.99");
        assert_eq!(
            state.notifications.last().map(|n| n.level),
            Some(NotificationLevel::Warning)
        );
    }

    #[tokio::test]
    async fn test_unknown_rate_is_rejected() {
        let h = harness().await;
        let err = h.checkout.select_shipping_rate("free_shipping:9").await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
        assert_eq!(h.backend.call_count("update_shipping_method").await, 0);
    }

    struct GatedAdapter {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl PaymentAdapter for GatedAdapter {
        fn gateway_id(&self) -> &str {
            "stripe"
        }

        async fn initiate(&self, _request: PaymentRequest) -> Result<PaymentOutcome, PaymentError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(PaymentOutcome::Completed {
                transaction_id: Some("pi_gated".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_payment_method_change_discards_in_flight_result() {
        let backend = InMemoryCommerce::with_sample_catalog(CurrencyCode::USD);
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut registry = PaymentRegistry::new(None, None);
        registry.register(Arc::new(GatedAdapter {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        }));
        let (cart, checkout) = build(&backend, registry);
        cart.add_to_cart(ProductId::new(103), 1).await.unwrap();
        checkout.initialize().await.unwrap();
        fill_billing(&checkout).await;
        checkout.select_payment_method("stripe").await.unwrap();

        let checkout = Arc::new(checkout);
        let task = tokio::spawn({
            let checkout = Arc::clone(&checkout);
            async move { checkout.place_order(card()).await }
        });
        entered.notified().await;
        checkout.select_payment_method("cod").await.unwrap();
        release.notify_one();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), PAYMENT_METHOD_CHANGED);
        assert_eq!(backend.call_count("create_order").await, 0);
        let state = checkout.state().await;
        assert_eq!(state.phase, CheckoutPhase::Ready);
        assert!(!state.loading.order);
        assert_eq!(state.payment_method.as_deref(), Some("cod"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_address_edits_debounce_into_one_recalculation() {
        let h = harness().await;

        for postcode in ["9", "97", "972"] {
            let state = h
                .checkout
                .update_billing(AddressPatch {
                    postcode: Some(postcode.to_string()),
                    ..AddressPatch::default()
                })
                .await;
            assert!(state.loading.shipping);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(h.backend.call_count("update_customer").await, 0);

        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(h.backend.call_count("update_customer").await, 1);
        let customer = h.backend.customer(h.cart.session()).await.unwrap();
        assert_eq!(customer.billing.postcode, "972");
        assert!(!h.checkout.state().await.loading.shipping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shipping_stays_loading_until_latest_recalculation_finishes() {
        let h = harness().await;
        h.backend.hold("update_customer").await;
        let postcode = |value: &str| AddressPatch {
            postcode: Some(value.to_string()),
            ..AddressPatch::default()
        };

        h.checkout.update_billing(postcode("9")).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(h.backend.call_count("update_customer").await, 1);

        let state = h.checkout.update_billing(postcode("97")).await;
        assert!(state.loading.shipping);

        // The first recalculation completes while the second is still waiting
        h.backend.release("update_customer", 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.backend.call_count("update_customer").await, 1);
        assert!(h.checkout.state().await.loading.shipping);

        h.backend.release("update_customer", 1).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(h.backend.call_count("update_customer").await, 2);
        let customer = h.backend.customer(h.cart.session()).await.unwrap();
        assert_eq!(customer.billing.postcode, "97");
        assert!(!h.checkout.state().await.loading.shipping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_recalculation_is_reported_once() {
        let h = harness().await;
        h.backend.fail("update_customer", Failure::Transport).await;
        h.checkout
            .update_billing(AddressPatch {
                postcode: Some("97201".to_string()),
                ..AddressPatch::default()
            })
            .await;
        tokio::time::sleep(Duration::from_millis(600)).await;

        let notifications = h.checkout.take_notifications().await;
        assert_eq!(notifications, vec![Notification::error(TRY_AGAIN)]);
        assert!(h.checkout.take_notifications().await.is_empty());
        assert!(!h.checkout.state().await.loading.shipping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_cancels_pending_recalculation() {
        let h = harness().await;
        h.checkout
            .update_billing(AddressPatch {
                city: Some("Portland".to_string()),
                ..AddressPatch::default()
            })
            .await;
        h.checkout.leave().await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.backend.call_count("update_customer").await, 0);
        assert!(!h.checkout.state().await.loading.shipping);
    }
}
