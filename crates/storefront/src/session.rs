//! Per-shopper state.
//!
//! A [`ShopperSession`] owns everything that belongs to one browser: the
//! backend session token, the cart store, the checkout orchestrator, a pending
//! off-site payment and memoized confirmation outcomes. Sessions live in a
//! `moka` cache keyed by the shopper id stored in the `tower-sessions` cookie.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use copperleaf_core::OrderId;
use moka::future::Cache;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::cart::CartStore;
use crate::checkout::{CheckoutOrchestrator, CheckoutServices, PendingPayment};
use crate::commerce::BackendSession;
use crate::config::CheckoutConfig;
use crate::confirmation::VerifyOutcome;

/// Maximum number of live shopper sessions held in memory.
const MAX_SESSIONS: u64 = 10_000;

/// Idle time after which a shopper's in-memory state is dropped.
///
/// The backend session token outlives this in the cookie, so the cart is
/// restored on the next request.
const SESSION_IDLE: Duration = Duration::from_secs(2 * 60 * 60);

type ConfirmationKey = (OrderId, String);

/// State for one shopper.
pub struct ShopperSession {
    id: Uuid,
    cart: Arc<CartStore>,
    checkout: CheckoutOrchestrator,
    pending_payment: RwLock<Option<PendingPayment>>,
    confirmations: Mutex<HashMap<ConfirmationKey, VerifyOutcome>>,
}

impl ShopperSession {
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn cart(&self) -> &Arc<CartStore> {
        &self.cart
    }

    #[must_use]
    pub const fn checkout(&self) -> &CheckoutOrchestrator {
        &self.checkout
    }

    /// The backend session token currently in use, if one was issued.
    pub async fn backend_token(&self) -> Option<String> {
        self.cart.session().token().await
    }

    pub async fn pending_payment(&self) -> Option<PendingPayment> {
        self.pending_payment.read().await.clone()
    }

    /// Remember an order awaiting off-site payment.
    pub async fn set_pending_payment(&self, pending: PendingPayment) {
        *self.pending_payment.write().await = Some(pending);
    }

    pub async fn clear_pending_payment(&self) {
        *self.pending_payment.write().await = None;
    }

    pub(crate) const fn confirmations(&self) -> &Mutex<HashMap<ConfirmationKey, VerifyOutcome>> {
        &self.confirmations
    }
}

/// All live shopper sessions.
pub struct ShopperSessions {
    sessions: Cache<Uuid, Arc<ShopperSession>>,
    services: CheckoutServices,
    config: CheckoutConfig,
    return_url: String,
}

impl ShopperSessions {
    /// Create the session registry.
    ///
    /// Off-site payments return to `{base_url}/checkout/confirm`.
    #[must_use]
    pub fn new(services: CheckoutServices, config: CheckoutConfig, base_url: &str) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(MAX_SESSIONS)
                .time_to_idle(SESSION_IDLE)
                .build(),
            services,
            config,
            return_url: format!("{}/checkout/confirm", base_url.trim_end_matches('/')),
        }
    }

    /// The session for `id`, building it (resuming `backend_token`) if needed.
    pub async fn get_or_create(&self, id: Uuid, backend_token: Option<String>) -> Arc<ShopperSession> {
        self.sessions
            .get_with(id, async {
                debug!(shopper_id = %id, resumed = backend_token.is_some(), "Creating shopper session");
                Arc::new(self.build(id, backend_token))
            })
            .await
    }

    /// Look up an existing session without creating one.
    pub async fn get(&self, id: Uuid) -> Option<Arc<ShopperSession>> {
        self.sessions.get(&id).await
    }

    fn build(&self, id: Uuid, backend_token: Option<String>) -> ShopperSession {
        let backend_session = backend_token.map_or_else(BackendSession::new, BackendSession::with_token);
        let cart = Arc::new(CartStore::new(
            Arc::clone(&self.services.backend),
            Arc::new(backend_session),
            Arc::clone(&self.services.analytics),
            id.to_string(),
            self.config.currency,
        ));
        let checkout = CheckoutOrchestrator::new(
            self.services.clone(),
            Arc::clone(&cart),
            id.to_string(),
            self.return_url.clone(),
            self.config,
        );
        ShopperSession {
            id,
            cart,
            checkout,
            pending_payment: RwLock::new(None),
            confirmations: Mutex::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use copperleaf_core::{CurrencyCode, ProductId};

    use super::*;
    use crate::commerce::InMemoryCommerce;
    use crate::payments::PaymentRegistry;
    use crate::services::analytics::NoopAnalytics;

    fn sessions(backend: &InMemoryCommerce) -> ShopperSessions {
        ShopperSessions::new(
            CheckoutServices {
                backend: Arc::new(backend.clone()),
                payments: Arc::new(PaymentRegistry::new(None, None)),
                analytics: Arc::new(NoopAnalytics),
            },
            CheckoutConfig::default(),
            "https://shop.example.com/",
        )
    }

    #[tokio::test]
    async fn test_same_id_returns_same_session() {
        let backend = InMemoryCommerce::with_sample_catalog(CurrencyCode::USD);
        let sessions = sessions(&backend);
        let id = Uuid::new_v4();

        let first = sessions.get_or_create(id, None).await;
        let second = sessions.get_or_create(id, Some("ignored".to_string())).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert!(sessions.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_backend_token_resumes_cart() {
        let backend = InMemoryCommerce::with_sample_catalog(CurrencyCode::USD);
        let sessions = sessions(&backend);

        let first = sessions.get_or_create(Uuid::new_v4(), None).await;
        first.cart().add_to_cart(ProductId::new(101), 2).await.unwrap();
        let token = first.backend_token().await;
        assert!(token.is_some());

        let resumed = sessions.get_or_create(Uuid::new_v4(), token).await;
        let cart = resumed.cart().refresh().await.unwrap();
        assert_eq!(cart.item_count(), 2);
    }

    #[tokio::test]
    async fn test_pending_payment_round_trip() {
        let backend = InMemoryCommerce::default();
        let sessions = sessions(&backend);
        let shopper = sessions.get_or_create(Uuid::new_v4(), None).await;
        let pending = PendingPayment {
            order_id: OrderId::new(1001),
            order_key: copperleaf_core::OrderKey::new("wc_order_abc"),
            payment_intent_id: "pi_000001".to_string(),
        };

        shopper.set_pending_payment(pending.clone()).await;
        assert_eq!(shopper.pending_payment().await, Some(pending));
        shopper.clear_pending_payment().await;
        assert!(shopper.pending_payment().await.is_none());
    }
}
