//! The cart store.
//!
//! The backend owns the durable cart; the store keeps the last cart the
//! backend returned and only replaces it after a successful round trip.
//! Mutations are serialized by an async mutex held across the backend call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use copperleaf_core::{CurrencyCode, Price, ProductId};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

use crate::commerce::{BackendSession, Cart, CartItem, CommerceBackend, CommerceError};
use crate::services::analytics::{self, AnalyticsEvent, AnalyticsItem, AnalyticsSink};

const QUANTITY_TOO_LARGE: &str = "Quantity is too large";

/// Errors from cart operations, rendered as a transient notification.
#[derive(Debug, Error)]
pub enum CartError {
    /// The backend refused the change (out of stock, unknown product, ...).
    #[error("{0}")]
    Rejected(String),

    /// The backend could not be reached or returned garbage.
    #[error("Something went wrong. Please try again.")]
    Transport(#[source] CommerceError),

    /// Quantities must be at least 1 when adding.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,
}

impl From<CommerceError> for CartError {
    fn from(err: CommerceError) -> Self {
        err.rejection_message()
            .map_or_else(|| Self::Transport(err), Self::Rejected)
    }
}

/// Clears the loading flag when a mutation finishes, however it finishes.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Cart state for one shopper.
pub struct CartStore {
    backend: Arc<dyn CommerceBackend>,
    session: Arc<BackendSession>,
    analytics: Arc<dyn AnalyticsSink>,
    analytics_client_id: String,
    currency: CurrencyCode,
    cart: RwLock<Cart>,
    mutation: Mutex<()>,
    loading: AtomicBool,
}

impl CartStore {
    #[must_use]
    pub fn new(
        backend: Arc<dyn CommerceBackend>,
        session: Arc<BackendSession>,
        analytics: Arc<dyn AnalyticsSink>,
        analytics_client_id: impl Into<String>,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            backend,
            session,
            analytics,
            analytics_client_id: analytics_client_id.into(),
            currency,
            cart: RwLock::new(Cart::default()),
            mutation: Mutex::new(()),
            loading: AtomicBool::new(false),
        }
    }

    /// The backend session this cart lives in.
    #[must_use]
    pub fn session(&self) -> &Arc<BackendSession> {
        &self.session
    }

    /// Snapshot of the current cart.
    pub async fn cart(&self) -> Cart {
        self.cart.read().await.clone()
    }

    /// Snapshot of the current lines.
    pub async fn items(&self) -> Vec<CartItem> {
        self.cart.read().await.items.clone()
    }

    /// Whether a mutation is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Replace local state with a cart fetched elsewhere (e.g. by checkout).
    pub async fn sync(&self, cart: Cart) {
        *self.cart.write().await = cart;
    }

    /// Fetch the session cart from the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails; local state is untouched.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Cart, CartError> {
        let _serial = self.mutation.lock().await;
        let _loading = LoadingGuard::start(&self.loading);
        let cart = self.backend.cart(&self.session).await?;
        self.sync(cart.clone()).await;
        Ok(cart)
    }

    /// Add `quantity` of a product, merging into its existing line if present.
    ///
    /// # Errors
    ///
    /// Returns an error if `quantity` is zero or the backend call fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_to_cart(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        let _serial = self.mutation.lock().await;
        let _loading = LoadingGuard::start(&self.loading);

        let existing = self.cart.read().await.item_for_product(product_id).cloned();
        let cart = match existing {
            Some(line) => {
                debug!(key = %line.key, "Merging into existing cart line");
                let merged = line
                    .quantity
                    .checked_add(quantity)
                    .ok_or_else(|| CartError::Rejected(QUANTITY_TOO_LARGE.to_string()))?;
                self.backend
                    .update_item_quantity(&self.session, &line.key, merged)
                    .await?
            }
            None => {
                self.backend
                    .add_item(&self.session, product_id, quantity)
                    .await?
            }
        };

        if let Some(line) = cart.item_for_product(product_id) {
            self.track(AnalyticsEvent::AddToCart(self.analytics_item(line, quantity)));
        }
        self.sync(cart.clone()).await;
        Ok(cart)
    }

    /// Set a line's quantity; anything below 1 removes the line.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails; local state is untouched.
    #[instrument(skip(self))]
    pub async fn update_quantity(&self, key: &str, quantity: i64) -> Result<Cart, CartError> {
        let Ok(quantity) = u32::try_from(quantity) else {
            return if quantity < 1 {
                self.remove_from_cart(key).await
            } else {
                Err(CartError::Rejected(QUANTITY_TOO_LARGE.to_string()))
            };
        };
        if quantity == 0 {
            return self.remove_from_cart(key).await;
        }

        let _serial = self.mutation.lock().await;
        let _loading = LoadingGuard::start(&self.loading);
        let cart = self
            .backend
            .update_item_quantity(&self.session, key, quantity)
            .await?;
        self.sync(cart.clone()).await;
        Ok(cart)
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails; local state is untouched.
    #[instrument(skip(self))]
    pub async fn remove_from_cart(&self, key: &str) -> Result<Cart, CartError> {
        let _serial = self.mutation.lock().await;
        let _loading = LoadingGuard::start(&self.loading);

        let removed = self.cart.read().await.item(key).cloned();
        let cart = self
            .backend
            .remove_items(&self.session, &[key.to_string()])
            .await?;

        if let Some(line) = removed {
            self.track(AnalyticsEvent::RemoveFromCart(
                self.analytics_item(&line, line.quantity),
            ));
        }
        self.sync(cart.clone()).await;
        Ok(cart)
    }

    /// Empty the cart. An already-empty cart makes no backend call.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<(), CartError> {
        let _serial = self.mutation.lock().await;
        if self.cart.read().await.is_empty() {
            debug!("Cart already empty");
            return Ok(());
        }

        let _loading = LoadingGuard::start(&self.loading);
        let cart = self.backend.empty_cart(&self.session).await?;
        self.sync(cart).await;
        Ok(())
    }

    fn analytics_item(&self, line: &CartItem, quantity: u32) -> AnalyticsItem {
        AnalyticsItem {
            item_id: line.product_id.to_string(),
            item_name: line.name.clone(),
            price: Price::parse_display(&line.unit_price_display, self.currency)
                .map(|p| p.amount)
                .unwrap_or_default(),
            quantity,
        }
    }

    fn track(&self, event: AnalyticsEvent) {
        analytics::emit(&self.analytics, &self.analytics_client_id, event);
    }
}
