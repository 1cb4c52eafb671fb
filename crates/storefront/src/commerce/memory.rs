//! In-process [`CommerceBackend`] used by tests and local development.
//!
//! Behaves like the GraphQL backend from the storefront's point of view:
//! carts live per session token (issued on first use), totals are recomputed
//! on every mutation, coupons and shipping rates follow simple rules and
//! orders are readable only with their key. Every call is recorded so tests
//! can assert on backend traffic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use copperleaf_core::{CurrencyCode, OrderId, OrderKey, OrderStatus, Price, ProductId};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use super::types::{
    Address, AppliedCoupon, Cart, CartItem, CartTotals, CheckoutInput, CustomerUpdate, Order,
    OrderLine, OrderResult, PageInfo, PaymentGateway, ProductConnection, ProductDetail,
    ProductQuery, ProductSummary, ShippingRate,
};
use super::{BackendSession, CommerceBackend, CommerceError};

/// How an injected failure presents itself.
#[derive(Debug, Clone)]
pub enum Failure {
    /// The backend rejects the call with a message.
    Rejected(String),
    /// The backend is unreachable or returns a gateway error.
    Transport,
}

impl Failure {
    fn into_error(self) -> CommerceError {
        match self {
            Self::Rejected(message) => CommerceError::UserError(message),
            Self::Transport => CommerceError::Status {
                status: 502,
                body: "Bad Gateway".to_string(),
            },
        }
    }
}

/// A coupon rule.
#[derive(Debug, Clone, Copy)]
pub enum Discount {
    /// Fixed amount off the cart.
    Fixed(Decimal),
    /// Percentage of the subtotal.
    Percent(Decimal),
}

#[derive(Debug, Clone)]
struct StoredProduct {
    detail: ProductDetail,
    category: Option<String>,
    price: Decimal,
}

#[derive(Debug, Clone)]
struct Line {
    key: String,
    product_id: ProductId,
    quantity: u32,
}

#[derive(Debug, Clone, Default)]
struct SessionCart {
    lines: Vec<Line>,
    coupons: Vec<String>,
    chosen_rate: Option<String>,
    customer: Option<CustomerUpdate>,
}

#[derive(Debug, Default)]
struct State {
    products: Vec<StoredProduct>,
    coupons: HashMap<String, Discount>,
    rates: Vec<ShippingRate>,
    gateways: Vec<PaymentGateway>,
    carts: HashMap<String, SessionCart>,
    orders: HashMap<OrderId, Order>,
    next_order_id: i64,
    next_line: u64,
    failures: HashMap<&'static str, Failure>,
    gates: HashMap<&'static str, Arc<Semaphore>>,
    calls: Vec<&'static str>,
}

/// In-memory commerce backend.
#[derive(Clone)]
pub struct InMemoryCommerce {
    currency: CurrencyCode,
    state: Arc<Mutex<State>>,
}

impl Default for InMemoryCommerce {
    fn default() -> Self {
        Self::new(CurrencyCode::USD)
    }
}

impl InMemoryCommerce {
    /// An empty backend with a flat-rate and a pickup shipping option and the
    /// card, wallet and cash-on-delivery gateways enabled.
    #[must_use]
    pub fn new(currency: CurrencyCode) -> Self {
        Self::from_state(currency, initial_state())
    }

    /// A backend pre-filled with a small catalog and a `WELCOME10` coupon.
    #[must_use]
    pub fn with_sample_catalog(currency: CurrencyCode) -> Self {
        let mut state = initial_state();
        for (id, slug, name, price, category) in [
            (101, "sencha", "Sencha Green Tea", "12.50", "tea"),
            (102, "assam", "Assam Breakfast", "9.99", "tea"),
            (103, "kyusu", "Tokoname Kyusu", "49.99", "teaware"),
            (104, "matcha-whisk", "Bamboo Matcha Whisk", "18.00", "teaware"),
        ] {
            state
                .products
                .push(stored_product(id, slug, name, price, Some(category), currency));
        }
        state
            .coupons
            .insert("welcome10".to_string(), Discount::Percent(Decimal::TEN));
        Self::from_state(currency, state)
    }

    fn from_state(currency: CurrencyCode, state: State) -> Self {
        Self {
            currency,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Add a product to the catalog.
    pub async fn add_product(&self, id: i64, slug: &str, name: &str, price: &str) {
        let product = stored_product(id, slug, name, price, None, self.currency);
        self.state.lock().await.products.push(product);
    }

    /// Register a coupon code (case-insensitive).
    pub async fn add_coupon(&self, code: &str, discount: Discount) {
        self.state
            .lock()
            .await
            .coupons
            .insert(code.to_lowercase(), discount);
    }

    /// Replace the shipping rates offered for non-empty carts.
    pub async fn set_shipping_rates(&self, rates: Vec<ShippingRate>) {
        self.state.lock().await.rates = rates;
    }

    /// Make every call to `operation` fail until cleared.
    pub async fn fail(&self, operation: &'static str, failure: Failure) {
        self.state.lock().await.failures.insert(operation, failure);
    }

    /// Stop failing `operation`.
    pub async fn recover(&self, operation: &'static str) {
        self.state.lock().await.failures.remove(operation);
    }

    /// Make calls to `operation` wait until [`release`](Self::release)d.
    ///
    /// Held calls are already recorded in [`calls`](Self::calls).
    pub async fn hold(&self, operation: &'static str) {
        self.state
            .lock()
            .await
            .gates
            .insert(operation, Arc::new(Semaphore::new(0)));
    }

    /// Let `count` held (or future) calls to `operation` proceed.
    pub async fn release(&self, operation: &'static str, count: usize) {
        if let Some(gate) = self.state.lock().await.gates.get(operation) {
            gate.add_permits(count);
        }
    }

    /// Names of the operations called so far, in order.
    pub async fn calls(&self) -> Vec<&'static str> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls to `operation`.
    pub async fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| **c == operation)
            .count()
    }

    /// The customer details last sent for the session, if any.
    pub async fn customer(&self, session: &BackendSession) -> Option<CustomerUpdate> {
        let token = session.token().await?;
        self.state
            .lock()
            .await
            .carts
            .get(&token)
            .and_then(|c| c.customer.clone())
    }

    /// Read an order without a key (test inspection only).
    pub async fn stored_order(&self, id: OrderId) -> Option<Order> {
        self.state.lock().await.orders.get(&id).cloned()
    }

    async fn begin(&self, operation: &'static str) -> Result<tokio::sync::MutexGuard<'_, State>, CommerceError> {
        let gate = {
            let mut state = self.state.lock().await;
            state.calls.push(operation);
            state.gates.get(operation).cloned()
        };
        if let Some(gate) = gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }

        let state = self.state.lock().await;
        if let Some(failure) = state.failures.get(operation).cloned() {
            return Err(failure.into_error());
        }
        Ok(state)
    }

    async fn session_token(session: &BackendSession) -> String {
        if let Some(token) = session.token().await {
            return token;
        }
        let token = Uuid::new_v4().simple().to_string();
        session.set_token(token.clone()).await;
        token
    }

    fn money(&self, amount: Decimal) -> String {
        Price::new(amount, self.currency).display()
    }

    fn render_cart(&self, state: &State, cart: &SessionCart) -> Cart {
        let mut subtotal = Decimal::ZERO;
        let items: Vec<CartItem> = cart
            .lines
            .iter()
            .filter_map(|line| {
                let product = state
                    .products
                    .iter()
                    .find(|p| p.detail.summary.id == line.product_id)?;
                let line_total = product.price * Decimal::from(line.quantity);
                subtotal += line_total;
                Some(CartItem {
                    key: line.key.clone(),
                    product_id: line.product_id,
                    name: product.detail.summary.name.clone(),
                    unit_price_display: product.detail.summary.price.clone(),
                    quantity: line.quantity,
                    image_url: product.detail.summary.image.as_ref().map(|i| i.url.clone()),
                    line_total: self.money(line_total),
                })
            })
            .collect();

        let applied_coupons: Vec<AppliedCoupon> = cart
            .coupons
            .iter()
            .filter_map(|code| {
                let amount = match state.coupons.get(code)? {
                    Discount::Fixed(amount) => (*amount).min(subtotal),
                    Discount::Percent(percent) => (subtotal * *percent / Decimal::ONE_HUNDRED).round_dp(2),
                };
                Some(AppliedCoupon {
                    code: code.clone(),
                    discount_amount: self.money(amount),
                })
            })
            .collect();
        let discount = applied_coupons
            .iter()
            .filter_map(|c| Price::parse_display(&c.discount_amount, self.currency).ok())
            .fold(Decimal::ZERO, |acc, p| acc + p.amount);

        let shipping_rates = if items.is_empty() {
            vec![]
        } else {
            state.rates.clone()
        };
        let chosen = cart
            .chosen_rate
            .as_ref()
            .filter(|id| shipping_rates.iter().any(|r| &r.id == *id))
            .cloned()
            .or_else(|| shipping_rates.first().map(|r| r.id.clone()));
        let shipping = chosen
            .as_ref()
            .and_then(|id| shipping_rates.iter().find(|r| &r.id == id))
            .and_then(|r| r.cost.parse::<Decimal>().ok())
            .unwrap_or_default();

        Cart {
            items,
            totals: CartTotals {
                subtotal: self.money(subtotal),
                shipping_total: self.money(shipping),
                discount_total: self.money(discount),
                total: self.money(subtotal - discount + shipping),
            },
            applied_coupons,
            shipping_rates,
            chosen_shipping_rate: chosen,
        }
    }
}

fn initial_state() -> State {
    State {
        rates: vec![
            ShippingRate {
                id: "flat_rate:1".to_string(),
                label: "Flat rate".to_string(),
                cost: "10.00".to_string(),
            },
            ShippingRate {
                id: "local_pickup:2".to_string(),
                label: "Local pickup".to_string(),
                cost: "0.00".to_string(),
            },
        ],
        gateways: vec![
            PaymentGateway {
                id: "stripe".to_string(),
                title: "Credit card".to_string(),
                description: Some("Pay with your card.".to_string()),
            },
            PaymentGateway {
                id: "ppcp-gateway".to_string(),
                title: "PayPal".to_string(),
                description: None,
            },
            PaymentGateway {
                id: "cod".to_string(),
                title: "Cash on delivery".to_string(),
                description: Some("Pay when your order arrives.".to_string()),
            },
        ],
        next_order_id: 1000,
        ..State::default()
    }
}

fn stored_product(
    id: i64,
    slug: &str,
    name: &str,
    price: &str,
    category: Option<&str>,
    currency: CurrencyCode,
) -> StoredProduct {
    let amount = price.parse::<Decimal>().unwrap_or_default();
    StoredProduct {
        detail: ProductDetail {
            summary: ProductSummary {
                id: ProductId::new(id),
                slug: slug.to_string(),
                name: name.to_string(),
                price: Price::new(amount, currency).display(),
                regular_price: None,
                on_sale: false,
                image: None,
                short_description: None,
                stock_status: Some("IN_STOCK".to_string()),
            },
            description: None,
            gallery: vec![],
            average_rating: 0.0,
            review_count: 0,
            reviews: vec![],
            related: vec![],
        },
        category: category.map(str::to_string),
        price: amount,
    }
}

#[async_trait]
impl CommerceBackend for InMemoryCommerce {
    async fn products(&self, query: &ProductQuery) -> Result<ProductConnection, CommerceError> {
        let state = self.begin("products").await?;
        let search = query.search_term().map(str::to_lowercase);
        let matching: Vec<&StoredProduct> = state
            .products
            .iter()
            .filter(|p| {
                query
                    .category
                    .as_ref()
                    .is_none_or(|c| p.category.as_ref() == Some(c))
            })
            .filter(|p| {
                search
                    .as_ref()
                    .is_none_or(|s| p.detail.summary.name.to_lowercase().contains(s))
            })
            .collect();

        let start = query
            .after
            .as_ref()
            .and_then(|cursor| cursor.parse::<usize>().ok())
            .unwrap_or(0);
        let page_size = query.page_size() as usize;
        let end = (start + page_size).min(matching.len());
        let products = matching
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|p| p.detail.summary.clone())
            .collect();

        Ok(ProductConnection {
            products,
            page_info: PageInfo {
                has_next_page: end < matching.len(),
                end_cursor: (end > start).then(|| end.to_string()),
            },
        })
    }

    async fn product(&self, slug: &str) -> Result<ProductDetail, CommerceError> {
        let state = self.begin("product").await?;
        state
            .products
            .iter()
            .find(|p| p.detail.summary.slug == slug)
            .map(|p| p.detail.clone())
            .ok_or_else(|| CommerceError::NotFound(format!("Product not found: {slug}")))
    }

    async fn cart(&self, session: &BackendSession) -> Result<Cart, CommerceError> {
        let token = Self::session_token(session).await;
        let state = self.begin("cart").await?;
        let cart = state.carts.get(&token).cloned().unwrap_or_default();
        Ok(self.render_cart(&state, &cart))
    }

    async fn add_item(
        &self,
        session: &BackendSession,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart, CommerceError> {
        let token = Self::session_token(session).await;
        let mut state = self.begin("add_item").await?;
        if !state.products.iter().any(|p| p.detail.summary.id == product_id) {
            return Err(CommerceError::UserError(
                "No product found matching the ID provided".to_string(),
            ));
        }
        if quantity == 0 {
            return Err(CommerceError::UserError(
                "Quantity must be at least 1".to_string(),
            ));
        }
        state.next_line += 1;
        let key = format!("line-{}", state.next_line);
        let cart = state.carts.entry(token.clone()).or_default();
        // The backend merges repeat adds of the same product into one line
        if let Some(line) = cart.lines.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = line.quantity.checked_add(quantity).ok_or_else(|| {
                CommerceError::UserError("Quantity is too large".to_string())
            })?;
        } else {
            cart.lines.push(Line {
                key,
                product_id,
                quantity,
            });
        }
        let cart = cart.clone();
        Ok(self.render_cart(&state, &cart))
    }

    async fn update_item_quantity(
        &self,
        session: &BackendSession,
        key: &str,
        quantity: u32,
    ) -> Result<Cart, CommerceError> {
        let token = Self::session_token(session).await;
        let mut state = self.begin("update_item_quantity").await?;
        let cart = state.carts.entry(token).or_default();
        if quantity == 0 {
            cart.lines.retain(|l| l.key != key);
        } else {
            let line = cart
                .lines
                .iter_mut()
                .find(|l| l.key == key)
                .ok_or_else(|| CommerceError::UserError("No cart item found with that key".to_string()))?;
            line.quantity = quantity;
        }
        let cart = cart.clone();
        Ok(self.render_cart(&state, &cart))
    }

    async fn remove_items(
        &self,
        session: &BackendSession,
        keys: &[String],
    ) -> Result<Cart, CommerceError> {
        let token = Self::session_token(session).await;
        let mut state = self.begin("remove_items").await?;
        let cart = state.carts.entry(token).or_default();
        cart.lines.retain(|l| !keys.contains(&l.key));
        let cart = cart.clone();
        Ok(self.render_cart(&state, &cart))
    }

    async fn empty_cart(&self, session: &BackendSession) -> Result<Cart, CommerceError> {
        let token = Self::session_token(session).await;
        let mut state = self.begin("empty_cart").await?;
        let cart = state.carts.entry(token).or_default();
        cart.lines.clear();
        cart.coupons.clear();
        let cart = cart.clone();
        Ok(self.render_cart(&state, &cart))
    }

    async fn update_customer(
        &self,
        session: &BackendSession,
        update: &CustomerUpdate,
    ) -> Result<(), CommerceError> {
        let token = Self::session_token(session).await;
        let mut state = self.begin("update_customer").await?;
        state.carts.entry(token).or_default().customer = Some(update.clone());
        Ok(())
    }

    async fn update_shipping_method(
        &self,
        session: &BackendSession,
        rate_id: &str,
    ) -> Result<Cart, CommerceError> {
        let token = Self::session_token(session).await;
        let mut state = self.begin("update_shipping_method").await?;
        if !state.rates.iter().any(|r| r.id == rate_id) {
            return Err(CommerceError::UserError(format!(
                "Shipping method \"{rate_id}\" is not available"
            )));
        }
        let cart = state.carts.entry(token).or_default();
        cart.chosen_rate = Some(rate_id.to_string());
        let cart = cart.clone();
        Ok(self.render_cart(&state, &cart))
    }

    async fn apply_coupon(
        &self,
        session: &BackendSession,
        code: &str,
    ) -> Result<AppliedCoupon, CommerceError> {
        let token = Self::session_token(session).await;
        let mut state = self.begin("apply_coupon").await?;
        let code = code.trim().to_lowercase();
        if !state.coupons.contains_key(&code) {
            return Err(CommerceError::UserError(format!(
                "Coupon \"{code}\" does not exist!"
            )));
        }
        let cart = state.carts.entry(token).or_default();
        if cart.coupons.contains(&code) {
            return Err(CommerceError::UserError(
                "Coupon code already applied!".to_string(),
            ));
        }
        cart.coupons.push(code.clone());
        let cart = cart.clone();
        let rendered = self.render_cart(&state, &cart);
        rendered
            .applied_coupons
            .into_iter()
            .find(|c| c.code == code)
            .ok_or_else(|| CommerceError::UserError(format!("Coupon \"{code}\" was not applied.")))
    }

    async fn remove_coupons(
        &self,
        session: &BackendSession,
        codes: &[String],
    ) -> Result<(), CommerceError> {
        let token = Self::session_token(session).await;
        let mut state = self.begin("remove_coupons").await?;
        let codes: Vec<String> = codes.iter().map(|c| c.to_lowercase()).collect();
        state
            .carts
            .entry(token)
            .or_default()
            .coupons
            .retain(|c| !codes.contains(c));
        Ok(())
    }

    async fn payment_gateways(
        &self,
        _session: &BackendSession,
    ) -> Result<Vec<PaymentGateway>, CommerceError> {
        let state = self.begin("payment_gateways").await?;
        Ok(state.gateways.clone())
    }

    async fn create_order(
        &self,
        session: &BackendSession,
        input: &CheckoutInput,
    ) -> Result<OrderResult, CommerceError> {
        let token = Self::session_token(session).await;
        let mut state = self.begin("create_order").await?;
        let cart = state.carts.get(&token).cloned().unwrap_or_default();
        if cart.lines.is_empty() {
            return Err(CommerceError::UserError(
                "Sorry, your session has expired.".to_string(),
            ));
        }
        let mut cart = cart;
        if let Some(rate) = &input.shipping_method {
            cart.chosen_rate = Some(rate.clone());
        }
        let rendered = self.render_cart(&state, &cart);

        state.next_order_id += 1;
        let id = OrderId::new(state.next_order_id);
        let key = OrderKey::new(format!("wc_order_{}", Uuid::new_v4().simple()));
        let shipping: Address = if input.ship_to_different_address {
            input.shipping.clone()
        } else {
            input.billing.clone()
        };

        let order = Order {
            id,
            key: key.clone(),
            order_number: id.to_string(),
            status: if input.is_paid {
                OrderStatus::Processing
            } else {
                OrderStatus::Pending
            },
            date: Some(chrono::Utc::now().to_rfc3339()),
            items: rendered
                .items
                .iter()
                .map(|item| OrderLine {
                    name: item.name.clone(),
                    quantity: item.quantity,
                    total: item.line_total.clone(),
                })
                .collect(),
            subtotal: rendered.totals.subtotal,
            shipping_total: rendered.totals.shipping_total,
            discount_total: rendered.totals.discount_total,
            total: rendered.totals.total,
            payment_method_title: state
                .gateways
                .iter()
                .find(|g| g.id == input.payment_method)
                .map(|g| g.title.clone()),
            transaction_id: input.transaction_id.clone(),
            billing: input.billing.clone(),
            shipping,
            customer_note: input.customer_note.clone().filter(|n| !n.trim().is_empty()),
        };
        state.orders.insert(id, order);

        Ok(OrderResult {
            order_id: id,
            order_key: key,
            result: "success".to_string(),
            redirect: None,
        })
    }

    async fn order(&self, id: OrderId, key: &str) -> Result<Order, CommerceError> {
        let state = self.begin("order").await?;
        let order = state
            .orders
            .get(&id)
            .ok_or_else(|| CommerceError::NotFound(format!("Order not found: {id}")))?;
        if !order.key.matches(key) {
            return Err(CommerceError::Unauthorized(
                "Order key does not match".to_string(),
            ));
        }
        Ok(order.clone())
    }

    async fn finalize_order(
        &self,
        id: OrderId,
        transaction_id: &str,
    ) -> Result<Order, CommerceError> {
        let mut state = self.begin("finalize_order").await?;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| CommerceError::NotFound(format!("Order not found: {id}")))?;
        if !order.status.is_paid() {
            order.status = OrderStatus::Processing;
            order.transaction_id = Some(transaction_id.to_string());
        }
        Ok(order.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn backend() -> InMemoryCommerce {
        let backend = InMemoryCommerce::default();
        backend.add_product(1, "kyusu", "Kyusu", "49.99").await;
        backend.add_product(2, "whisk", "Whisk", "18.00").await;
        backend
    }

    #[tokio::test]
    async fn test_session_token_issued_on_first_cart_call() {
        let backend = backend().await;
        let session = BackendSession::new();
        let cart = backend.cart(&session).await.unwrap();
        assert!(cart.is_empty());
        assert!(cart.shipping_rates.is_empty());
        assert!(session.token().await.is_some());
    }

    #[tokio::test]
    async fn test_totals_follow_coupons_and_rates() {
        let backend = backend().await;
        backend
            .add_coupon("TENOFF", Discount::Fixed(Decimal::TEN))
            .await;
        let session = BackendSession::new();

        let cart = backend.add_item(&session, ProductId::new(1), 1).await.unwrap();
        assert_eq!(cart.totals.subtotal, "$49.99");
        assert_eq!(cart.chosen_shipping_rate.as_deref(), Some("flat_rate:1"));
        assert_eq!(cart.totals.total, "$59.99");

        backend.apply_coupon(&session, "tenoff").await.unwrap();
        let cart = backend.cart(&session).await.unwrap();
        assert_eq!(cart.totals.discount_total, "$10.00");
        assert_eq!(cart.totals.total, "$49.99");

        let cart = backend
            .update_shipping_method(&session, "local_pickup:2")
            .await
            .unwrap();
        assert_eq!(cart.totals.total, "$39.99");
    }

    #[tokio::test]
    async fn test_order_requires_matching_key() {
        let backend = backend().await;
        let session = BackendSession::new();
        backend.add_item(&session, ProductId::new(2), 2).await.unwrap();
        let input = CheckoutInput {
            billing: Address::default(),
            shipping: Address::default(),
            ship_to_different_address: false,
            payment_method: "cod".to_string(),
            shipping_method: Some("flat_rate:1".to_string()),
            customer_note: None,
            transaction_id: None,
            is_paid: false,
            meta_data: vec![],
        };
        let result = backend.create_order(&session, &input).await.unwrap();

        let order = backend
            .order(result.order_id, result.order_key.as_str())
            .await
            .unwrap();
        assert_eq!(order.total, "$46.00");
        assert_eq!(order.payment_method_title.as_deref(), Some("Cash on delivery"));

        let err = backend.order(result.order_id, "wc_order_wrong").await.unwrap_err();
        assert!(matches!(err, CommerceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let backend = backend().await;
        backend.fail("cart", Failure::Transport).await;
        let session = BackendSession::new();
        assert!(backend.cart(&session).await.is_err());
        backend.recover("cart").await;
        assert!(backend.cart(&session).await.is_ok());
        assert_eq!(backend.call_count("cart").await, 2);
    }
}
