//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! # Pages
//! GET  /cart                          - Cart page
//! GET  /checkout                      - Checkout page (redirects to /cart when empty)
//! GET  /checkout/confirm              - Verify an off-site payment on return
//! GET  /orders/{id}?key=              - Receipt page
//!
//! # Catalog
//! GET  /api/products                  - Product listing (?first&after&category&search)
//! GET  /api/products/{slug}           - Product detail
//!
//! # Cart
//! GET    /api/cart                    - Current cart
//! POST   /api/cart/items              - Add a product
//! PATCH  /api/cart/items/{key}        - Set line quantity (< 1 removes)
//! DELETE /api/cart/items/{key}        - Remove a line
//! DELETE /api/cart                    - Empty the cart
//!
//! # Checkout
//! GET  /api/checkout                  - Initialize and return the checkout view
//! POST /api/checkout/address          - Edit billing and/or shipping
//! POST /api/checkout/ship-to-different
//! POST /api/checkout/notes
//! POST /api/checkout/shipping-rate
//! POST /api/checkout/coupons          - Apply a coupon
//! DELETE /api/checkout/coupons/{code} - Remove a coupon
//! POST /api/checkout/payment-method
//! POST /api/checkout/place-order
//! POST /api/checkout/leave            - Cancel pending recalculation
//!
//! # Orders
//! GET  /api/orders/{id}?key=
//!
//! # Payments
//! POST /api/payments/intents          - Create a card payment intent
//! POST /api/payments/intents/{id}     - Update the intent amount
//! POST /api/payments/wallet/orders    - Create a wallet order
//!
//! # Services
//! GET  /api/address-lookup?q=         - Locality suggestions
//! POST /api/reviews                   - Forward a product review (rate limited)
//! POST /api/newsletter                - Newsletter signup (rate limited)
//! ```

pub mod api;
pub mod pages;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::middleware::form_rate_limiter;
use crate::state::AppState;

/// Create the cart API router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api::cart::show).delete(api::cart::clear))
        .route("/items", post(api::cart::add))
        .route(
            "/items/{key}",
            patch(api::cart::update).delete(api::cart::remove),
        )
}

/// Create the checkout API router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api::checkout::show))
        .route("/address", post(api::checkout::update_address))
        .route(
            "/ship-to-different",
            post(api::checkout::ship_to_different_address),
        )
        .route("/notes", post(api::checkout::update_notes))
        .route("/shipping-rate", post(api::checkout::select_shipping_rate))
        .route("/coupons", post(api::checkout::apply_coupon))
        .route("/coupons/{code}", delete(api::checkout::remove_coupon))
        .route("/payment-method", post(api::checkout::select_payment_method))
        .route("/place-order", post(api::checkout::place_order))
        .route("/leave", post(api::checkout::leave))
}

/// Create the payment API router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/intents", post(api::payments::create_intent))
        .route("/intents/{id}", post(api::payments::update_intent))
        .route("/wallet/orders", post(api::payments::create_wallet_order))
}

/// Form endpoints, each behind the per-IP rate limiter.
pub fn form_routes() -> Router<AppState> {
    Router::new()
        .route("/api/reviews", post(api::services::submit_review))
        .route("/api/newsletter", post(api::services::subscribe))
        .layer(form_rate_limiter())
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Pages
        .route("/cart", get(pages::cart))
        .route("/checkout", get(pages::checkout))
        .route("/checkout/confirm", get(pages::confirm))
        .route("/orders/{id}", get(pages::receipt))
        // Catalog
        .route("/api/products", get(api::products::index))
        .route("/api/products/{slug}", get(api::products::show))
        // Cart and checkout
        .nest("/api/cart", cart_routes())
        .nest("/api/checkout", checkout_routes())
        .route("/api/orders/{id}", get(api::orders::show))
        .nest("/api/payments", payment_routes())
        // Services
        .route("/api/address-lookup", get(api::services::address_lookup))
        .merge(form_routes())
}
