//! Cart API handlers.
//!
//! Each mutation answers with the cart as the backend returned it.

use axum::{
    Json,
    extract::Path,
    http::StatusCode,
};
use copperleaf_core::ProductId;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::commerce::Cart;
use crate::error::{Result, add_breadcrumb};
use crate::middleware::Shopper;

/// A cart with its total quantity.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    #[serde(flatten)]
    pub cart: Cart,
    pub item_count: u32,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        let item_count = cart.item_count();
        Self { cart, item_count }
    }
}

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

/// Quantity update request body.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    /// Values below 1 remove the line.
    pub quantity: i64,
}

/// Current cart, freshly loaded from the backend.
///
/// GET /api/cart
///
/// # Errors
///
/// Returns an error if the backend call fails.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn show(Shopper(shopper): Shopper) -> Result<Json<CartResponse>> {
    let cart = shopper.cart().refresh().await?;
    Ok(Json(cart.into()))
}

/// Add a product to the cart.
///
/// POST /api/cart/items
///
/// # Errors
///
/// Returns 422 for a zero quantity or a refused product.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn add(
    Shopper(shopper): Shopper,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartResponse>> {
    let product_id = request.product_id.to_string();
    let quantity = request.quantity.to_string();
    add_breadcrumb(
        "cart",
        "Add to cart",
        &[("product_id", &product_id), ("quantity", &quantity)],
    );

    let cart = shopper
        .cart()
        .add_to_cart(request.product_id, request.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// Set a line's quantity.
///
/// PATCH /api/cart/items/{key}
///
/// # Errors
///
/// Returns an error if the backend refuses the change.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn update(
    Shopper(shopper): Shopper,
    Path(key): Path<String>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>> {
    let cart = shopper
        .cart()
        .update_quantity(&key, request.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// Remove a line.
///
/// DELETE /api/cart/items/{key}
///
/// # Errors
///
/// Returns an error if the backend call fails.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn remove(
    Shopper(shopper): Shopper,
    Path(key): Path<String>,
) -> Result<Json<CartResponse>> {
    add_breadcrumb("cart", "Remove from cart", &[("key", &key)]);
    let cart = shopper.cart().remove_from_cart(&key).await?;
    Ok(Json(cart.into()))
}

/// Empty the cart.
///
/// DELETE /api/cart
///
/// # Errors
///
/// Returns an error if the backend call fails.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn clear(Shopper(shopper): Shopper) -> Result<StatusCode> {
    shopper.cart().clear_cart().await?;
    Ok(StatusCode::NO_CONTENT)
}
