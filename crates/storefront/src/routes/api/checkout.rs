//! Checkout API handlers.
//!
//! Every successful response is the full checkout view with the queued
//! notifications drained into it. Error responses drain the queue too; their
//! message is already in the error body.

use axum::{Json, extract::Path, http::StatusCode};
use copperleaf_core::OrderId;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::checkout::{CheckoutError, CheckoutState, PaymentDetails, PlaceOrderOutcome};
use crate::commerce::AddressPatch;
use crate::error::{Result, add_breadcrumb};
use crate::middleware::Shopper;
use crate::session::ShopperSession;

/// Address edit request body. Either side may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AddressRequest {
    pub billing: Option<AddressPatch>,
    pub shipping: Option<AddressPatch>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub value: bool,
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct ShippingRateRequest {
    pub rate_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CouponRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentMethodRequest {
    pub gateway_id: String,
}

/// Place-order request body: whatever the browser collected for the gateway.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlaceOrderRequest {
    /// Card payment method token.
    pub payment_token: Option<String>,
    /// Approved wallet order id.
    pub wallet_order_id: Option<String>,
}

/// Place-order response.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlaceOrderResponse {
    Completed {
        order_id: OrderId,
        receipt_url: String,
    },
    /// The browser must navigate to `redirect_url` to finish paying.
    Redirect { redirect_url: String },
}

/// Attach drained notifications to a successful result; drop them on error.
async fn respond(
    shopper: &ShopperSession,
    result: std::result::Result<CheckoutState, CheckoutError>,
) -> Result<Json<CheckoutState>> {
    let notifications = shopper.checkout().take_notifications().await;
    let mut state = result?;
    state.notifications = notifications;
    Ok(Json(state))
}

/// Enter checkout and return the view.
///
/// GET /api/checkout
///
/// # Errors
///
/// Returns an error if the cart or the payment gateways cannot be loaded.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn show(Shopper(shopper): Shopper) -> Result<Json<CheckoutState>> {
    let result = shopper.checkout().initialize().await;
    respond(&shopper, result).await
}

/// Edit billing and/or shipping details.
///
/// POST /api/checkout/address
///
/// # Errors
///
/// Never fails once the body parses; the signature matches its siblings.
#[instrument(skip(shopper, request), fields(shopper_id = %shopper.id()))]
pub async fn update_address(
    Shopper(shopper): Shopper,
    Json(request): Json<AddressRequest>,
) -> Result<Json<CheckoutState>> {
    let checkout = shopper.checkout();
    let mut state = None;
    if let Some(billing) = request.billing {
        state = Some(checkout.update_billing(billing).await);
    }
    if let Some(shipping) = request.shipping {
        state = Some(checkout.update_shipping(shipping).await);
    }
    let state = match state {
        Some(state) => state,
        None => checkout.state().await,
    };
    respond(&shopper, Ok(state)).await
}

/// Toggle shipping to a separate address.
///
/// POST /api/checkout/ship-to-different
///
/// # Errors
///
/// Never fails once the body parses.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn ship_to_different_address(
    Shopper(shopper): Shopper,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<CheckoutState>> {
    let state = shopper
        .checkout()
        .set_ship_to_different_address(request.value)
        .await;
    respond(&shopper, Ok(state)).await
}

/// Set the order notes.
///
/// POST /api/checkout/notes
///
/// # Errors
///
/// Never fails once the body parses.
#[instrument(skip(shopper, request), fields(shopper_id = %shopper.id()))]
pub async fn update_notes(
    Shopper(shopper): Shopper,
    Json(request): Json<NotesRequest>,
) -> Result<Json<CheckoutState>> {
    let state = shopper.checkout().set_order_notes(request.notes).await;
    respond(&shopper, Ok(state)).await
}

/// Select a shipping rate.
///
/// POST /api/checkout/shipping-rate
///
/// # Errors
///
/// Returns 422 if the rate is not currently offered.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn select_shipping_rate(
    Shopper(shopper): Shopper,
    Json(request): Json<ShippingRateRequest>,
) -> Result<Json<CheckoutState>> {
    let result = shopper
        .checkout()
        .select_shipping_rate(&request.rate_id)
        .await;
    respond(&shopper, result).await
}

/// Apply a coupon.
///
/// POST /api/checkout/coupons
///
/// # Errors
///
/// Returns 422 with the backend's message if the coupon is refused, or 409
/// while another coupon update is in flight.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn apply_coupon(
    Shopper(shopper): Shopper,
    Json(request): Json<CouponRequest>,
) -> Result<Json<CheckoutState>> {
    add_breadcrumb("checkout", "Apply coupon", &[("code", &request.code)]);
    let result = shopper.checkout().apply_coupon(&request.code).await;
    respond(&shopper, result).await
}

/// Remove a coupon.
///
/// DELETE /api/checkout/coupons/{code}
///
/// # Errors
///
/// Returns an error if the backend refuses the removal.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn remove_coupon(
    Shopper(shopper): Shopper,
    Path(code): Path<String>,
) -> Result<Json<CheckoutState>> {
    let result = shopper.checkout().remove_coupon(&code).await;
    respond(&shopper, result).await
}

/// Select a payment method.
///
/// POST /api/checkout/payment-method
///
/// # Errors
///
/// Returns 422 if the gateway is not offered.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn select_payment_method(
    Shopper(shopper): Shopper,
    Json(request): Json<PaymentMethodRequest>,
) -> Result<Json<CheckoutState>> {
    let result = shopper
        .checkout()
        .select_payment_method(&request.gateway_id)
        .await;
    respond(&shopper, result).await
}

/// Submit the order.
///
/// POST /api/checkout/place-order
///
/// # Errors
///
/// Returns 422 for validation failures (no backend call is made), 402 for a
/// declined or cancelled payment, and 502 for backend failures.
#[instrument(skip(shopper, request), fields(shopper_id = %shopper.id()))]
pub async fn place_order(
    Shopper(shopper): Shopper,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<Json<PlaceOrderResponse>> {
    add_breadcrumb("checkout", "Place order", &[]);
    let result = shopper
        .checkout()
        .place_order(PaymentDetails {
            payment_token: request.payment_token,
            wallet_order_id: request.wallet_order_id,
        })
        .await;
    shopper.checkout().take_notifications().await;

    match result? {
        PlaceOrderOutcome::Completed {
            order_id,
            receipt_url,
            ..
        } => {
            shopper.clear_pending_payment().await;
            info!(order_id = %order_id, "Order placed");
            Ok(Json(PlaceOrderResponse::Completed {
                order_id,
                receipt_url,
            }))
        }
        PlaceOrderOutcome::Redirect { url, pending } => {
            info!(order_id = %pending.order_id, "Order awaiting off-site payment");
            shopper.set_pending_payment(pending).await;
            Ok(Json(PlaceOrderResponse::Redirect { redirect_url: url }))
        }
    }
}

/// Leave checkout; drops a pending address recalculation.
///
/// POST /api/checkout/leave
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn leave(Shopper(shopper): Shopper) -> StatusCode {
    shopper.checkout().leave().await;
    StatusCode::NO_CONTENT
}
