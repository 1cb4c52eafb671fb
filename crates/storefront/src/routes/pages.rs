//! Server-rendered pages.
//!
//! The cart and checkout pages render the current state and hand it to the
//! page script as JSON; everything interactive goes through `/api`.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use copperleaf_core::OrderId;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::checkout::{CheckoutPhase, CheckoutState};
use crate::commerce::{Cart, Order};
use crate::error::AppError;
use crate::middleware::Shopper;
use crate::state::AppState;

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart.html")]
pub struct CartTemplate {
    pub cart: Cart,
    pub item_count: u32,
    pub error: Option<String>,
}

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout.html")]
pub struct CheckoutTemplate {
    pub state: CheckoutState,
    /// `state` serialized for the page script.
    pub state_json: String,
    pub error: Option<String>,
}

/// Receipt page template.
#[derive(Template, WebTemplate)]
#[template(path = "receipt.html")]
pub struct ReceiptTemplate {
    pub order: Order,
    pub status_label: &'static str,
}

/// Shown when an off-site payment could not be confirmed.
#[derive(Template, WebTemplate)]
#[template(path = "confirm_failed.html")]
pub struct ConfirmFailedTemplate {
    pub message: String,
}

/// Query the payment provider appends to the return URL.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfirmQuery {
    pub payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptQuery {
    pub key: String,
}

/// JSON safe to embed in a `<script>` element.
fn script_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

/// Display the cart page.
///
/// Leaving checkout for the cart drops any pending address recalculation.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn cart(Shopper(shopper): Shopper) -> CartTemplate {
    shopper.checkout().leave().await;

    let (cart, error) = match shopper.cart().refresh().await {
        Ok(cart) => (cart, None),
        Err(e) => {
            warn!(error = %e, "Failed to load cart");
            (shopper.cart().cart().await, Some(e.to_string()))
        }
    };

    CartTemplate {
        item_count: cart.item_count(),
        cart,
        error,
    }
}

/// Display the checkout page, or send an empty cart back to `/cart`.
#[instrument(skip(shopper), fields(shopper_id = %shopper.id()))]
pub async fn checkout(Shopper(shopper): Shopper) -> Response {
    let checkout = shopper.checkout();
    let (state, error) = match checkout.initialize().await {
        Ok(state) => (state, None),
        Err(e) => {
            warn!(error = %e, "Failed to initialize checkout");
            (checkout.state().await, Some(e.to_string()))
        }
    };
    if state.phase == CheckoutPhase::EmptyCart {
        return Redirect::to("/cart").into_response();
    }

    let mut state = state;
    state.notifications = checkout.take_notifications().await;
    CheckoutTemplate {
        state_json: script_json(&state),
        state,
        error,
    }
    .into_response()
}

/// Verify an off-site payment when the shopper returns from the provider.
///
/// A verified payment redirects to the receipt; anything else renders the
/// reason and leaves the cart intact.
#[instrument(skip(state, shopper), fields(shopper_id = %shopper.id()))]
pub async fn confirm(
    State(state): State<AppState>,
    Shopper(shopper): Shopper,
    Query(query): Query<ConfirmQuery>,
) -> Response {
    let outcome = state
        .confirmation()
        .verify_pending(&shopper, query.payment_intent.as_deref())
        .await;

    match outcome.receipt_url {
        Some(url) if outcome.success => Redirect::to(&url).into_response(),
        _ => ConfirmFailedTemplate {
            message: outcome.message,
        }
        .into_response(),
    }
}

/// Display an order receipt.
///
/// # Errors
///
/// Returns 403 if the key does not match the order and 404 if there is no
/// such order.
#[instrument(skip(state, query))]
pub async fn receipt(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Query(query): Query<ReceiptQuery>,
) -> Result<ReceiptTemplate, StatusCode> {
    let order = state
        .catalog()
        .order(id, &query.key)
        .await
        .map_err(|e| {
            let err = AppError::from(e);
            warn!(error = %err, order_id = %id, "Receipt lookup failed");
            err.status()
        })?;

    Ok(ReceiptTemplate {
        status_label: order.status.label(),
        order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_json_cannot_close_the_script_element() {
        let json = script_json(&serde_json::json!({ "note": "</script><b>&" }));
        assert!(!json.contains("</script>"));
        assert!(!json.contains('<'));
        assert!(json.contains("\\u003c/script\\u003e"));
    }
}
