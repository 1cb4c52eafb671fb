//! Browser-facing payment endpoints.
//!
//! The browser SDKs need a client secret (cards) or a provider order id
//! (wallet) before the shopper can enter details. Amounts are in the store
//! currency; provider secrets never leave the server.

use axum::{
    Json,
    extract::{Path, State},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use copperleaf_core::Price;

use crate::error::{AppError, Result};
use crate::payments::{IntentParams, PaymentIntent};
use crate::state::AppState;

/// Create-intent request body.
#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub payment_method_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct WalletOrderResponse {
    pub id: String,
}

fn positive_amount(state: &AppState, amount: Decimal) -> Result<Price> {
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "Amount must be greater than zero.".to_string(),
        ));
    }
    Ok(Price::new(amount, state.config().checkout.currency))
}

fn cards_unavailable() -> AppError {
    AppError::Unavailable("Card payments are not available right now.".to_string())
}

/// Create a card payment intent.
///
/// POST /api/payments/intents
///
/// # Errors
///
/// Returns 400 for a non-positive amount, 503 if no card processor is
/// configured and 502 if the processor fails.
#[instrument(skip(state))]
pub async fn create_intent(
    State(state): State<AppState>,
    Json(request): Json<CreateIntentRequest>,
) -> Result<Json<PaymentIntent>> {
    let amount = positive_amount(&state, request.amount)?;
    let intents = state.intents().ok_or_else(cards_unavailable)?;

    let payment_method_types = if request.payment_method_types.is_empty() {
        vec!["card".to_string()]
    } else {
        request.payment_method_types
    };
    let intent = intents
        .create_intent(&IntentParams {
            amount,
            payment_method_types,
            payment_method: None,
            return_url: None,
            receipt_email: None,
        })
        .await?;
    Ok(Json(intent))
}

/// Change the amount of an unconfirmed intent.
///
/// POST /api/payments/intents/{id}
///
/// # Errors
///
/// Returns 400 for a non-positive amount, 503 if no card processor is
/// configured and 502 if the processor fails.
#[instrument(skip(state))]
pub async fn update_intent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<PaymentIntent>> {
    let amount = positive_amount(&state, request.amount)?;
    let intents = state.intents().ok_or_else(cards_unavailable)?;
    let intent = intents.update_amount(&id, amount).await?;
    Ok(Json(intent))
}

/// Create a wallet order for the shopper to approve.
///
/// POST /api/payments/wallet/orders
///
/// # Errors
///
/// Returns 400 for a non-positive amount, 503 if no wallet provider is
/// configured and 502 if the provider fails.
#[instrument(skip(state))]
pub async fn create_wallet_order(
    State(state): State<AppState>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<WalletOrderResponse>> {
    let amount = positive_amount(&state, request.amount)?;
    let wallet = state.wallet().ok_or_else(|| {
        AppError::Unavailable("This payment method is not available.".to_string())
    })?;
    let id = wallet.create_order(amount).await?;
    Ok(Json(WalletOrderResponse { id }))
}
