//! Order lookup.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use copperleaf_core::OrderId;
use serde::Deserialize;
use tracing::instrument;

use crate::commerce::Order;
use crate::error::Result;
use crate::state::AppState;

/// The order key proving the caller placed the order.
#[derive(Debug, Deserialize)]
pub struct OrderKeyQuery {
    pub key: String,
}

/// Fetch an order for the receipt.
///
/// GET /api/orders/{id}?key=
///
/// # Errors
///
/// Returns 403 if the key does not match and 404 if there is no such order.
#[instrument(skip(state, query))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Query(query): Query<OrderKeyQuery>,
) -> Result<Json<Order>> {
    let order = state.catalog().order(id, &query.key).await?;
    Ok(Json(order))
}
