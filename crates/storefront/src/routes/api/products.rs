//! Catalog reads.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::instrument;

use crate::commerce::{ProductConnection, ProductDetail, ProductQuery};
use crate::error::Result;
use crate::state::AppState;

/// List products.
///
/// GET /api/products?first&after&category&search
///
/// # Errors
///
/// Returns an error if the backend call fails.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductConnection>> {
    let products = state.catalog().products(&query).await?;
    Ok(Json(products))
}

/// Product detail by slug.
///
/// GET /api/products/{slug}
///
/// # Errors
///
/// Returns 404 if no product has this slug.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductDetail>> {
    let product = state.catalog().product(&slug).await?;
    Ok(Json(product))
}
