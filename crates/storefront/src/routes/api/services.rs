//! Address lookup, review and newsletter endpoints.

use axum::{
    Json,
    extract::{Multipart, Query, State},
};
use copperleaf_core::Email;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::services::{AddressSuggestion, ReviewSubmission};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LookupQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
}

/// Confirmation shown after a form submission.
#[derive(Debug, Serialize)]
pub struct FormResponse {
    pub message: &'static str,
}

/// Locality and postcode suggestions for a partial address.
///
/// GET /api/address-lookup?q=
///
/// Always answers with a list; lookup failures and a missing provider give
/// an empty one.
#[instrument(skip(state))]
pub async fn address_lookup(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Json<Vec<AddressSuggestion>> {
    let suggestions = match state.address_lookup() {
        Some(client) => client.suggest(&query.q).await,
        None => Vec::new(),
    };
    Json(suggestions)
}

/// Forward a product review.
///
/// POST /api/reviews (multipart)
///
/// # Errors
///
/// Returns 422 for an incomplete review, 400 for a malformed form and 502 if
/// the backend refuses it.
#[instrument(skip(state, multipart))]
pub async fn submit_review(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FormResponse>> {
    let mut fields = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        fields.push((name, value));
    }

    let review = ReviewSubmission::from_fields(fields)?;
    state.reviews().submit(review).await?;
    Ok(Json(FormResponse {
        message: "Thanks! Your review will appear once it has been approved.",
    }))
}

/// Subscribe an email address to the newsletter.
///
/// POST /api/newsletter
///
/// # Errors
///
/// Returns 400 for an invalid address, 503 if the newsletter is not
/// configured and 502 if the marketing provider fails.
#[instrument(skip(state, request))]
pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<FormResponse>> {
    let email = Email::parse(&request.email)
        .map_err(|_| AppError::BadRequest("Please enter a valid email address.".to_string()))?;
    let klaviyo = state.klaviyo().ok_or_else(|| {
        AppError::Unavailable("Newsletter signup is not available.".to_string())
    })?;

    add_breadcrumb("newsletter", "Subscribe", &[("domain", email.domain())]);
    klaviyo.subscribe(&email).await?;
    info!(domain = email.domain(), "Newsletter subscription successful");
    Ok(Json(FormResponse {
        message: "Thanks for subscribing!",
    }))
}
