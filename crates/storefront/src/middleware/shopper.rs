//! Shopper session middleware and extractor.
//!
//! Every storefront request is bound to a [`ShopperSession`]. The shopper id
//! and the backend session token are persisted in the cookie session so a
//! shopper whose in-memory state was evicted gets their cart back.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tower_sessions::Session;
use tracing::Span;
use uuid::Uuid;

use crate::error::AppError;
use crate::session::ShopperSession;
use crate::state::AppState;

/// Session key for the shopper id.
pub const SHOPPER_ID_KEY: &str = "shopper_id";

/// Session key for the commerce backend's session token.
pub const BACKEND_TOKEN_KEY: &str = "backend_session";

/// The current request's shopper.
///
/// Available on every route behind [`shopper_middleware`].
#[derive(Clone)]
pub struct Shopper(pub Arc<ShopperSession>);

/// Resolve (or start) the shopper for this request.
///
/// After the handler runs, a newly issued backend token is written back to
/// the cookie session.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn shopper_middleware(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let id = if let Some(id) = session.get::<Uuid>(SHOPPER_ID_KEY).await? {
        id
    } else {
        let id = Uuid::new_v4();
        session.insert(SHOPPER_ID_KEY, id).await?;
        id
    };
    Span::current().record("shopper_id", tracing::field::display(id));

    let stored_token = session.get::<String>(BACKEND_TOKEN_KEY).await?;
    let shopper = state.shoppers().get_or_create(id, stored_token.clone()).await;
    request.extensions_mut().insert(Shopper(Arc::clone(&shopper)));

    let response = next.run(request).await;

    let current_token = shopper.backend_token().await;
    if current_token.is_some() && current_token != stored_token {
        session.insert(BACKEND_TOKEN_KEY, current_token).await?;
    }

    Ok(response)
}

impl<S> FromRequestParts<S> for Shopper
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| AppError::Internal("Shopper middleware not installed".to_string()))
    }
}
