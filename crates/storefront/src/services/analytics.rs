//! Server-side analytics events via the GA4 Measurement Protocol.
//!
//! Events are fire-and-forget: [`emit`] spawns the request and logs failures
//! at `warn` without surfacing them to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AnalyticsConfig;

const COLLECT_URL: &str = "https://www.google-analytics.com/mp/collect";

/// Errors that can occur when sending analytics events.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Collector rejected event with status {0}")]
    Rejected(u16),
}

/// A product in an analytics event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsItem {
    pub item_id: String,
    pub item_name: String,
    pub price: Decimal,
    pub quantity: u32,
}

/// Commerce events the storefront reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsEvent {
    AddToCart(AnalyticsItem),
    RemoveFromCart(AnalyticsItem),
    Purchase {
        transaction_id: String,
        value: Decimal,
        items: Vec<AnalyticsItem>,
    },
}

impl AnalyticsEvent {
    /// GA4 event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AddToCart(_) => "add_to_cart",
            Self::RemoveFromCart(_) => "remove_from_cart",
            Self::Purchase { .. } => "purchase",
        }
    }

    fn params(&self, currency: &str) -> serde_json::Value {
        match self {
            Self::AddToCart(item) | Self::RemoveFromCart(item) => serde_json::json!({
                "currency": currency,
                "value": item.price * Decimal::from(item.quantity),
                "items": [item],
            }),
            Self::Purchase {
                transaction_id,
                value,
                items,
            } => serde_json::json!({
                "currency": currency,
                "transaction_id": transaction_id,
                "value": value,
                "items": items,
            }),
        }
    }
}

/// Destination for analytics events.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Send one event attributed to `client_id`.
    async fn track(&self, client_id: &str, event: AnalyticsEvent) -> Result<(), AnalyticsError>;
}

/// Spawn `event` on its own task; failures are logged and dropped.
pub fn emit(sink: &Arc<dyn AnalyticsSink>, client_id: &str, event: AnalyticsEvent) {
    let sink = Arc::clone(sink);
    let client_id = client_id.to_string();
    tokio::spawn(async move {
        let name = event.name();
        if let Err(e) = sink.track(&client_id, event).await {
            warn!(error = %e, event = name, "Failed to send analytics event");
        }
    });
}

/// Sink used when analytics is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalytics;

#[async_trait]
impl AnalyticsSink for NoopAnalytics {
    async fn track(&self, _client_id: &str, event: AnalyticsEvent) -> Result<(), AnalyticsError> {
        debug!(event = event.name(), "Analytics disabled, dropping event");
        Ok(())
    }
}

/// GA4 Measurement Protocol client.
#[derive(Clone)]
pub struct Ga4Client {
    client: reqwest::Client,
    measurement_id: String,
    api_secret: SecretString,
    currency: String,
}

impl Ga4Client {
    #[must_use]
    pub fn new(config: &AnalyticsConfig, currency: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            measurement_id: config.measurement_id.clone(),
            api_secret: config.api_secret.clone(),
            currency: currency.to_string(),
        }
    }
}

#[async_trait]
impl AnalyticsSink for Ga4Client {
    async fn track(&self, client_id: &str, event: AnalyticsEvent) -> Result<(), AnalyticsError> {
        let body = serde_json::json!({
            "client_id": client_id,
            "events": [{
                "name": event.name(),
                "params": event.params(&self.currency),
            }],
        });

        let response = self
            .client
            .post(COLLECT_URL)
            .query(&[
                ("measurement_id", self.measurement_id.as_str()),
                ("api_secret", self.api_secret.expose_secret()),
            ])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalyticsError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}
