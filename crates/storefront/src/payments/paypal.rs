//! Wallet provider client (PayPal orders API).

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use copperleaf_core::{CurrencyCode, Price};
use moka::future::Cache;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error, instrument};

use super::{PaymentError, WalletOrders};
use crate::config::PayPalConfig;

/// Access tokens are valid for hours; refresh well before that.
const TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Client for the wallet provider's orders API.
#[derive(Clone)]
pub struct PayPalClient {
    client: reqwest::Client,
    api_base: String,
    client_id: String,
    client_secret: SecretString,
    token: Cache<(), String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OrderDetails {
    #[serde(default)]
    purchase_units: Vec<OrderUnit>,
}

#[derive(Debug, Deserialize)]
struct OrderUnit {
    amount: Money,
}

#[derive(Debug, Deserialize)]
struct Money {
    currency_code: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    payments: Option<Payments>,
}

#[derive(Debug, Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    issue: String,
}

impl PayPalClient {
    #[must_use]
    pub fn new(config: &PayPalConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: Cache::builder()
                .max_capacity(1)
                .time_to_live(TOKEN_TTL)
                .build(),
        }
    }

    /// Fetch (or reuse) an OAuth access token.
    async fn access_token(&self) -> Result<String, PaymentError> {
        if let Some(token) = self.token.get(&()).await {
            return Ok(token);
        }

        let credentials = STANDARD.encode(format!(
            "{}:{}",
            self.client_id,
            self.client_secret.expose_secret()
        ));
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .header("Authorization", format!("Basic {credentials}"))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = %status, "Wallet provider rejected credentials");
            return Err(PaymentError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = response.json().await?;
        debug!("Fetched wallet provider access token");
        self.token.insert((), token.access_token.clone()).await;
        Ok(token.access_token)
    }
}

/// The amount of the first purchase unit in an order details response.
fn parse_order_amount(body: &str) -> Result<Price, PaymentError> {
    let invalid = |message: String| PaymentError::Provider {
        status: 200,
        message,
    };
    let order: OrderDetails = serde_json::from_str(body).map_err(|e| invalid(e.to_string()))?;
    let money = order
        .purchase_units
        .into_iter()
        .next()
        .map(|unit| unit.amount)
        .ok_or_else(|| invalid("order without purchase units".to_string()))?;
    let currency = CurrencyCode::from_str(&money.currency_code).map_err(invalid)?;
    let amount = Decimal::from_str(&money.value).map_err(|e| invalid(e.to_string()))?;
    Ok(Price::new(amount, currency))
}

/// Map a capture response to a capture id or a shopper-facing error.
fn parse_capture_response(status: u16, body: &str) -> Result<String, PaymentError> {
    if !(200..300).contains(&status) {
        let parsed = serde_json::from_str::<ErrorResponse>(body).ok();
        if parsed
            .as_ref()
            .is_some_and(|e| e.details.iter().any(|d| d.issue == "ORDER_NOT_APPROVED"))
        {
            return Err(PaymentError::Cancelled);
        }
        if parsed
            .as_ref()
            .is_some_and(|e| e.details.iter().any(|d| d.issue == "INSTRUMENT_DECLINED"))
        {
            return Err(PaymentError::Declined(
                "Your payment method was declined. Please choose another.".to_string(),
            ));
        }
        let message = parsed
            .and_then(|e| e.message)
            .unwrap_or_else(|| body.chars().take(200).collect());
        return Err(PaymentError::Provider { status, message });
    }

    let capture: CaptureResponse =
        serde_json::from_str(body).map_err(|e| PaymentError::Provider {
            status,
            message: e.to_string(),
        })?;
    if capture.status != "COMPLETED" {
        return Err(PaymentError::Declined(
            "The payment was not completed.".to_string(),
        ));
    }
    capture
        .purchase_units
        .into_iter()
        .filter_map(|u| u.payments)
        .flat_map(|p| p.captures)
        .map(|c| c.id)
        .next()
        .ok_or_else(|| PaymentError::Provider {
            status,
            message: "capture response without capture id".to_string(),
        })
}

#[async_trait]
impl WalletOrders for PayPalClient {
    #[instrument(skip(self), fields(amount = %amount))]
    async fn create_order(&self, amount: Price) -> Result<String, PaymentError> {
        let token = self.access_token().await?;
        let body = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": amount.currency_code.code(),
                    "value": amount.plain(),
                }
            }]
        });

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.api_base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = %status, "Wallet provider rejected order creation");
            return Err(PaymentError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let order: CreatedOrder = response.json().await?;
        Ok(order.id)
    }

    #[instrument(skip(self))]
    async fn order_amount(&self, order_id: &str) -> Result<Price, PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!(
                "{}/v2/checkout/orders/{}",
                self.api_base,
                urlencoding::encode(order_id)
            ))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::Cancelled);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = %status, "Wallet provider rejected order lookup");
            return Err(PaymentError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        parse_order_amount(&response.text().await?)
    }

    #[instrument(skip(self))]
    async fn capture_order(&self, order_id: &str) -> Result<String, PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.api_base,
                urlencoding::encode(order_id)
            ))
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_capture_response(status, &body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_capture_returns_capture_id() {
        let body = r#"{
            "id": "5O190127TN364715T",
            "status": "COMPLETED",
            "purchase_units": [{ "payments": { "captures": [{ "id": "3C679366HH908993F", "status": "COMPLETED" }] } }]
        }"#;
        assert_eq!(parse_capture_response(201, body).unwrap(), "3C679366HH908993F");
    }

    #[test]
    fn test_order_amount_reads_first_purchase_unit() {
        let body = r#"{
            "id": "5O190127TN364715T",
            "status": "APPROVED",
            "purchase_units": [{ "amount": { "currency_code": "USD", "value": "59.99" } }]
        }"#;
        assert_eq!(
            parse_order_amount(body).unwrap(),
            Price::new(Decimal::new(5999, 2), CurrencyCode::USD)
        );
    }

    #[test]
    fn test_order_without_purchase_units_is_a_provider_error() {
        assert!(matches!(
            parse_order_amount(r#"{ "purchase_units": [] }"#).unwrap_err(),
            PaymentError::Provider { .. }
        ));
    }

    #[test]
    fn test_unapproved_order_is_cancelled() {
        let body = r#"{
            "name": "UNPROCESSABLE_ENTITY",
            "message": "The requested action could not be performed.",
            "details": [{ "issue": "ORDER_NOT_APPROVED" }]
        }"#;
        assert!(matches!(
            parse_capture_response(422, body).unwrap_err(),
            PaymentError::Cancelled
        ));
    }

    #[test]
    fn test_pending_capture_is_declined() {
        let body = r#"{ "status": "PAYER_ACTION_REQUIRED", "purchase_units": [] }"#;
        assert!(matches!(
            parse_capture_response(200, body).unwrap_err(),
            PaymentError::Declined(_)
        ));
    }
}
