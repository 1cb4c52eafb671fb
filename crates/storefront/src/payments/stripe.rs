//! Card processor client (Stripe payment intents).

use async_trait::async_trait;
use copperleaf_core::{PaymentStatus, Price};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{error, instrument};

use super::{IntentParams, PaymentError, PaymentIntent, PaymentIntents};
use crate::config::StripeConfig;

/// Client for the processor's payment-intents API.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    status: PaymentStatus,
    client_secret: Option<String>,
    amount: i64,
    currency: String,
    next_action: Option<NextAction>,
    last_payment_error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct NextAction {
    redirect_to_url: Option<RedirectToUrl>,
}

#[derive(Debug, Deserialize)]
struct RedirectToUrl {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl From<IntentResponse> for PaymentIntent {
    fn from(response: IntentResponse) -> Self {
        Self {
            id: response.id,
            status: response.status,
            client_secret: response.client_secret,
            amount: response.amount,
            currency: response.currency,
            next_action_url: response
                .next_action
                .and_then(|a| a.redirect_to_url)
                .and_then(|r| r.url),
            last_error: response.last_payment_error.and_then(|e| e.message),
        }
    }
}

impl StripeClient {
    #[must_use]
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            secret_key: config.secret_key.clone(),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<PaymentIntent, PaymentError> {
        let response = request
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        parse_intent_response(status.as_u16(), &body)
    }
}

/// Map a processor response to an intent or a shopper-facing error.
fn parse_intent_response(status: u16, body: &str) -> Result<PaymentIntent, PaymentError> {
    if (200..300).contains(&status) {
        return serde_json::from_str::<IntentResponse>(body)
            .map(PaymentIntent::from)
            .map_err(|e| {
                error!(error = %e, "Failed to parse payment intent");
                PaymentError::Provider {
                    status,
                    message: e.to_string(),
                }
            });
    }

    let api_error = serde_json::from_str::<ApiErrorEnvelope>(body).ok().map(|e| e.error);
    match api_error {
        Some(ApiErrorBody {
            message: Some(message),
            kind: Some(kind),
        }) if kind == "card_error" => Err(PaymentError::Declined(message)),
        other => {
            let message = other
                .and_then(|e| e.message)
                .unwrap_or_else(|| body.chars().take(200).collect());
            error!(status, message = %message, "Payment processor returned an error");
            Err(PaymentError::Provider { status, message })
        }
    }
}

#[async_trait]
impl PaymentIntents for StripeClient {
    #[instrument(skip(self, params), fields(amount = %params.amount))]
    async fn create_intent(&self, params: &IntentParams) -> Result<PaymentIntent, PaymentError> {
        let amount = params.amount.minor_units().ok_or_else(|| PaymentError::Provider {
            status: 0,
            message: format!("amount out of range: {}", params.amount),
        })?;

        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), amount.to_string()),
            (
                "currency".to_string(),
                params.amount.currency_code.lowercase_code(),
            ),
        ];
        for kind in &params.payment_method_types {
            form.push(("payment_method_types[]".to_string(), kind.clone()));
        }
        if let Some(payment_method) = &params.payment_method {
            form.push(("payment_method".to_string(), payment_method.clone()));
            form.push(("confirm".to_string(), "true".to_string()));
        }
        if let Some(return_url) = &params.return_url {
            form.push(("return_url".to_string(), return_url.clone()));
        }
        if let Some(email) = &params.receipt_email {
            form.push(("receipt_email".to_string(), email.clone()));
        }

        let url = format!("{}/v1/payment_intents", self.api_base);
        self.send(self.client.post(url).form(&form)).await
    }

    #[instrument(skip(self), fields(amount = %amount))]
    async fn update_amount(&self, id: &str, amount: Price) -> Result<PaymentIntent, PaymentError> {
        let minor = amount.minor_units().ok_or_else(|| PaymentError::Provider {
            status: 0,
            message: format!("amount out of range: {amount}"),
        })?;
        let url = format!(
            "{}/v1/payment_intents/{}",
            self.api_base,
            urlencoding::encode(id)
        );
        self.send(self.client.post(url).form(&[("amount", minor.to_string())]))
            .await
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError> {
        let url = format!(
            "{}/v1/payment_intents/{}",
            self.api_base,
            urlencoding::encode(id)
        );
        self.send(self.client.get(url)).await
    }
}
