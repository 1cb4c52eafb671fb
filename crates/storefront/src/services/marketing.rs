//! Klaviyo client for newsletter signups.
//!
//! A signup creates (or finds) the profile and then adds it to the
//! configured list. Klaviyo answers a duplicate profile with `409` and the
//! existing id in the error metadata; that counts as success.

use copperleaf_core::Email;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::KlaviyoConfig;

/// Klaviyo API version.
const API_REVISION: &str = "2024-10-15";

/// Klaviyo API base URL.
const BASE_URL: &str = "https://a.klaviyo.com/api";

/// Errors that can occur when interacting with Klaviyo API.
#[derive(Debug, Error)]
pub enum KlaviyoError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Klaviyo API client for list subscriptions.
#[derive(Clone)]
pub struct KlaviyoClient {
    client: reqwest::Client,
    base_url: String,
    list_id: String,
}

impl KlaviyoClient {
    /// Create a new Klaviyo API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &KlaviyoConfig) -> Result<Self, KlaviyoError> {
        Self::with_base_url(config, BASE_URL)
    }

    /// Create a client against a different API root.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn with_base_url(config: &KlaviyoConfig, base_url: &str) -> Result<Self, KlaviyoError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Klaviyo-API-Key {}", config.api_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| KlaviyoError::Parse(format!("Invalid API key format: {e}")))?,
        );
        headers.insert("revision", HeaderValue::from_static(API_REVISION));
        headers.insert(
            "Content-Type",
            HeaderValue::from_static("application/vnd.api+json"),
        );
        headers.insert("Accept", HeaderValue::from_static("application/vnd.api+json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            list_id: config.list_id.clone(),
        })
    }

    /// Subscribe `email` to the newsletter list.
    ///
    /// # Errors
    ///
    /// Returns error if either API request fails.
    #[instrument(skip(self, email), fields(email_domain = %email.domain()))]
    pub async fn subscribe(&self, email: &Email) -> Result<(), KlaviyoError> {
        let profile_id = self.create_profile(email).await?;
        self.add_to_list(&profile_id).await
    }

    /// Create a profile, returning its id (or the existing profile's id).
    async fn create_profile(&self, email: &Email) -> Result<String, KlaviyoError> {
        let url = format!("{}/profiles/", self.base_url);
        let body = serde_json::json!({
            "data": {
                "type": "profile",
                "attributes": { "email": email.as_str() }
            }
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::CONFLICT {
            debug!("Profile already exists");
            return duplicate_profile_id(&text).ok_or_else(|| {
                KlaviyoError::Parse("Duplicate profile response without an id".to_string())
            });
        }
        if !status.is_success() {
            return Err(KlaviyoError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let created: ApiResponse<Resource> =
            serde_json::from_str(&text).map_err(|e| KlaviyoError::Parse(e.to_string()))?;
        Ok(created.data.id)
    }

    async fn add_to_list(&self, profile_id: &str) -> Result<(), KlaviyoError> {
        let url = format!(
            "{}/lists/{}/relationships/profiles/",
            self.base_url, self.list_id
        );
        let body = serde_json::json!({
            "data": [{ "type": "profile", "id": profile_id }]
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(KlaviyoError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Pull the existing profile id out of a `409 duplicate_profile` body.
fn duplicate_profile_id(body: &str) -> Option<String> {
    let errors: ErrorResponse = serde_json::from_str(body).ok()?;
    errors
        .errors
        .into_iter()
        .find_map(|e| e.meta.and_then(|m| m.duplicate_profile_id))
}

// =============================================================================
// API Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    meta: Option<ErrorMeta>,
}

#[derive(Debug, Deserialize)]
struct ErrorMeta {
    duplicate_profile_id: Option<String>,
}
