//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront (used for payment return URLs)
//! - `COMMERCE_SITE_URL` - Base URL of the commerce backend (GraphQL at `/graphql`)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STORE_CURRENCY` - ISO currency code for totals and payments (default: USD)
//! - `COMMERCE_API_TOKEN` - Bearer token for order lookup and finalization
//! - `CHECKOUT_ADDRESS_DEBOUNCE_MS` - Address recalculation debounce (default: 500)
//! - `STRIPE_SECRET_KEY` - Payment processor secret key (enables card payments)
//! - `STRIPE_API_BASE` - Payment processor API base (default: <https://api.stripe.com>)
//! - `PAYPAL_CLIENT_ID` / `PAYPAL_CLIENT_SECRET` - Wallet credentials (enables wallet payments)
//! - `PAYPAL_API_BASE` - Wallet API base (default: sandbox)
//! - `KLAVIYO_API_KEY` / `KLAVIYO_LIST_ID` - Newsletter subscriptions
//! - `GA4_MEASUREMENT_ID` / `GA4_API_SECRET` - Server-side analytics events
//! - `ADDRESS_LOOKUP_URL` / `ADDRESS_LOOKUP_API_KEY` - Locality/postcode suggestions
//! - `SENTRY_DSN` / `SENTRY_ENVIRONMENT` - Sentry error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use copperleaf_core::CurrencyCode;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Commerce backend configuration
    pub commerce: CommerceConfig,
    /// Checkout behaviour
    pub checkout: CheckoutConfig,
    /// Payment provider credentials
    pub payments: PaymentsConfig,
    /// Newsletter provider configuration (disabled when absent)
    pub klaviyo: Option<KlaviyoConfig>,
    /// Analytics configuration (disabled when absent)
    pub analytics: Option<AnalyticsConfig>,
    /// Address lookup configuration (disabled when absent)
    pub address_lookup: Option<AddressLookupConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Commerce backend configuration.
#[derive(Clone)]
pub struct CommerceConfig {
    /// Site root, e.g. `https://shop.example.org`
    pub site_url: String,
    /// GraphQL endpoint derived from the site root
    pub graphql_url: String,
    /// Product review (comment) form endpoint derived from the site root
    pub review_url: String,
    /// Privileged token for reading and finalizing orders
    pub api_token: Option<SecretString>,
}

impl std::fmt::Debug for CommerceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommerceConfig")
            .field("site_url", &self.site_url)
            .field("graphql_url", &self.graphql_url)
            .field("review_url", &self.review_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Checkout behaviour configuration.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutConfig {
    /// Currency used for displayed totals and payment amounts
    pub currency: CurrencyCode,
    /// Quiet period before an address edit triggers shipping recalculation
    pub address_debounce: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: CurrencyCode::USD,
            address_debounce: Duration::from_millis(500),
        }
    }
}

/// Payment provider configuration.
///
/// Each provider is optional; a missing provider leaves its gateway
/// unavailable at checkout.
#[derive(Debug, Clone, Default)]
pub struct PaymentsConfig {
    /// Card processor configuration
    pub stripe: Option<StripeConfig>,
    /// Wallet provider configuration
    pub paypal: Option<PayPalConfig>,
}

/// Card payment processor configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// API base URL
    pub api_base: String,
    /// Secret API key (server-side only)
    pub secret_key: SecretString,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Wallet provider configuration.
#[derive(Clone)]
pub struct PayPalConfig {
    /// API base URL
    pub api_base: String,
    /// OAuth client ID (public)
    pub client_id: String,
    /// OAuth client secret (server-side only)
    pub client_secret: SecretString,
}

impl std::fmt::Debug for PayPalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayPalConfig")
            .field("api_base", &self.api_base)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Klaviyo newsletter configuration.
#[derive(Clone)]
pub struct KlaviyoConfig {
    /// Private API key
    pub api_key: SecretString,
    /// List new subscribers are added to
    pub list_id: String,
}

impl std::fmt::Debug for KlaviyoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KlaviyoConfig")
            .field("api_key", &"[REDACTED]")
            .field("list_id", &self.list_id)
            .finish()
    }
}

/// GA4 Measurement Protocol configuration.
#[derive(Clone)]
pub struct AnalyticsConfig {
    /// GA4 measurement ID
    pub measurement_id: String,
    /// Measurement Protocol API secret
    pub api_secret: SecretString,
}

impl std::fmt::Debug for AnalyticsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsConfig")
            .field("measurement_id", &self.measurement_id)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Address lookup service configuration.
#[derive(Clone)]
pub struct AddressLookupConfig {
    /// Search endpoint; the query is passed as `q`
    pub url: String,
    /// Optional API key sent as `AUTH-KEY`
    pub api_key: Option<SecretString>,
}

impl std::fmt::Debug for AddressLookupConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressLookupConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("STOREFRONT_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_PORT".to_string(), e.to_string())
            })?;
        let base_url = required_url("STOREFRONT_BASE_URL")?;

        Ok(Self {
            host,
            port,
            base_url,
            commerce: CommerceConfig::from_env()?,
            checkout: CheckoutConfig::from_env()?,
            payments: PaymentsConfig::from_env()?,
            klaviyo: KlaviyoConfig::from_env()?,
            analytics: AnalyticsConfig::from_env()?,
            address_lookup: AddressLookupConfig::from_env(),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl CommerceConfig {
    /// Derive endpoint URLs from a site root.
    #[must_use]
    pub fn from_site_url(site_url: &str) -> Self {
        let site_url = trim_url(site_url);
        Self {
            graphql_url: format!("{site_url}/graphql"),
            review_url: format!("{site_url}/wp-comments-post.php"),
            site_url,
            api_token: None,
        }
    }

    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_site_url(&required_url("COMMERCE_SITE_URL")?);
        if let Some(token) = get_optional_env("COMMERCE_API_TOKEN") {
            validate_secret_strength(&token, "COMMERCE_API_TOKEN")?;
            config.api_token = Some(SecretString::from(token));
        }
        Ok(config)
    }
}

impl CheckoutConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let currency = get_env_or_default("STORE_CURRENCY", "USD")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("STORE_CURRENCY".to_string(), e))?;
        let debounce_ms = get_env_or_default("CHECKOUT_ADDRESS_DEBOUNCE_MS", "500")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar(
                    "CHECKOUT_ADDRESS_DEBOUNCE_MS".to_string(),
                    e.to_string(),
                )
            })?;

        Ok(Self {
            currency,
            address_debounce: Duration::from_millis(debounce_ms),
        })
    }
}

impl PaymentsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let stripe = match get_optional_env("STRIPE_SECRET_KEY") {
            Some(key) => {
                validate_secret_strength(&key, "STRIPE_SECRET_KEY")?;
                Some(StripeConfig {
                    api_base: trim_url(&get_env_or_default(
                        "STRIPE_API_BASE",
                        "https://api.stripe.com",
                    )),
                    secret_key: SecretString::from(key),
                })
            }
            None => None,
        };

        let paypal = match get_optional_env("PAYPAL_CLIENT_ID") {
            Some(client_id) => Some(PayPalConfig {
                api_base: trim_url(&get_env_or_default(
                    "PAYPAL_API_BASE",
                    "https://api-m.sandbox.paypal.com",
                )),
                client_id,
                client_secret: get_validated_secret("PAYPAL_CLIENT_SECRET")?,
            }),
            None => None,
        };

        Ok(Self { stripe, paypal })
    }
}

impl KlaviyoConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(api_key) = get_optional_env("KLAVIYO_API_KEY") else {
            return Ok(None);
        };
        validate_secret_strength(&api_key, "KLAVIYO_API_KEY")?;
        Ok(Some(Self {
            api_key: SecretString::from(api_key),
            list_id: get_required_env("KLAVIYO_LIST_ID")?,
        }))
    }
}

impl AnalyticsConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(measurement_id) = get_optional_env("GA4_MEASUREMENT_ID") else {
            return Ok(None);
        };
        Ok(Some(Self {
            measurement_id,
            api_secret: SecretString::from(get_required_env("GA4_API_SECRET")?),
        }))
    }
}

impl AddressLookupConfig {
    fn from_env() -> Option<Self> {
        get_optional_env("ADDRESS_LOOKUP_URL").map(|url| Self {
            url,
            api_key: get_optional_env("ADDRESS_LOOKUP_API_KEY").map(SecretString::from),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Strip trailing slashes so endpoint paths can be appended.
fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// A required absolute http(s) URL, without a trailing slash.
fn required_url(key: &str) -> Result<String, ConfigError> {
    let value = trim_url(&get_required_env(key)?);
    let parsed =
        Url::parse(&value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme {}", parsed.scheme()),
        ));
    }
    Ok(value)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the provider."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_placeholder_secret_rejected() {
        let err = validate_secret_strength("sk_test_your-key-here", "STRIPE_SECRET_KEY").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_low_entropy_secret_rejected() {
        assert!(validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "KLAVIYO_API_KEY").is_err());
    }

    #[test]
    fn test_provider_style_secret_accepted() {
        assert!(validate_secret_strength("sk_live_51Hq8ZkLm3Nx9PqRt7Vw2Yb", "STRIPE_SECRET_KEY").is_ok());
    }

    #[test]
    fn test_commerce_urls_derived_from_site() {
        let commerce = CommerceConfig::from_site_url("https://shop.test/ ");
        assert_eq!(commerce.site_url, "https://shop.test");
        assert_eq!(commerce.graphql_url, "https://shop.test/graphql");
        assert_eq!(commerce.review_url, "https://shop.test/wp-comments-post.php");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let stripe = StripeConfig {
            api_base: "https://api.stripe.com".to_string(),
            secret_key: SecretString::from("sk_live_super_secret_value"),
        };
        let paypal = PayPalConfig {
            api_base: "https://api-m.paypal.com".to_string(),
            client_id: "client_id_value".to_string(),
            client_secret: SecretString::from("paypal_super_secret_value"),
        };

        let debug_output = format!("{stripe:?} {paypal:?}");
        assert!(debug_output.contains("client_id_value"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret"));
    }

    #[test]
    fn test_socket_addr() {
        let config = StorefrontConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            commerce: CommerceConfig::from_site_url("http://localhost:8080"),
            checkout: CheckoutConfig::default(),
            payments: PaymentsConfig::default(),
            klaviyo: None,
            analytics: None,
            address_lookup: None,
            sentry_dsn: None,
            sentry_environment: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
        assert!(!config.is_secure());
    }
}
