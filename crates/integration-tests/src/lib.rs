//! Integration tests for the Copperleaf storefront.
//!
//! The full router (sessions, shopper binding, rate limiting, templates) is
//! driven in-process with `tower::ServiceExt::oneshot`, against the
//! in-memory commerce backend and payment provider.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p copperleaf-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use copperleaf_core::CurrencyCode;
use copperleaf_storefront::commerce::InMemoryCommerce;
use copperleaf_storefront::config::{
    CheckoutConfig, CommerceConfig, PaymentsConfig, StorefrontConfig,
};
use copperleaf_storefront::payments::{InMemoryPayments, PaymentIntents, WalletOrders};
use copperleaf_storefront::services::NoopAnalytics;
use copperleaf_storefront::state::{AppState, Providers};
use serde_json::Value;
use tower::ServiceExt;

/// Product id of the sample catalog's $49.99 teapot.
pub const KYUSU: i64 = 103;

/// Address the test browser appears to come from.
pub const CLIENT_IP: &str = "203.0.113.9";

/// Configuration with every optional integration switched off.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        host: [127, 0, 0, 1].into(),
        port: 0,
        base_url: "http://localhost:3000".to_string(),
        commerce: CommerceConfig::from_site_url("http://commerce.invalid"),
        checkout: CheckoutConfig::default(),
        payments: PaymentsConfig::default(),
        klaviyo: None,
        analytics: None,
        address_lookup: None,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// One browser talking to the storefront: cookies persist across requests.
pub struct TestApp {
    router: Router,
    pub backend: InMemoryCommerce,
    pub payments: Arc<InMemoryPayments>,
    cookie: Option<String>,
}

/// A buffered response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

impl TestApp {
    /// Storefront over the sample catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    #[must_use]
    pub fn with_config(config: StorefrontConfig) -> Self {
        let backend = InMemoryCommerce::with_sample_catalog(CurrencyCode::USD);
        let payments = Arc::new(InMemoryPayments::new());
        let providers = Providers {
            backend: Arc::new(backend.clone()),
            intents: Some(Arc::clone(&payments) as Arc<dyn PaymentIntents>),
            wallet: Some(Arc::clone(&payments) as Arc<dyn WalletOrders>),
            analytics: Arc::new(NoopAnalytics),
        };
        let state = AppState::with_providers(config, providers).unwrap();

        Self {
            router: copperleaf_storefront::app(state),
            backend,
            payments,
            cookie: None,
        }
    }

    /// A second browser on the same storefront, without cookies.
    #[must_use]
    pub fn another_browser(&self) -> Self {
        Self {
            router: self.router.clone(),
            backend: self.backend.clone(),
            payments: Arc::clone(&self.payments),
            cookie: None,
        }
    }

    /// Send a request as this browser.
    pub async fn request(&mut self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    /// Send a prepared request, attaching the session cookie and a client
    /// address for the rate limiter.
    pub async fn send(&mut self, mut request: Request<Body>) -> TestResponse {
        let headers = request.headers_mut();
        if let Some(cookie) = &self.cookie {
            headers.insert(header::COOKIE, cookie.parse().unwrap());
        }
        if !headers.contains_key("x-forwarded-for") {
            headers.insert("x-forwarded-for", CLIENT_IP.parse().unwrap());
        }
        let response = self.router.clone().oneshot(request).await.unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            self.cookie = Some(pair.to_string());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&mut self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn patch(&mut self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::PATCH, uri, Some(body)).await
    }

    pub async fn delete(&mut self, uri: &str) -> TestResponse {
        self.request(Method::DELETE, uri, None).await
    }

    /// Put a kyusu in the cart and open checkout with complete billing
    /// details and `gateway_id` selected.
    pub async fn ready_checkout(&mut self, gateway_id: &str) -> Value {
        let response = self
            .post("/api/cart/items", serde_json::json!({ "product_id": KYUSU }))
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());

        let response = self.get("/api/checkout").await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());

        let response = self
            .post(
                "/api/checkout/address",
                serde_json::json!({
                    "billing": {
                        "first_name": "Ada",
                        "last_name": "Lovelace",
                        "email": "ada@example.com"
                    }
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());

        let response = self
            .post(
                "/api/checkout/payment-method",
                serde_json::json!({ "gateway_id": gateway_id }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());
        response.json()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
