//! Payment endpoints, address lookup, reviews and newsletter signup.

#![allow(clippy::unwrap_used)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use copperleaf_integration_tests::TestApp;
use serde_json::json;

fn multipart(fields: &[(&str, &str)]) -> Request<Body> {
    let boundary = "copperleaf-test-boundary";
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));

    Request::builder()
        .method(Method::POST)
        .uri("/api/reviews")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_create_and_update_payment_intent() {
    let mut app = TestApp::new();
    let response = app
        .post("/api/payments/intents", json!({ "amount": "59.99" }))
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    let intent = response.json();
    assert_eq!(intent["amount"], 5999);
    assert_eq!(intent["currency"], "usd");
    assert_eq!(intent["status"], "requires_payment_method");
    let id = intent["id"].as_str().unwrap().to_string();
    assert_eq!(intent["client_secret"], format!("{id}_secret"));

    let response = app
        .post(
            &format!("/api/payments/intents/{id}"),
            json!({ "amount": "54.99" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["amount"], 5499);
}

#[tokio::test]
async fn test_non_positive_amount_is_rejected() {
    let mut app = TestApp::new();
    let response = app
        .post("/api/payments/intents", json!({ "amount": "0" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "Amount must be greater than zero.");
}

#[tokio::test]
async fn test_wallet_order_is_created() {
    let mut app = TestApp::new();
    let response = app
        .post("/api/payments/wallet/orders", json!({ "amount": "59.99" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.json()["id"].as_str().unwrap().starts_with("WALLET_"));
}

#[tokio::test]
async fn test_address_lookup_without_provider_is_empty() {
    let mut app = TestApp::new();
    let response = app.get("/api/address-lookup?q=Richmond").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!([]));
}

#[tokio::test]
async fn test_incomplete_review_is_rejected() {
    let mut app = TestApp::new();
    let response = app
        .send(multipart(&[
            ("comment_post_ID", "103"),
            ("comment", "Pours beautifully."),
            ("rating", "5"),
        ]))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["error"], "Please enter your name.");
}

#[tokio::test]
async fn test_newsletter_validation_and_availability() {
    let mut app = TestApp::new();
    let response = app
        .post("/api/newsletter", json!({ "email": "not-an-email" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "Please enter a valid email address.");

    let response = app
        .post("/api/newsletter", json!({ "email": "ada@example.com" }))
        .await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_form_endpoints_are_rate_limited() {
    let mut app = TestApp::new();
    let mut statuses = Vec::new();
    for _ in 0..6 {
        let response = app
            .post("/api/newsletter", json!({ "email": "not-an-email" }))
            .await;
        statuses.push(response.status);
    }
    assert!(
        statuses
            .iter()
            .take(5)
            .all(|s| *s == StatusCode::BAD_REQUEST)
    );
    assert_eq!(statuses.last(), Some(&StatusCode::TOO_MANY_REQUESTS));

    // Other endpoints are not limited.
    let response = app.get("/api/cart").await;
    assert_eq!(response.status, StatusCode::OK);
}
