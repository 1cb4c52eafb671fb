//! Off-site card payments: redirect out, verify on return.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use copperleaf_core::PaymentStatus;
use copperleaf_integration_tests::TestApp;
use copperleaf_storefront::payments::memory::CardBehavior;
use serde_json::json;

/// Place a card order that needs off-site authentication; returns the
/// payment intent id.
async fn redirected(app: &mut TestApp) -> String {
    app.payments
        .set_card_behavior(CardBehavior::RequireAction)
        .await;
    app.ready_checkout("stripe").await;

    let response = app
        .post(
            "/api/checkout/place-order",
            json!({ "payment_token": "pm_card_threeds" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    let placed = response.json();
    assert_eq!(placed["status"], "redirect");
    let url = placed["redirect_url"].as_str().unwrap();
    url.rsplit('/').next().unwrap().to_string()
}

#[tokio::test]
async fn test_redirect_keeps_cart_until_verified() {
    let mut app = TestApp::new();
    redirected(&mut app).await;

    let cart = app.get("/api/cart").await.json();
    assert_eq!(cart["item_count"], 1);
    assert_eq!(app.backend.call_count("finalize_order").await, 0);
}

#[tokio::test]
async fn test_succeeded_payment_redirects_to_receipt_once() {
    let mut app = TestApp::new();
    let intent = redirected(&mut app).await;
    app.payments
        .set_intent_status(&intent, PaymentStatus::Succeeded)
        .await;

    let uri = format!("/checkout/confirm?payment_intent={intent}&redirect_status=succeeded");
    let response = app.get(&uri).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    let receipt_url = response.location().unwrap().to_string();
    assert!(receipt_url.starts_with("/orders/"));

    let cart = app.get("/api/cart").await.json();
    assert_eq!(cart["item_count"], 0);
    let empty_calls = app.backend.call_count("empty_cart").await;

    // Reloading the confirmation page neither finalizes nor clears again.
    let again = app.get(&uri).await;
    assert_eq!(again.status, StatusCode::SEE_OTHER);
    assert_eq!(again.location(), Some(receipt_url.as_str()));
    assert_eq!(app.backend.call_count("finalize_order").await, 1);
    assert_eq!(app.backend.call_count("empty_cart").await, empty_calls);

    let receipt = app.get(&receipt_url).await;
    assert_eq!(receipt.status, StatusCode::OK);
    assert!(receipt.text().contains("Processing"));
}

#[tokio::test]
async fn test_abandoned_payment_renders_failure_and_keeps_cart() {
    let mut app = TestApp::new();
    let intent = redirected(&mut app).await;
    app.payments
        .set_intent_status(&intent, PaymentStatus::Canceled)
        .await;

    let response = app
        .get(&format!("/checkout/confirm?payment_intent={intent}"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text().contains("Your payment was not completed."));

    let cart = app.get("/api/cart").await.json();
    assert_eq!(cart["item_count"], 1);
    let state = app.get("/api/checkout").await.json();
    assert_eq!(state["phase"], "ready");
}

#[tokio::test]
async fn test_confirmation_for_another_shopper_is_refused() {
    let mut owner = TestApp::new();
    let intent = redirected(&mut owner).await;
    owner
        .payments
        .set_intent_status(&intent, PaymentStatus::Succeeded)
        .await;

    let mut stranger = owner.another_browser();
    let response = stranger
        .get(&format!("/checkout/confirm?payment_intent={intent}"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text().contains("find that payment."));
}
