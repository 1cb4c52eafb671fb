//! Checkout through the HTTP API: totals, coupons, validation and orders.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use copperleaf_integration_tests::{KYUSU, TestApp};
use serde_json::json;

#[tokio::test]
async fn test_empty_cart_checkout_redirects_to_cart() {
    let mut app = TestApp::new();
    let response = app.get("/checkout").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/cart"));
}

#[tokio::test]
async fn test_checkout_page_renders_state() {
    let mut app = TestApp::new();
    app.post("/api/cart/items", json!({ "product_id": KYUSU }))
        .await;

    let page = app.get("/checkout").await;
    assert_eq!(page.status, StatusCode::OK);
    let html = page.text();
    assert!(html.contains("Flat rate"));
    assert!(html.contains("$59.99"));
    assert!(html.contains(r#"id="checkout-state""#));
}

#[tokio::test]
async fn test_checkout_view_totals_with_default_rate() {
    let mut app = TestApp::new();
    app.post("/api/cart/items", json!({ "product_id": KYUSU }))
        .await;

    let state = app.get("/api/checkout").await.json();
    assert_eq!(state["phase"], "ready");
    assert_eq!(state["selected_rate"], "flat_rate:1");
    assert_eq!(state["displayed_total"], "$59.99");

    let state = app
        .post("/api/checkout/shipping-rate", json!({ "rate_id": "local_pickup:2" }))
        .await
        .json();
    assert_eq!(state["displayed_total"], "$49.99");
}

#[tokio::test]
async fn test_coupon_apply_and_remove_restore_totals() {
    let mut app = TestApp::new();
    app.post("/api/cart/items", json!({ "product_id": KYUSU }))
        .await;
    app.get("/api/checkout").await;

    let response = app
        .post("/api/checkout/coupons", json!({ "code": "welcome10" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let state = response.json();
    assert_eq!(state["displayed_total"], "$54.99");
    assert_eq!(state["notifications"][0]["message"], r#"Coupon "welcome10" applied."#);

    let state = app.delete("/api/checkout/coupons/welcome10").await.json();
    assert_eq!(state["displayed_total"], "$59.99");
    assert!(state["applied_coupons"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_coupon_message_is_verbatim() {
    let mut app = TestApp::new();
    app.post("/api/cart/items", json!({ "product_id": KYUSU }))
        .await;
    app.get("/api/checkout").await;

    let response = app
        .post("/api/checkout/coupons", json!({ "code": "bogus" }))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["error"], r#"Coupon "bogus" does not exist!"#);

    // The error was reported once; the next view carries no stale copy.
    let state = app.get("/api/checkout").await.json();
    assert!(state["notifications"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_incomplete_order_is_refused_without_backend_call() {
    let mut app = TestApp::new();
    app.post("/api/cart/items", json!({ "product_id": KYUSU }))
        .await;
    app.get("/api/checkout").await;

    let response = app.post("/api/checkout/place-order", json!({})).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.json()["error"],
        "Please enter your billing first name."
    );
    assert_eq!(app.backend.call_count("create_order").await, 0);
}

#[tokio::test]
async fn test_unoffered_payment_method_is_refused() {
    let mut app = TestApp::new();
    app.post("/api/cart/items", json!({ "product_id": KYUSU }))
        .await;
    app.get("/api/checkout").await;

    let response = app
        .post("/api/checkout/payment-method", json!({ "gateway_id": "bitcoin" }))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["error"], "That payment method is not available.");
}

#[tokio::test]
async fn test_offline_order_and_receipt() {
    let mut app = TestApp::new();
    app.ready_checkout("cod").await;

    let response = app.post("/api/checkout/place-order", json!({})).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    let placed = response.json();
    assert_eq!(placed["status"], "completed");
    let receipt_url = placed["receipt_url"].as_str().unwrap().to_string();
    let order_id = placed["order_id"].as_i64().unwrap();

    let cart = app.get("/api/cart").await.json();
    assert_eq!(cart["item_count"], 0);

    let receipt = app.get(&receipt_url).await;
    assert_eq!(receipt.status, StatusCode::OK);
    let html = receipt.text();
    assert!(html.contains("Tokoname Kyusu"));
    assert!(html.contains("$59.99"));
    assert!(html.contains("Pending payment"));

    let key = receipt_url.split("key=").nth(1).unwrap();
    let order = app
        .get(&format!("/api/orders/{order_id}?key={key}"))
        .await;
    assert_eq!(order.status, StatusCode::OK);
    assert_eq!(order.json()["total"], "$59.99");
}

#[tokio::test]
async fn test_order_lookup_with_wrong_key_is_forbidden() {
    let mut app = TestApp::new();
    app.ready_checkout("cod").await;
    let placed = app
        .post("/api/checkout/place-order", json!({}))
        .await
        .json();
    let order_id = placed["order_id"].as_i64().unwrap();

    let response = app
        .get(&format!("/api/orders/{order_id}?key=wc_order_guess"))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let page = app.get(&format!("/orders/{order_id}?key=wc_order_guess")).await;
    assert_eq!(page.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_card_order_is_paid_at_creation() {
    let mut app = TestApp::new();
    app.ready_checkout("stripe").await;

    let placed = app
        .post(
            "/api/checkout/place-order",
            json!({ "payment_token": "pm_card_visa" }),
        )
        .await
        .json();
    assert_eq!(placed["status"], "completed");

    let order_id = placed["order_id"].as_i64().unwrap();
    let order = app
        .backend
        .stored_order(copperleaf_core::OrderId::new(order_id))
        .await
        .unwrap();
    assert_eq!(order.status, copperleaf_core::OrderStatus::Processing);
}

#[tokio::test]
async fn test_card_order_without_token_is_refused() {
    let mut app = TestApp::new();
    app.ready_checkout("stripe").await;

    let response = app.post("/api/checkout/place-order", json!({})).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["error"], "Please enter your payment details.");
    assert_eq!(app.backend.call_count("create_order").await, 0);

    // Checkout is usable again after the failure.
    let state = app.get("/api/checkout").await.json();
    assert_eq!(state["phase"], "ready");
}

async fn approved_wallet_order(app: &mut TestApp, amount: &str) -> String {
    let response = app
        .post("/api/payments/wallet/orders", json!({ "amount": amount }))
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    let order = response.json()["id"].as_str().unwrap().to_string();
    app.payments.approve(&order).await;
    order
}

#[tokio::test]
async fn test_wallet_order_for_the_total_is_captured() {
    let mut app = TestApp::new();
    app.ready_checkout("ppcp-gateway").await;
    let wallet_order = approved_wallet_order(&mut app, "59.99").await;

    let placed = app
        .post(
            "/api/checkout/place-order",
            json!({ "wallet_order_id": wallet_order }),
        )
        .await;
    assert_eq!(placed.status, StatusCode::OK, "{}", placed.text());
    assert_eq!(placed.json()["status"], "completed");
    assert_eq!(app.payments.wallet_captures().await, 1);
}

#[tokio::test]
async fn test_wallet_order_for_another_amount_is_declined() {
    let mut app = TestApp::new();
    app.ready_checkout("ppcp-gateway").await;
    let wallet_order = approved_wallet_order(&mut app, "0.01").await;

    let response = app
        .post(
            "/api/checkout/place-order",
            json!({ "wallet_order_id": wallet_order }),
        )
        .await;
    assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(app.payments.wallet_captures().await, 0);
    assert_eq!(app.backend.call_count("create_order").await, 0);

    let state = app.get("/api/checkout").await.json();
    assert_eq!(state["phase"], "ready");
}
