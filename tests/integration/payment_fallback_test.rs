//! Router fallback and health-tripping behavior, exercised through the
//! payment service with scriptable gateway stubs.

#[path = "../common/mod.rs"]
mod common;

use common::{gateway_config, pending_order, stack, StubProvider};
use printpay::core::AppError;
use printpay::gateways::{GatewayName, RouterOptions, RoutingStrategy};
use printpay::orders::OrderPaymentStatus;
use printpay::transactions::{InitializePaymentRequest, TransactionStatus};
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn pay_request(order_id: &str) -> InitializePaymentRequest {
    InitializePaymentRequest {
        order_id: Some(order_id.to_string()),
        order_ids: vec![],
        preferred_gateway: None,
        payment_method: None,
        country: None,
        amount: None,
        currency: None,
    }
}

#[tokio::test]
async fn test_transient_failure_falls_back_to_next_priority() {
    let razorpay = Arc::new(StubProvider::failing(GatewayName::Razorpay));
    let stripe = Arc::new(StubProvider::new(GatewayName::Stripe));
    let stack = stack(
        vec![
            (gateway_config(GatewayName::Razorpay, 1), razorpay.clone()),
            (gateway_config(GatewayName::Stripe, 2), stripe.clone()),
        ],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));

    let response = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();

    assert_eq!(response.gateway, GatewayName::Stripe);
    assert!(!response.resumed);
    // priority 1 was tried first and failed over
    assert_eq!(razorpay.initialize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stripe.initialize_calls.load(Ordering::SeqCst), 1);

    let txn = stack.transactions.get(&response.transaction_id).unwrap();
    assert_eq!(txn.gateway, GatewayName::Stripe);
    assert_eq!(txn.status, TransactionStatus::Created);

    let order = stack.orders.get("ord-1").unwrap();
    assert_eq!(order.payment_status, OrderPaymentStatus::Processing);
    assert_eq!(order.payment_gateway, Some(GatewayName::Stripe));
    assert_eq!(
        order.payment_transaction_id.as_deref(),
        Some(response.transaction_id.as_str())
    );
}

#[tokio::test]
async fn test_every_gateway_failing_surfaces_gateway_error() {
    let razorpay = Arc::new(StubProvider::failing(GatewayName::Razorpay));
    let stripe = Arc::new(StubProvider::failing(GatewayName::Stripe));
    let stack = stack(
        vec![
            (gateway_config(GatewayName::Razorpay, 1), razorpay.clone()),
            (gateway_config(GatewayName::Stripe, 2), stripe.clone()),
        ],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));

    let err = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Gateway(_)), "got {:?}", err);
    assert_eq!(razorpay.initialize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stripe.initialize_calls.load(Ordering::SeqCst), 1);
    // nothing was written: the order is untouched and no ledger row exists
    assert_eq!(
        stack.orders.get("ord-1").unwrap().payment_status,
        OrderPaymentStatus::Pending
    );
    assert!(stack.transactions.all().is_empty());
}

#[tokio::test]
async fn test_failure_rate_trips_gateway_out_of_rotation() {
    let razorpay = Arc::new(StubProvider::failing(GatewayName::Razorpay));
    let stack = stack(
        vec![(gateway_config(GatewayName::Razorpay, 1), razorpay.clone())],
        RouterOptions {
            strategy: RoutingStrategy::Priority,
            failure_rate_threshold: 0.30,
            health_min_attempts: 5,
            health_cooldown: chrono::Duration::minutes(10),
        },
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));

    // below the minimum attempt count the gateway keeps being tried
    for _ in 0..5 {
        let err = stack
            .payments
            .initialize_payment(pay_request("ord-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Gateway(_)));
    }
    assert_eq!(razorpay.initialize_calls.load(Ordering::SeqCst), 5);

    // the fifth failure crossed the threshold and tripped the breaker
    let row = stack.registry.get(GatewayName::Razorpay).unwrap();
    assert!(!row.is_healthy);
    assert!(row.unhealthy_until.is_some());
    assert_eq!(row.failure_count, 1);

    // out of rotation: the next request finds no candidate and the
    // adapter is not called again
    let err = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::GatewayConfig(_)), "got {:?}", err);
    assert_eq!(razorpay.initialize_calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_success_after_cooldown_restores_health() {
    let razorpay = Arc::new(StubProvider::failing(GatewayName::Razorpay));
    let stack = stack(
        vec![(gateway_config(GatewayName::Razorpay, 1), razorpay.clone())],
        RouterOptions {
            strategy: RoutingStrategy::Priority,
            failure_rate_threshold: 0.30,
            health_min_attempts: 5,
            // zero cooldown: the trip expires immediately, modeling a
            // gateway whose cooldown window has already passed
            health_cooldown: chrono::Duration::zero(),
        },
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));

    for _ in 0..5 {
        assert!(stack
            .payments
            .initialize_payment(pay_request("ord-1"))
            .await
            .is_err());
    }
    assert!(!stack.registry.get(GatewayName::Razorpay).unwrap().is_healthy);

    // gateway recovers; the next attempt re-enters rotation and succeeds
    razorpay.fail_initialize.store(false, Ordering::SeqCst);
    let response = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();
    assert_eq!(response.gateway, GatewayName::Razorpay);

    let row = stack.registry.get(GatewayName::Razorpay).unwrap();
    assert!(row.is_healthy);
    assert!(row.unhealthy_until.is_none());
    assert_eq!(row.failure_count, 0);
}

#[tokio::test]
async fn test_currency_support_filters_candidates() {
    let razorpay = Arc::new(StubProvider::new(GatewayName::Razorpay));
    let stripe = Arc::new(StubProvider::new(GatewayName::Stripe));

    let mut inr_only = gateway_config(GatewayName::Razorpay, 1);
    inr_only.supported_currencies = vec!["USD".to_string()];

    let stack = stack(
        vec![
            (inr_only, razorpay.clone()),
            (gateway_config(GatewayName::Stripe, 2), stripe.clone()),
        ],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));

    let response = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();

    // the INR order never reaches the USD-only gateway
    assert_eq!(response.gateway, GatewayName::Stripe);
    assert_eq!(razorpay.initialize_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_preferred_gateway_jumps_the_queue() {
    let stripe = Arc::new(StubProvider::new(GatewayName::Stripe));
    let payu = Arc::new(StubProvider::redirect(GatewayName::Payu));
    let stack = stack(
        vec![
            (gateway_config(GatewayName::Stripe, 1), stripe.clone()),
            (gateway_config(GatewayName::Payu, 9), payu.clone()),
        ],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));

    let mut request = pay_request("ord-1");
    request.preferred_gateway = Some("payu".to_string());

    let response = stack.payments.initialize_payment(request).await.unwrap();
    assert_eq!(response.gateway, GatewayName::Payu);
    assert!(response.redirect_required);
    assert!(response.checkout_url.is_some());
    assert_eq!(stripe.initialize_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_amount_cap_excludes_gateway() {
    let razorpay = Arc::new(StubProvider::new(GatewayName::Razorpay));
    let stripe = Arc::new(StubProvider::new(GatewayName::Stripe));

    let mut capped = gateway_config(GatewayName::Razorpay, 1);
    capped.max_amount = dec!(100);

    let stack = stack(
        vec![
            (capped, razorpay.clone()),
            (gateway_config(GatewayName::Stripe, 2), stripe.clone()),
        ],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));

    let response = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();

    assert_eq!(response.gateway, GatewayName::Stripe);
    assert_eq!(razorpay.initialize_calls.load(Ordering::SeqCst), 0);
}
