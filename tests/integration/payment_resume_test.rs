//! Checkout session resume and supersede behavior: an open embedded session
//! is handed back to the client, anything stale is expired and replaced.

#[path = "../common/mod.rs"]
mod common;

use chrono::Utc;
use common::{gateway_config, pending_order, stack, StubProvider};
use printpay::core::AppError;
use printpay::gateways::{GatewayName, RouterOptions};
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

fn bulk_request(order_ids: &[&str]) -> InitializePaymentRequest {
    InitializePaymentRequest {
        order_id: None,
        order_ids: order_ids.iter().map(|s| s.to_string()).collect(),
        preferred_gateway: None,
        payment_method: None,
        country: None,
        amount: None,
        currency: None,
    }
}

#[tokio::test]
async fn test_open_embedded_session_is_resumed() {
    let razorpay = Arc::new(StubProvider::new(GatewayName::Razorpay));
    let stack = stack(
        vec![(gateway_config(GatewayName::Razorpay, 1), razorpay.clone())],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));

    let first = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();
    let second = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();

    assert!(!first.resumed);
    assert!(second.resumed);
    assert_eq!(second.transaction_id, first.transaction_id);
    assert_eq!(second.gateway_order_id, first.gateway_order_id);
    assert_eq!(second.amount, first.amount);
    assert_eq!(second.checkout_payload, first.checkout_payload);
    // the gateway was never asked for a second session
    assert_eq!(razorpay.initialize_calls.load(Ordering::SeqCst), 1);

    let txn = stack.transactions.get(&first.transaction_id).unwrap();
    assert_eq!(txn.status, TransactionStatus::Created);
}

#[tokio::test]
async fn test_redirect_session_is_replaced_not_resumed() {
    let payu = Arc::new(StubProvider::redirect(GatewayName::Payu));
    let stack = stack(
        vec![(gateway_config(GatewayName::Payu, 1), payu.clone())],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));

    let first = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();
    let second = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();

    // hosted redirect urls go stale; a fresh session is created every time
    assert!(!second.resumed);
    assert_ne!(second.transaction_id, first.transaction_id);
    assert_eq!(payu.initialize_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        stack.transactions.get(&first.transaction_id).unwrap().status,
        TransactionStatus::Expired
    );
    assert_eq!(
        stack.transactions.get(&second.transaction_id).unwrap().status,
        TransactionStatus::Created
    );
}

#[tokio::test]
async fn test_amount_change_supersedes_open_session() {
    let razorpay = Arc::new(StubProvider::new(GatewayName::Razorpay));
    let stack = stack(
        vec![(gateway_config(GatewayName::Razorpay, 1), razorpay.clone())],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));

    let first = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();

    // the order total changed while the session was open
    stack.orders.put(pending_order("ord-1", dec!(750)));

    let second = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();

    assert!(!second.resumed);
    assert_ne!(second.transaction_id, first.transaction_id);
    assert_eq!(second.amount, dec!(750));
    assert_eq!(razorpay.initialize_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        stack.transactions.get(&first.transaction_id).unwrap().status,
        TransactionStatus::Expired
    );
}

#[tokio::test]
async fn test_overdue_session_supersedes_instead_of_resuming() {
    let razorpay = Arc::new(StubProvider::new(GatewayName::Razorpay));
    let stack = stack(
        vec![(gateway_config(GatewayName::Razorpay, 1), razorpay.clone())],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));

    let first = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();

    let mut aged = stack.transactions.get(&first.transaction_id).unwrap();
    aged.expires_at = Some(Utc::now().naive_utc() - chrono::Duration::minutes(5));
    stack.transactions.put(aged);

    let second = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();

    assert!(!second.resumed);
    assert_ne!(second.transaction_id, first.transaction_id);
    assert_eq!(
        stack.transactions.get(&first.transaction_id).unwrap().status,
        TransactionStatus::Expired
    );
}

#[tokio::test]
async fn test_changed_order_set_supersedes_open_session() {
    let razorpay = Arc::new(StubProvider::new(GatewayName::Razorpay));
    let stack = stack(
        vec![(gateway_config(GatewayName::Razorpay, 1), razorpay.clone())],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));
    stack.orders.put(pending_order("ord-2", dec!(200)));

    let first = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap();

    // same primary order, but now paid together with a second one
    let second = stack
        .payments
        .initialize_payment(bulk_request(&["ord-1", "ord-2"]))
        .await
        .unwrap();

    assert!(!second.resumed);
    assert_eq!(second.amount, dec!(700));
    assert_eq!(
        stack.transactions.get(&first.transaction_id).unwrap().status,
        TransactionStatus::Expired
    );
}

#[tokio::test]
async fn test_bulk_payment_creates_one_transaction_for_all_orders() {
    let razorpay = Arc::new(StubProvider::new(GatewayName::Razorpay));
    let stack = stack(
        vec![(gateway_config(GatewayName::Razorpay, 1), razorpay.clone())],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-a", dec!(200)));
    stack.orders.put(pending_order("ord-b", dec!(300)));

    let response = stack
        .payments
        .initialize_payment(bulk_request(&["ord-a", "ord-b"]))
        .await
        .unwrap();

    assert_eq!(response.amount, dec!(500));

    let txn = stack.transactions.get(&response.transaction_id).unwrap();
    assert_eq!(
        txn.order_ids(),
        vec!["ord-a".to_string(), "ord-b".to_string()]
    );
    assert_eq!(stack.transactions.all().len(), 1);

    for id in ["ord-a", "ord-b"] {
        let order = stack.orders.get(id).unwrap();
        assert_eq!(order.payment_status, OrderPaymentStatus::Processing);
        assert_eq!(
            order.payment_transaction_id.as_deref(),
            Some(response.transaction_id.as_str())
        );
    }
}

#[tokio::test]
async fn test_already_paid_order_is_rejected() {
    let razorpay = Arc::new(StubProvider::new(GatewayName::Razorpay));
    let stack = stack(
        vec![(gateway_config(GatewayName::Razorpay, 1), razorpay.clone())],
        RouterOptions::default(),
    )
    .await;

    let mut paid = pending_order("ord-1", dec!(500));
    paid.payment_status = OrderPaymentStatus::Completed;
    stack.orders.put(paid);

    let err = stack
        .payments
        .initialize_payment(pay_request("ord-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)), "got {:?}", err);
    assert_eq!(razorpay.initialize_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_client_amount_mismatch_is_rejected() {
    let razorpay = Arc::new(StubProvider::new(GatewayName::Razorpay));
    let stack = stack(
        vec![(gateway_config(GatewayName::Razorpay, 1), razorpay.clone())],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));

    let mut request = pay_request("ord-1");
    request.amount = Some(dec!(450));

    let err = stack.payments.initialize_payment(request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {:?}", err);
    assert_eq!(razorpay.initialize_calls.load(Ordering::SeqCst), 0);
}
