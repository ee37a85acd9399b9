//! Duplicate webhook deliveries must collapse to one ledger transition and
//! one completion event, no matter how they arrive.

#[path = "../common/mod.rs"]
mod common;

use common::{created_transaction, gateway_config, pending_order, stack, StubProvider, TestStack};
use printpay::gateways::{GatewayName, RouterOptions};
use printpay::orders::OrderPaymentStatus;
use printpay::transactions::TransactionStatus;
use printpay::webhooks::{WebhookDelivery, WebhookOutcome, WebhookStatus};
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn captured_delivery(event_id: Option<&str>, gateway_order_id: &str) -> WebhookDelivery {
    let body = json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_123",
            "order_id": gateway_order_id,
            "status": "captured",
            "method": "upi",
            "upi": { "vpa": "asha@upi" },
            "created_at": 1_755_900_000,
        } } },
    });

    let mut headers = HashMap::new();
    headers.insert("x-razorpay-signature".to_string(), "sig".to_string());
    headers.insert("content-type".to_string(), "application/json".to_string());
    if let Some(id) = event_id {
        headers.insert("x-razorpay-event-id".to_string(), id.to_string());
    }

    WebhookDelivery {
        raw_body: body.to_string(),
        headers,
        source_ip: Some("203.0.113.7".to_string()),
    }
}

async fn razorpay_stack() -> TestStack {
    let razorpay = Arc::new(StubProvider::new(GatewayName::Razorpay));
    let stack = stack(
        vec![(gateway_config(GatewayName::Razorpay, 1), razorpay)],
        RouterOptions::default(),
    )
    .await;
    stack.orders.put(pending_order("ord-1", dec!(500)));
    stack.transactions.put(created_transaction(
        "txn-1",
        "ord-1",
        GatewayName::Razorpay,
        "order_abc",
        dec!(500),
    ));
    stack
}

#[tokio::test]
async fn test_second_delivery_of_same_event_is_duplicate() {
    let stack = razorpay_stack().await;

    let first = stack
        .ingestor
        .process(captured_delivery(Some("evt_1"), "order_abc"))
        .await
        .unwrap();
    let first_record_id = match first {
        WebhookOutcome::Processed {
            record_id,
            transaction_id,
            transitioned,
            ..
        } => {
            assert!(transitioned);
            assert_eq!(transaction_id, "txn-1");
            record_id
        }
        other => panic!("expected processed, got {:?}", other),
    };

    let second = stack
        .ingestor
        .process(captured_delivery(Some("evt_1"), "order_abc"))
        .await
        .unwrap();
    match second {
        WebhookOutcome::Duplicate { event_id, .. } => assert_eq!(event_id, "evt_1"),
        other => panic!("expected duplicate, got {:?}", other),
    }

    // one transition, one completion event, and the claim stays with the
    // record that won it
    assert_eq!(
        stack.transactions.get("txn-1").unwrap().status,
        TransactionStatus::Success
    );
    assert_eq!(
        stack.orders.get("ord-1").unwrap().payment_status,
        OrderPaymentStatus::Completed
    );
    assert_eq!(stack.hook.events().len(), 1);
    assert_eq!(
        stack.webhooks.claim_holder(GatewayName::Razorpay, "evt_1"),
        Some(first_record_id)
    );

    // both deliveries are audited
    let records = stack.webhooks.all();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .any(|r| r.status == WebhookStatus::Processed));
    assert!(records
        .iter()
        .any(|r| r.status == WebhookStatus::Duplicate));
}

#[tokio::test]
async fn test_concurrent_deliveries_yield_one_processing_attempt() {
    let stack = razorpay_stack().await;
    let delivery = captured_delivery(Some("evt_race"), "order_abc");

    let (a, b) = tokio::join!(
        stack.ingestor.process(delivery.clone()),
        stack.ingestor.process(delivery.clone()),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let processed = [&a, &b]
        .iter()
        .filter(|o| matches!(o, WebhookOutcome::Processed { .. }))
        .count();
    let duplicates = [&a, &b]
        .iter()
        .filter(|o| matches!(o, WebhookOutcome::Duplicate { .. }))
        .count();
    assert_eq!(processed, 1, "outcomes: {:?} / {:?}", a, b);
    assert_eq!(duplicates, 1, "outcomes: {:?} / {:?}", a, b);
    assert_eq!(stack.hook.events().len(), 1);
}

#[tokio::test]
async fn test_new_event_for_settled_payment_does_not_transition_again() {
    let stack = razorpay_stack().await;

    stack
        .ingestor
        .process(captured_delivery(Some("evt_1"), "order_abc"))
        .await
        .unwrap();

    // Razorpay fires payment.captured and order.paid with distinct event ids;
    // the second passes dedup but the ledger transition is already won
    let outcome = stack
        .ingestor
        .process(captured_delivery(Some("evt_2"), "order_abc"))
        .await
        .unwrap();
    match outcome {
        WebhookOutcome::Processed { transitioned, .. } => assert!(!transitioned),
        other => panic!("expected processed, got {:?}", other),
    }

    assert_eq!(stack.hook.events().len(), 1);
    assert_eq!(
        stack.orders.get("ord-1").unwrap().payment_status,
        OrderPaymentStatus::Completed
    );
}

#[tokio::test]
async fn test_delivery_without_event_id_skips_dedup() {
    let stack = razorpay_stack().await;

    let first = stack
        .ingestor
        .process(captured_delivery(None, "order_abc"))
        .await
        .unwrap();
    let second = stack
        .ingestor
        .process(captured_delivery(None, "order_abc"))
        .await
        .unwrap();

    // without an event id both dispatch; the conditional ledger update is
    // the only idempotency left
    match (first, second) {
        (
            WebhookOutcome::Processed {
                transitioned: first_won,
                ..
            },
            WebhookOutcome::Processed {
                transitioned: second_won,
                ..
            },
        ) => {
            assert!(first_won);
            assert!(!second_won);
        }
        other => panic!("expected two processed outcomes, got {:?}", other),
    }
    assert_eq!(stack.webhooks.claim_count(), 0);
    assert_eq!(stack.hook.events().len(), 1);
}
