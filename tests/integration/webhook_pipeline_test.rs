//! End-to-end webhook pipeline: identify, audit, claim, verify, interpret,
//! dispatch, and the replay path for failed records.

#[path = "../common/mod.rs"]
mod common;

use common::{created_transaction, gateway_config, pending_order, stack, StubProvider, TestStack};
use printpay::core::AppError;
use printpay::gateways::{GatewayName, RouterOptions};
use printpay::orders::OrderPaymentStatus;
use printpay::transactions::TransactionStatus;
use printpay::webhooks::{WebhookDelivery, WebhookOutcome, WebhookStatus};
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn delivery(event_id: &str, body: serde_json::Value) -> WebhookDelivery {
    let mut headers = HashMap::new();
    headers.insert("x-razorpay-signature".to_string(), "sig".to_string());
    headers.insert("x-razorpay-event-id".to_string(), event_id.to_string());
    headers.insert("content-type".to_string(), "application/json".to_string());
    headers.insert("authorization".to_string(), "Basic c2VjcmV0".to_string());

    WebhookDelivery {
        raw_body: body.to_string(),
        headers,
        source_ip: Some("203.0.113.7".to_string()),
    }
}

fn captured_body(gateway_order_id: &str) -> serde_json::Value {
    json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_123",
            "order_id": gateway_order_id,
            "status": "captured",
            "method": "upi",
            "upi": { "vpa": "asha@upi" },
            "created_at": 1_755_900_000,
        } } },
    })
}

async fn razorpay_stack() -> (TestStack, Arc<StubProvider>) {
    let razorpay = Arc::new(StubProvider::new(GatewayName::Razorpay));
    let stack = stack(
        vec![(gateway_config(GatewayName::Razorpay, 1), razorpay.clone())],
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
    (stack, razorpay)
}

#[tokio::test]
async fn test_captured_event_settles_payment_end_to_end() {
    let (stack, _) = razorpay_stack().await;

    let outcome = stack
        .ingestor
        .process(delivery("evt_1", captured_body("order_abc")))
        .await
        .unwrap();

    let record_id = match &outcome {
        WebhookOutcome::Processed {
            record_id,
            gateway,
            transaction_id,
            transitioned,
        } => {
            assert_eq!(*gateway, GatewayName::Razorpay);
            assert_eq!(transaction_id, "txn-1");
            assert!(*transitioned);
            record_id.clone()
        }
        other => panic!("expected processed, got {:?}", other),
    };

    let record = stack.webhooks.get(&record_id).unwrap();
    assert_eq!(record.status, WebhookStatus::Processed);
    assert!(record.verified);
    assert_eq!(record.gateway, Some(GatewayName::Razorpay));
    assert_eq!(record.event_type.as_deref(), Some("payment.captured"));
    assert_eq!(record.event_id.as_deref(), Some("evt_1"));
    assert_eq!(record.transaction_id.as_deref(), Some("txn-1"));
    assert_eq!(record.order_id.as_deref(), Some("ord-1"));
    assert_eq!(record.signature.as_deref(), Some("sig"));
    assert!(record.processed_at.is_some());
    // credentials never reach the audit row
    assert!(record.headers.get("authorization").is_none());
    assert!(record.headers.get("x-razorpay-signature").is_some());
    assert_eq!(
        stack.webhooks.claim_holder(GatewayName::Razorpay, "evt_1"),
        Some(record_id)
    );

    let txn = stack.transactions.get("txn-1").unwrap();
    assert_eq!(txn.status, TransactionStatus::Success);
    assert_eq!(txn.gateway_payment_id.as_deref(), Some("pay_123"));
    assert_eq!(txn.payment_method.as_deref(), Some("upi"));
    assert!(txn.captured_at.is_some());

    let order = stack.orders.get("ord-1").unwrap();
    assert_eq!(order.payment_status, OrderPaymentStatus::Completed);
    assert!(order.paid_at.is_some());

    let events = stack.hook.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].order_id, "ord-1");
    assert_eq!(events[0].amount, dec!(500));

    let body = outcome.http_body();
    assert_eq!(body["received"], json!(true));
    assert_eq!(body["status"], json!("processed"));
}

#[tokio::test]
async fn test_invalid_signature_releases_claim_for_authentic_delivery() {
    let (stack, razorpay) = razorpay_stack().await;
    razorpay.accept_signature.store(false, Ordering::SeqCst);

    let outcome = stack
        .ingestor
        .process(delivery("evt_1", captured_body("order_abc")))
        .await
        .unwrap();

    let record_id = match outcome {
        WebhookOutcome::InvalidSignature { record_id, gateway } => {
            assert_eq!(gateway, GatewayName::Razorpay);
            record_id
        }
        other => panic!("expected invalid signature, got {:?}", other),
    };

    let record = stack.webhooks.get(&record_id).unwrap();
    assert_eq!(record.status, WebhookStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("invalid signature"));
    assert!(!record.verified);
    // the forged delivery gave its claim back
    assert_eq!(
        stack.webhooks.claim_holder(GatewayName::Razorpay, "evt_1"),
        None
    );
    assert_eq!(
        stack.transactions.get("txn-1").unwrap().status,
        TransactionStatus::Created
    );

    // the authentic delivery with the same event id still goes through
    razorpay.accept_signature.store(true, Ordering::SeqCst);
    let retry = stack
        .ingestor
        .process(delivery("evt_1", captured_body("order_abc")))
        .await
        .unwrap();
    assert!(
        matches!(retry, WebhookOutcome::Processed { transitioned: true, .. }),
        "got {:?}",
        retry
    );
}

#[tokio::test]
async fn test_unrecognized_delivery_is_audited_as_unidentified() {
    let (stack, _) = razorpay_stack().await;

    let outcome = stack
        .ingestor
        .process(WebhookDelivery {
            raw_body: "this is not json".to_string(),
            headers: HashMap::new(),
            source_ip: None,
        })
        .await
        .unwrap();

    let record_id = match outcome {
        WebhookOutcome::Unidentified { record_id } => record_id,
        other => panic!("expected unidentified, got {:?}", other),
    };

    let record = stack.webhooks.get(&record_id).unwrap();
    assert_eq!(record.gateway, None);
    assert_eq!(record.status, WebhookStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("unidentified gateway"));
    assert_eq!(stack.webhooks.claim_count(), 0);
}

#[tokio::test]
async fn test_identified_gateway_without_adapter_keeps_claim() {
    // only stripe is loaded; the delivery identifies as razorpay
    let stripe = Arc::new(StubProvider::new(GatewayName::Stripe));
    let stack = stack(
        vec![(gateway_config(GatewayName::Stripe, 1), stripe)],
        RouterOptions::default(),
    )
    .await;

    let outcome = stack
        .ingestor
        .process(delivery("evt_1", captured_body("order_abc")))
        .await
        .unwrap();

    let record_id = match outcome {
        WebhookOutcome::Error { record_id, error } => {
            assert_eq!(error, "gateway adapter not configured");
            record_id
        }
        other => panic!("expected error, got {:?}", other),
    };

    // the event was real as far as we know; keep the claim so a duplicate
    // cannot slip in while the configuration is being fixed
    assert_eq!(
        stack.webhooks.claim_holder(GatewayName::Razorpay, "evt_1"),
        Some(record_id)
    );
}

#[tokio::test]
async fn test_unmatched_transaction_fails_then_replays_clean() {
    let razorpay = Arc::new(StubProvider::new(GatewayName::Razorpay));
    let stack = stack(
        vec![(gateway_config(GatewayName::Razorpay, 1), razorpay)],
        RouterOptions::default(),
    )
    .await;

    // webhook arrives before our ledger row exists
    let outcome = stack
        .ingestor
        .process(delivery("evt_9", captured_body("order_late")))
        .await
        .unwrap();
    let record_id = match outcome {
        WebhookOutcome::Error { record_id, error } => {
            assert_eq!(error, "transaction not found");
            record_id
        }
        other => panic!("expected error, got {:?}", other),
    };

    let record = stack.webhooks.get(&record_id).unwrap();
    assert_eq!(record.status, WebhookStatus::Failed);
    assert!(record.verified);
    assert_eq!(
        stack.webhooks.claim_holder(GatewayName::Razorpay, "evt_9"),
        Some(record_id.clone())
    );

    // the row lands, the record is replayed
    stack.orders.put(pending_order("ord-9", dec!(500)));
    stack.transactions.put(created_transaction(
        "txn-9",
        "ord-9",
        GatewayName::Razorpay,
        "order_late",
        dec!(500),
    ));

    let replayed = stack.ingestor.replay(&record_id).await.unwrap();
    match replayed {
        WebhookOutcome::Processed {
            transaction_id,
            transitioned,
            ..
        } => {
            assert_eq!(transaction_id, "txn-9");
            assert!(transitioned);
        }
        other => panic!("expected processed, got {:?}", other),
    }

    let record = stack.webhooks.get(&record_id).unwrap();
    assert_eq!(record.status, WebhookStatus::Processed);
    assert_eq!(record.attempts, 2);
    assert_eq!(
        stack.transactions.get("txn-9").unwrap().status,
        TransactionStatus::Success
    );
    assert_eq!(stack.hook.events().len(), 1);
}

#[tokio::test]
async fn test_failed_event_marks_transaction_and_orders_failed() {
    let (stack, _) = razorpay_stack().await;

    let body = json!({
        "event": "payment.failed",
        "payload": { "payment": { "entity": {
            "id": "pay_9",
            "order_id": "order_abc",
            "error_code": "BAD_REQUEST_ERROR",
            "error_description": "Payment declined by issuer",
        } } },
    });
    let outcome = stack.ingestor.process(delivery("evt_f", body)).await.unwrap();
    assert!(
        matches!(outcome, WebhookOutcome::Processed { transitioned: true, .. }),
        "got {:?}",
        outcome
    );

    let txn = stack.transactions.get("txn-1").unwrap();
    assert_eq!(txn.status, TransactionStatus::Failed);
    assert_eq!(txn.error_code.as_deref(), Some("BAD_REQUEST_ERROR"));
    assert_eq!(
        txn.error_message.as_deref(),
        Some("Payment declined by issuer")
    );
    assert_eq!(
        stack.orders.get("ord-1").unwrap().payment_status,
        OrderPaymentStatus::Failed
    );
    assert!(stack.hook.events().is_empty());
}

#[tokio::test]
async fn test_unhandled_event_is_acknowledged_without_action() {
    let (stack, _) = razorpay_stack().await;

    let body = json!({
        "event": "refund.processed",
        "payload": { "payment": { "entity": { "id": "pay_1", "order_id": "order_abc" } } },
    });
    let outcome = stack.ingestor.process(delivery("evt_r", body)).await.unwrap();

    let record_id = match outcome {
        WebhookOutcome::Ignored { record_id, reason, .. } => {
            assert!(reason.contains("refund.processed"), "reason: {}", reason);
            record_id
        }
        other => panic!("expected ignored, got {:?}", other),
    };
    assert_eq!(
        stack.webhooks.get(&record_id).unwrap().status,
        WebhookStatus::Processed
    );
    assert_eq!(
        stack.transactions.get("txn-1").unwrap().status,
        TransactionStatus::Created
    );
}

#[tokio::test]
async fn test_replay_refuses_non_failed_records() {
    let (stack, _) = razorpay_stack().await;

    let outcome = stack
        .ingestor
        .process(delivery("evt_1", captured_body("order_abc")))
        .await
        .unwrap();
    let record_id = match outcome {
        WebhookOutcome::Processed { record_id, .. } => record_id,
        other => panic!("expected processed, got {:?}", other),
    };

    let err = stack.ingestor.replay(&record_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_failed_records_are_listed_for_retry() {
    let (stack, _) = razorpay_stack().await;

    // two deliveries that cannot be matched, one that settles
    stack
        .ingestor
        .process(delivery("evt_a", captured_body("order_missing_1")))
        .await
        .unwrap();
    stack
        .ingestor
        .process(delivery("evt_b", captured_body("order_missing_2")))
        .await
        .unwrap();
    stack
        .ingestor
        .process(delivery("evt_c", captured_body("order_abc")))
        .await
        .unwrap();

    let failed = stack.ingestor.failed_for_retry(10).await.unwrap();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|r| r.status == WebhookStatus::Failed));
    assert!(failed
        .iter()
        .all(|r| r.error_message.as_deref() == Some("transaction not found")));

    let capped = stack.ingestor.failed_for_retry(1).await.unwrap();
    assert_eq!(capped.len(), 1);
}
