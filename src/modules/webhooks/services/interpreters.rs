//! Per-gateway webhook interpretation.
//!
//! Pure functions from a raw delivery to (gateway, event identity, action).
//! Nothing here touches the database or the network; the ingestor owns all
//! side effects.

use crate::modules::gateways::adapters::CallbackContext;
use crate::modules::gateways::models::GatewayName;
use crate::modules::transactions::PaymentConfirmation;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::DateTime;
use serde_json::Value;

/// How the event points back at a ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnReference {
    /// Gateway-side session/order id (`gateway_order_id` column).
    GatewayOrder(String),
    /// Our own transaction id, for gateways keyed off the merchant reference.
    Ledger(String),
}

/// What the event asks the ledger to do.
#[derive(Debug, Clone)]
pub enum WebhookAction {
    ConfirmPayment {
        reference: TxnReference,
        confirmation: PaymentConfirmation,
    },
    FailPayment {
        reference: TxnReference,
        error_code: Option<String>,
        error_message: Option<String>,
    },
    Ignore {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Interpretation {
    pub event_type: Option<String>,
    pub event_id: Option<String>,
    pub action: WebhookAction,
}

impl Interpretation {
    fn ignore(event_type: Option<String>, event_id: Option<String>, reason: &str) -> Self {
        Self {
            event_type,
            event_id,
            action: WebhookAction::Ignore {
                reason: reason.to_string(),
            },
        }
    }
}

/// Headers are checked first (they survive payload quirks), then payload
/// shape. Returns `None` for deliveries no adapter recognizes.
pub fn identify_gateway(ctx: &CallbackContext) -> Option<GatewayName> {
    if ctx.header("x-razorpay-signature").is_some() {
        return Some(GatewayName::Razorpay);
    }
    if ctx.header("stripe-signature").is_some() {
        return Some(GatewayName::Stripe);
    }
    if ctx.header("x-verify").is_some() {
        return Some(GatewayName::Phonepe);
    }

    let payload = &ctx.payload;
    if payload.pointer("/payload/payment/entity").is_some() {
        return Some(GatewayName::Razorpay);
    }
    if payload.get("type").is_some() && payload.pointer("/data/object").is_some() {
        return Some(GatewayName::Stripe);
    }
    if ctx.field("response").is_some() || payload.get("code").is_some() {
        return Some(GatewayName::Phonepe);
    }
    if payload.get("txnid").is_some() && payload.get("hash").is_some() {
        return Some(GatewayName::Payu);
    }
    None
}

/// The signature material recorded alongside the event. PayU posts its hash
/// in the form body; everyone else uses a header.
pub fn extract_signature(gateway: Option<GatewayName>, ctx: &CallbackContext) -> Option<String> {
    let primary = match gateway {
        Some(GatewayName::Razorpay) => ctx.header("x-razorpay-signature"),
        Some(GatewayName::Stripe) => ctx.header("stripe-signature"),
        Some(GatewayName::Phonepe) => ctx.header("x-verify"),
        Some(GatewayName::Payu) => ctx.field("hash"),
        None => None,
    };
    primary
        .or_else(|| ctx.header("x-webhook-signature"))
        .map(String::from)
}

pub fn interpret(gateway: GatewayName, ctx: &CallbackContext) -> Interpretation {
    match gateway {
        GatewayName::Razorpay => interpret_razorpay(ctx),
        GatewayName::Stripe => interpret_stripe(ctx),
        GatewayName::Phonepe => interpret_phonepe(ctx),
        GatewayName::Payu => interpret_payu(ctx),
    }
}

fn interpret_razorpay(ctx: &CallbackContext) -> Interpretation {
    let event_type = ctx
        .payload
        .get("event")
        .and_then(Value::as_str)
        .map(String::from);
    // Razorpay sends the event id in a header; older payload formats carry it
    // as a top-level `id`.
    let event_id = ctx
        .header("x-razorpay-event-id")
        .map(String::from)
        .or_else(|| ctx.payload.get("id").and_then(Value::as_str).map(String::from));
    let entity = ctx.payload.pointer("/payload/payment/entity");

    let action = match event_type.as_deref() {
        Some("payment.captured") | Some("order.paid") => {
            let Some(entity) = entity else {
                return Interpretation::ignore(event_type, event_id, "payment entity missing");
            };
            let Some(order_id) = entity.get("order_id").and_then(Value::as_str) else {
                return Interpretation::ignore(
                    event_type,
                    event_id,
                    "payment entity missing order_id",
                );
            };
            WebhookAction::ConfirmPayment {
                reference: TxnReference::GatewayOrder(order_id.to_string()),
                confirmation: PaymentConfirmation {
                    gateway_payment_id: entity
                        .get("id")
                        .and_then(Value::as_str)
                        .map(String::from),
                    payment_method: entity
                        .get("method")
                        .and_then(Value::as_str)
                        .map(String::from),
                    method_details: entity
                        .get("method")
                        .and_then(Value::as_str)
                        .and_then(|m| entity.get(m).cloned())
                        .filter(|v| !v.is_null()),
                    captured_at: entity
                        .get("created_at")
                        .and_then(Value::as_i64)
                        .and_then(|ts| DateTime::from_timestamp(ts, 0))
                        .map(|dt| dt.naive_utc()),
                },
            }
        }
        Some("payment.failed") => {
            let Some(entity) = entity else {
                return Interpretation::ignore(event_type, event_id, "payment entity missing");
            };
            let Some(order_id) = entity.get("order_id").and_then(Value::as_str) else {
                return Interpretation::ignore(
                    event_type,
                    event_id,
                    "payment entity missing order_id",
                );
            };
            WebhookAction::FailPayment {
                reference: TxnReference::GatewayOrder(order_id.to_string()),
                error_code: entity
                    .get("error_code")
                    .and_then(Value::as_str)
                    .map(String::from),
                error_message: entity
                    .get("error_description")
                    .and_then(Value::as_str)
                    .map(String::from),
            }
        }
        Some(other) => WebhookAction::Ignore {
            reason: format!("unhandled Razorpay event: {}", other),
        },
        None => WebhookAction::Ignore {
            reason: "missing event field".to_string(),
        },
    };

    Interpretation {
        event_type,
        event_id,
        action,
    }
}

fn interpret_stripe(ctx: &CallbackContext) -> Interpretation {
    let event_type = ctx
        .payload
        .get("type")
        .and_then(Value::as_str)
        .map(String::from);
    let event_id = ctx
        .payload
        .get("id")
        .and_then(Value::as_str)
        .map(String::from);
    let object = ctx.payload.pointer("/data/object");
    let session_id = object.and_then(|o| o.get("id")).and_then(Value::as_str);

    let action = match event_type.as_deref() {
        Some("checkout.session.completed") | Some("checkout.session.async_payment_succeeded") => {
            let (Some(object), Some(session_id)) = (object, session_id) else {
                return Interpretation::ignore(event_type, event_id, "session object missing");
            };
            // `completed` also fires for async methods still settling; only
            // `payment_status: paid` confirms money movement.
            if object.get("payment_status").and_then(Value::as_str) == Some("paid") {
                WebhookAction::ConfirmPayment {
                    reference: TxnReference::GatewayOrder(session_id.to_string()),
                    confirmation: PaymentConfirmation {
                        gateway_payment_id: object
                            .get("payment_intent")
                            .and_then(Value::as_str)
                            .map(String::from),
                        payment_method: object
                            .pointer("/payment_method_types/0")
                            .and_then(Value::as_str)
                            .map(String::from),
                        method_details: None,
                        captured_at: ctx
                            .payload
                            .get("created")
                            .and_then(Value::as_i64)
                            .and_then(|ts| DateTime::from_timestamp(ts, 0))
                            .map(|dt| dt.naive_utc()),
                    },
                }
            } else {
                WebhookAction::Ignore {
                    reason: "session completed but payment not settled".to_string(),
                }
            }
        }
        Some("checkout.session.expired") => {
            let Some(session_id) = session_id else {
                return Interpretation::ignore(event_type, event_id, "session object missing");
            };
            WebhookAction::FailPayment {
                reference: TxnReference::GatewayOrder(session_id.to_string()),
                error_code: Some("SESSION_EXPIRED".to_string()),
                error_message: Some("Checkout session expired before payment".to_string()),
            }
        }
        Some("checkout.session.async_payment_failed") => {
            let Some(session_id) = session_id else {
                return Interpretation::ignore(event_type, event_id, "session object missing");
            };
            WebhookAction::FailPayment {
                reference: TxnReference::GatewayOrder(session_id.to_string()),
                error_code: Some("ASYNC_PAYMENT_FAILED".to_string()),
                error_message: Some("Asynchronous payment method failed".to_string()),
            }
        }
        Some("payment_intent.payment_failed") => WebhookAction::Ignore {
            reason: "payment failures surface through checkout.session events".to_string(),
        },
        Some(other) => WebhookAction::Ignore {
            reason: format!("unhandled Stripe event: {}", other),
        },
        None => WebhookAction::Ignore {
            reason: "missing type field".to_string(),
        },
    };

    Interpretation {
        event_type,
        event_id,
        action,
    }
}

fn interpret_phonepe(ctx: &CallbackContext) -> Interpretation {
    // Server callbacks wrap the status JSON in a base64 `response` field; the
    // sandbox sometimes posts the inner document directly.
    let decoded = match ctx.field("response") {
        Some(encoded) => BASE64
            .decode(encoded)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok()),
        None => Some(ctx.payload.clone()),
    };
    let Some(decoded) = decoded else {
        return Interpretation::ignore(None, None, "undecodable response payload");
    };

    let event_type = decoded.get("code").and_then(Value::as_str).map(String::from);
    let data = decoded.get("data").cloned().unwrap_or(Value::Null);
    let merchant_txn = data.get("merchantTransactionId").and_then(Value::as_str);
    let provider_txn = data.get("transactionId").and_then(Value::as_str);
    let event_id = provider_txn.or(merchant_txn).map(String::from);

    let action = match event_type.as_deref() {
        Some("PAYMENT_SUCCESS") => {
            let Some(merchant_txn) = merchant_txn else {
                return Interpretation::ignore(
                    event_type,
                    event_id,
                    "merchantTransactionId missing",
                );
            };
            WebhookAction::ConfirmPayment {
                reference: TxnReference::Ledger(merchant_txn.to_string()),
                confirmation: PaymentConfirmation {
                    gateway_payment_id: provider_txn.map(String::from),
                    payment_method: data
                        .pointer("/paymentInstrument/type")
                        .and_then(Value::as_str)
                        .map(String::from),
                    method_details: data
                        .get("paymentInstrument")
                        .cloned()
                        .filter(|v| !v.is_null()),
                    captured_at: None,
                },
            }
        }
        Some(code @ ("PAYMENT_ERROR" | "PAYMENT_DECLINED" | "PAYMENT_CANCELLED" | "TIMED_OUT")) => {
            let Some(merchant_txn) = merchant_txn else {
                return Interpretation::ignore(
                    event_type,
                    event_id,
                    "merchantTransactionId missing",
                );
            };
            WebhookAction::FailPayment {
                reference: TxnReference::Ledger(merchant_txn.to_string()),
                error_code: Some(code.to_string()),
                error_message: decoded
                    .get("message")
                    .and_then(Value::as_str)
                    .map(String::from),
            }
        }
        Some("PAYMENT_PENDING") => WebhookAction::Ignore {
            reason: "payment still pending".to_string(),
        },
        Some(other) => WebhookAction::Ignore {
            reason: format!("unhandled PhonePe code: {}", other),
        },
        None => WebhookAction::Ignore {
            reason: "missing status code".to_string(),
        },
    };

    Interpretation {
        event_type,
        event_id,
        action,
    }
}

fn interpret_payu(ctx: &CallbackContext) -> Interpretation {
    let event_type = ctx.field("status").map(String::from);
    let event_id = ctx.field("mihpayid").map(String::from);
    let txnid = ctx.field("txnid");

    let action = match (event_type.as_deref(), txnid) {
        (Some("success"), Some(txnid)) => WebhookAction::ConfirmPayment {
            reference: TxnReference::Ledger(txnid.to_string()),
            confirmation: PaymentConfirmation {
                gateway_payment_id: ctx.field("mihpayid").map(String::from),
                payment_method: ctx.field("mode").map(String::from),
                method_details: None,
                captured_at: None,
            },
        },
        (Some("failure") | Some("failed"), Some(txnid)) => WebhookAction::FailPayment {
            reference: TxnReference::Ledger(txnid.to_string()),
            error_code: ctx.field("error").map(String::from),
            error_message: ctx.field("error_Message").map(String::from),
        },
        (Some("pending"), _) => WebhookAction::Ignore {
            reason: "payment still pending".to_string(),
        },
        (_, None) => WebhookAction::Ignore {
            reason: "txnid missing".to_string(),
        },
        (Some(other), _) => WebhookAction::Ignore {
            reason: format!("unhandled PayU status: {}", other),
        },
        (None, _) => WebhookAction::Ignore {
            reason: "status missing".to_string(),
        },
    };

    Interpretation {
        event_type,
        event_id,
        action,
    }
}
