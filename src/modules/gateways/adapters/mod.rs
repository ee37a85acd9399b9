use crate::core::{Currency, Result};
use crate::modules::gateways::models::GatewayName;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod http;
pub mod payu;
pub mod phonepe;
pub mod razorpay;
pub mod signing;
pub mod stripe;

pub use http::GatewayHttp;
pub use payu::PayuProvider;
pub use phonepe::PhonepeProvider;
pub use razorpay::RazorpayProvider;
pub use stripe::StripeProvider;

/// How the customer reaches the gateway's checkout.
///
/// Redirect flows hand the browser a session URL that cannot be reused, so
/// they always get a fresh transaction instead of resuming a pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutFlow {
    Embedded,
    Redirect,
}

/// Everything an adapter needs to open a session with its gateway.
#[derive(Debug, Clone)]
pub struct InitializeContext {
    /// Our ledger id, passed to the gateway as the merchant reference.
    pub transaction_id: String,
    pub order_id: String,
    pub user_id: Option<String>,
    /// Major units; adapters convert to their native denomination.
    pub amount: Decimal,
    pub currency: Currency,
    pub customer: CustomerInfo,
    pub payment_method: Option<String>,
    /// Where the gateway sends the customer (or callback) after payment.
    pub callback_url: String,
    pub notes: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct CustomerInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A freshly opened gateway session.
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySession {
    pub gateway_order_id: String,
    /// What the storefront needs to render or submit checkout.
    pub checkout_payload: serde_json::Value,
    pub checkout_url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub redirect_required: bool,
}

/// An inbound callback or webhook delivery, headers lowercased.
#[derive(Debug, Clone)]
pub struct CallbackContext {
    pub raw_body: String,
    pub payload: serde_json::Value,
    headers: HashMap<String, String>,
}

impl CallbackContext {
    pub fn new(raw_body: String, payload: serde_json::Value, headers: HashMap<String, String>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            raw_body,
            payload,
            headers,
        }
    }

    /// Build a context from client-supplied verification fields (no headers).
    pub fn from_payload(payload: serde_json::Value) -> Self {
        Self {
            raw_body: payload.to_string(),
            payload,
            headers: HashMap::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteState {
    Success,
    Failed,
    Pending,
}

/// A gateway's native transaction state, normalized.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteStatus {
    pub state: RemoteState,
    pub gateway_payment_id: Option<String>,
    /// Major units.
    pub amount: Option<Decimal>,
    pub currency: Option<Currency>,
    pub payment_method: Option<String>,
    pub method_details: Option<serde_json::Value>,
    pub captured_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl RemoteStatus {
    pub fn pending() -> Self {
        Self {
            state: RemoteState::Pending,
            gateway_payment_id: None,
            amount: None,
            currency: None,
            payment_method: None,
            method_details: None,
            captured_at: None,
            error_code: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub status: String,
    pub amount: Decimal,
    pub processed_at: DateTime<Utc>,
}

/// Capability contract implemented once per gateway.
///
/// Transport and remote-API failures come back as `AppError::Gateway` so the
/// router can treat them uniformly as "this provider failed, try the next".
/// Signature verification never errors: anything short of a valid signature
/// is `false`.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> GatewayName;

    fn flow(&self) -> CheckoutFlow;

    /// Open a transaction/session with the remote gateway.
    async fn initialize_transaction(&self, ctx: &InitializeContext) -> Result<GatewaySession>;

    /// Constant-time verification of a callback or webhook signature.
    fn verify_signature(&self, ctx: &CallbackContext) -> bool;

    /// Query the gateway for the current state of a transaction.
    async fn check_status(&self, gateway_txn_id: &str) -> Result<RemoteStatus>;

    async fn process_refund(
        &self,
        gateway_payment_id: &str,
        amount: Decimal,
        reason: Option<&str>,
    ) -> Result<RefundOutcome>;

    /// Major units to the gateway's native denomination.
    fn normalize_amount(&self, amount: Decimal, currency: Currency) -> Decimal;

    /// Native denomination back to major units. Inverse of `normalize_amount`.
    fn denormalize_amount(&self, native: Decimal, currency: Currency) -> Decimal;

    /// Cheap connectivity probe.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Secret slots may carry an auxiliary part after `###`: the webhook signing
/// secret for Stripe, the salt index for PhonePe. Absent separator means no
/// auxiliary part.
pub(crate) fn split_secret(secret: &str) -> (&str, Option<&str>) {
    match secret.split_once("###") {
        Some((main, aux)) if !aux.is_empty() => (main, Some(aux)),
        _ => (secret, None),
    }
}
