use super::signing::{constant_time_eq, hmac_sha256_hex};
use super::{
    split_secret, CallbackContext, CheckoutFlow, GatewayHttp, GatewaySession, InitializeContext,
    PaymentProvider, RefundOutcome, RemoteState, RemoteStatus,
};
use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::models::{GatewayCredentials, GatewayName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

const BASE_URL: &str = "https://api.razorpay.com";
const SESSION_MINUTES: i64 = 30;

/// Razorpay: card-network-style gateway, embedded checkout.
///
/// Client callbacks are signed as `HMAC-SHA256(order_id|payment_id)` with the
/// key secret; webhooks carry `X-Razorpay-Signature`, an HMAC over the raw
/// body with the webhook secret. Amounts travel in paise.
pub struct RazorpayProvider {
    key_id: String,
    key_secret: String,
    webhook_secret: String,
    base_url: String,
    http: GatewayHttp,
}

impl RazorpayProvider {
    /// The webhook secret rides in the secret slot after `###`; without it the
    /// key secret doubles as the webhook secret. Test keys route to Razorpay's
    /// sandbox through the same host.
    pub fn new(credentials: GatewayCredentials, http: GatewayHttp) -> Self {
        let (key_secret, webhook_secret) = split_secret(&credentials.secret_key);
        Self {
            key_id: credentials.public_key.clone(),
            key_secret: key_secret.to_string(),
            webhook_secret: webhook_secret.unwrap_or(key_secret).to_string(),
            base_url: BASE_URL.to_string(),
            http,
        }
    }

    fn paise(&self, amount: Decimal, currency: Currency) -> Result<i64> {
        self.normalize_amount(amount, currency)
            .to_i64()
            .ok_or_else(|| AppError::validation("Amount out of range for Razorpay"))
    }

    fn request_error(err: reqwest::Error) -> AppError {
        if err.is_connect() || err.is_timeout() {
            AppError::gateway(format!("Razorpay gateway unavailable: {}", err))
        } else {
            AppError::gateway(format!("Razorpay API request failed: {}", err))
        }
    }

    fn verify_client_callback(&self, ctx: &CallbackContext) -> bool {
        let (Some(order_id), Some(payment_id), Some(signature)) = (
            ctx.field("razorpay_order_id"),
            ctx.field("razorpay_payment_id"),
            ctx.field("razorpay_signature"),
        ) else {
            return false;
        };

        let message = format!("{}|{}", order_id, payment_id);
        let expected = hmac_sha256_hex(self.key_secret.as_bytes(), message.as_bytes());
        constant_time_eq(&expected, signature)
    }

    fn verify_webhook(&self, ctx: &CallbackContext) -> bool {
        let Some(signature) = ctx.header("x-razorpay-signature") else {
            return false;
        };
        let expected = hmac_sha256_hex(self.webhook_secret.as_bytes(), ctx.raw_body.as_bytes());
        constant_time_eq(&expected, signature)
    }
}

#[async_trait]
impl PaymentProvider for RazorpayProvider {
    fn name(&self) -> GatewayName {
        GatewayName::Razorpay
    }

    fn flow(&self) -> CheckoutFlow {
        CheckoutFlow::Embedded
    }

    async fn initialize_transaction(&self, ctx: &InitializeContext) -> Result<GatewaySession> {
        let url = format!("{}/v1/orders", self.base_url);
        let amount = self.paise(ctx.amount, ctx.currency)?;

        let order_request = json!({
            "amount": amount,
            "currency": ctx.currency.as_str(),
            "receipt": ctx.transaction_id,
            "notes": ctx.notes,
        });

        let response = self
            .http
            .plain()
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&order_request)
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read Razorpay response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Razorpay API error - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let order: RazorpayOrder = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse Razorpay response: {}", e)))?;

        Ok(GatewaySession {
            gateway_order_id: order.id.clone(),
            checkout_payload: json!({
                "key": self.key_id,
                "order_id": order.id,
                "amount": amount,
                "currency": ctx.currency.as_str(),
                "prefill": {
                    "name": ctx.customer.name,
                    "email": ctx.customer.email,
                    "contact": ctx.customer.phone,
                },
                "notes": ctx.notes,
            }),
            checkout_url: None,
            expires_at: Utc::now() + chrono::Duration::minutes(SESSION_MINUTES),
            redirect_required: false,
        })
    }

    fn verify_signature(&self, ctx: &CallbackContext) -> bool {
        // Client confirmations carry the signature in the payload, webhook
        // deliveries in the header.
        if ctx.field("razorpay_signature").is_some() {
            return self.verify_client_callback(ctx);
        }
        self.verify_webhook(ctx)
    }

    async fn check_status(&self, gateway_txn_id: &str) -> Result<RemoteStatus> {
        let url = format!("{}/v1/payments/{}", self.base_url, gateway_txn_id);

        let response = self
            .http
            .retrying()
            .get(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Razorpay status check failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read Razorpay response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Razorpay status check - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let raw: serde_json::Value = serde_json::from_str(&body)?;
        let payment: RazorpayPayment = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::gateway(format!("Failed to parse Razorpay payment: {}", e)))?;

        let state = match payment.status.as_str() {
            "captured" | "refunded" => RemoteState::Success,
            "failed" => RemoteState::Failed,
            // created / authorized / pending
            _ => RemoteState::Pending,
        };

        let method_details = payment
            .method
            .as_deref()
            .and_then(|m| raw.get(m).cloned())
            .filter(|v| !v.is_null());

        Ok(RemoteStatus {
            state,
            gateway_payment_id: Some(payment.id),
            amount: Some(self.denormalize_amount(Decimal::from(payment.amount), Currency::INR)),
            currency: payment.currency.parse().ok(),
            payment_method: payment.method,
            method_details,
            captured_at: payment.created_at.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            error_code: payment.error_code,
            error_message: payment.error_description,
        })
    }

    async fn process_refund(
        &self,
        gateway_payment_id: &str,
        amount: Decimal,
        reason: Option<&str>,
    ) -> Result<RefundOutcome> {
        let url = format!("{}/v1/payments/{}/refund", self.base_url, gateway_payment_id);
        let refund_request = json!({
            "amount": self.paise(amount, Currency::INR)?,
            "notes": { "reason": reason.unwrap_or("requested_by_customer") },
        });

        let response = self
            .http
            .plain()
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&refund_request)
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read Razorpay response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Razorpay refund failed - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let refund: RazorpayRefund = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse Razorpay refund: {}", e)))?;

        Ok(RefundOutcome {
            refund_id: refund.id,
            status: refund.status,
            amount: self.denormalize_amount(Decimal::from(refund.amount), Currency::INR),
            processed_at: Utc::now(),
        })
    }

    fn normalize_amount(&self, amount: Decimal, _currency: Currency) -> Decimal {
        (amount * Decimal::from(100)).round()
    }

    fn denormalize_amount(&self, native: Decimal, _currency: Currency) -> Decimal {
        native / Decimal::from(100)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/orders?count=1", self.base_url);
        match self
            .http
            .retrying()
            .get(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayPayment {
    id: String,
    status: String,
    amount: i64,
    currency: String,
    method: Option<String>,
    created_at: Option<i64>,
    error_code: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RazorpayRefund {
    id: String,
    status: String,
    amount: i64,
}
