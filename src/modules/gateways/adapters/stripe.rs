use super::signing::{constant_time_eq, hmac_sha256_hex};
use super::{
    split_secret, CallbackContext, CheckoutFlow, GatewayHttp, GatewaySession, InitializeContext,
    PaymentProvider, RefundOutcome, RemoteState, RemoteStatus,
};
use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::models::{GatewayCredentials, GatewayName};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

const BASE_URL: &str = "https://api.stripe.com";
const SESSION_MINUTES: i64 = 30;

/// Webhook timestamp drift allowed before a delivery is rejected as stale.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Currencies Stripe treats as having no minor unit.
const ZERO_DECIMAL: [Currency; 1] = [Currency::JPY];

/// Stripe: hosted checkout sessions, customer redirected to Stripe's page.
///
/// Webhook verification reimplements the SDK's constructor: parse the
/// `Stripe-Signature` header (`t=...,v1=...`), HMAC-SHA256 over
/// `"{t}.{raw_body}"`, constant-time compare, 5-minute timestamp tolerance.
pub struct StripeProvider {
    secret_key: String,
    webhook_secret: String,
    base_url: String,
    http: GatewayHttp,
}

impl StripeProvider {
    /// The webhook signing secret (`whsec_...`) rides in the secret slot
    /// after `###`.
    pub fn new(credentials: GatewayCredentials, http: GatewayHttp) -> Self {
        let (secret_key, webhook_secret) = split_secret(&credentials.secret_key);
        Self {
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.unwrap_or(secret_key).to_string(),
            base_url: BASE_URL.to_string(),
            http,
        }
    }

    fn minor_units(&self, amount: Decimal, currency: Currency) -> Result<i64> {
        self.normalize_amount(amount, currency)
            .to_i64()
            .ok_or_else(|| AppError::validation("Amount out of range for Stripe"))
    }

    fn request_error(err: reqwest::Error) -> AppError {
        if err.is_connect() || err.is_timeout() {
            AppError::gateway(format!("Stripe gateway unavailable: {}", err))
        } else {
            AppError::gateway(format!("Stripe API request failed: {}", err))
        }
    }

    fn verify_header(&self, header: &str, raw_body: &str, now_ts: i64) -> bool {
        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<&str> = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let Some(timestamp) = timestamp else {
            return false;
        };
        if candidates.is_empty() || (now_ts - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            return false;
        }

        let signed_payload = format!("{}.{}", timestamp, raw_body);
        let expected = hmac_sha256_hex(self.webhook_secret.as_bytes(), signed_payload.as_bytes());
        candidates
            .iter()
            .any(|candidate| constant_time_eq(&expected, candidate))
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> GatewayName {
        GatewayName::Stripe
    }

    fn flow(&self) -> CheckoutFlow {
        CheckoutFlow::Redirect
    }

    async fn initialize_transaction(&self, ctx: &InitializeContext) -> Result<GatewaySession> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let amount = self.minor_units(ctx.amount, ctx.currency)?;
        let expires_at = Utc::now() + chrono::Duration::minutes(SESSION_MINUTES);

        // Stripe's API is form-encoded, not JSON
        let mut form: Vec<(&str, String)> = vec![
            ("mode", "payment".to_string()),
            ("client_reference_id", ctx.transaction_id.clone()),
            (
                "success_url",
                format!("{}?session_id={{CHECKOUT_SESSION_ID}}&status=success", ctx.callback_url),
            ),
            ("cancel_url", format!("{}?status=cancelled", ctx.callback_url)),
            ("expires_at", expires_at.timestamp().to_string()),
            (
                "line_items[0][price_data][currency]",
                ctx.currency.as_str().to_lowercase(),
            ),
            ("line_items[0][price_data][unit_amount]", amount.to_string()),
            (
                "line_items[0][price_data][product_data][name]",
                format!("Order {}", ctx.order_id),
            ),
            ("line_items[0][quantity]", "1".to_string()),
        ];
        if let Some(email) = &ctx.customer.email {
            form.push(("customer_email", email.clone()));
        }

        let response = self
            .http
            .plain()
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read Stripe response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Stripe API error - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let session: StripeSession = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(GatewaySession {
            gateway_order_id: session.id.clone(),
            checkout_payload: serde_json::json!({
                "sessionId": session.id,
                "checkoutUrl": session.url,
            }),
            checkout_url: session.url,
            expires_at,
            redirect_required: true,
        })
    }

    fn verify_signature(&self, ctx: &CallbackContext) -> bool {
        let Some(header) = ctx.header("stripe-signature") else {
            return false;
        };
        self.verify_header(header, &ctx.raw_body, Utc::now().timestamp())
    }

    async fn check_status(&self, gateway_txn_id: &str) -> Result<RemoteStatus> {
        let url = format!("{}/v1/checkout/sessions/{}", self.base_url, gateway_txn_id);

        let response = self
            .http
            .retrying()
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Stripe status check failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read Stripe response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Stripe status check - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let session: StripeSession = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse Stripe session: {}", e)))?;

        let state = match (session.payment_status.as_deref(), session.status.as_deref()) {
            (Some("paid"), _) => RemoteState::Success,
            (_, Some("expired")) => RemoteState::Failed,
            _ => RemoteState::Pending,
        };

        let currency = session
            .currency
            .as_deref()
            .and_then(|c| c.to_uppercase().parse::<Currency>().ok());
        let amount = match (session.amount_total, currency) {
            (Some(total), Some(currency)) => {
                Some(self.denormalize_amount(Decimal::from(total), currency))
            }
            _ => None,
        };

        Ok(RemoteStatus {
            state,
            gateway_payment_id: session.payment_intent,
            amount,
            currency,
            payment_method: Some("card".to_string()),
            method_details: None,
            captured_at: (state == RemoteState::Success).then(Utc::now),
            error_code: None,
            error_message: None,
        })
    }

    async fn process_refund(
        &self,
        gateway_payment_id: &str,
        amount: Decimal,
        reason: Option<&str>,
    ) -> Result<RefundOutcome> {
        let url = format!("{}/v1/refunds", self.base_url);
        let form: Vec<(&str, String)> = vec![
            ("payment_intent", gateway_payment_id.to_string()),
            ("amount", self.minor_units(amount, Currency::INR)?.to_string()),
            ("reason", reason.unwrap_or("requested_by_customer").to_string()),
        ];

        let response = self
            .http
            .plain()
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read Stripe response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Stripe refund failed - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let refund: StripeRefund = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse Stripe refund: {}", e)))?;

        Ok(RefundOutcome {
            refund_id: refund.id,
            status: refund.status,
            amount,
            processed_at: Utc::now(),
        })
    }

    fn normalize_amount(&self, amount: Decimal, currency: Currency) -> Decimal {
        if ZERO_DECIMAL.contains(&currency) {
            amount.round()
        } else {
            (amount * Decimal::from(100)).round()
        }
    }

    fn denormalize_amount(&self, native: Decimal, currency: Currency) -> Decimal {
        if ZERO_DECIMAL.contains(&currency) {
            native
        } else {
            native / Decimal::from(100)
        }
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/balance", self.base_url);
        match self
            .http
            .retrying()
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    status: Option<String>,
    payment_status: Option<String>,
    payment_intent: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    status: String,
}
