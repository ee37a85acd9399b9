use super::signing::{constant_time_eq, sha256_hex};
use super::{
    split_secret, CallbackContext, CheckoutFlow, GatewayHttp, GatewaySession, InitializeContext,
    PaymentProvider, RefundOutcome, RemoteState, RemoteStatus,
};
use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::models::{GatewayCredentials, GatewayMode, GatewayName};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;

const SANDBOX_BASE_URL: &str = "https://api-preprod.phonepe.com/apis/pg-sandbox";
const PRODUCTION_BASE_URL: &str = "https://api.phonepe.com/apis/hermes";
const PAY_PATH: &str = "/pg/v1/pay";
const REFUND_PATH: &str = "/pg/v1/refund";
const SESSION_MINUTES: i64 = 20;

/// PhonePe: redirect gateway with base64-wrapped payloads.
///
/// Every exchange is authenticated by
/// `X-VERIFY = SHA256(base64Payload + path + saltKey) + "###" + saltIndex`;
/// outbound status checks sign the path with an empty payload, inbound
/// callbacks sign the payload with an empty path. Amounts travel in paise.
pub struct PhonepeProvider {
    merchant_id: String,
    salt_key: String,
    salt_index: String,
    base_url: String,
    http: GatewayHttp,
}

impl PhonepeProvider {
    /// The salt index rides in the secret slot after `###`, defaulting to 1.
    pub fn new(credentials: GatewayCredentials, mode: GatewayMode, http: GatewayHttp) -> Self {
        let (salt_key, salt_index) = split_secret(&credentials.secret_key);
        Self {
            merchant_id: credentials.public_key.clone(),
            salt_key: salt_key.to_string(),
            salt_index: salt_index.unwrap_or("1").to_string(),
            base_url: match mode {
                GatewayMode::Sandbox => SANDBOX_BASE_URL.to_string(),
                GatewayMode::Production => PRODUCTION_BASE_URL.to_string(),
            },
            http,
        }
    }

    fn x_verify(&self, base64_payload: &str, path: &str) -> String {
        let digest = sha256_hex(format!("{}{}{}", base64_payload, path, self.salt_key).as_bytes());
        format!("{}###{}", digest, self.salt_index)
    }

    fn paise(&self, amount: Decimal, currency: Currency) -> Result<i64> {
        self.normalize_amount(amount, currency)
            .to_i64()
            .ok_or_else(|| AppError::validation("Amount out of range for PhonePe"))
    }

    fn request_error(err: reqwest::Error) -> AppError {
        if err.is_connect() || err.is_timeout() {
            AppError::gateway(format!("PhonePe gateway unavailable: {}", err))
        } else {
            AppError::gateway(format!("PhonePe API request failed: {}", err))
        }
    }
}

#[async_trait]
impl PaymentProvider for PhonepeProvider {
    fn name(&self) -> GatewayName {
        GatewayName::Phonepe
    }

    fn flow(&self) -> CheckoutFlow {
        CheckoutFlow::Redirect
    }

    async fn initialize_transaction(&self, ctx: &InitializeContext) -> Result<GatewaySession> {
        let pay_request = json!({
            "merchantId": self.merchant_id,
            "merchantTransactionId": ctx.transaction_id,
            "merchantUserId": ctx.user_id.as_deref().unwrap_or("guest"),
            "amount": self.paise(ctx.amount, ctx.currency)?,
            "redirectUrl": ctx.callback_url,
            "redirectMode": "POST",
            "callbackUrl": ctx.callback_url,
            "mobileNumber": ctx.customer.phone,
            "paymentInstrument": { "type": "PAY_PAGE" },
        });

        let encoded = BASE64.encode(pay_request.to_string());
        let url = format!("{}{}", self.base_url, PAY_PATH);

        let response = self
            .http
            .plain()
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-VERIFY", self.x_verify(&encoded, PAY_PATH))
            .json(&json!({ "request": encoded }))
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read PhonePe response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "PhonePe API error - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse PhonePe response: {}", e)))?;

        if !parsed["success"].as_bool().unwrap_or(false) {
            return Err(AppError::gateway(format!(
                "PhonePe rejected the pay request: {}",
                parsed["code"].as_str().unwrap_or("UNKNOWN")
            )));
        }

        let redirect_url = parsed["data"]["instrumentResponse"]["redirectInfo"]["url"]
            .as_str()
            .ok_or_else(|| AppError::gateway("PhonePe response missing redirect URL"))?;

        Ok(GatewaySession {
            // PhonePe keys everything off the merchant transaction id
            gateway_order_id: ctx.transaction_id.clone(),
            checkout_payload: json!({ "redirectUrl": redirect_url }),
            checkout_url: Some(redirect_url.to_string()),
            expires_at: Utc::now() + chrono::Duration::minutes(SESSION_MINUTES),
            redirect_required: true,
        })
    }

    fn verify_signature(&self, ctx: &CallbackContext) -> bool {
        let Some(provided) = ctx.header("x-verify") else {
            return false;
        };
        let Some(encoded) = ctx.field("response") else {
            return false;
        };
        // Callbacks sign the payload alone, no path component
        let expected = self.x_verify(encoded, "");
        constant_time_eq(&expected, provided)
    }

    async fn check_status(&self, gateway_txn_id: &str) -> Result<RemoteStatus> {
        let path = format!("/pg/v1/status/{}/{}", self.merchant_id, gateway_txn_id);
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .retrying()
            .get(&url)
            .header("Content-Type", "application/json")
            .header("X-VERIFY", self.x_verify("", &path))
            .header("X-MERCHANT-ID", &self.merchant_id)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("PhonePe status check failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read PhonePe response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "PhonePe status check - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse PhonePe status: {}", e)))?;

        let code = parsed["code"].as_str().unwrap_or("");
        let state = match code {
            "PAYMENT_SUCCESS" => RemoteState::Success,
            "PAYMENT_ERROR" | "PAYMENT_DECLINED" | "PAYMENT_CANCELLED" | "TIMED_OUT" => {
                RemoteState::Failed
            }
            _ => RemoteState::Pending,
        };

        let amount = parsed["data"]["amount"]
            .as_i64()
            .map(|paise| self.denormalize_amount(Decimal::from(paise), Currency::INR));

        Ok(RemoteStatus {
            state,
            gateway_payment_id: parsed["data"]["transactionId"].as_str().map(String::from),
            amount,
            currency: Some(Currency::INR),
            payment_method: parsed["data"]["paymentInstrument"]["type"]
                .as_str()
                .map(String::from),
            method_details: {
                let instrument = parsed["data"]["paymentInstrument"].clone();
                (!instrument.is_null()).then_some(instrument)
            },
            captured_at: (state == RemoteState::Success).then(Utc::now),
            error_code: (state == RemoteState::Failed).then(|| code.to_string()),
            error_message: parsed["message"].as_str().map(String::from),
        })
    }

    async fn process_refund(
        &self,
        gateway_payment_id: &str,
        amount: Decimal,
        _reason: Option<&str>,
    ) -> Result<RefundOutcome> {
        let merchant_refund_id = format!("R{}", uuid::Uuid::new_v4().simple());
        let refund_request = json!({
            "merchantId": self.merchant_id,
            "merchantTransactionId": merchant_refund_id,
            "originalTransactionId": gateway_payment_id,
            "amount": self.paise(amount, Currency::INR)?,
        });

        let encoded = BASE64.encode(refund_request.to_string());
        let url = format!("{}{}", self.base_url, REFUND_PATH);

        let response = self
            .http
            .plain()
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-VERIFY", self.x_verify(&encoded, REFUND_PATH))
            .json(&json!({ "request": encoded }))
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read PhonePe response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "PhonePe refund failed - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse PhonePe refund: {}", e)))?;

        if !parsed["success"].as_bool().unwrap_or(false) {
            return Err(AppError::gateway(format!(
                "PhonePe refund rejected: {}",
                parsed["code"].as_str().unwrap_or("UNKNOWN")
            )));
        }

        Ok(RefundOutcome {
            refund_id: parsed["data"]["transactionId"]
                .as_str()
                .unwrap_or(&merchant_refund_id)
                .to_string(),
            status: "pending".to_string(),
            amount,
            processed_at: Utc::now(),
        })
    }

    fn normalize_amount(&self, amount: Decimal, _currency: Currency) -> Decimal {
        (amount * Decimal::from(100)).round()
    }

    fn denormalize_amount(&self, native: Decimal, _currency: Currency) -> Decimal {
        native / Decimal::from(100)
    }
}
