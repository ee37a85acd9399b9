use super::signing::{constant_time_eq, sha512_hex};
use super::{
    CallbackContext, CheckoutFlow, GatewayHttp, GatewaySession, InitializeContext, PaymentProvider,
    RefundOutcome, RemoteState, RemoteStatus,
};
use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::models::{GatewayCredentials, GatewayMode, GatewayName};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;

const SANDBOX_FORM_URL: &str = "https://test.payu.in";
const PRODUCTION_FORM_URL: &str = "https://secure.payu.in";
const SANDBOX_API_URL: &str = "https://test.payu.in";
const PRODUCTION_API_URL: &str = "https://info.payu.in";
const SESSION_MINUTES: i64 = 15;

/// PayU: form-POST gateway secured by a SHA512 hash chain.
///
/// The request and response hashes are independent formulas, not one formula
/// reversed: the response side prepends the salt and carries six literal
/// empty fields for unused charge types. Amounts stay in major units as
/// two-decimal strings.
pub struct PayuProvider {
    merchant_key: String,
    salt: String,
    form_base_url: String,
    api_base_url: String,
    http: GatewayHttp,
}

impl PayuProvider {
    pub fn new(credentials: GatewayCredentials, mode: GatewayMode, http: GatewayHttp) -> Self {
        let (form_base_url, api_base_url) = match mode {
            GatewayMode::Sandbox => (SANDBOX_FORM_URL, SANDBOX_API_URL),
            GatewayMode::Production => (PRODUCTION_FORM_URL, PRODUCTION_API_URL),
        };
        Self {
            merchant_key: credentials.public_key.clone(),
            salt: credentials.secret_key.clone(),
            form_base_url: form_base_url.to_string(),
            api_base_url: api_base_url.to_string(),
            http,
        }
    }

    /// `SHA512(key|txnid|amount|productinfo|firstname|email|udf1..udf5||||||salt)`
    fn request_hash(&self, fields: &PayuFormFields) -> String {
        let message = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}||||||{}",
            self.merchant_key,
            fields.txnid,
            fields.amount,
            fields.productinfo,
            fields.firstname,
            fields.email,
            fields.udf1,
            fields.udf2,
            fields.udf3,
            fields.udf4,
            fields.udf5,
            self.salt
        );
        sha512_hex(message.as_bytes())
    }

    /// `SHA512(salt|status||||||udf5..udf1|email|firstname|productinfo|amount|txnid|key)`
    ///
    /// The six pipes after status are literal empty fields; the direction is
    /// not a naive reversal of the request formula.
    fn response_hash(&self, ctx: &CallbackContext) -> String {
        let field = |name: &str| ctx.field(name).unwrap_or("");
        let message = format!(
            "{}|{}||||||{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.salt,
            field("status"),
            field("udf5"),
            field("udf4"),
            field("udf3"),
            field("udf2"),
            field("udf1"),
            field("email"),
            field("firstname"),
            field("productinfo"),
            field("amount"),
            field("txnid"),
            self.merchant_key
        );
        sha512_hex(message.as_bytes())
    }

    /// Web-service command hash: `SHA512(key|command|var1|salt)`.
    fn command_hash(&self, command: &str, var1: &str) -> String {
        sha512_hex(format!("{}|{}|{}|{}", self.merchant_key, command, var1, self.salt).as_bytes())
    }

    fn request_error(err: reqwest::Error) -> AppError {
        if err.is_connect() || err.is_timeout() {
            AppError::gateway(format!("PayU gateway unavailable: {}", err))
        } else {
            AppError::gateway(format!("PayU API request failed: {}", err))
        }
    }
}

struct PayuFormFields {
    txnid: String,
    amount: String,
    productinfo: String,
    firstname: String,
    email: String,
    udf1: String,
    udf2: String,
    udf3: String,
    udf4: String,
    udf5: String,
}

#[async_trait]
impl PaymentProvider for PayuProvider {
    fn name(&self) -> GatewayName {
        GatewayName::Payu
    }

    fn flow(&self) -> CheckoutFlow {
        CheckoutFlow::Redirect
    }

    /// Builds the browser form POST; PayU has no server-side session call.
    async fn initialize_transaction(&self, ctx: &InitializeContext) -> Result<GatewaySession> {
        let fields = PayuFormFields {
            txnid: ctx.transaction_id.clone(),
            amount: format!("{:.2}", ctx.amount),
            productinfo: format!("Order {}", ctx.order_id),
            firstname: ctx.customer.name.clone().unwrap_or_else(|| "Customer".to_string()),
            email: ctx.customer.email.clone().unwrap_or_default(),
            udf1: ctx.order_id.clone(),
            udf2: String::new(),
            udf3: String::new(),
            udf4: String::new(),
            udf5: String::new(),
        };
        let hash = self.request_hash(&fields);
        let action_url = format!("{}/_payment", self.form_base_url);

        Ok(GatewaySession {
            // No remote session: the merchant transaction id is the reference
            gateway_order_id: fields.txnid.clone(),
            checkout_payload: json!({
                "actionUrl": action_url,
                "method": "POST",
                "fields": {
                    "key": self.merchant_key,
                    "txnid": fields.txnid,
                    "amount": fields.amount,
                    "productinfo": fields.productinfo,
                    "firstname": fields.firstname,
                    "email": fields.email,
                    "phone": ctx.customer.phone.clone().unwrap_or_default(),
                    "surl": format!("{}?status=success", ctx.callback_url),
                    "furl": format!("{}?status=failure", ctx.callback_url),
                    "udf1": fields.udf1,
                    "udf2": fields.udf2,
                    "udf3": fields.udf3,
                    "udf4": fields.udf4,
                    "udf5": fields.udf5,
                    "service_provider": "payu_paisa",
                    "hash": hash,
                },
            }),
            checkout_url: Some(action_url),
            expires_at: Utc::now() + chrono::Duration::minutes(SESSION_MINUTES),
            redirect_required: true,
        })
    }

    fn verify_signature(&self, ctx: &CallbackContext) -> bool {
        let Some(provided) = ctx.field("hash") else {
            return false;
        };
        let expected = self.response_hash(ctx);
        constant_time_eq(&expected, &provided.to_lowercase())
    }

    async fn check_status(&self, gateway_txn_id: &str) -> Result<RemoteStatus> {
        let url = format!("{}/merchant/postservice?form=2", self.api_base_url);
        let form: Vec<(&str, String)> = vec![
            ("key", self.merchant_key.clone()),
            ("command", "verify_payment".to_string()),
            ("var1", gateway_txn_id.to_string()),
            ("hash", self.command_hash("verify_payment", gateway_txn_id)),
        ];

        let response = self
            .http
            .retrying()
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("PayU status check failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read PayU response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "PayU status check - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse PayU response: {}", e)))?;

        let details = &parsed["transaction_details"][gateway_txn_id];
        if details.is_null() {
            return Err(AppError::gateway(format!(
                "PayU verify_payment returned no details for {}",
                gateway_txn_id
            )));
        }

        let txn_status = details["status"].as_str().unwrap_or("");
        let state = match txn_status {
            "success" => RemoteState::Success,
            "failure" | "failed" => RemoteState::Failed,
            _ => RemoteState::Pending,
        };

        let amount = details["transaction_amount"]
            .as_str()
            .or_else(|| details["amt"].as_str())
            .and_then(|a| a.parse::<Decimal>().ok());

        Ok(RemoteStatus {
            state,
            gateway_payment_id: details["mihpayid"].as_str().map(String::from),
            amount,
            currency: Some(Currency::INR),
            payment_method: details["mode"].as_str().map(String::from),
            method_details: None,
            captured_at: (state == RemoteState::Success).then(Utc::now),
            error_code: details["error_code"].as_str().map(String::from),
            error_message: details["error_Message"].as_str().map(String::from),
        })
    }

    async fn process_refund(
        &self,
        gateway_payment_id: &str,
        amount: Decimal,
        _reason: Option<&str>,
    ) -> Result<RefundOutcome> {
        let url = format!("{}/merchant/postservice?form=2", self.api_base_url);
        let token = uuid::Uuid::new_v4().simple().to_string();
        let form: Vec<(&str, String)> = vec![
            ("key", self.merchant_key.clone()),
            ("command", "cancel_refund_transaction".to_string()),
            ("var1", gateway_payment_id.to_string()),
            ("var2", token.clone()),
            ("var3", format!("{:.2}", amount)),
            (
                "hash",
                self.command_hash("cancel_refund_transaction", gateway_payment_id),
            ),
        ];

        let response = self
            .http
            .plain()
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read PayU response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "PayU refund failed - HTTP {} ({})",
                status.as_u16(),
                body
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway(format!("Failed to parse PayU refund: {}", e)))?;

        if parsed["status"].as_i64() != Some(1) {
            return Err(AppError::gateway(format!(
                "PayU refund rejected: {}",
                parsed["msg"].as_str().unwrap_or("unknown error")
            )));
        }

        Ok(RefundOutcome {
            refund_id: parsed["request_id"]
                .as_str()
                .map(String::from)
                .unwrap_or(token),
            status: "queued".to_string(),
            amount,
            processed_at: Utc::now(),
        })
    }

    /// PayU already works in major units.
    fn normalize_amount(&self, amount: Decimal, _currency: Currency) -> Decimal {
        amount.round_dp(2)
    }

    fn denormalize_amount(&self, native: Decimal, _currency: Currency) -> Decimal {
        native
    }
}
