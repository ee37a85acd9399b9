use crate::core::{AppError, Result};
use crate::modules::gateways::adapters::{
    CallbackContext, CheckoutFlow, CustomerInfo, InitializeContext, PaymentProvider, RemoteState,
    RemoteStatus,
};
use crate::modules::gateways::models::GatewayName;
use crate::modules::gateways::services::{PaymentRouter, SelectionCriteria};
use crate::modules::orders::models::PrintOrder;
use crate::modules::orders::repositories::OrderStore;
use crate::modules::orders::services::{PaymentCompleted, PaymentCompletedHook};
use crate::modules::transactions::models::{
    PaymentConfirmation, PaymentTransaction, TransactionStatus,
};
use crate::modules::transactions::repositories::TransactionStore;
use chrono::{NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentRequest {
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_ids: Vec<String>,
    pub preferred_gateway: Option<String>,
    pub payment_method: Option<String>,
    pub country: Option<String>,
    /// Client-side echo of the expected charge; rejected on mismatch.
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentResponse {
    pub transaction_id: String,
    pub gateway: GatewayName,
    pub gateway_order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub checkout_payload: serde_json::Value,
    pub checkout_url: Option<String>,
    pub redirect_required: bool,
    pub expires_at: Option<NaiveDateTime>,
    pub resumed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub gateway: GatewayName,
    pub gateway_payment_id: Option<String>,
    pub order_ids: Vec<String>,
    pub verified: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub transaction_id: String,
    pub order_id: String,
    pub order_ids: Vec<String>,
    pub gateway: GatewayName,
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub gateway_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub expires_at: Option<NaiveDateTime>,
    pub captured_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    /// Defaults to the full transaction amount.
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub transaction_id: String,
    pub refund_id: String,
    pub status: String,
    pub amount: Decimal,
    pub processed_at: NaiveDateTime,
}

/// Orchestrates the payment lifecycle over orders, the ledger and the router.
///
/// All confirmation paths funnel through [`PaymentService::confirm_success`],
/// so the order update and completion hook fire exactly once no matter how
/// many callbacks and webhooks arrive for the same payment.
pub struct PaymentService {
    orders: Arc<dyn OrderStore>,
    transactions: Arc<dyn TransactionStore>,
    router: Arc<PaymentRouter>,
    hook: Arc<dyn PaymentCompletedHook>,
    payment_expiry: chrono::Duration,
    public_base_url: String,
}

impl PaymentService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        transactions: Arc<dyn TransactionStore>,
        router: Arc<PaymentRouter>,
        hook: Arc<dyn PaymentCompletedHook>,
        payment_expiry: chrono::Duration,
        public_base_url: String,
    ) -> Self {
        Self {
            orders,
            transactions,
            router,
            hook,
            payment_expiry,
            public_base_url,
        }
    }

    /// Start (or resume) a checkout session for one or more orders.
    pub async fn initialize_payment(
        &self,
        request: InitializePaymentRequest,
    ) -> Result<InitializePaymentResponse> {
        let ids = collect_order_ids(&request)?;
        let orders = self.load_orders(&ids).await?;
        let primary = &orders[0];

        for order in &orders {
            if !order.is_payable() {
                return Err(AppError::conflict(format!(
                    "Order {} is already {}",
                    order.order_number, order.payment_status
                )));
            }
        }

        let currency = primary.currency()?;
        for order in &orders[1..] {
            if !order.currency.eq_ignore_ascii_case(currency.as_str()) {
                return Err(AppError::validation(
                    "Bulk payment requires all orders in the same currency",
                ));
            }
        }

        let total: Decimal = orders.iter().map(|o| o.total_amount).sum();
        let amount = currency.round(total);
        currency.validate_amount(amount).map_err(AppError::validation)?;

        if let Some(client_amount) = request.amount {
            if currency.round(client_amount) != amount {
                return Err(AppError::validation(format!(
                    "Requested amount {} does not match order total {}",
                    client_amount, amount
                )));
            }
        }
        if let Some(ref code) = request.currency {
            if !code.eq_ignore_ascii_case(currency.as_str()) {
                return Err(AppError::validation(format!(
                    "Requested currency {} does not match order currency {}",
                    code, currency
                )));
            }
        }

        // Resume an embedded-flow session when one is still open and matches;
        // anything else is closed out so at most one open session exists.
        if let Some(open) = self.transactions.find_open_by_order(&primary.id).await? {
            let now = Utc::now().naive_utc();
            let resumable = open.is_resumable(now)
                && open.order_ids() == ids
                && open.amount == amount
                && self.router.flow_of(open.gateway).await == Some(CheckoutFlow::Embedded);

            if resumable {
                if let Some(response) = resume_response(&open) {
                    info!(
                        transaction_id = %open.id,
                        gateway = %open.gateway,
                        "Resuming open checkout session"
                    );
                    return Ok(response);
                }
            }
            self.transactions.mark_expired(&open.id).await?;
        }

        let preferred = request
            .preferred_gateway
            .as_deref()
            .map(GatewayName::from_str)
            .transpose()
            .map_err(AppError::validation)?;

        let ctx = InitializeContext {
            transaction_id: Uuid::new_v4().to_string(),
            order_id: primary.id.clone(),
            user_id: primary.user_id.clone(),
            amount,
            currency,
            customer: CustomerInfo {
                name: Some(primary.customer_name.clone()),
                email: Some(primary.customer_email.clone()),
                phone: primary.customer_phone.clone(),
            },
            payment_method: request.payment_method.clone(),
            callback_url: format!(
                "{}/payment/verify",
                self.public_base_url.trim_end_matches('/')
            ),
            notes: json!({
                "order_number": primary.order_number,
                "order_ids": ids,
            }),
        };
        let criteria = SelectionCriteria {
            amount,
            currency,
            country: request.country.as_deref(),
            payment_method: request.payment_method.as_deref(),
            exclude: &[],
        };

        let (gateway, session) = self.router.route_initialize(&ctx, &criteria, preferred).await?;

        let now = Utc::now().naive_utc();
        let transaction = PaymentTransaction {
            id: ctx.transaction_id,
            order_id: primary.id.clone(),
            user_id: primary.user_id.clone(),
            gateway,
            gateway_order_id: session.gateway_order_id.clone(),
            amount,
            currency: currency.as_str().to_string(),
            status: TransactionStatus::Created,
            gateway_payment_id: None,
            payment_method: request.payment_method,
            method_details: None,
            error_code: None,
            error_message: None,
            expires_at: Some(
                session
                    .expires_at
                    .naive_utc()
                    .min(now + self.payment_expiry),
            ),
            captured_at: None,
            metadata: Some(json!({
                "order_ids": ids,
                "session": {
                    "checkout_payload": session.checkout_payload,
                    "checkout_url": session.checkout_url,
                    "redirect_required": session.redirect_required,
                },
            })),
            created_at: now,
            updated_at: now,
        };
        self.transactions.insert(&transaction).await?;

        for id in &ids {
            self.orders.mark_processing(id, gateway, &transaction.id).await?;
        }

        info!(
            transaction_id = %transaction.id,
            gateway = %gateway,
            amount = %amount,
            currency = %currency,
            orders = ids.len(),
            "Payment initialized"
        );

        Ok(InitializePaymentResponse {
            transaction_id: transaction.id,
            gateway,
            gateway_order_id: session.gateway_order_id,
            amount,
            currency: currency.as_str().to_string(),
            checkout_payload: session.checkout_payload,
            checkout_url: session.checkout_url,
            redirect_required: session.redirect_required,
            expires_at: transaction.expires_at,
            resumed: false,
        })
    }

    /// Client-side confirmation after checkout.
    ///
    /// Accepts Razorpay handshake fields, PayU response-form fields, or a
    /// generic `transactionId`, and confirms against signature or remote
    /// state as the gateway allows.
    pub async fn verify_payment(
        &self,
        payload: serde_json::Value,
    ) -> Result<VerifyPaymentResponse> {
        if payload.get("razorpay_order_id").is_some() || payload.get("razorpay_payment_id").is_some()
        {
            return self.verify_razorpay_callback(payload).await;
        }
        if payload.get("txnid").is_some() && payload.get("hash").is_some() {
            return self.verify_payu_callback(payload).await;
        }
        if let Some(id) = string_field(&payload, &["transactionId", "transaction_id"]) {
            return self.verify_by_remote_status(&id).await;
        }

        Err(AppError::validation(
            "Verification payload not recognized; expected razorpay_* fields, PayU form fields, or transactionId",
        ))
    }

    async fn verify_razorpay_callback(
        &self,
        payload: serde_json::Value,
    ) -> Result<VerifyPaymentResponse> {
        let order_id = payload
            .get("razorpay_order_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::validation("razorpay_order_id is required"))?
            .to_string();
        let payment_id = payload
            .get("razorpay_payment_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::validation("razorpay_payment_id is required"))?
            .to_string();

        let transaction = self
            .transactions
            .find_by_gateway_order_id(&order_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("No transaction for gateway order '{}'", order_id))
            })?;
        if transaction.is_success() {
            return Ok(self.verified_response(transaction));
        }

        self.transactions.mark_attempted(&transaction.id).await?;
        let adapter = self.adapter_for(&transaction).await?;

        if !adapter.verify_signature(&CallbackContext::from_payload(payload)) {
            self.fail_transaction(
                &transaction,
                Some("SIGNATURE_INVALID"),
                Some("Callback signature verification failed"),
            )
            .await?;
            return Err(AppError::SignatureVerification(
                "Razorpay callback signature invalid".to_string(),
            ));
        }

        // Signature proves the handshake; the remote lookup enriches it with
        // capture details and catches payments that failed after authorization.
        let remote = match adapter.check_status(&payment_id).await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(
                    transaction_id = %transaction.id,
                    error = %err,
                    "Status lookup failed after valid signature, confirming from callback"
                );
                RemoteStatus {
                    state: RemoteState::Success,
                    gateway_payment_id: Some(payment_id.clone()),
                    ..RemoteStatus::pending()
                }
            }
        };

        if remote.state == RemoteState::Failed {
            self.fail_transaction(
                &transaction,
                remote.error_code.as_deref(),
                remote.error_message.as_deref(),
            )
            .await?;
            return Ok(VerifyPaymentResponse {
                transaction_id: transaction.id.clone(),
                status: TransactionStatus::Failed,
                gateway: transaction.gateway,
                gateway_payment_id: Some(payment_id),
                order_ids: transaction.order_ids(),
                verified: true,
            });
        }

        let confirmation = PaymentConfirmation {
            gateway_payment_id: remote.gateway_payment_id.or(Some(payment_id)),
            payment_method: remote.payment_method,
            method_details: remote.method_details,
            captured_at: remote.captured_at.map(|t| t.naive_utc()),
        };
        self.confirm_success(&transaction, &confirmation).await?;

        Ok(VerifyPaymentResponse {
            transaction_id: transaction.id.clone(),
            status: TransactionStatus::Success,
            gateway: transaction.gateway,
            gateway_payment_id: confirmation.gateway_payment_id,
            order_ids: transaction.order_ids(),
            verified: true,
        })
    }

    async fn verify_payu_callback(
        &self,
        payload: serde_json::Value,
    ) -> Result<VerifyPaymentResponse> {
        let txnid = payload
            .get("txnid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::validation("txnid is required"))?
            .to_string();

        let transaction = self
            .transactions
            .find_by_id(&txnid)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Transaction '{}' not found", txnid)))?;
        if transaction.is_success() {
            return Ok(self.verified_response(transaction));
        }

        self.transactions.mark_attempted(&transaction.id).await?;
        let adapter = self.adapter_for(&transaction).await?;

        let status = payload
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let mihpayid = string_field(&payload, &["mihpayid"]);
        let mode = string_field(&payload, &["mode"]);
        let error_message = string_field(&payload, &["error_Message", "error_message"]);

        if !adapter.verify_signature(&CallbackContext::from_payload(payload)) {
            self.fail_transaction(
                &transaction,
                Some("SIGNATURE_INVALID"),
                Some("Response hash verification failed"),
            )
            .await?;
            return Err(AppError::SignatureVerification(
                "PayU response hash invalid".to_string(),
            ));
        }

        match status.as_str() {
            "success" => {
                let confirmation = PaymentConfirmation {
                    gateway_payment_id: mihpayid,
                    payment_method: mode,
                    method_details: None,
                    captured_at: Some(Utc::now().naive_utc()),
                };
                self.confirm_success(&transaction, &confirmation).await?;

                Ok(VerifyPaymentResponse {
                    transaction_id: transaction.id.clone(),
                    status: TransactionStatus::Success,
                    gateway: transaction.gateway,
                    gateway_payment_id: confirmation.gateway_payment_id,
                    order_ids: transaction.order_ids(),
                    verified: true,
                })
            }
            "failure" | "failed" => {
                self.fail_transaction(
                    &transaction,
                    Some("PAYMENT_FAILED"),
                    error_message.as_deref(),
                )
                .await?;
                Ok(VerifyPaymentResponse {
                    transaction_id: transaction.id.clone(),
                    status: TransactionStatus::Failed,
                    gateway: transaction.gateway,
                    gateway_payment_id: mihpayid,
                    order_ids: transaction.order_ids(),
                    verified: true,
                })
            }
            _ => Ok(VerifyPaymentResponse {
                transaction_id: transaction.id.clone(),
                status: TransactionStatus::Attempted,
                gateway: transaction.gateway,
                gateway_payment_id: mihpayid,
                order_ids: transaction.order_ids(),
                verified: false,
            }),
        }
    }

    /// Generic path: look the transaction up and ask its gateway directly.
    async fn verify_by_remote_status(&self, transaction_id: &str) -> Result<VerifyPaymentResponse> {
        let transaction = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Transaction '{}' not found", transaction_id))
            })?;
        if transaction.is_success() {
            return Ok(self.verified_response(transaction));
        }

        self.transactions.mark_attempted(&transaction.id).await?;
        let adapter = self.adapter_for(&transaction).await?;

        let reference = status_reference(&transaction)?;
        let remote = adapter.check_status(&reference).await?;

        match remote.state {
            RemoteState::Success => {
                let confirmation = PaymentConfirmation {
                    gateway_payment_id: remote.gateway_payment_id,
                    payment_method: remote.payment_method,
                    method_details: remote.method_details,
                    captured_at: remote.captured_at.map(|t| t.naive_utc()),
                };
                self.confirm_success(&transaction, &confirmation).await?;

                Ok(VerifyPaymentResponse {
                    transaction_id: transaction.id.clone(),
                    status: TransactionStatus::Success,
                    gateway: transaction.gateway,
                    gateway_payment_id: confirmation.gateway_payment_id,
                    order_ids: transaction.order_ids(),
                    verified: true,
                })
            }
            RemoteState::Failed => {
                self.fail_transaction(
                    &transaction,
                    remote.error_code.as_deref(),
                    remote.error_message.as_deref(),
                )
                .await?;
                Ok(VerifyPaymentResponse {
                    transaction_id: transaction.id.clone(),
                    status: TransactionStatus::Failed,
                    gateway: transaction.gateway,
                    gateway_payment_id: remote.gateway_payment_id,
                    order_ids: transaction.order_ids(),
                    verified: true,
                })
            }
            RemoteState::Pending => Ok(VerifyPaymentResponse {
                transaction_id: transaction.id.clone(),
                status: TransactionStatus::Attempted,
                gateway: transaction.gateway,
                gateway_payment_id: remote.gateway_payment_id,
                order_ids: transaction.order_ids(),
                verified: false,
            }),
        }
    }

    /// Ledger view of one transaction, lazily expiring overdue sessions.
    pub async fn payment_status(&self, transaction_id: &str) -> Result<PaymentStatusResponse> {
        let mut transaction = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Transaction '{}' not found", transaction_id))
            })?;

        if transaction.is_overdue(Utc::now().naive_utc())
            && self.transactions.mark_expired(&transaction.id).await?
        {
            transaction.status = TransactionStatus::Expired;
        }

        Ok(PaymentStatusResponse {
            transaction_id: transaction.id.clone(),
            order_id: transaction.order_id.clone(),
            order_ids: transaction.order_ids(),
            gateway: transaction.gateway,
            amount: transaction.amount,
            currency: transaction.currency.clone(),
            status: transaction.status,
            gateway_payment_id: transaction.gateway_payment_id,
            payment_method: transaction.payment_method,
            error_code: transaction.error_code,
            error_message: transaction.error_message,
            expires_at: transaction.expires_at,
            captured_at: transaction.captured_at,
            created_at: transaction.created_at,
        })
    }

    /// Refund a successful payment through its gateway.
    ///
    /// The ledger row stays `success`; the refund is recorded in transaction
    /// metadata and the orders move to `refunded`.
    pub async fn refund_payment(
        &self,
        transaction_id: &str,
        request: RefundRequest,
    ) -> Result<RefundResponse> {
        let transaction = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Transaction '{}' not found", transaction_id))
            })?;

        if !transaction.is_success() {
            return Err(AppError::conflict(format!(
                "Only successful payments can be refunded; transaction is {}",
                transaction.status
            )));
        }
        if transaction.refund_record().is_some() {
            return Err(AppError::conflict("Transaction is already refunded"));
        }

        let amount = request.amount.unwrap_or(transaction.amount);
        if amount <= Decimal::ZERO || amount > transaction.amount {
            return Err(AppError::validation(format!(
                "Refund amount must be between 0 and {}",
                transaction.amount
            )));
        }

        let adapter = self.adapter_for(&transaction).await?;
        let reference = refund_reference(&transaction)?;
        let outcome = adapter
            .process_refund(&reference, amount, request.reason.as_deref())
            .await?;

        let mut metadata = transaction.metadata.clone().unwrap_or_else(|| json!({}));
        if !metadata.is_object() {
            metadata = json!({});
        }
        metadata["refund"] = json!({
            "refund_id": outcome.refund_id,
            "status": outcome.status,
            "amount": outcome.amount,
            "processed_at": outcome.processed_at.naive_utc(),
            "reason": request.reason,
        });
        self.transactions
            .update_metadata(&transaction.id, &metadata)
            .await?;

        for order_id in transaction.order_ids() {
            self.orders.mark_refunded(&order_id).await?;
        }

        info!(
            transaction_id = %transaction.id,
            gateway = %transaction.gateway,
            refund_id = %outcome.refund_id,
            amount = %amount,
            "Payment refunded"
        );

        Ok(RefundResponse {
            transaction_id: transaction.id,
            refund_id: outcome.refund_id,
            status: outcome.status,
            amount: outcome.amount,
            processed_at: outcome.processed_at.naive_utc(),
        })
    }

    /// Sweep for checkout sessions past their deadline.
    pub async fn expire_overdue_sessions(&self) -> Result<u64> {
        let expired = self
            .transactions
            .expire_overdue(Utc::now().naive_utc())
            .await?;
        if expired > 0 {
            info!(expired, "Expired overdue checkout sessions");
        }
        Ok(expired)
    }

    /// Apply a confirmed payment: conditional ledger transition, and the
    /// order update + completion hook only when this call won it.
    pub async fn confirm_success(
        &self,
        transaction: &PaymentTransaction,
        confirmation: &PaymentConfirmation,
    ) -> Result<bool> {
        let transitioned = self
            .transactions
            .mark_success(&transaction.id, confirmation)
            .await?;
        if !transitioned {
            return Ok(false);
        }

        let paid_at = confirmation
            .captured_at
            .unwrap_or_else(|| Utc::now().naive_utc());
        for order_id in transaction.order_ids() {
            self.orders
                .mark_paid(&order_id, transaction.gateway, &transaction.id, paid_at)
                .await?;
        }

        let order_number = self
            .orders
            .find_by_id(&transaction.order_id)
            .await?
            .map(|order| order.order_number)
            .unwrap_or_else(|| transaction.order_id.clone());

        self.hook
            .on_payment_completed(&PaymentCompleted {
                order_id: transaction.order_id.clone(),
                order_number,
                transaction_id: transaction.id.clone(),
                gateway: transaction.gateway,
                amount: transaction.amount,
                currency: transaction.currency.clone(),
            })
            .await;

        Ok(true)
    }

    /// Record a failed payment and mark its orders, keeping the conditional
    /// transition semantics.
    pub async fn fail_transaction(
        &self,
        transaction: &PaymentTransaction,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let transitioned = self
            .transactions
            .mark_failed(&transaction.id, error_code, error_message)
            .await?;
        if transitioned {
            for order_id in transaction.order_ids() {
                self.orders.mark_payment_failed(&order_id).await?;
            }
        }
        Ok(transitioned)
    }

    async fn adapter_for(
        &self,
        transaction: &PaymentTransaction,
    ) -> Result<Arc<dyn PaymentProvider>> {
        self.router.adapter(transaction.gateway).await.ok_or_else(|| {
            AppError::gateway_config(format!(
                "Gateway {} is not loaded; cannot process transaction {}",
                transaction.gateway, transaction.id
            ))
        })
    }

    async fn load_orders(&self, ids: &[String]) -> Result<Vec<PrintOrder>> {
        let fetched = self.orders.find_by_ids(ids).await?;

        let mut ordered = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match fetched.iter().find(|o| &o.id == id) {
                Some(order) => ordered.push(order.clone()),
                None => missing.push(id.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(AppError::not_found(format!(
                "Orders not found: {}",
                missing.join(", ")
            )));
        }

        Ok(ordered)
    }

    fn verified_response(&self, transaction: PaymentTransaction) -> VerifyPaymentResponse {
        VerifyPaymentResponse {
            transaction_id: transaction.id.clone(),
            status: transaction.status,
            gateway: transaction.gateway,
            gateway_payment_id: transaction.gateway_payment_id.clone(),
            order_ids: transaction.order_ids(),
            verified: true,
        }
    }
}

fn collect_order_ids(request: &InitializePaymentRequest) -> Result<Vec<String>> {
    let raw: Vec<String> = match (&request.order_id, request.order_ids.is_empty()) {
        (Some(id), true) => vec![id.clone()],
        (None, false) => request.order_ids.clone(),
        (Some(_), false) => {
            return Err(AppError::validation(
                "Provide either orderId or orderIds, not both",
            ))
        }
        (None, true) => {
            return Err(AppError::validation("orderId or orderIds is required"));
        }
    };

    let mut ids = Vec::with_capacity(raw.len());
    for id in raw {
        if id.trim().is_empty() {
            return Err(AppError::validation("Order ids must not be empty"));
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Rebuild an initialize response from the session stored at creation.
fn resume_response(transaction: &PaymentTransaction) -> Option<InitializePaymentResponse> {
    let session = transaction.metadata.as_ref()?.get("session")?;

    Some(InitializePaymentResponse {
        transaction_id: transaction.id.clone(),
        gateway: transaction.gateway,
        gateway_order_id: transaction.gateway_order_id.clone(),
        amount: transaction.amount,
        currency: transaction.currency.clone(),
        checkout_payload: session
            .get("checkout_payload")
            .cloned()
            .unwrap_or(serde_json::Value::Null),
        checkout_url: session
            .get("checkout_url")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        redirect_required: session
            .get("redirect_required")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        expires_at: transaction.expires_at,
        resumed: true,
    })
}

/// What `check_status` expects as its reference, per gateway.
fn status_reference(transaction: &PaymentTransaction) -> Result<String> {
    match transaction.gateway {
        GatewayName::Razorpay => transaction.gateway_payment_id.clone().ok_or_else(|| {
            AppError::validation(
                "Razorpay status checks need a payment id; verify with razorpay_* fields first",
            )
        }),
        GatewayName::Stripe => Ok(transaction.gateway_order_id.clone()),
        GatewayName::Phonepe | GatewayName::Payu => Ok(transaction.id.clone()),
    }
}

/// What `process_refund` expects as its reference, per gateway.
fn refund_reference(transaction: &PaymentTransaction) -> Result<String> {
    match transaction.gateway {
        GatewayName::Phonepe => Ok(transaction.id.clone()),
        _ => transaction.gateway_payment_id.clone().ok_or_else(|| {
            AppError::validation("Transaction has no gateway payment id to refund against")
        }),
    }
}

fn string_field(payload: &serde_json::Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| payload.get(name).and_then(|v| v.as_str()))
        .map(str::to_string)
}
