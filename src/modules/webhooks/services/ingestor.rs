//! Webhook ingestion pipeline.
//!
//! Every delivery runs identify -> audit -> claim -> verify -> interpret ->
//! dispatch. The audit insert happens before anything else so even malformed
//! or forged deliveries leave a row; once that row exists the gateway always
//! gets a 200 (gateways retry on anything else, and our dedup claims make
//! retries harmless anyway).

use super::interpreters::{
    self, extract_signature, identify_gateway, Interpretation, TxnReference, WebhookAction,
};
use crate::core::{AppError, Result};
use crate::modules::gateways::adapters::CallbackContext;
use crate::modules::gateways::models::GatewayName;
use crate::modules::gateways::services::PaymentRouter;
use crate::modules::transactions::{PaymentService, PaymentTransaction, TransactionStore};
use crate::modules::webhooks::models::{sanitize_headers, WebhookRecord, WebhookStatus};
use crate::modules::webhooks::repositories::WebhookStore;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One raw HTTP delivery, as received.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub raw_body: String,
    pub headers: HashMap<String, String>,
    pub source_ip: Option<String>,
}

/// Where a delivery ended up. Every variant maps to a 200 response; the
/// distinction is for the audit trail and tests.
#[derive(Debug)]
pub enum WebhookOutcome {
    Processed {
        record_id: String,
        gateway: GatewayName,
        transaction_id: String,
        /// False when the ledger row was already in a final state.
        transitioned: bool,
    },
    Ignored {
        record_id: String,
        gateway: GatewayName,
        reason: String,
    },
    Duplicate {
        record_id: String,
        gateway: GatewayName,
        event_id: String,
    },
    Unidentified {
        record_id: String,
    },
    InvalidSignature {
        record_id: String,
        gateway: GatewayName,
    },
    Error {
        record_id: String,
        error: String,
    },
}

impl WebhookOutcome {
    /// Response body for the gateway. Always acknowledges receipt; failure
    /// detail stays in the audit log, not on the wire.
    pub fn http_body(&self) -> Value {
        match self {
            WebhookOutcome::Processed {
                record_id,
                gateway,
                transaction_id,
                ..
            } => json!({
                "received": true,
                "status": "processed",
                "webhookId": record_id,
                "gateway": gateway.as_str(),
                "transactionId": transaction_id,
            }),
            WebhookOutcome::Ignored {
                record_id, gateway, ..
            } => json!({
                "received": true,
                "status": "ignored",
                "webhookId": record_id,
                "gateway": gateway.as_str(),
            }),
            WebhookOutcome::Duplicate {
                record_id, gateway, ..
            } => json!({
                "received": true,
                "status": "duplicate",
                "webhookId": record_id,
                "gateway": gateway.as_str(),
            }),
            WebhookOutcome::Unidentified { record_id } => json!({
                "received": true,
                "status": "unidentified",
                "webhookId": record_id,
            }),
            WebhookOutcome::InvalidSignature { record_id, gateway } => json!({
                "received": true,
                "status": "rejected",
                "webhookId": record_id,
                "gateway": gateway.as_str(),
            }),
            WebhookOutcome::Error { record_id, .. } => json!({
                "received": true,
                "status": "error",
                "webhookId": record_id,
            }),
        }
    }
}

pub struct WebhookIngestor {
    store: Arc<dyn WebhookStore>,
    transactions: Arc<dyn TransactionStore>,
    payments: Arc<PaymentService>,
    router: Arc<PaymentRouter>,
}

impl WebhookIngestor {
    pub fn new(
        store: Arc<dyn WebhookStore>,
        transactions: Arc<dyn TransactionStore>,
        payments: Arc<PaymentService>,
        router: Arc<PaymentRouter>,
    ) -> Self {
        Self {
            store,
            transactions,
            payments,
            router,
        }
    }

    /// Run a delivery through the pipeline. Returns `Err` only when the audit
    /// insert itself fails; anything after that is absorbed into an outcome so
    /// the HTTP layer can still acknowledge.
    pub async fn process(&self, delivery: WebhookDelivery) -> Result<WebhookOutcome> {
        let payload: Value = serde_json::from_str(&delivery.raw_body).unwrap_or(Value::Null);
        let ctx = CallbackContext::new(
            delivery.raw_body.clone(),
            payload,
            delivery.headers.clone(),
        );

        let gateway = identify_gateway(&ctx);
        let interpretation = gateway.map(|g| interpreters::interpret(g, &ctx));

        let record = WebhookRecord {
            id: Uuid::new_v4().to_string(),
            gateway,
            event_type: interpretation.as_ref().and_then(|i| i.event_type.clone()),
            event_id: interpretation.as_ref().and_then(|i| i.event_id.clone()),
            raw_payload: ctx.payload.clone(),
            headers: sanitize_headers(&delivery.headers),
            signature: extract_signature(gateway, &ctx),
            verified: false,
            status: WebhookStatus::Received,
            attempts: 1,
            transaction_id: None,
            order_id: None,
            error_message: None,
            source_ip: delivery.source_ip,
            received_at: Utc::now().naive_utc(),
            processed_at: None,
        };
        self.store.insert(&record).await?;

        match self.run_pipeline(&record, &ctx, interpretation).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(record_id = %record.id, error = %err, "Webhook processing failed");
                if let Err(mark_err) = self.store.mark_failed(&record.id, &err.to_string()).await {
                    error!(record_id = %record.id, error = %mark_err, "Could not record webhook failure");
                }
                Ok(WebhookOutcome::Error {
                    record_id: record.id,
                    error: err.to_string(),
                })
            }
        }
    }

    async fn run_pipeline(
        &self,
        record: &WebhookRecord,
        ctx: &CallbackContext,
        interpretation: Option<Interpretation>,
    ) -> Result<WebhookOutcome> {
        let (Some(gateway), Some(interpretation)) = (record.gateway, interpretation) else {
            warn!(record_id = %record.id, "Webhook from unidentified source");
            self.store.mark_failed(&record.id, "unidentified gateway").await?;
            return Ok(WebhookOutcome::Unidentified {
                record_id: record.id.clone(),
            });
        };

        // Claim before verifying: the claim is what makes concurrent
        // duplicate deliveries collapse to one processing attempt.
        if let Some(event_id) = record.event_id.as_deref() {
            let claimed = self.store.claim_event(gateway, event_id, &record.id).await?;
            if !claimed {
                info!(gateway = %gateway, event_id, "Duplicate webhook delivery");
                self.store.mark_duplicate(&record.id).await?;
                return Ok(WebhookOutcome::Duplicate {
                    record_id: record.id.clone(),
                    gateway,
                    event_id: event_id.to_string(),
                });
            }
        } else {
            debug!(record_id = %record.id, gateway = %gateway, "No event id; dedup skipped");
        }

        let Some(adapter) = self.router.adapter(gateway).await else {
            self.store
                .mark_failed(&record.id, "gateway adapter not configured")
                .await?;
            return Ok(WebhookOutcome::Error {
                record_id: record.id.clone(),
                error: "gateway adapter not configured".to_string(),
            });
        };

        if !adapter.verify_signature(ctx) {
            // A forged delivery must not poison the dedup table for the
            // authentic one still on its way.
            if let Some(event_id) = record.event_id.as_deref() {
                self.store.release_claim(gateway, event_id).await?;
            }
            warn!(record_id = %record.id, gateway = %gateway, "Webhook signature verification failed");
            self.store.mark_failed(&record.id, "invalid signature").await?;
            return Ok(WebhookOutcome::InvalidSignature {
                record_id: record.id.clone(),
                gateway,
            });
        }

        self.store.mark_processing(&record.id, true).await?;
        self.dispatch(record, gateway, interpretation.action).await
    }

    async fn dispatch(
        &self,
        record: &WebhookRecord,
        gateway: GatewayName,
        action: WebhookAction,
    ) -> Result<WebhookOutcome> {
        match action {
            WebhookAction::Ignore { reason } => {
                info!(record_id = %record.id, gateway = %gateway, reason = %reason, "Webhook acknowledged without action");
                self.store.mark_processed(&record.id, None, None).await?;
                Ok(WebhookOutcome::Ignored {
                    record_id: record.id.clone(),
                    gateway,
                    reason,
                })
            }
            WebhookAction::ConfirmPayment {
                reference,
                confirmation,
            } => {
                let Some(transaction) = self.resolve(&reference).await? else {
                    return self.unmatched(record, gateway, &reference).await;
                };
                let transitioned = self
                    .payments
                    .confirm_success(&transaction, &confirmation)
                    .await?;
                self.store
                    .mark_processed(&record.id, Some(&transaction.id), Some(&transaction.order_id))
                    .await?;
                info!(
                    record_id = %record.id,
                    gateway = %gateway,
                    transaction_id = %transaction.id,
                    transitioned,
                    "Webhook confirmed payment"
                );
                Ok(WebhookOutcome::Processed {
                    record_id: record.id.clone(),
                    gateway,
                    transaction_id: transaction.id,
                    transitioned,
                })
            }
            WebhookAction::FailPayment {
                reference,
                error_code,
                error_message,
            } => {
                let Some(transaction) = self.resolve(&reference).await? else {
                    return self.unmatched(record, gateway, &reference).await;
                };
                let transitioned = self
                    .payments
                    .fail_transaction(
                        &transaction,
                        error_code.as_deref(),
                        error_message.as_deref(),
                    )
                    .await?;
                self.store
                    .mark_processed(&record.id, Some(&transaction.id), Some(&transaction.order_id))
                    .await?;
                info!(
                    record_id = %record.id,
                    gateway = %gateway,
                    transaction_id = %transaction.id,
                    transitioned,
                    "Webhook failed payment"
                );
                Ok(WebhookOutcome::Processed {
                    record_id: record.id.clone(),
                    gateway,
                    transaction_id: transaction.id,
                    transitioned,
                })
            }
        }
    }

    async fn resolve(&self, reference: &TxnReference) -> Result<Option<PaymentTransaction>> {
        match reference {
            TxnReference::GatewayOrder(id) => self.transactions.find_by_gateway_order_id(id).await,
            TxnReference::Ledger(id) => self.transactions.find_by_id(id).await,
        }
    }

    /// Verified event pointing at a transaction we do not have. The claim is
    /// kept so a replay after investigation does not race a late duplicate.
    async fn unmatched(
        &self,
        record: &WebhookRecord,
        gateway: GatewayName,
        reference: &TxnReference,
    ) -> Result<WebhookOutcome> {
        warn!(
            record_id = %record.id,
            gateway = %gateway,
            ?reference,
            "Webhook references unknown transaction"
        );
        self.store
            .mark_failed(&record.id, "transaction not found")
            .await?;
        Ok(WebhookOutcome::Error {
            record_id: record.id.clone(),
            error: "transaction not found".to_string(),
        })
    }

    /// Re-run a failed record through interpret/dispatch.
    ///
    /// Signature verification is skipped when the first delivery already
    /// passed it: the stored payload is re-serialized JSON, and an HMAC over
    /// those bytes would reject events that were genuine on the wire.
    pub async fn replay(&self, record_id: &str) -> Result<WebhookOutcome> {
        let record = self
            .store
            .find_by_id(record_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Webhook record {} not found", record_id)))?;

        if record.status != WebhookStatus::Failed {
            return Err(AppError::conflict(format!(
                "Webhook {} is {}; only failed records can be replayed",
                record_id, record.status
            )));
        }
        let Some(gateway) = record.gateway else {
            return Err(AppError::validation(
                "Webhook has no identified gateway to replay against",
            ));
        };

        self.store.increment_attempts(&record.id).await?;

        let headers = headers_from_json(&record.headers);
        let ctx = CallbackContext::new(record.raw_payload.to_string(), record.raw_payload.clone(), headers);

        if !record.verified {
            let Some(adapter) = self.router.adapter(gateway).await else {
                return Err(AppError::gateway_config("Gateway adapter not configured"));
            };
            if !adapter.verify_signature(&ctx) {
                self.store.mark_failed(&record.id, "invalid signature").await?;
                return Ok(WebhookOutcome::InvalidSignature {
                    record_id: record.id.clone(),
                    gateway,
                });
            }
        }
        self.store.mark_processing(&record.id, true).await?;

        let interpretation = interpreters::interpret(gateway, &ctx);
        match self.dispatch(&record, gateway, interpretation.action).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if let Err(mark_err) = self.store.mark_failed(&record.id, &err.to_string()).await {
                    error!(record_id = %record.id, error = %mark_err, "Could not record replay failure");
                }
                Err(err)
            }
        }
    }

    pub async fn failed_for_retry(&self, limit: i64) -> Result<Vec<WebhookRecord>> {
        self.store.find_failed_for_retry(limit).await
    }
}

fn headers_from_json(headers: &Value) -> HashMap<String, String> {
    headers
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(name, value)| {
                    value.as_str().map(|v| (name.clone(), v.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}
