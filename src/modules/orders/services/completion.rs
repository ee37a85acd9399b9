use crate::modules::gateways::models::GatewayName;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

/// Emitted once per transaction when a payment is confirmed.
#[derive(Debug, Clone)]
pub struct PaymentCompleted {
    pub order_id: String,
    pub order_number: String,
    pub transaction_id: String,
    pub gateway: GatewayName,
    pub amount: Decimal,
    pub currency: String,
}

/// Downstream notification point for confirmed payments.
///
/// Fired by whichever path wins the ledger's success transition, so a
/// callback and a webhook for the same payment produce exactly one call.
/// Deployments plug fulfillment kickoff or receipt email in here.
#[async_trait]
pub trait PaymentCompletedHook: Send + Sync {
    async fn on_payment_completed(&self, event: &PaymentCompleted);
}

/// Default hook: structured log only.
pub struct LoggingCompletionHook;

#[async_trait]
impl PaymentCompletedHook for LoggingCompletionHook {
    async fn on_payment_completed(&self, event: &PaymentCompleted) {
        info!(
            order_id = %event.order_id,
            order_number = %event.order_number,
            transaction_id = %event.transaction_id,
            gateway = %event.gateway,
            amount = %event.amount,
            currency = %event.currency,
            "Order payment completed"
        );
    }
}
