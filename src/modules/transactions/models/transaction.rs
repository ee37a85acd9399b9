use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::models::GatewayName;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Ledger state machine.
///
/// `Created → Attempted → {Success | Failed}`, with `Expired` entered from
/// `Created` once `expires_at` passes. A late gateway confirmation may still
/// move an expired row to `Success`; money that moved is always recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Created,
    Attempted,
    Success,
    Failed,
    Expired,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Created => write!(f, "created"),
            TransactionStatus::Attempted => write!(f, "attempted"),
            TransactionStatus::Success => write!(f, "success"),
            TransactionStatus::Failed => write!(f, "failed"),
            TransactionStatus::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => Ok(TransactionStatus::Created),
            "attempted" => Ok(TransactionStatus::Attempted),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            "expired" => Ok(TransactionStatus::Expired),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

/// One payment attempt against one gateway. Rows are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentTransaction {
    /// UUID, generated before the gateway call so redirect gateways can use
    /// it as their merchant reference.
    pub id: String,

    /// Primary order; bulk payments list every order id in `metadata`.
    pub order_id: String,

    pub user_id: Option<String>,

    pub gateway: GatewayName,

    /// Gateway-side session/order reference returned by `initialize`.
    pub gateway_order_id: String,

    pub amount: Decimal,

    /// ISO 4217 code as stored; parse with [`PaymentTransaction::currency`].
    pub currency: String,

    pub status: TransactionStatus,

    /// Gateway-side payment/capture id, set on confirmation.
    pub gateway_payment_id: Option<String>,

    pub payment_method: Option<String>,

    /// Gateway-native method detail blob (card network, UPI handle, ...).
    pub method_details: Option<serde_json::Value>,

    pub error_code: Option<String>,
    pub error_message: Option<String>,

    pub expires_at: Option<NaiveDateTime>,
    pub captured_at: Option<NaiveDateTime>,

    /// `order_ids` for bulk payments, stored checkout session for resume,
    /// refund record after a refund.
    pub metadata: Option<serde_json::Value>,

    #[sqlx(default)]
    pub created_at: NaiveDateTime,
    #[sqlx(default)]
    pub updated_at: NaiveDateTime,
}

impl PaymentTransaction {
    pub fn currency(&self) -> Result<Currency> {
        Currency::from_str(&self.currency)
            .map_err(|e| AppError::internal(format!("Transaction has invalid currency: {}", e)))
    }

    /// Overdue `Created` rows are reported (and lazily marked) expired.
    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        self.status == TransactionStatus::Created
            && self.expires_at.map(|at| at < now).unwrap_or(false)
    }

    /// A checkout session that can be handed back to the client.
    pub fn is_resumable(&self, now: NaiveDateTime) -> bool {
        self.status == TransactionStatus::Created && !self.is_overdue(now)
    }

    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    /// Every order this transaction pays for.
    pub fn order_ids(&self) -> Vec<String> {
        let from_metadata = self
            .metadata
            .as_ref()
            .and_then(|m| m.get("order_ids"))
            .and_then(|ids| ids.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if from_metadata.is_empty() {
            vec![self.order_id.clone()]
        } else {
            from_metadata
        }
    }

    pub fn refund_record(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref().and_then(|m| m.get("refund"))
    }
}

/// Confirmation details applied when a transaction reaches `Success`.
#[derive(Debug, Clone, Default)]
pub struct PaymentConfirmation {
    pub gateway_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub method_details: Option<serde_json::Value>,
    pub captured_at: Option<NaiveDateTime>,
}
