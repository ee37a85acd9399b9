use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::models::GatewayName;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Payment state of a print order.
///
/// `Processing` means a checkout session exists but no confirmation arrived
/// yet. `Completed` is terminal for payment purposes except for refunds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderPaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl fmt::Display for OrderPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderPaymentStatus::Pending => write!(f, "pending"),
            OrderPaymentStatus::Processing => write!(f, "processing"),
            OrderPaymentStatus::Completed => write!(f, "completed"),
            OrderPaymentStatus::Failed => write!(f, "failed"),
            OrderPaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for OrderPaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderPaymentStatus::Pending),
            "processing" => Ok(OrderPaymentStatus::Processing),
            "completed" => Ok(OrderPaymentStatus::Completed),
            "failed" => Ok(OrderPaymentStatus::Failed),
            "refunded" => Ok(OrderPaymentStatus::Refunded),
            _ => Err(format!("Invalid order payment status: {}", s)),
        }
    }
}

/// The payment-facing slice of a print order.
///
/// Orders are created elsewhere in the platform; this module only reads them
/// and writes their payment columns.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PrintOrder {
    pub id: String,

    /// Human-facing order reference (e.g. "PO-2024-00042").
    pub order_number: String,

    pub user_id: Option<String>,

    pub total_amount: Decimal,

    /// ISO 4217 code as stored; parse with [`PrintOrder::currency`].
    pub currency: String,

    pub payment_status: OrderPaymentStatus,

    /// Gateway that took (or is taking) the payment.
    pub payment_gateway: Option<GatewayName>,

    /// Ledger transaction currently associated with this order.
    pub payment_transaction_id: Option<String>,

    pub paid_at: Option<NaiveDateTime>,

    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,

    #[sqlx(default)]
    pub created_at: NaiveDateTime,
    #[sqlx(default)]
    pub updated_at: NaiveDateTime,
}

impl PrintOrder {
    pub fn currency(&self) -> Result<Currency> {
        Currency::from_str(&self.currency)
            .map_err(|e| AppError::validation(format!("Order has invalid currency: {}", e)))
    }

    /// Whether a new checkout session may be opened for this order.
    pub fn is_payable(&self) -> bool {
        matches!(
            self.payment_status,
            OrderPaymentStatus::Pending | OrderPaymentStatus::Processing | OrderPaymentStatus::Failed
        )
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == OrderPaymentStatus::Completed
    }
}
