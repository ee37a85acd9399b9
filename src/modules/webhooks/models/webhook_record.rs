use crate::modules::gateways::models::GatewayName;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use std::fmt;

/// Headers never persisted to the audit log.
const SENSITIVE_HEADERS: [&str; 3] = ["authorization", "cookie", "proxy-authorization"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Received,
    Processing,
    Processed,
    Failed,
    Duplicate,
}

impl fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookStatus::Received => write!(f, "received"),
            WebhookStatus::Processing => write!(f, "processing"),
            WebhookStatus::Processed => write!(f, "processed"),
            WebhookStatus::Failed => write!(f, "failed"),
            WebhookStatus::Duplicate => write!(f, "duplicate"),
        }
    }
}

/// One inbound webhook delivery, append-only.
///
/// Every delivery gets a row before any processing happens, including
/// duplicates, forgeries and deliveries from gateways we cannot identify
/// (`gateway` NULL). Idempotency is not enforced here but in the separate
/// dedup claim table, so the audit trail stays complete.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookRecord {
    pub id: String,

    /// None = sender not identified.
    pub gateway: Option<GatewayName>,

    /// Gateway-native event vocabulary (`payment.captured`, ...).
    pub event_type: Option<String>,

    /// Gateway-side delivery/event id used for deduplication.
    pub event_id: Option<String>,

    pub raw_payload: serde_json::Value,

    /// Sanitized headers; see [`sanitize_headers`].
    pub headers: serde_json::Value,

    pub signature: Option<String>,
    pub verified: bool,

    pub status: WebhookStatus,
    pub attempts: i32,

    pub transaction_id: Option<String>,
    pub order_id: Option<String>,
    pub error_message: Option<String>,

    pub source_ip: Option<String>,

    pub received_at: NaiveDateTime,
    pub processed_at: Option<NaiveDateTime>,
}

/// Header map for the audit log, secrets stripped, keys lowercased.
pub fn sanitize_headers(headers: &HashMap<String, String>) -> serde_json::Value {
    let sanitized: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.to_ascii_lowercase();
            if SENSITIVE_HEADERS.contains(&name.as_str()) {
                None
            } else {
                Some((name, serde_json::Value::String(value.clone())))
            }
        })
        .collect();

    serde_json::Value::Object(sanitized)
}
