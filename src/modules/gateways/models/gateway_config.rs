use crate::core::Currency;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// The gateways this platform can route to.
///
/// Adapters register under these names; webhook identification resolves to
/// them. Stored as lowercase strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(32)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GatewayName {
    Razorpay,
    Stripe,
    Phonepe,
    Payu,
}

impl GatewayName {
    pub const ALL: [GatewayName; 4] = [
        GatewayName::Razorpay,
        GatewayName::Stripe,
        GatewayName::Phonepe,
        GatewayName::Payu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayName::Razorpay => "razorpay",
            GatewayName::Stripe => "stripe",
            GatewayName::Phonepe => "phonepe",
            GatewayName::Payu => "payu",
        }
    }
}

impl fmt::Display for GatewayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "razorpay" => Ok(GatewayName::Razorpay),
            "stripe" => Ok(GatewayName::Stripe),
            "phonepe" => Ok(GatewayName::Phonepe),
            "payu" => Ok(GatewayName::Payu),
            other => Err(format!("Unknown gateway: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    Sandbox,
    Production,
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayMode::Sandbox => write!(f, "sandbox"),
            GatewayMode::Production => write!(f, "production"),
        }
    }
}

/// Persisted per-gateway configuration.
///
/// Exactly one row per gateway name. Credential columns hold vault output
/// (`iv:tag:ciphertext`) or legacy plaintext; they never leave the server in
/// API responses.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GatewayConfig {
    pub id: String,
    pub name: GatewayName,
    pub is_active: bool,

    /// Lower value = tried first under PRIORITY ranking.
    pub priority: i32,

    /// 0-100 share for TRAFFIC_SPLIT ranking.
    pub traffic_weight: i32,

    pub mode: GatewayMode,

    #[serde(skip_serializing)]
    pub sandbox_public_key: String,
    #[serde(skip_serializing)]
    pub sandbox_secret_key: String,
    #[serde(skip_serializing)]
    pub live_public_key: String,
    #[serde(skip_serializing)]
    pub live_secret_key: String,

    #[sqlx(json)]
    pub supported_currencies: Vec<String>,
    #[sqlx(json)]
    pub supported_countries: Vec<String>,
    #[sqlx(json)]
    pub supported_methods: Vec<String>,

    pub min_amount: Decimal,
    /// Zero means no upper cap.
    pub max_amount: Decimal,

    pub is_healthy: bool,
    pub unhealthy_until: Option<NaiveDateTime>,
    pub failure_count: i32,

    /// Fee percentage charged by the gateway, used by INTELLIGENT ranking.
    pub transaction_rate: Decimal,

    pub webhook_url: Option<String>,
    pub callback_url: Option<String>,

    #[sqlx(default)]
    pub created_at: NaiveDateTime,
    #[sqlx(default)]
    pub updated_at: NaiveDateTime,
}

/// Decrypted credential pair for the configured mode.
#[derive(Clone)]
pub struct GatewayCredentials {
    pub public_key: String,
    pub secret_key: String,
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl GatewayConfig {
    /// Check if gateway supports a specific currency
    pub fn supports_currency(&self, currency: Currency) -> bool {
        self.supported_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(currency.as_str()))
    }

    /// Empty country list means no restriction.
    pub fn supports_country(&self, country: &str) -> bool {
        self.supported_countries.is_empty()
            || self
                .supported_countries
                .iter()
                .any(|c| c.eq_ignore_ascii_case(country))
    }

    /// Empty method list means every method is accepted.
    pub fn supports_method(&self, method: &str) -> bool {
        self.supported_methods.is_empty()
            || self
                .supported_methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(method))
    }

    pub fn amount_within_limits(&self, amount: Decimal) -> bool {
        if amount < self.min_amount {
            return false;
        }
        self.max_amount.is_zero() || amount <= self.max_amount
    }

    /// Health state with timed auto-recovery: an unhealthy gateway re-enters
    /// rotation once `unhealthy_until` has passed.
    pub fn healthy_at(&self, now: NaiveDateTime) -> bool {
        if self.is_healthy {
            return true;
        }
        match self.unhealthy_until {
            Some(until) => now >= until,
            None => false,
        }
    }

    /// The credential pair for the configured mode, still in stored form.
    pub fn credential_pair(&self) -> (&str, &str) {
        match self.mode {
            GatewayMode::Sandbox => (&self.sandbox_public_key, &self.sandbox_secret_key),
            GatewayMode::Production => (&self.live_public_key, &self.live_secret_key),
        }
    }
}
