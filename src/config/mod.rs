use crate::core::{AppError, Result};
use serde::Deserialize;
use std::env;

pub mod database;
pub mod server;

pub use database::DatabaseConfig;
pub use server::ServerConfig;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub routing: RoutingConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
    /// Minutes before a CREATED payment stops being resumable.
    pub payment_expiry_minutes: i64,
    /// Public origin used to build callback and webhook URLs handed to gateways.
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Strategy name when none is requested: priority | traffic_split | intelligent
    pub default_strategy: String,
    /// Failure-rate above which a gateway is tripped unhealthy.
    pub failure_rate_threshold: f64,
    /// Attempts required before the failure rate is trusted.
    pub health_min_attempts: u64,
    /// How long a tripped gateway stays out of rotation.
    pub health_cooldown_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub rate_limit_per_minute: u32,
    /// Storefront origin allowed by CORS; None permits any origin (dev only).
    pub cors_allowed_origin: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                payment_expiry_minutes: env::var("PAYMENT_EXPIRY_MINUTES")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid PAYMENT_EXPIRY_MINUTES".to_string())
                    })?,
                public_base_url: env::var("APP_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            routing: RoutingConfig {
                default_strategy: env::var("ROUTING_STRATEGY")
                    .unwrap_or_else(|_| "priority".to_string()),
                failure_rate_threshold: env::var("HEALTH_FAILURE_THRESHOLD")
                    .unwrap_or_else(|_| "0.30".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid HEALTH_FAILURE_THRESHOLD".to_string())
                    })?,
                health_min_attempts: env::var("HEALTH_MIN_ATTEMPTS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid HEALTH_MIN_ATTEMPTS".to_string())
                    })?,
                health_cooldown_secs: env::var("HEALTH_COOLDOWN_SECS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid HEALTH_COOLDOWN_SECS".to_string())
                    })?,
            },
            security: SecurityConfig {
                rate_limit_per_minute: env::var("RATE_LIMIT_PER_MINUTE")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid RATE_LIMIT_PER_MINUTE".to_string())
                    })?,
                cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN").ok(),
            },
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.app.payment_expiry_minutes <= 0 {
            return Err(AppError::Configuration(
                "Payment expiry minutes must be greater than 0".to_string(),
            ));
        }

        if self.security.rate_limit_per_minute == 0 {
            return Err(AppError::Configuration(
                "Rate limit must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.routing.failure_rate_threshold) {
            return Err(AppError::Configuration(
                "Health failure threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        match self.routing.default_strategy.as_str() {
            "priority" | "traffic_split" | "intelligent" => Ok(()),
            other => Err(AppError::Configuration(format!(
                "Unknown routing strategy: {other}"
            ))),
        }
    }
}
