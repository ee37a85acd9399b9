use crate::core::Result;
use crate::modules::gateways::models::{GatewayConfig, GatewayName};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::MySqlPool;

/// Read/health surface over the `gateway_configs` table.
///
/// The router and webhook ingestor depend on this trait; tests swap in an
/// in-memory implementation. Credential columns come back in stored form,
/// decryption happens at provider load.
#[async_trait]
pub trait GatewayRegistry: Send + Sync {
    /// Every configured gateway, active or not, ordered by priority.
    async fn find_all(&self) -> Result<Vec<GatewayConfig>>;

    /// Active gateways ordered by priority (lower first).
    async fn find_active(&self) -> Result<Vec<GatewayConfig>>;

    async fn find_by_name(&self, name: GatewayName) -> Result<Option<GatewayConfig>>;

    /// Trip a gateway out of rotation until `until` and bump its failure count.
    async fn mark_unhealthy(&self, name: GatewayName, until: NaiveDateTime) -> Result<()>;

    /// Restore a gateway to rotation and reset its failure count.
    async fn mark_healthy(&self, name: GatewayName) -> Result<()>;
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, is_active, priority, traffic_weight, mode,
           sandbox_public_key, sandbox_secret_key, live_public_key, live_secret_key,
           supported_currencies, supported_countries, supported_methods,
           min_amount, max_amount, is_healthy, unhealthy_until, failure_count,
           transaction_rate, webhook_url, callback_url, created_at, updated_at
    FROM gateway_configs
"#;

/// MySQL-backed gateway registry
#[derive(Clone)]
pub struct SqlxGatewayRepository {
    pool: MySqlPool,
}

impl SqlxGatewayRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GatewayRegistry for SqlxGatewayRepository {
    async fn find_all(&self) -> Result<Vec<GatewayConfig>> {
        let gateways = sqlx::query_as::<_, GatewayConfig>(&format!(
            "{SELECT_COLUMNS} ORDER BY priority ASC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(gateways)
    }

    async fn find_active(&self) -> Result<Vec<GatewayConfig>> {
        let gateways = sqlx::query_as::<_, GatewayConfig>(&format!(
            "{SELECT_COLUMNS} WHERE is_active = TRUE ORDER BY priority ASC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(gateways)
    }

    async fn find_by_name(&self, name: GatewayName) -> Result<Option<GatewayConfig>> {
        let gateway =
            sqlx::query_as::<_, GatewayConfig>(&format!("{SELECT_COLUMNS} WHERE name = ?"))
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        Ok(gateway)
    }

    async fn mark_unhealthy(&self, name: GatewayName, until: NaiveDateTime) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE gateway_configs
            SET is_healthy = FALSE, unhealthy_until = ?, failure_count = failure_count + 1
            WHERE name = ?
            "#,
        )
        .bind(until)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_healthy(&self, name: GatewayName) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE gateway_configs
            SET is_healthy = TRUE, unhealthy_until = NULL, failure_count = 0
            WHERE name = ?
            "#,
        )
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
