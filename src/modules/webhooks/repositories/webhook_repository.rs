use crate::core::Result;
use crate::modules::gateways::models::GatewayName;
use crate::modules::webhooks::models::WebhookRecord;
use async_trait::async_trait;
use sqlx::MySqlPool;

/// Audit log plus the dedup claim table.
///
/// The log is append-only; rows only ever advance their status. Claims are
/// atomic: `claim_event` is an `INSERT IGNORE` on the `(gateway, event_id)`
/// primary key, so exactly one of two racing deliveries wins.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert(&self, record: &WebhookRecord) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<WebhookRecord>>;

    /// Claim `(gateway, event_id)` for a record. Returns false when another
    /// delivery already holds the claim.
    async fn claim_event(
        &self,
        gateway: GatewayName,
        event_id: &str,
        record_id: &str,
    ) -> Result<bool>;

    /// Free a claim so the genuine delivery of this event can still win it.
    async fn release_claim(&self, gateway: GatewayName, event_id: &str) -> Result<()>;

    async fn mark_processing(&self, id: &str, verified: bool) -> Result<()>;

    async fn mark_processed(
        &self,
        id: &str,
        transaction_id: Option<&str>,
        order_id: Option<&str>,
    ) -> Result<()>;

    async fn mark_failed(&self, id: &str, error_message: &str) -> Result<()>;

    async fn mark_duplicate(&self, id: &str) -> Result<()>;

    async fn increment_attempts(&self, id: &str) -> Result<()>;

    /// Failed records, newest first, for the replay surface.
    async fn find_failed_for_retry(&self, limit: i64) -> Result<Vec<WebhookRecord>>;
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, gateway, event_type, event_id, raw_payload, headers, signature,
           verified, status, attempts, transaction_id, order_id, error_message,
           source_ip, received_at, processed_at
    FROM webhook_events
"#;

/// MySQL-backed webhook audit log
#[derive(Clone)]
pub struct SqlxWebhookRepository {
    pool: MySqlPool,
}

impl SqlxWebhookRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookStore for SqlxWebhookRepository {
    async fn insert(&self, record: &WebhookRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events
                (id, gateway, event_type, event_id, raw_payload, headers, signature,
                 verified, status, attempts, transaction_id, order_id, error_message,
                 source_ip, received_at, processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.gateway)
        .bind(&record.event_type)
        .bind(&record.event_id)
        .bind(&record.raw_payload)
        .bind(&record.headers)
        .bind(&record.signature)
        .bind(record.verified)
        .bind(record.status)
        .bind(record.attempts)
        .bind(&record.transaction_id)
        .bind(&record.order_id)
        .bind(&record.error_message)
        .bind(&record.source_ip)
        .bind(record.received_at)
        .bind(record.processed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<WebhookRecord>> {
        let record =
            sqlx::query_as::<_, WebhookRecord>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    async fn claim_event(
        &self,
        gateway: GatewayName,
        event_id: &str,
        record_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT IGNORE INTO webhook_dedup (gateway, event_id, record_id) VALUES (?, ?, ?)",
        )
        .bind(gateway)
        .bind(event_id)
        .bind(record_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_claim(&self, gateway: GatewayName, event_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM webhook_dedup WHERE gateway = ? AND event_id = ?")
            .bind(gateway)
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_processing(&self, id: &str, verified: bool) -> Result<()> {
        sqlx::query("UPDATE webhook_events SET status = 'processing', verified = ? WHERE id = ?")
            .bind(verified)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_processed(
        &self,
        id: &str,
        transaction_id: Option<&str>,
        order_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'processed',
                transaction_id = COALESCE(?, transaction_id),
                order_id = COALESCE(?, order_id),
                error_message = NULL,
                processed_at = NOW()
            WHERE id = ?
            "#,
        )
        .bind(transaction_id)
        .bind(order_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: &str, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'failed', error_message = ?, processed_at = NOW()
            WHERE id = ?
            "#,
        )
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_duplicate(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_events SET status = 'duplicate', processed_at = NOW() WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_attempts(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE webhook_events SET attempts = attempts + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_failed_for_retry(&self, limit: i64) -> Result<Vec<WebhookRecord>> {
        let records = sqlx::query_as::<_, WebhookRecord>(&format!(
            "{SELECT_COLUMNS} WHERE status = 'failed' ORDER BY received_at DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
