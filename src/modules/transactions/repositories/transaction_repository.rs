use crate::core::Result;
use crate::modules::transactions::models::{PaymentConfirmation, PaymentTransaction};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::MySqlPool;

/// The payment ledger.
///
/// Terminal transitions are conditional UPDATEs so that a client callback and
/// a webhook racing on the same transaction produce exactly one transition;
/// the `mark_*` methods report whether this call won it.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, transaction: &PaymentTransaction) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<PaymentTransaction>>;

    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentTransaction>>;

    /// Latest `created` row for an order, for resume.
    async fn find_open_by_order(&self, order_id: &str) -> Result<Option<PaymentTransaction>>;

    /// `created → attempted`; no-op for any other state.
    async fn mark_attempted(&self, id: &str) -> Result<()>;

    /// Transition to `success` unless already there. Returns whether this
    /// call performed the transition.
    async fn mark_success(&self, id: &str, confirmation: &PaymentConfirmation) -> Result<bool>;

    /// Transition to `failed` unless already terminal. Returns whether this
    /// call performed the transition.
    async fn mark_failed(
        &self,
        id: &str,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<bool>;

    /// `created → expired`, observed lazily on reads and by the sweeper.
    async fn mark_expired(&self, id: &str) -> Result<bool>;

    /// Expire every overdue `created` row; returns how many changed.
    async fn expire_overdue(&self, now: NaiveDateTime) -> Result<u64>;

    async fn update_metadata(&self, id: &str, metadata: &serde_json::Value) -> Result<()>;
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, order_id, user_id, gateway, gateway_order_id, amount, currency,
           status, gateway_payment_id, payment_method, method_details,
           error_code, error_message, expires_at, captured_at, metadata,
           created_at, updated_at
    FROM payment_transactions
"#;

/// MySQL-backed ledger
#[derive(Clone)]
pub struct SqlxTransactionRepository {
    pool: MySqlPool,
}

impl SqlxTransactionRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for SqlxTransactionRepository {
    async fn insert(&self, transaction: &PaymentTransaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_transactions
                (id, order_id, user_id, gateway, gateway_order_id, amount, currency,
                 status, gateway_payment_id, payment_method, method_details,
                 error_code, error_message, expires_at, captured_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.order_id)
        .bind(&transaction.user_id)
        .bind(transaction.gateway)
        .bind(&transaction.gateway_order_id)
        .bind(transaction.amount)
        .bind(&transaction.currency)
        .bind(transaction.status)
        .bind(&transaction.gateway_payment_id)
        .bind(&transaction.payment_method)
        .bind(&transaction.method_details)
        .bind(&transaction.error_code)
        .bind(&transaction.error_message)
        .bind(transaction.expires_at)
        .bind(transaction.captured_at)
        .bind(&transaction.metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PaymentTransaction>> {
        let transaction =
            sqlx::query_as::<_, PaymentTransaction>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(transaction)
    }

    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        let transaction = sqlx::query_as::<_, PaymentTransaction>(&format!(
            "{SELECT_COLUMNS} WHERE gateway_order_id = ? ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    async fn find_open_by_order(&self, order_id: &str) -> Result<Option<PaymentTransaction>> {
        let transaction = sqlx::query_as::<_, PaymentTransaction>(&format!(
            "{SELECT_COLUMNS} WHERE order_id = ? AND status = 'created' ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    async fn mark_attempted(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE payment_transactions SET status = 'attempted' WHERE id = ? AND status = 'created'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_success(&self, id: &str, confirmation: &PaymentConfirmation) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'success',
                gateway_payment_id = COALESCE(?, gateway_payment_id),
                payment_method = COALESCE(?, payment_method),
                method_details = COALESCE(?, method_details),
                captured_at = COALESCE(?, captured_at, NOW()),
                error_code = NULL,
                error_message = NULL
            WHERE id = ? AND status <> 'success'
            "#,
        )
        .bind(&confirmation.gateway_payment_id)
        .bind(&confirmation.payment_method)
        .bind(&confirmation.method_details)
        .bind(confirmation.captured_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(
        &self,
        id: &str,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'failed', error_code = ?, error_message = ?
            WHERE id = ? AND status NOT IN ('success', 'failed')
            "#,
        )
        .bind(error_code)
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_expired(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payment_transactions SET status = 'expired' WHERE id = ? AND status = 'created'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn expire_overdue(&self, now: NaiveDateTime) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'expired'
            WHERE status = 'created' AND expires_at IS NOT NULL AND expires_at < ?
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn update_metadata(&self, id: &str, metadata: &serde_json::Value) -> Result<()> {
        sqlx::query("UPDATE payment_transactions SET metadata = ? WHERE id = ?")
            .bind(metadata)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
