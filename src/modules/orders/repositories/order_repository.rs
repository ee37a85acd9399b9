use crate::core::Result;
use crate::modules::gateways::models::GatewayName;
use crate::modules::orders::models::PrintOrder;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::MySqlPool;

/// Payment-side access to `print_orders`.
///
/// Order creation and fulfillment live elsewhere; this trait only reads
/// orders and advances their payment columns.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<PrintOrder>>;

    /// Fetch a batch of orders for bulk checkout. Missing ids are simply
    /// absent from the result; the caller decides whether that is an error.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<PrintOrder>>;

    /// Attach a checkout session: status becomes `processing`.
    async fn mark_processing(
        &self,
        id: &str,
        gateway: GatewayName,
        transaction_id: &str,
    ) -> Result<()>;

    /// Record a confirmed payment: status becomes `completed`.
    async fn mark_paid(
        &self,
        id: &str,
        gateway: GatewayName,
        transaction_id: &str,
        paid_at: NaiveDateTime,
    ) -> Result<()>;

    /// Status becomes `failed`; gateway and transaction stay for diagnosis.
    async fn mark_payment_failed(&self, id: &str) -> Result<()>;

    async fn mark_refunded(&self, id: &str) -> Result<()>;
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, order_number, user_id, total_amount, currency,
           payment_status, payment_gateway, payment_transaction_id, paid_at,
           customer_name, customer_email, customer_phone, created_at, updated_at
    FROM print_orders
"#;

/// MySQL-backed order store
#[derive(Clone)]
pub struct SqlxOrderRepository {
    pool: MySqlPool,
}

impl SqlxOrderRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for SqlxOrderRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<PrintOrder>> {
        let order = sqlx::query_as::<_, PrintOrder>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<PrintOrder>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("{SELECT_COLUMNS} WHERE id IN ({placeholders})");

        let mut query = sqlx::query_as::<_, PrintOrder>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let orders = query.fetch_all(&self.pool).await?;
        Ok(orders)
    }

    async fn mark_processing(
        &self,
        id: &str,
        gateway: GatewayName,
        transaction_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE print_orders
            SET payment_status = 'processing', payment_gateway = ?, payment_transaction_id = ?
            WHERE id = ?
            "#,
        )
        .bind(gateway)
        .bind(transaction_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_paid(
        &self,
        id: &str,
        gateway: GatewayName,
        transaction_id: &str,
        paid_at: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE print_orders
            SET payment_status = 'completed', payment_gateway = ?,
                payment_transaction_id = ?, paid_at = ?
            WHERE id = ?
            "#,
        )
        .bind(gateway)
        .bind(transaction_id)
        .bind(paid_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_payment_failed(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE print_orders SET payment_status = 'failed' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_refunded(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE print_orders SET payment_status = 'refunded' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
