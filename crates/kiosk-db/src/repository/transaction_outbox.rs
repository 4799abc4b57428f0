//! # Transaction Outbox Repository
//!
//! Completed sales recorded while the machine was offline. Rows are keyed by
//! order id, which doubles as the remote idempotency key.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use kiosk_core::TransactionRecord;

const SELECT_COLUMNS: &str = r#"
    SELECT order_id, machine_code, site_code, frame_family, price, copies,
           total_amount, payment_mode, event_id, created_at, updated_at
    FROM transaction_outbox
"#;

/// Repository for the transaction outbox.
#[derive(Debug, Clone)]
pub struct TransactionOutboxRepository {
    pool: SqlitePool,
}

impl TransactionOutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransactionOutboxRepository { pool }
    }

    /// Appends a sale to the outbox.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` if the order id is already queued.
    pub async fn enqueue(&self, record: &TransactionRecord) -> DbResult<()> {
        debug!(
            order_id = %record.order_id,
            total_amount = record.total_amount,
            "Queuing transaction"
        );

        sqlx::query(
            r#"
            INSERT INTO transaction_outbox (
                order_id, machine_code, site_code, frame_family, price, copies,
                total_amount, payment_mode, event_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&record.order_id)
        .bind(&record.machine_code)
        .bind(&record.site_code)
        .bind(&record.frame_family)
        .bind(record.price)
        .bind(record.copies)
        .bind(record.total_amount)
        .bind(record.payment_mode)
        .bind(&record.event_id)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists every queued sale, oldest first.
    pub async fn list_pending(&self) -> DbResult<Vec<TransactionRecord>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY seq ASC");
        let records = sqlx::query_as::<_, TransactionRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Reads one queued sale.
    pub async fn get(&self, order_id: &str) -> DbResult<Option<TransactionRecord>> {
        let sql = format!("{SELECT_COLUMNS} WHERE order_id = ?1");
        let record = sqlx::query_as::<_, TransactionRecord>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Number of queued sales.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transaction_outbox")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Removes a queued sale. Returns `false` if no such row existed.
    pub async fn delete(&self, order_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM transaction_outbox WHERE order_id = ?1")
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        debug!(order_id = %order_id, removed, "Transaction row deleted");
        Ok(removed)
    }
}
