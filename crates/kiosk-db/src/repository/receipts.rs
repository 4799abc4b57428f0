//! # Delivery Receipt Repository
//!
//! Local markers of confirmed remote deliveries, keyed by outbox topic and
//! record id. Written right after the backend accepts an item and never
//! cleared, so a record that reappears after a crash skips the remote call.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use kiosk_core::OutboxTopic;

/// Repository for delivery receipts.
#[derive(Debug, Clone)]
pub struct DeliveryReceiptRepository {
    pool: SqlitePool,
}

impl DeliveryReceiptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DeliveryReceiptRepository { pool }
    }

    /// Marks a record as delivered. Recording twice keeps the first instant.
    pub async fn record(
        &self,
        topic: OutboxTopic,
        record_id: &str,
        delivered_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO delivery_receipts (topic, record_id, delivered_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(topic.as_str())
        .bind(record_id)
        .bind(delivered_at)
        .execute(&self.pool)
        .await?;

        debug!(topic = %topic, record_id = %record_id, "Delivery receipt recorded");
        Ok(())
    }

    /// Whether a delivery was already confirmed for this record.
    pub async fn contains(&self, topic: OutboxTopic, record_id: &str) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM delivery_receipts WHERE topic = ?1 AND record_id = ?2",
        )
        .bind(topic.as_str())
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }
}
