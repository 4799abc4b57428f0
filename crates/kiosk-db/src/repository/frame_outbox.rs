//! # Offline Frame Outbox Repository
//!
//! Finished composites waiting to be uploaded.
//!
//! ## Row Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  session completes ──► enqueue(record)        (always, any mode)       │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  OutboxUploader ─────► list_pending()         (oldest first, snapshot) │
//! │                              │                                          │
//! │          upload fails ◄──────┼──────► upload confirmed                  │
//! │          row untouched       │        delete(frame_id) == true          │
//! │                              │              │                           │
//! │                              │              ▼                           │
//! │                              │        remove file on disk               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This repository never touches the file itself; the uploader removes it
//! only after `delete` reports the row was actually removed.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use kiosk_core::OfflineFrameRecord;

/// Repository for the offline-frame outbox.
#[derive(Debug, Clone)]
pub struct FrameOutboxRepository {
    pool: SqlitePool,
}

impl FrameOutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        FrameOutboxRepository { pool }
    }

    /// Appends a frame to the outbox.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` if the frame id is already queued.
    pub async fn enqueue(&self, record: &OfflineFrameRecord) -> DbResult<()> {
        debug!(frame_id = %record.frame_id, path = %record.file_path, "Queuing frame");

        sqlx::query(
            r#"
            INSERT INTO offline_frames (
                frame_id, machine_code, site_code, file_path, event_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&record.frame_id)
        .bind(&record.machine_code)
        .bind(&record.site_code)
        .bind(&record.file_path)
        .bind(&record.event_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists every queued frame, oldest first.
    pub async fn list_pending(&self) -> DbResult<Vec<OfflineFrameRecord>> {
        let records = sqlx::query_as::<_, OfflineFrameRecord>(
            r#"
            SELECT frame_id, machine_code, site_code, file_path, event_id, created_at
            FROM offline_frames
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Reads one queued frame.
    pub async fn get(&self, frame_id: &str) -> DbResult<Option<OfflineFrameRecord>> {
        let record = sqlx::query_as::<_, OfflineFrameRecord>(
            r#"
            SELECT frame_id, machine_code, site_code, file_path, event_id, created_at
            FROM offline_frames
            WHERE frame_id = ?1
            "#,
        )
        .bind(frame_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Number of queued frames.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offline_frames")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Removes a queued frame. Returns `false` if no such row existed.
    pub async fn delete(&self, frame_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM offline_frames WHERE frame_id = ?1")
            .bind(frame_id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        debug!(frame_id = %frame_id, removed, "Frame row deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::{Duration, Utc};

    fn record(frame_id: &str, minutes_ago: i64) -> OfflineFrameRecord {
        OfflineFrameRecord {
            frame_id: frame_id.to_string(),
            machine_code: "M100".to_string(),
            site_code: "S01".to_string(),
            file_path: format!("/tmp/outbox/{frame_id}.jpg"),
            event_id: None,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_list_pending_is_insertion_ordered() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.frame_outbox();

        repo.enqueue(&record("OF-250101-AAA", 1)).await.unwrap();
        repo.enqueue(&record("OF-250101-BBB", 5)).await.unwrap();

        let pending = repo.list_pending().await.unwrap();
        let ids: Vec<_> = pending.iter().map(|r| r.frame_id.as_str()).collect();
        assert_eq!(ids, ["OF-250101-AAA", "OF-250101-BBB"]);
        assert_eq!(repo.count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_frame_id_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.frame_outbox();

        repo.enqueue(&record("OF-250101-AB2", 0)).await.unwrap();
        let err = repo.enqueue(&record("OF-250101-AB2", 0)).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_delete_reports_whether_row_existed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.frame_outbox();

        repo.enqueue(&record("OF-250101-AB2", 0)).await.unwrap();

        assert!(repo.delete("OF-250101-AB2").await.unwrap());
        assert!(!repo.delete("OF-250101-AB2").await.unwrap());
        assert!(repo.get("OF-250101-AB2").await.unwrap().is_none());
        assert_eq!(repo.count_pending().await.unwrap(), 0);
    }
}
