//! # Outbox Uploader
//!
//! Drains an outbox to the backend: strictly one record at a time, each
//! row deleted only after the backend confirmed it.
//!
//! ## Per-Record Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    OutboxUploader::upload_all                           │
//! │                                                                         │
//! │  snapshot (list_pending, oldest first)                                 │
//! │       │                                                                 │
//! │       ▼  for each record, sequentially                                 │
//! │  1. validate (machine/site fallback: settings → static config)         │
//! │       │ invalid ──► failed (Validation), no network call               │
//! │       ▼                                                                 │
//! │  2. delivery receipt present? ── yes ──┐                               │
//! │       │ no                             │                               │
//! │       ▼                                │                               │
//! │  3. upload (60 s deadline)             │                               │
//! │       │ error/timeout ──► failed, row untouched                        │
//! │       ▼                                │                               │
//! │  4. record delivery receipt            │                               │
//! │       │◄───────────────────────────────┘                               │
//! │       ▼                                                                 │
//! │  5. delete row ── removed? ── yes ──► 6. after_delete (frame file)     │
//! │                       │ no (already gone) ──► skip side effects        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failed records are never retried inside the pass. The caller decides
//! between [`OutboxUploader::retry_failed`] and
//! [`OutboxUploader::discard_failed`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use kiosk_core::validation::{validate_frame_record, validate_transaction_record, IdentityFallback};
use kiosk_core::{Clock, OfflineFrameRecord, OutboxTopic, TransactionRecord, ValidationError};
use kiosk_db::Database;

use crate::api::{bounded, RemoteApi};
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Outbox Kind
// =============================================================================

/// Everything that differs between the two outboxes.
#[async_trait]
pub trait OutboxKind: Send + Sync {
    type Record: Clone + Send + Sync;

    fn topic(&self) -> OutboxTopic;

    /// Stable idempotency key of a record.
    fn record_id<'a>(&self, record: &'a Self::Record) -> &'a str;

    /// Returns the copy to upload, with fallback identity filled in.
    fn validate(
        &self,
        record: &Self::Record,
        fallback: &IdentityFallback,
    ) -> Result<Self::Record, ValidationError>;

    async fn list_pending(&self) -> SyncResult<Vec<Self::Record>>;

    async fn upload(&self, record: &Self::Record) -> SyncResult<()>;

    async fn is_delivered(&self, record: &Self::Record) -> SyncResult<bool>;

    async fn mark_delivered(&self, record: &Self::Record) -> SyncResult<()>;

    /// Removes the row; `false` if it was already gone.
    async fn delete_row(&self, record: &Self::Record) -> SyncResult<bool>;

    /// Cleanup after the row is confirmed deleted.
    async fn after_delete(&self, _record: &Self::Record) -> SyncResult<()> {
        Ok(())
    }
}

// =============================================================================
// Reports
// =============================================================================

/// A record that did not make it this pass.
#[derive(Debug)]
pub struct FailedItem<R> {
    pub record: R,
    pub error: SyncError,
}

/// Outcome of one pass over an outbox.
#[derive(Debug)]
pub struct UploadReport<R> {
    pub topic: OutboxTopic,
    pub succeeded: usize,
    pub failed: Vec<FailedItem<R>>,
    /// LocalStore or filesystem errors that did not stop the pass.
    pub store_errors: Vec<SyncError>,
}

impl<R> UploadReport<R> {
    pub fn new(topic: OutboxTopic) -> Self {
        UploadReport {
            topic,
            succeeded: 0,
            failed: Vec::new(),
            store_errors: Vec::new(),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Failures the backend answered with a 4xx.
    pub fn permanent_rejections(&self) -> usize {
        self.failed
            .iter()
            .filter(|f| f.error.is_permanent_rejection())
            .count()
    }
}

/// Outcome of an operator discard.
#[derive(Debug, Default)]
pub struct DiscardReport {
    pub discarded: usize,
    pub store_errors: Vec<SyncError>,
}

// =============================================================================
// Uploader
// =============================================================================

/// Sequential drain-retry-confirm engine shared by both outboxes.
#[derive(Debug, Clone, Copy)]
pub struct OutboxUploader {
    call_timeout: Duration,
}

impl Default for OutboxUploader {
    fn default() -> Self {
        OutboxUploader::new(Duration::from_secs(kiosk_core::REMOTE_CALL_TIMEOUT_SECS))
    }
}

impl OutboxUploader {
    pub fn new(call_timeout: Duration) -> Self {
        OutboxUploader { call_timeout }
    }

    /// Uploads `items` in order. Rows added after the snapshot wait for the
    /// next pass.
    pub async fn upload_all<K: OutboxKind>(
        &self,
        kind: &K,
        items: Vec<K::Record>,
        fallback: &IdentityFallback,
    ) -> UploadReport<K::Record> {
        let topic = kind.topic();
        let mut report = UploadReport::new(topic);

        info!(topic = %topic, pending = items.len(), "Outbox pass starting");

        for item in items {
            self.process(kind, item, fallback, &mut report).await;
        }

        info!(
            topic = %topic,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            store_errors = report.store_errors.len(),
            "Outbox pass finished"
        );
        report
    }

    async fn process<K: OutboxKind>(
        &self,
        kind: &K,
        item: K::Record,
        fallback: &IdentityFallback,
        report: &mut UploadReport<K::Record>,
    ) {
        let id = kind.record_id(&item).to_string();

        let resolved = match kind.validate(&item, fallback) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(topic = %report.topic, record_id = %id, error = %e, "Skipping invalid record");
                report.failed.push(FailedItem {
                    record: item,
                    error: e.into(),
                });
                return;
            }
        };

        let delivered = match kind.is_delivered(&resolved).await {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(record_id = %id, error = %e, "Could not read delivery receipt");
                report.store_errors.push(e);
                false
            }
        };

        if delivered {
            debug!(record_id = %id, "Already delivered, cleaning up only");
        } else {
            if let Err(e) = bounded(self.call_timeout, kind.upload(&resolved)).await {
                warn!(topic = %report.topic, record_id = %id, error = %e, "Upload failed");
                report.failed.push(FailedItem {
                    record: item,
                    error: e,
                });
                return;
            }

            if let Err(e) = kind.mark_delivered(&resolved).await {
                error!(record_id = %id, error = %e, "Could not record delivery receipt");
                report.store_errors.push(e);
            }
        }

        match kind.delete_row(&item).await {
            Ok(true) => {
                if let Err(e) = kind.after_delete(&item).await {
                    warn!(record_id = %id, error = %e, "Cleanup after delete failed");
                    report.store_errors.push(e);
                }
            }
            Ok(false) => debug!(record_id = %id, "Row already removed"),
            Err(e) => {
                // Delivered; the receipt turns the next pass into cleanup only.
                error!(record_id = %id, error = %e, "Could not delete delivered row");
                report.store_errors.push(e);
            }
        }

        debug!(topic = %report.topic, record_id = %id, "Record delivered");
        report.succeeded += 1;
    }

    /// Runs the same algorithm over the previous pass's failures that are
    /// still queued.
    pub async fn retry_failed<K: OutboxKind>(
        &self,
        kind: &K,
        previous: &UploadReport<K::Record>,
        fallback: &IdentityFallback,
    ) -> UploadReport<K::Record> {
        let pending = match kind.list_pending().await {
            Ok(pending) => pending,
            Err(e) => {
                let mut report = UploadReport::new(kind.topic());
                report.store_errors.push(e);
                return report;
            }
        };

        let still_queued: Vec<K::Record> = previous
            .failed
            .iter()
            .filter_map(|f| {
                let id = kind.record_id(&f.record);
                pending.iter().find(|p| kind.record_id(p) == id).cloned()
            })
            .collect();

        self.upload_all(kind, still_queued, fallback).await
    }

    /// Deletes the previous pass's failures for good. Frame files go too.
    pub async fn discard_failed<K: OutboxKind>(
        &self,
        kind: &K,
        previous: &UploadReport<K::Record>,
    ) -> DiscardReport {
        let mut report = DiscardReport::default();

        for failed in &previous.failed {
            let id = kind.record_id(&failed.record);
            match kind.delete_row(&failed.record).await {
                Ok(true) => {
                    warn!(topic = %kind.topic(), record_id = %id, "Discarded undeliverable record");
                    report.discarded += 1;
                    if let Err(e) = kind.after_delete(&failed.record).await {
                        report.store_errors.push(e);
                    }
                }
                Ok(false) => debug!(record_id = %id, "Nothing to discard"),
                Err(e) => report.store_errors.push(e),
            }
        }

        report
    }
}

// =============================================================================
// Frame Outbox
// =============================================================================

/// Offline frames: multipart upload, file removed after the row.
#[derive(Clone)]
pub struct FrameOutbox {
    db: Database,
    api: Arc<dyn RemoteApi>,
    clock: Arc<dyn Clock>,
}

impl FrameOutbox {
    pub fn new(db: Database, api: Arc<dyn RemoteApi>, clock: Arc<dyn Clock>) -> Self {
        FrameOutbox { db, api, clock }
    }
}

#[async_trait]
impl OutboxKind for FrameOutbox {
    type Record = OfflineFrameRecord;

    fn topic(&self) -> OutboxTopic {
        OutboxTopic::Frames
    }

    fn record_id<'a>(&self, record: &'a OfflineFrameRecord) -> &'a str {
        &record.frame_id
    }

    fn validate(
        &self,
        record: &OfflineFrameRecord,
        fallback: &IdentityFallback,
    ) -> Result<OfflineFrameRecord, ValidationError> {
        validate_frame_record(record, fallback)
    }

    async fn list_pending(&self) -> SyncResult<Vec<OfflineFrameRecord>> {
        Ok(self.db.frame_outbox().list_pending().await?)
    }

    async fn upload(&self, record: &OfflineFrameRecord) -> SyncResult<()> {
        let path = Path::new(&record.file_path);
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| SyncError::Filesystem(format!("{}: {e}", path.display())))?;
        if !exists {
            return Err(ValidationError::InvalidFormat {
                field: "file_path".to_string(),
                reason: format!("{} does not exist", path.display()),
            }
            .into());
        }
        self.api.upload_frame(record).await
    }

    async fn is_delivered(&self, record: &OfflineFrameRecord) -> SyncResult<bool> {
        Ok(self.db.receipts().contains(OutboxTopic::Frames, &record.frame_id).await?)
    }

    async fn mark_delivered(&self, record: &OfflineFrameRecord) -> SyncResult<()> {
        Ok(self
            .db
            .receipts()
            .record(OutboxTopic::Frames, &record.frame_id, self.clock.now())
            .await?)
    }

    async fn delete_row(&self, record: &OfflineFrameRecord) -> SyncResult<bool> {
        Ok(self.db.frame_outbox().delete(&record.frame_id).await?)
    }

    async fn after_delete(&self, record: &OfflineFrameRecord) -> SyncResult<()> {
        remove_file_if_present(Path::new(&record.file_path)).await
    }
}

async fn remove_file_if_present(path: &Path) -> SyncResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Outbox file removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::Filesystem(format!("{}: {e}", path.display()))),
    }
}

// =============================================================================
// Transaction Outbox
// =============================================================================

/// Offline sales: JSON upload keyed by order id.
#[derive(Clone)]
pub struct TransactionOutbox {
    db: Database,
    api: Arc<dyn RemoteApi>,
    clock: Arc<dyn Clock>,
}

impl TransactionOutbox {
    pub fn new(db: Database, api: Arc<dyn RemoteApi>, clock: Arc<dyn Clock>) -> Self {
        TransactionOutbox { db, api, clock }
    }
}

#[async_trait]
impl OutboxKind for TransactionOutbox {
    type Record = TransactionRecord;

    fn topic(&self) -> OutboxTopic {
        OutboxTopic::Transactions
    }

    fn record_id<'a>(&self, record: &'a TransactionRecord) -> &'a str {
        &record.order_id
    }

    fn validate(
        &self,
        record: &TransactionRecord,
        fallback: &IdentityFallback,
    ) -> Result<TransactionRecord, ValidationError> {
        validate_transaction_record(record, fallback)
    }

    async fn list_pending(&self) -> SyncResult<Vec<TransactionRecord>> {
        Ok(self.db.transaction_outbox().list_pending().await?)
    }

    async fn upload(&self, record: &TransactionRecord) -> SyncResult<()> {
        self.api.create_completed_transaction(record).await
    }

    async fn is_delivered(&self, record: &TransactionRecord) -> SyncResult<bool> {
        Ok(self
            .db
            .receipts()
            .contains(OutboxTopic::Transactions, &record.order_id)
            .await?)
    }

    async fn mark_delivered(&self, record: &TransactionRecord) -> SyncResult<()> {
        Ok(self
            .db
            .receipts()
            .record(OutboxTopic::Transactions, &record.order_id, self.clock.now())
            .await?)
    }

    async fn delete_row(&self, record: &TransactionRecord) -> SyncResult<bool> {
        Ok(self.db.transaction_outbox().delete(&record.order_id).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fallback_m100, frame_record, sale_record, FakeRemote};
    use chrono::Utc;
    use kiosk_core::SystemClock;
    use kiosk_db::DbConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    async fn setup(api: Arc<FakeRemote>) -> (Database, FrameOutbox, TransactionOutbox) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let frames = FrameOutbox::new(db.clone(), api.clone(), clock.clone());
        let sales = TransactionOutbox::new(db.clone(), api, clock);
        (db, frames, sales)
    }

    async fn queue_frame(db: &Database, dir: &Path, frame_id: &str) -> std::path::PathBuf {
        let path = dir.join(format!("{frame_id}.jpg"));
        std::fs::write(&path, b"jpeg").unwrap();
        db.frame_outbox()
            .enqueue(&frame_record(frame_id, &path))
            .await
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_successful_pass_empties_outbox_and_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRemote::default());
        let (db, frames, _) = setup(api.clone()).await;

        let a = queue_frame(&db, dir.path(), "OF-250101-AAA").await;
        let b = queue_frame(&db, dir.path(), "OF-250101-BBB").await;

        let items = frames.list_pending().await.unwrap();
        let report = OutboxUploader::default()
            .upload_all(&frames, items, &fallback_m100())
            .await;

        assert_eq!(report.succeeded, 2);
        assert!(report.failed.is_empty());
        assert_eq!(db.frame_outbox().count_pending().await.unwrap(), 0);
        assert!(!a.exists());
        assert!(!b.exists());
        assert_eq!(api.uploaded_frames(), ["OF-250101-AAA", "OF-250101-BBB"]);
    }

    #[tokio::test]
    async fn test_single_frame_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRemote::default());
        let (db, frames, _) = setup(api.clone()).await;

        queue_frame(&db, dir.path(), "OF-250101-XYZ").await;
        let path = queue_frame(&db, dir.path(), "OF-250101-AB2").await;
        let before = db.frame_outbox().count_pending().await.unwrap();

        let only_ab2: Vec<_> = frames
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.frame_id == "OF-250101-AB2")
            .collect();
        let report = OutboxUploader::default()
            .upload_all(&frames, only_ab2, &fallback_m100())
            .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(db.frame_outbox().count_pending().await.unwrap(), before - 1);
        assert!(!path.exists());
        assert!(db.frame_outbox().get("OF-250101-XYZ").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_row_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRemote::default());
        api.fail_uploads_with(503);
        let (db, frames, _) = setup(api.clone()).await;

        let path = queue_frame(&db, dir.path(), "OF-250101-AB2").await;
        let before = db.frame_outbox().get("OF-250101-AB2").await.unwrap();

        let items = frames.list_pending().await.unwrap();
        let report = OutboxUploader::default()
            .upload_all(&frames, items, &fallback_m100())
            .await;

        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed_count(), 1);
        assert!(report.failed[0].error.is_retryable());
        assert_eq!(report.permanent_rejections(), 0);
        assert_eq!(db.frame_outbox().get("OF-250101-AB2").await.unwrap(), before);
        assert!(path.exists());
        assert!(!db.receipts().contains(OutboxTopic::Frames, "OF-250101-AB2").await.unwrap());
    }

    #[tokio::test]
    async fn test_receipt_skips_remote_call_after_crash() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRemote::default());
        let (db, frames, _) = setup(api.clone()).await;

        // Delivered before a crash that hit between receipt and row delete.
        let path = queue_frame(&db, dir.path(), "OF-250101-AB2").await;
        db.receipts()
            .record(OutboxTopic::Frames, "OF-250101-AB2", Utc::now())
            .await
            .unwrap();

        let items = frames.list_pending().await.unwrap();
        let report = OutboxUploader::default()
            .upload_all(&frames, items, &fallback_m100())
            .await;

        assert_eq!(report.succeeded, 1);
        assert!(api.uploaded_frames().is_empty());
        assert_eq!(db.frame_outbox().count_pending().await.unwrap(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_rerun_with_stale_snapshot_repeats_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRemote::default());
        let (db, frames, _) = setup(api.clone()).await;

        let path = queue_frame(&db, dir.path(), "OF-250101-AB2").await;
        let snapshot = frames.list_pending().await.unwrap();

        let first = OutboxUploader::default()
            .upload_all(&frames, snapshot.clone(), &fallback_m100())
            .await;
        assert_eq!(first.succeeded, 1);
        assert!(!path.exists());

        // A new file now sits where the old one was; it must survive.
        std::fs::write(&path, b"someone else's file").unwrap();

        let second = OutboxUploader::default()
            .upload_all(&frames, snapshot, &fallback_m100())
            .await;

        assert_eq!(second.succeeded, 1);
        assert!(second.store_errors.is_empty());
        assert_eq!(api.uploaded_frames().len(), 1);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_invalid_record_counts_failed_without_network_call() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRemote::default());
        let (db, frames, _) = setup(api.clone()).await;

        let path = dir.path().join("OF-250101-AB2.jpg");
        std::fs::write(&path, b"jpeg").unwrap();
        let mut record = frame_record("OF-250101-AB2", &path);
        record.machine_code.clear();
        db.frame_outbox().enqueue(&record).await.unwrap();

        let items = frames.list_pending().await.unwrap();
        let report = OutboxUploader::default()
            .upload_all(&frames, items, &IdentityFallback::default())
            .await;

        assert_eq!(report.failed_count(), 1);
        assert!(matches!(report.failed[0].error, SyncError::Validation(_)));
        assert!(api.uploaded_frames().is_empty());
        assert_eq!(db.frame_outbox().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_frame_file_is_a_validation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRemote::default());
        let (db, frames, _) = setup(api.clone()).await;

        let path = queue_frame(&db, dir.path(), "OF-250101-AB2").await;
        std::fs::remove_file(&path).unwrap();

        let items = frames.list_pending().await.unwrap();
        let report = OutboxUploader::default()
            .upload_all(&frames, items, &fallback_m100())
            .await;

        assert_eq!(report.failed_count(), 1);
        assert!(matches!(
            report.failed[0].error,
            SyncError::Validation(ValidationError::InvalidFormat { ref field, .. }) if field == "file_path"
        ));
        assert!(!report.failed[0].error.is_retryable());
        assert!(api.uploaded_frames().is_empty());
        assert_eq!(db.frame_outbox().count_pending().await.unwrap(), 1);
        assert!(!db.receipts().contains(OutboxTopic::Frames, "OF-250101-AB2").await.unwrap());
    }

    #[tokio::test]
    async fn test_fallback_machine_code_fills_upload() {
        let api = Arc::new(FakeRemote::default());
        let (db, _, sales) = setup(api.clone()).await;

        let mut record = sale_record("ORD-1");
        record.machine_code.clear();
        db.transaction_outbox().enqueue(&record).await.unwrap();

        // Settings empty, static config has M100.
        let fallback = IdentityFallback {
            static_machine_code: Some("M100".into()),
            static_site_code: Some("S01".into()),
            ..IdentityFallback::default()
        };

        let items = sales.list_pending().await.unwrap();
        let report = OutboxUploader::default().upload_all(&sales, items, &fallback).await;

        assert_eq!(report.succeeded, 1);
        let sent = api.completed_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].machine_code, "M100");
    }

    #[tokio::test]
    async fn test_rows_added_mid_pass_wait_for_next_pass() {
        let api = Arc::new(FakeRemote::default());
        let (db, _, sales) = setup(api.clone()).await;

        db.transaction_outbox().enqueue(&sale_record("ORD-1")).await.unwrap();
        let snapshot = sales.list_pending().await.unwrap();
        db.transaction_outbox().enqueue(&sale_record("ORD-2")).await.unwrap();

        let report = OutboxUploader::default()
            .upload_all(&sales, snapshot, &fallback_m100())
            .await;

        assert_eq!(report.succeeded, 1);
        let remaining = db.transaction_outbox().list_pending().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].order_id, "ORD-2");
    }

    #[tokio::test]
    async fn test_retry_failed_only_touches_failed_subset() {
        let api = Arc::new(FakeRemote::default());
        let (db, _, sales) = setup(api.clone()).await;

        db.transaction_outbox().enqueue(&sale_record("ORD-1")).await.unwrap();
        api.fail_uploads_with(500);
        let first = OutboxUploader::default()
            .upload_all(&sales, sales.list_pending().await.unwrap(), &fallback_m100())
            .await;
        assert_eq!(first.failed_count(), 1);

        db.transaction_outbox().enqueue(&sale_record("ORD-2")).await.unwrap();
        api.recover();

        let retry = OutboxUploader::default()
            .retry_failed(&sales, &first, &fallback_m100())
            .await;

        assert_eq!(retry.succeeded, 1);
        let sent: Vec<_> = api
            .completed_transactions()
            .into_iter()
            .map(|t| t.order_id)
            .collect();
        assert_eq!(sent, ["ORD-1"]);
        assert_eq!(db.transaction_outbox().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_discard_failed_removes_rows_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRemote::default());
        api.fail_uploads_with(400);
        let (db, frames, _) = setup(api.clone()).await;

        let path = queue_frame(&db, dir.path(), "OF-250101-AB2").await;
        let report = OutboxUploader::default()
            .upload_all(&frames, frames.list_pending().await.unwrap(), &fallback_m100())
            .await;
        assert_eq!(report.permanent_rejections(), 1);

        let discard = OutboxUploader::default().discard_failed(&frames, &report).await;

        assert_eq!(discard.discarded, 1);
        assert_eq!(db.frame_outbox().count_pending().await.unwrap(), 0);
        assert!(!path.exists());

        // Discarding again finds nothing.
        let again = OutboxUploader::default().discard_failed(&frames, &report).await;
        assert_eq!(again.discarded, 0);
    }

    // -------------------------------------------------------------------------
    // Timing (in-process kind, no database)
    // -------------------------------------------------------------------------

    /// Kind whose first upload never answers.
    struct StallingKind {
        calls: AtomicUsize,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OutboxKind for StallingKind {
        type Record = String;

        fn topic(&self) -> OutboxTopic {
            OutboxTopic::Transactions
        }

        fn record_id<'a>(&self, record: &'a String) -> &'a str {
            record
        }

        fn validate(&self, record: &String, _: &IdentityFallback) -> Result<String, ValidationError> {
            Ok(record.clone())
        }

        async fn list_pending(&self) -> SyncResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn upload(&self, _: &String) -> SyncResult<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(600)).await;
            }
            Ok(())
        }

        async fn is_delivered(&self, _: &String) -> SyncResult<bool> {
            Ok(false)
        }

        async fn mark_delivered(&self, _: &String) -> SyncResult<()> {
            Ok(())
        }

        async fn delete_row(&self, record: &String) -> SyncResult<bool> {
            self.deleted.lock().unwrap().push(record.clone());
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_upload_times_out_and_pass_continues() {
        let kind = StallingKind {
            calls: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
        };
        let started = tokio::time::Instant::now();

        let report = OutboxUploader::default()
            .upload_all(&kind, vec!["A".into(), "B".into()], &IdentityFallback::default())
            .await;

        assert_eq!(report.succeeded, 1);
        assert!(matches!(report.failed[0].error, SyncError::Timeout(60)));
        assert_eq!(report.failed[0].record, "A");
        assert_eq!(*kind.deleted.lock().unwrap(), ["B"]);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(60));
        assert!(elapsed < Duration::from_secs(600));
    }
}
