//! # Sync Coordinator
//!
//! Entry point for operator-triggered and app-start sync.
//!
//! ## "Sync now"
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SyncCoordinator::sync_now                          │
//! │                                                                         │
//! │  guard.try_lock() ── held? ──► Err(SyncInProgress)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. ConfigSyncService::sync_configuration                              │
//! │  2. identity fallback  (settings codes + static codes)                 │
//! │  3. frame outbox       ──► OutboxUploader::upload_all                  │
//! │  4. transaction outbox ──► OutboxUploader::upload_all                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncSummary  "succeeded: N, failed: M"                                │
//! │       │                                                                 │
//! │       ├──► retry_failed(&summary)   same algorithm, failed subset      │
//! │       └──► discard_failed(&summary) delete rows (and frame files)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use kiosk_core::validation::IdentityFallback;
use kiosk_core::{
    Clock, OfflineFrameRecord, OutboxTopic, TransactionRecord, SETTING_MACHINE_CODE,
    SETTING_SITE_CODE,
};
use kiosk_db::Database;

use crate::api::RemoteApi;
use crate::config::KioskConfig;
use crate::config_sync::ConfigSyncService;
use crate::error::{SyncError, SyncResult};
use crate::outbox::{
    DiscardReport, FrameOutbox, OutboxKind, OutboxUploader, TransactionOutbox, UploadReport,
};

// =============================================================================
// Summary
// =============================================================================

/// Aggregate outcome of a sync pass, shown to the operator.
#[derive(Debug)]
pub struct SyncSummary {
    /// Whether configuration and catalog were both refreshed.
    pub configuration_synced: bool,
    pub frames: UploadReport<OfflineFrameRecord>,
    pub transactions: UploadReport<TransactionRecord>,
}

impl SyncSummary {
    pub fn succeeded(&self) -> usize {
        self.frames.succeeded + self.transactions.succeeded
    }

    pub fn failed(&self) -> usize {
        self.frames.failed_count() + self.transactions.failed_count()
    }

    pub fn store_errors(&self) -> impl Iterator<Item = &SyncError> {
        self.frames
            .store_errors
            .iter()
            .chain(self.transactions.store_errors.iter())
    }

    /// Failures the backend answered with a 4xx.
    pub fn permanent_rejections(&self) -> usize {
        self.frames.permanent_rejections() + self.transactions.permanent_rejections()
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "succeeded: {}, failed: {}", self.succeeded(), self.failed())
    }
}

/// Rows still waiting in each outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingCounts {
    pub frames: i64,
    pub transactions: i64,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Single-flight sync across configuration and both outboxes.
pub struct SyncCoordinator {
    db: Database,
    config_sync: ConfigSyncService,
    frames: FrameOutbox,
    transactions: TransactionOutbox,
    uploader: OutboxUploader,
    static_identity: IdentityFallback,
    guard: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        db: Database,
        config_sync: ConfigSyncService,
        api: Arc<dyn RemoteApi>,
        clock: Arc<dyn Clock>,
        uploader: OutboxUploader,
        static_identity: IdentityFallback,
    ) -> Self {
        SyncCoordinator {
            frames: FrameOutbox::new(db.clone(), api.clone(), clock.clone()),
            transactions: TransactionOutbox::new(db.clone(), api, clock),
            db,
            config_sync,
            uploader,
            static_identity,
            guard: Mutex::new(()),
        }
    }

    /// Coordinator wired from the static configuration file.
    pub fn from_config(
        db: Database,
        api: Arc<dyn RemoteApi>,
        clock: Arc<dyn Clock>,
        config: &KioskConfig,
    ) -> Self {
        let config_sync =
            ConfigSyncService::from_config(db.clone(), api.clone(), clock.clone(), config);
        SyncCoordinator::new(
            db,
            config_sync,
            api,
            clock,
            OutboxUploader::new(config.call_timeout()),
            config.static_identity(),
        )
    }

    pub fn config_sync(&self) -> &ConfigSyncService {
        &self.config_sync
    }

    /// Refreshes configuration once at startup. Failures are only logged.
    pub async fn on_app_start(&self) -> bool {
        let Ok(_guard) = self.guard.try_lock() else {
            info!("Sync already running, skipping startup refresh");
            return false;
        };

        let synced = self.config_sync.sync_configuration().await;
        if !synced {
            warn!("Startup configuration sync failed, running on cached configuration");
        }
        synced
    }

    /// Configuration sync followed by a pass over both outboxes.
    pub async fn sync_now(&self) -> SyncResult<SyncSummary> {
        let _guard = self
            .guard
            .try_lock()
            .map_err(|_| SyncError::SyncInProgress)?;

        info!("Sync started");
        let configuration_synced = self.config_sync.sync_configuration().await;
        let fallback = self.identity_fallback().await;

        let frames = self.drain(&self.frames, &fallback).await;
        let transactions = self.drain(&self.transactions, &fallback).await;

        let summary = SyncSummary {
            configuration_synced,
            frames,
            transactions,
        };
        info!(
            configuration_synced,
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Sync finished"
        );
        Ok(summary)
    }

    /// Re-runs the upload over the previous pass's failures only.
    pub async fn retry_failed(&self, previous: &SyncSummary) -> SyncResult<SyncSummary> {
        let _guard = self
            .guard
            .try_lock()
            .map_err(|_| SyncError::SyncInProgress)?;

        let fallback = self.identity_fallback().await;
        let frames = self
            .uploader
            .retry_failed(&self.frames, &previous.frames, &fallback)
            .await;
        let transactions = self
            .uploader
            .retry_failed(&self.transactions, &previous.transactions, &fallback)
            .await;

        let summary = SyncSummary {
            configuration_synced: false,
            frames,
            transactions,
        };
        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Retry finished"
        );
        Ok(summary)
    }

    /// Permanently deletes the previous pass's failures.
    pub async fn discard_failed(&self, previous: &SyncSummary) -> SyncResult<DiscardReport> {
        let _guard = self
            .guard
            .try_lock()
            .map_err(|_| SyncError::SyncInProgress)?;

        let mut report = self
            .uploader
            .discard_failed(&self.frames, &previous.frames)
            .await;
        let transactions = self
            .uploader
            .discard_failed(&self.transactions, &previous.transactions)
            .await;

        report.discarded += transactions.discarded;
        report.store_errors.extend(transactions.store_errors);

        warn!(discarded = report.discarded, "Failed outbox records discarded");
        Ok(report)
    }

    pub async fn pending_counts(&self) -> SyncResult<PendingCounts> {
        Ok(PendingCounts {
            frames: self.db.frame_outbox().count_pending().await?,
            transactions: self.db.transaction_outbox().count_pending().await?,
        })
    }

    async fn drain<K: OutboxKind>(
        &self,
        kind: &K,
        fallback: &IdentityFallback,
    ) -> UploadReport<K::Record> {
        match kind.list_pending().await {
            Ok(items) => self.uploader.upload_all(kind, items, fallback).await,
            Err(e) => {
                warn!(topic = %kind.topic(), error = %e, "Could not read outbox");
                let mut report = UploadReport::new(kind.topic());
                report.store_errors.push(e);
                report
            }
        }
    }

    /// Settings codes over static codes, read fresh for every pass.
    async fn identity_fallback(&self) -> IdentityFallback {
        let settings = self.db.settings();
        let mut fallback = self.static_identity.clone();

        match settings.get_value(SETTING_MACHINE_CODE).await {
            Ok(value) => fallback.settings_machine_code = value,
            Err(e) => warn!(error = %e, "Could not read machine code setting"),
        }
        match settings.get_value(SETTING_SITE_CODE).await {
            Ok(value) => fallback.settings_site_code = value,
            Err(e) => warn!(error = %e, "Could not read site code setting"),
        }

        fallback
    }
}

impl fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("topics", &[OutboxTopic::Frames, OutboxTopic::Transactions])
            .field("busy", &self.guard.try_lock().is_err())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{machine_config, sale_record, FakeRemote};
    use kiosk_core::SystemClock;
    use kiosk_db::DbConfig;

    async fn coordinator(api: Arc<FakeRemote>) -> (Database, Arc<SyncCoordinator>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut config = KioskConfig::default();
        config.machine.code = Some("M100".into());
        config.machine.site_code = Some("S01".into());

        let coordinator =
            SyncCoordinator::from_config(db.clone(), api, Arc::new(SystemClock), &config);
        (db, Arc::new(coordinator))
    }

    #[tokio::test]
    async fn test_sync_now_refreshes_and_drains() {
        let api = Arc::new(FakeRemote::with_configuration(machine_config(true)));
        api.set_catalog(Some(Vec::new()));
        let (db, coordinator) = coordinator(api.clone()).await;

        db.transaction_outbox().enqueue(&sale_record("ORD-1")).await.unwrap();
        db.transaction_outbox().enqueue(&sale_record("ORD-2")).await.unwrap();

        let summary = coordinator.sync_now().await.unwrap();

        assert!(summary.configuration_synced);
        assert_eq!(summary.to_string(), "succeeded: 2, failed: 0");
        assert_eq!(coordinator.pending_counts().await.unwrap(), PendingCounts::default());
        assert!(coordinator
            .config_sync()
            .effective_configuration()
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_failures_are_reported_then_retried() {
        let api = Arc::new(FakeRemote::with_configuration(machine_config(true)));
        api.set_catalog(Some(Vec::new()));
        api.fail_uploads_with(502);
        let (db, coordinator) = coordinator(api.clone()).await;

        db.transaction_outbox().enqueue(&sale_record("ORD-1")).await.unwrap();

        let summary = coordinator.sync_now().await.unwrap();
        assert_eq!(summary.to_string(), "succeeded: 0, failed: 1");
        assert_eq!(summary.permanent_rejections(), 0);
        assert_eq!(coordinator.pending_counts().await.unwrap().transactions, 1);

        api.recover();
        let retried = coordinator.retry_failed(&summary).await.unwrap();

        assert_eq!(retried.to_string(), "succeeded: 1, failed: 0");
        assert!(!retried.configuration_synced);
        assert_eq!(coordinator.pending_counts().await.unwrap().transactions, 0);
    }

    #[tokio::test]
    async fn test_discard_failed_empties_outbox() {
        let api = Arc::new(FakeRemote::with_configuration(machine_config(true)));
        api.fail_uploads_with(409);
        let (db, coordinator) = coordinator(api.clone()).await;

        db.transaction_outbox().enqueue(&sale_record("ORD-1")).await.unwrap();
        let summary = coordinator.sync_now().await.unwrap();
        assert_eq!(summary.permanent_rejections(), 1);

        let discarded = coordinator.discard_failed(&summary).await.unwrap();

        assert_eq!(discarded.discarded, 1);
        assert_eq!(coordinator.pending_counts().await.unwrap().transactions, 0);
        assert!(api.completed_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_offline_backend_still_drains_nothing_and_reports() {
        let api = Arc::new(FakeRemote::default());
        api.go_offline();
        let (db, coordinator) = coordinator(api.clone()).await;

        db.transaction_outbox().enqueue(&sale_record("ORD-1")).await.unwrap();
        let summary = coordinator.sync_now().await.unwrap();

        assert!(!summary.configuration_synced);
        assert_eq!(summary.failed(), 1);
        assert!(summary.transactions.failed[0].error.is_retryable());
        assert_eq!(summary.store_errors().count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_sync_is_rejected() {
        let api = Arc::new(FakeRemote::with_configuration(machine_config(false)));
        api.set_catalog(Some(Vec::new()));
        let gate = api.hold_fetches();
        let (_db, coordinator) = coordinator(api.clone()).await;

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.sync_now().await }
        });
        api.fetch_started().await;

        assert!(matches!(
            coordinator.sync_now().await,
            Err(SyncError::SyncInProgress)
        ));
        assert!(!coordinator.on_app_start().await);

        gate.notify_one();
        let summary = first.await.unwrap().unwrap();
        assert!(summary.configuration_synced);

        // Guard released: the next pass runs.
        assert!(coordinator.sync_now().await.is_ok());
    }

    #[tokio::test]
    async fn test_on_app_start_syncs_configuration_only() {
        let api = Arc::new(FakeRemote::with_configuration(machine_config(true)));
        api.set_catalog(Some(Vec::new()));
        let (db, coordinator) = coordinator(api.clone()).await;
        db.transaction_outbox().enqueue(&sale_record("ORD-1")).await.unwrap();

        assert!(coordinator.on_app_start().await);

        assert_eq!(api.config_fetches(), 1);
        assert!(api.completed_transactions().is_empty());
        assert_eq!(coordinator.pending_counts().await.unwrap().transactions, 1);
    }
}
