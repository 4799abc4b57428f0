//! # Session Recorder
//!
//! Turns a completed session into durable local work.
//!
//! ## Completion Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │               SessionRecorder::complete_session(&ctx)                   │
//! │                                                                         │
//! │  1. fan-out composite ──► spool ×quantity + archive  (errors collected) │
//! │                                                                         │
//! │  2. copy composite ──► outbox spool/<frame_id>.<ext>                   │
//! │        └──► frame outbox row                          (ALWAYS)         │
//! │                                                                         │
//! │  3. decide_recording_path(ctx.config)                                  │
//! │        ├── RecordToOutbox    ──► transaction outbox row                │
//! │        └── RecordImmediately ──► POST transactions/completed           │
//! │                                   failure: logged, not queued           │
//! │                                                                         │
//! │  4. SessionOutcome { frame_id, order_id, fanout, errors }              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here returns an error: every failure lands in the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, warn};

use kiosk_core::ids::generate_frame_id;
use kiosk_core::mode::{decide_recording_path, RecordingPath};
use kiosk_core::{Clock, OutboxTopic, SessionContext, REMOTE_CALL_TIMEOUT_SECS};
use kiosk_db::Database;

use crate::api::{bounded, PendingTransactionRequest, RemoteApi};
use crate::config::KioskConfig;
use crate::error::{SyncError, SyncResult};
use crate::fanout::{ArtifactFanoutWriter, FanoutReport};

/// Attempts at finding an unused frame id before giving up.
const FRAME_ID_ATTEMPTS: usize = 16;

/// What happened to one completed session.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: String,
    /// Frame id queued for upload, if the frame was queued.
    pub frame_id: Option<String>,
    pub recording_path: RecordingPath,
    /// Order id of the sale, whether queued or sent.
    pub order_id: Option<String>,
    /// True when the sale reached the backend or the transaction outbox.
    pub sale_recorded: bool,
    pub fanout: FanoutReport,
    pub errors: Vec<SyncError>,
}

impl SessionOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.fanout.is_complete()
    }
}

/// Records completed sessions.
#[derive(Clone)]
pub struct SessionRecorder {
    db: Database,
    api: Arc<dyn RemoteApi>,
    clock: Arc<dyn Clock>,
    fanout: ArtifactFanoutWriter,
    outbox_spool_dir: PathBuf,
    call_timeout: Duration,
}

impl SessionRecorder {
    pub fn new(
        db: Database,
        api: Arc<dyn RemoteApi>,
        clock: Arc<dyn Clock>,
        fanout: ArtifactFanoutWriter,
        outbox_spool_dir: impl Into<PathBuf>,
    ) -> Self {
        SessionRecorder {
            db,
            api,
            clock,
            fanout,
            outbox_spool_dir: outbox_spool_dir.into(),
            call_timeout: Duration::from_secs(REMOTE_CALL_TIMEOUT_SECS),
        }
    }

    /// Recorder wired from the static configuration file.
    pub fn from_config(
        db: Database,
        api: Arc<dyn RemoteApi>,
        clock: Arc<dyn Clock>,
        config: &KioskConfig,
    ) -> Self {
        let fanout = ArtifactFanoutWriter::new(
            config.fanout_targets(),
            config.fanout_retry(),
            clock.clone(),
        );
        SessionRecorder::new(db, api, clock, fanout, config.outbox_spool_dir())
            .with_call_timeout(config.call_timeout())
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Opens a pending sale for the payment flow and attaches its order id
    /// to the session.
    pub async fn create_pending_transaction(
        &self,
        ctx: &mut SessionContext,
    ) -> SyncResult<Option<String>> {
        let request = PendingTransactionRequest {
            frame_family: ctx.frame_family.clone(),
            amount: ctx.total_amount(),
            machine_code: ctx.machine_code().to_string(),
            site_code: ctx.site_code().to_string(),
        };

        let created = bounded(
            self.call_timeout,
            self.api.create_pending_transaction(&request),
        )
        .await?;

        Ok(created.map(|record| {
            info!(session_id = %ctx.session_id, order_id = %record.order_id, "Pending transaction created");
            ctx.attach_order(record.order_id.clone());
            record.order_id
        }))
    }

    /// Persists everything a finished session produced.
    pub async fn complete_session(&self, ctx: &SessionContext) -> SessionOutcome {
        let mut ctx = ctx.clone();
        let recording_path = decide_recording_path(ctx.config.as_ref());

        let mut outcome = SessionOutcome {
            session_id: ctx.session_id.clone(),
            frame_id: None,
            recording_path,
            order_id: None,
            sale_recorded: false,
            fanout: FanoutReport::default(),
            errors: Vec::new(),
        };

        match ctx.composite().map(Path::to_path_buf) {
            Ok(composite) => {
                outcome.fanout = self
                    .fanout
                    .persist(&composite, ctx.quantity, &ctx.frame_family)
                    .await;

                match self.queue_frame(&ctx, &composite).await {
                    Ok(frame_id) => outcome.frame_id = Some(frame_id),
                    Err(e) => {
                        error!(session_id = %ctx.session_id, error = %e, "Frame could not be queued");
                        outcome.errors.push(e);
                    }
                }
            }
            Err(e) => {
                warn!(session_id = %ctx.session_id, "Session completed without a composite");
                outcome.errors.push(e.into());
            }
        }

        let now = self.clock.now();
        let record = ctx.transaction_record(now);
        outcome.order_id = Some(record.order_id.clone());

        match recording_path {
            RecordingPath::RecordToOutbox => {
                match self.db.transaction_outbox().enqueue(&record).await {
                    Ok(()) => {
                        info!(order_id = %record.order_id, total_amount = record.total_amount, "Sale queued");
                        outcome.sale_recorded = true;
                    }
                    Err(e) => {
                        error!(order_id = %record.order_id, error = %e, "Sale could not be queued");
                        outcome.errors.push(e.into());
                    }
                }
            }
            RecordingPath::RecordImmediately => {
                let sent = bounded(
                    self.call_timeout,
                    self.api.create_completed_transaction(&record),
                )
                .await;

                match sent {
                    Ok(()) => {
                        info!(order_id = %record.order_id, total_amount = record.total_amount, "Sale recorded");
                        outcome.sale_recorded = true;
                    }
                    Err(e) => {
                        // Not queued: online sales have no local fallback.
                        error!(
                            order_id = %record.order_id,
                            machine_code = %record.machine_code,
                            total_amount = record.total_amount,
                            error = %e,
                            "Sale not recorded, reconcile manually"
                        );
                        outcome.errors.push(e);
                    }
                }
            }
        }

        info!(
            session_id = %outcome.session_id,
            frame_id = ?outcome.frame_id,
            sale_recorded = outcome.sale_recorded,
            errors = outcome.errors.len(),
            fanout_errors = outcome.fanout.errors.len(),
            "Session completed"
        );
        outcome
    }

    /// Copies the composite into the outbox spool and queues its row.
    async fn queue_frame(&self, ctx: &SessionContext, composite: &Path) -> SyncResult<String> {
        let now = self.clock.now();
        let frame_id = self
            .unused_frame_id(now, &mut StdRng::from_entropy())
            .await?;

        let ext = composite
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        tokio::fs::create_dir_all(&self.outbox_spool_dir).await?;
        let owned_copy = self.outbox_spool_dir.join(format!("{frame_id}.{ext}"));
        tokio::fs::copy(composite, &owned_copy).await?;

        let record = ctx.frame_record(frame_id.clone(), &owned_copy, now);
        if let Err(e) = self.db.frame_outbox().enqueue(&record).await {
            let _ = tokio::fs::remove_file(&owned_copy).await;
            return Err(e.into());
        }

        info!(frame_id = %frame_id, path = %owned_copy.display(), "Frame queued");
        Ok(frame_id)
    }

    /// Draws ids until one is neither queued nor already delivered.
    ///
    /// Delivery receipts outlive their rows, so a delivered id handed out
    /// again would be deleted by the uploader without being sent.
    async fn unused_frame_id<R: Rng + Send>(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        rng: &mut R,
    ) -> SyncResult<String> {
        for _ in 0..FRAME_ID_ATTEMPTS {
            let candidate = generate_frame_id(now, rng);
            if self.db.frame_outbox().get(&candidate).await?.is_some() {
                debug!(frame_id = %candidate, "Frame id already queued");
                continue;
            }
            if self.db.receipts().contains(OutboxTopic::Frames, &candidate).await? {
                debug!(frame_id = %candidate, "Frame id already delivered");
                continue;
            }
            return Ok(candidate);
        }
        Err(SyncError::Internal(format!(
            "no unused frame id after {FRAME_ID_ATTEMPTS} attempts"
        )))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
