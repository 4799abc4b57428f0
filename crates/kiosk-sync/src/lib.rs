//! # kiosk-sync: Sync Engine for the Photo Kiosk
//!
//! Keeps a photo kiosk selling while the network comes and goes: cached
//! configuration, durable outboxes, and post-session file fan-out.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kiosk Sync Architecture                          │
//! │                                                                         │
//! │   session complete                     operator "Sync now" / app start  │
//! │         │                                          │                    │
//! │         ▼                                          ▼                    │
//! │  ┌────────────────┐                       ┌────────────────────┐        │
//! │  │ SessionRecorder│                       │  SyncCoordinator   │        │
//! │  │                │                       │  (single-flight)   │        │
//! │  └──┬──────┬──────┘                       └──┬──────────┬──────┘        │
//! │     │      │                                 │          │               │
//! │     ▼      ▼                                 ▼          ▼               │
//! │  ┌──────┐ ┌─────────────────┐  ┌──────────────────┐ ┌────────────────┐  │
//! │  │Fanout│ │ frame / sale    │  │ ConfigSyncService│ │ OutboxUploader │  │
//! │  │Writer│ │ outbox rows     │◄─┤ cache + staleness│ │ receipt, delete│  │
//! │  └──────┘ └─────────────────┘  └────────┬─────────┘ └───────┬────────┘  │
//! │                    │                    │                   │           │
//! │                    ▼                    ▼                   ▼           │
//! │            ┌──────────────┐      ┌───────────────────────────────┐      │
//! │            │ kiosk-db     │      │ RemoteApi (reqwest, 60 s cap) │      │
//! │            │ (LocalStore) │      └───────────────────────────────┘      │
//! │            └──────────────┘                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`] - `SyncCoordinator`, sync now / retry / discard
//! - [`config_sync`] - Configuration and catalog cache with passive refresh
//! - [`outbox`] - Sequential drain-retry-confirm uploader for both outboxes
//! - [`recorder`] - Session completion: fan-out, frame queue, sale routing
//! - [`fanout`] - Concurrent spool and archive copies
//! - [`api`] - `RemoteApi` trait and its `reqwest` client
//! - [`retry`] - Bounded-attempt retry policy
//! - [`config`] - Static TOML + environment configuration
//! - [`logging`] - Tracing subscriber setup
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kiosk_core::SystemClock;
//! use kiosk_db::Database;
//! use kiosk_sync::{HttpRemoteApi, KioskConfig, SessionRecorder, SyncCoordinator};
//!
//! kiosk_sync::logging::init_tracing();
//! let config = KioskConfig::load_or_default(None);
//! let db = Database::new(config.database_config()?).await?;
//! let api = Arc::new(HttpRemoteApi::new(&config.api.base_url, config.call_timeout())?);
//! let clock = Arc::new(SystemClock);
//!
//! let coordinator = SyncCoordinator::from_config(db.clone(), api.clone(), clock.clone(), &config);
//! coordinator.on_app_start().await;
//!
//! let recorder = SessionRecorder::from_config(db, api, clock, &config);
//! let outcome = recorder.complete_session(&ctx).await;
//!
//! let summary = coordinator.sync_now().await?;
//! println!("{summary}");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod api;
pub mod config;
pub mod config_sync;
pub mod coordinator;
pub mod error;
pub mod fanout;
pub mod logging;
pub mod outbox;
pub mod recorder;
pub mod retry;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::{HttpRemoteApi, PendingTransactionRequest, RemoteApi};
pub use config::KioskConfig;
pub use config_sync::ConfigSyncService;
pub use coordinator::{PendingCounts, SyncCoordinator, SyncSummary};
pub use error::{SyncError, SyncResult};
pub use fanout::{ArtifactFanoutWriter, FanoutError, FanoutReport, FanoutTargets};
pub use outbox::{
    DiscardReport, FailedItem, FrameOutbox, OutboxKind, OutboxUploader, TransactionOutbox,
    UploadReport,
};
pub use recorder::{SessionOutcome, SessionRecorder};
pub use retry::{RetryExhausted, RetryPolicy};
