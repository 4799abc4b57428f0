//! # kiosk-db: LocalStore for the Kiosk Sync Core
//!
//! Durable SQLite storage for everything the kiosk must not lose across a
//! restart: the cached configuration and catalog, both outboxes, settings
//! and delivery receipts.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kiosk Data Flow                                  │
//! │                                                                         │
//! │  kiosk-sync (ConfigSyncService / SessionRecorder / OutboxUploader)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kiosk-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │◄───│ config/catalog │   │  (embedded)  │   │   │
//! │  │   │  SqlitePool   │    │ outboxes       │   │ 001_initial  │   │   │
//! │  │   │               │    │ settings       │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  kiosk.db (next to the kiosk executable)                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kiosk_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::beside_executable()?).await?;
//! let pending = db.frame_outbox().count_pending().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, DEFAULT_DATABASE_FILE};

pub use repository::catalog::FrameCatalogRepository;
pub use repository::config::MachineConfigRepository;
pub use repository::frame_outbox::FrameOutboxRepository;
pub use repository::receipts::DeliveryReceiptRepository;
pub use repository::settings::SettingsRepository;
pub use repository::transaction_outbox::TransactionOutboxRepository;
