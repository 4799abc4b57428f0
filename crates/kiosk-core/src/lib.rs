//! # kiosk-core: Pure Domain Logic for the Kiosk Sync Core
//!
//! This crate holds the records, decisions and policies of the offline-first
//! sync core as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Kiosk Sync Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                Kiosk Application (session lifecycle)            │   │
//! │  │   capture-complete ──► SessionRecorder   operator ──► Sync now  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                      kiosk-sync                                 │   │
//! │  │   ConfigSyncService • OutboxUploader • ArtifactFanoutWriter     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kiosk-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   mode    │  │ staleness │  │ validation│  │   │
//! │  │   │  Records  │  │ Recording │  │  30 min   │  │  fallback │  │   │
//! │  │   │  Config   │  │   Path    │  │  window   │  │   codes   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kiosk-db (LocalStore)                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Cached configuration, catalog, outbox records, settings
//! - [`mode`] - Per-session recording-path decision
//! - [`staleness`] - Passive refresh policy for cached data
//! - [`validation`] - Identity fallback and outbox record validation
//! - [`session`] - Session-scoped context passed through the session call chain
//! - [`ids`] - Frame id and order id generation
//! - [`clock`] - Injectable time source
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use kiosk_core::mode::{decide_recording_path, RecordingPath};
//! use kiosk_core::MachineConfiguration;
//!
//! let mut config = MachineConfiguration::new("M100", "S01");
//! config.offline = true;
//!
//! assert_eq!(decide_recording_path(Some(&config)), RecordingPath::RecordToOutbox);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod ids;
pub mod mode;
pub mod session;
pub mod staleness;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, ValidationError};
pub use mode::RecordingPath;
pub use session::SessionContext;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum age of the cached frame catalog before a passive refresh is
/// attempted while the machine operates offline.
pub const CATALOG_STALENESS_MINUTES: i64 = 30;

/// Hard bound on every remote call.
pub const REMOTE_CALL_TIMEOUT_SECS: u64 = 60;

/// Attempts per fan-out copy before the destination is counted failed.
pub const FANOUT_MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between fan-out copy attempts.
pub const FANOUT_BACKOFF_MS: u64 = 500;

/// Settings key holding the fallback machine code.
pub const SETTING_MACHINE_CODE: &str = "machine_code";

/// Settings key holding the fallback site code.
pub const SETTING_SITE_CODE: &str = "site_code";

/// Settings key holding the instant the frame catalog was last replaced.
pub const SETTING_CATALOG_SAVED_AT: &str = "catalog.last_saved_at";
