//! # Sync Error Types
//!
//! Error types for configuration sync, outbox upload and session recording.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │       Local             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Network        │  │  Database (DbError)     │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  Filesystem             │ │
//! │  │  ConfigLoad/Save│  │  RemoteRejected │  │  Validation             │ │
//! │  │  MissingMachine │  │  Deserialization│  │  Core                   │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Coordination: SyncInProgress                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Partial fan-out failures are not `SyncError`s; they are collected as
//! [`crate::fanout::FanoutError`] entries in a fan-out report.

use thiserror::Error;

use kiosk_core::{CoreError, ValidationError};
use kiosk_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering every failure the sync layer reports.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid kiosk configuration.
    #[error("Invalid kiosk configuration: {0}")]
    InvalidConfig(String),

    /// Invalid API base URL.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// No machine code in settings or static configuration.
    #[error("Machine code not configured")]
    MissingMachineCode,

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Transport failure (DNS, connect, reset, TLS).
    #[error("Network error: {0}")]
    Network(String),

    /// The remote call did not finish in time.
    #[error("Remote call timed out after {0} seconds")]
    Timeout(u64),

    /// The backend answered but refused the request.
    #[error("Remote rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// Response body could not be decoded.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// LocalStore failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// File copy, read or removal failed.
    #[error("Filesystem error: {0}")]
    Filesystem(String),

    /// Queued record is missing required fields.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Session-level domain error.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Coordination Errors
    // =========================================================================
    /// Another sync pass holds the single-flight guard.
    #[error("A sync is already in progress")]
    SyncInProgress,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(kiosk_core::REMOTE_CALL_TIMEOUT_SECS)
        } else if err.is_decode() {
            SyncError::DeserializationFailed(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::RemoteRejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::DeserializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Filesystem(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if a later pass may succeed with the same record.
    ///
    /// Rejections are included: every non-success answer is retried the same
    /// way and only an operator discard removes a record.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Timeout(_) | SyncError::RemoteRejected { .. }
        )
    }

    /// Returns true for a 4xx rejection, which will most likely repeat.
    ///
    /// Informational only; it does not change retry behavior.
    pub fn is_permanent_rejection(&self) -> bool {
        matches!(self, SyncError::RemoteRejected { status, .. } if (400..500).contains(status))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
                | SyncError::MissingMachineCode
        )
    }

    /// Returns true if LocalStore or the filesystem failed.
    pub fn is_store_error(&self) -> bool {
        matches!(self, SyncError::Database(_) | SyncError::Filesystem(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Network("connection reset".into()).is_retryable());
        assert!(SyncError::Timeout(60).is_retryable());
        assert!(SyncError::RemoteRejected {
            status: 422,
            message: "bad frame".into()
        }
        .is_retryable());

        assert!(!SyncError::Validation(ValidationError::required("frame_id")).is_retryable());
        assert!(!SyncError::SyncInProgress.is_retryable());
    }

    #[test]
    fn test_permanent_rejection_is_4xx_only() {
        let client = SyncError::RemoteRejected {
            status: 400,
            message: "malformed".into(),
        };
        let server = SyncError::RemoteRejected {
            status: 503,
            message: "maintenance".into(),
        };

        assert!(client.is_permanent_rejection());
        assert!(!server.is_permanent_rejection());
        assert!(!SyncError::Timeout(60).is_permanent_rejection());
    }

    #[test]
    fn test_store_errors() {
        let err: SyncError = DbError::PoolExhausted.into();
        assert!(err.is_store_error());
        assert!(SyncError::Filesystem("disk full".into()).is_store_error());
        assert!(!SyncError::MissingMachineCode.is_store_error());
        assert!(SyncError::MissingMachineCode.is_config_error());
    }
}
