//! # Error Types
//!
//! Domain-specific error types for kiosk-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kiosk-core errors (this file)                                         │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Outbox record missing mandatory fields         │
//! │                                                                         │
//! │  kiosk-db errors (separate crate)                                      │
//! │  └── DbError          - LocalStore failures                            │
//! │                                                                         │
//! │  kiosk-sync errors (separate crate)                                    │
//! │  └── SyncError        - Network, rejection, storage, validation        │
//! │                                                                         │
//! │  Flow: ValidationError → SyncError → UploadReport → operator summary   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No machine configuration has been cached yet.
    ///
    /// ## When This Occurs
    /// - First boot before any successful configuration sync
    /// - LocalStore was wiped
    #[error("Machine configuration not available")]
    ConfigurationMissing,

    /// The session was completed without a composite image.
    #[error("Session has no composite image")]
    MissingComposite,

    /// A frame family has no price in the cached pricing list.
    #[error("No price configured for frame family {0}")]
    PriceNotFound(String),

    /// Copy quantity is outside the accepted range.
    #[error("Quantity {requested} must be between 1 and {max}")]
    InvalidQuantity { requested: u32, max: u32 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// A queued record is missing mandatory fields.
///
/// Raised before any network call. Such a record is permanently skipped
/// within an upload pass; only an operator discard removes it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty, even after fallback.
    #[error("{field} is required")]
    Required { field: String },

    /// Invalid format (e.g., malformed frame id).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },
}

impl ValidationError {
    /// Creates a Required error for the given field.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
