//! # Validation Module
//!
//! Identity fallback and validation for queued outbox records.
//!
//! ## Fallback Chain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Machine / Site Code Resolution                         │
//! │                                                                         │
//! │  1. Value stored on the record                                         │
//! │           │ empty?                                                      │
//! │           ▼                                                             │
//! │  2. AppSettings (machine_code / site_code)                             │
//! │           │ empty?                                                      │
//! │           ▼                                                             │
//! │  3. Static configuration file ([machine] section)                      │
//! │           │ empty?                                                      │
//! │           ▼                                                             │
//! │  ValidationError::Required → skipped, counted failed, no network call  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation never mutates the stored record: it returns a resolved copy
//! used only for the upload call.

use crate::error::ValidationError;
use crate::ids::is_well_formed_frame_id;
use crate::types::{OfflineFrameRecord, TransactionRecord};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identity Fallback
// =============================================================================

/// Fallback sources for machine and site codes, in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityFallback {
    /// Values from the AppSettings table.
    pub settings_machine_code: Option<String>,
    pub settings_site_code: Option<String>,
    /// Values from the static configuration file.
    pub static_machine_code: Option<String>,
    pub static_site_code: Option<String>,
}

impl IdentityFallback {
    /// Resolves a machine code, falling back settings → static config.
    pub fn machine_code(&self, own: &str) -> Option<String> {
        first_non_empty([
            Some(own),
            self.settings_machine_code.as_deref(),
            self.static_machine_code.as_deref(),
        ])
    }

    /// Resolves a site code, falling back settings → static config.
    pub fn site_code(&self, own: &str) -> Option<String> {
        first_non_empty([
            Some(own),
            self.settings_site_code.as_deref(),
            self.static_site_code.as_deref(),
        ])
    }
}

fn first_non_empty<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

// =============================================================================
// Record Validators
// =============================================================================

/// Validates a queued frame record and returns the copy to upload.
///
/// ## Rules
/// - `frame_id` must be present and well formed
/// - `file_path` must be present; `FrameOutbox` checks the file exists
///   before uploading
/// - machine and site code must resolve through the fallback chain
pub fn validate_frame_record(
    record: &OfflineFrameRecord,
    fallback: &IdentityFallback,
) -> ValidationResult<OfflineFrameRecord> {
    required("frame_id", &record.frame_id)?;
    if !is_well_formed_frame_id(&record.frame_id) {
        return Err(ValidationError::InvalidFormat {
            field: "frame_id".to_string(),
            reason: "expected OF-<yyMMdd>-<suffix>".to_string(),
        });
    }
    required("file_path", &record.file_path)?;

    let machine_code = fallback
        .machine_code(&record.machine_code)
        .ok_or_else(|| ValidationError::required("machine_code"))?;
    let site_code = fallback
        .site_code(&record.site_code)
        .ok_or_else(|| ValidationError::required("site_code"))?;

    Ok(OfflineFrameRecord {
        machine_code,
        site_code,
        ..record.clone()
    })
}

/// Validates a queued transaction record and returns the copy to upload.
///
/// ## Rules
/// - `order_id` and `frame_family` must be present
/// - `copies` must be positive; amounts must not be negative
/// - machine and site code must resolve through the fallback chain
pub fn validate_transaction_record(
    record: &TransactionRecord,
    fallback: &IdentityFallback,
) -> ValidationResult<TransactionRecord> {
    required("order_id", &record.order_id)?;
    required("frame_family", &record.frame_family)?;

    if record.copies <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "copies".to_string(),
        });
    }
    if record.price < 0 || record.total_amount < 0 {
        return Err(ValidationError::InvalidFormat {
            field: "total_amount".to_string(),
            reason: "amounts cannot be negative".to_string(),
        });
    }

    let machine_code = fallback
        .machine_code(&record.machine_code)
        .ok_or_else(|| ValidationError::required("machine_code"))?;
    let site_code = fallback
        .site_code(&record.site_code)
        .ok_or_else(|| ValidationError::required("site_code"))?;

    Ok(TransactionRecord {
        machine_code,
        site_code,
        ..record.clone()
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
