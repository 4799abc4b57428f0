//! # Domain Types
//!
//! Records cached, queued and exchanged by the kiosk sync core.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  CACHED (replaced wholesale)          QUEUED (outbox, delete-on-ack)   │
//! │  ┌─────────────────────┐              ┌─────────────────────┐          │
//! │  │ MachineConfiguration│  singleton   │ OfflineFrameRecord  │          │
//! │  │  machine/site code  │              │  frame_id (key)     │          │
//! │  │  offline flag       │              │  file_path          │          │
//! │  │  prices[] ──────────┼─► FramePrice │  event_id?          │          │
//! │  └─────────────────────┘              └─────────────────────┘          │
//! │  ┌─────────────────────┐              ┌─────────────────────┐          │
//! │  │ FrameTemplate[]     │  catalog     │ TransactionRecord   │          │
//! │  │  frame_family       │              │  order_id (key)     │          │
//! │  │  local_saved_at     │              │  price × copies     │          │
//! │  └─────────────────────┘              └─────────────────────┘          │
//! │                                                                         │
//! │  SETTINGS: AppSetting { key, value, updated_at }                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Money
//! All amounts are integer minor currency units (`i64`), never floats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Payment Mode
// =============================================================================

/// How a sale was paid.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Cash acceptor.
    #[default]
    Cash,
    /// Card terminal.
    Card,
    /// QR code / e-wallet.
    Qr,
    /// Free session (event or operator comp).
    Free,
}

impl PaymentMode {
    /// Wire/database name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::Card => "card",
            PaymentMode::Qr => "qr",
            PaymentMode::Free => "free",
        }
    }

    /// Parses a backend payment string, accepting the aliases the backend
    /// has used. Unknown values map to `None`.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Some(PaymentMode::Cash),
            "card" | "debit" | "credit" | "edc" => Some(PaymentMode::Card),
            "qr" | "qris" | "ewallet" | "e-wallet" => Some(PaymentMode::Qr),
            "free" | "event" => Some(PaymentMode::Free),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Machine Configuration
// =============================================================================

/// Price of one frame family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FramePrice {
    /// Frame family code (e.g., "standard", "strip").
    pub frame_family: String,
    /// Price per session in minor units.
    pub price: i64,
}

/// The machine configuration cached from the backend.
///
/// Exactly one exists in LocalStore at any time. It is replaced wholesale on
/// every successful sync, never merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MachineConfiguration {
    /// Backend identifier.
    pub id: String,

    /// Machine code this kiosk reports as.
    pub machine_code: String,

    /// Site (venue) code.
    pub site_code: String,

    /// Payment type accepted by the machine.
    pub payment_type: PaymentMode,

    /// When set, completed sales are queued locally instead of sent directly.
    pub offline: bool,

    /// Per-frame-family pricing.
    pub prices: Vec<FramePrice>,

    /// Capture countdown in seconds.
    pub image_timer_secs: i64,

    /// Whether the backend has the machine enabled.
    pub is_active: bool,

    /// When this configuration was written locally.
    #[ts(as = "Option<String>")]
    pub last_saved_at: Option<DateTime<Utc>>,

    /// Local replacement counter, incremented on every wholesale replace.
    pub version: i64,
}

impl MachineConfiguration {
    /// Creates an online, active configuration with no prices.
    pub fn new(machine_code: impl Into<String>, site_code: impl Into<String>) -> Self {
        MachineConfiguration {
            id: String::new(),
            machine_code: machine_code.into(),
            site_code: site_code.into(),
            payment_type: PaymentMode::default(),
            offline: false,
            prices: Vec::new(),
            image_timer_secs: 5,
            is_active: true,
            last_saved_at: None,
            version: 0,
        }
    }

    /// Returns the configured price for a frame family.
    pub fn price_for(&self, frame_family: &str) -> Option<i64> {
        self.prices
            .iter()
            .find(|p| p.frame_family.eq_ignore_ascii_case(frame_family))
            .map(|p| p.price)
    }
}

// =============================================================================
// Frame Catalog
// =============================================================================

/// A frame template in the cached catalog.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FrameTemplate {
    pub id: String,
    pub machine_code: String,
    /// Frame family code; governs photo count and print routing.
    pub frame_family: String,
    pub status: String,
    /// Image payload or remote reference, stored as received.
    pub image: String,
    pub site_code: String,
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub updated_at: Option<DateTime<Utc>>,
    /// When this row was written locally.
    #[ts(as = "String")]
    pub local_saved_at: DateTime<Utc>,
}

// =============================================================================
// Outbox Records
// =============================================================================

/// A finished composite awaiting upload.
///
/// Queued once per completed session regardless of recording path. The row
/// and its file are removed together, only after the backend confirms.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OfflineFrameRecord {
    /// Generated id (`OF-<yyMMdd>-<suffix>`), the idempotency key.
    pub frame_id: String,
    pub machine_code: String,
    pub site_code: String,
    /// Path of the outbox-owned copy of the composite.
    pub file_path: String,
    pub event_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A completed sale awaiting upload.
///
/// Queued only when the session completes while the machine is offline.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransactionRecord {
    /// Idempotency key (local UUID or from a pending-transaction call).
    pub order_id: String,
    pub machine_code: String,
    pub site_code: String,
    pub frame_family: String,
    /// Unit price in minor units.
    pub price: i64,
    pub copies: i64,
    pub total_amount: i64,
    pub payment_mode: PaymentMode,
    pub event_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Settings
// =============================================================================

/// A generic key/value setting.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppSetting {
    pub key: String,
    pub value: String,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Outbox Topic
// =============================================================================

/// The two independent outbox queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxTopic {
    Frames,
    Transactions,
}

impl OutboxTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxTopic::Frames => "frames",
            OutboxTopic::Transactions => "transactions",
        }
    }
}

impl std::fmt::Display for OutboxTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
