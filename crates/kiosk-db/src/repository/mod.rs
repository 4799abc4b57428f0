//! # Repository Module
//!
//! LocalStore repositories.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CACHED (wholesale replace, one transaction)                           │
//! │    MachineConfigRepository   machine_configuration + frame_prices      │
//! │    FrameCatalogRepository    frame_templates + catalog.last_saved_at   │
//! │                                                                         │
//! │  OUTBOX (single-row append / delete)                                   │
//! │    FrameOutboxRepository         offline_frames                        │
//! │    TransactionOutboxRepository   transaction_outbox                    │
//! │                                                                         │
//! │  BOOKKEEPING                                                           │
//! │    SettingsRepository            app_settings                          │
//! │    DeliveryReceiptRepository     delivery_receipts                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories are obtained from [`crate::Database`] and hold a clone of
//! its pool.

pub mod catalog;
pub mod config;
pub mod frame_outbox;
pub mod receipts;
pub mod settings;
pub mod transaction_outbox;
