//! # Session Context
//!
//! Everything one kiosk session knows, carried explicitly through the session
//! call chain instead of living in process-wide fields.
//!
//! ## Lifecycle
//! ```text
//! begin(config snapshot) ──► select_frame ──► [payment: attach_order]
//!        ──► attach_composite ──► SessionRecorder::complete_session(&ctx)
//!        ──► reset()  (next customer starts clean)
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::ids::generate_order_id;
use crate::types::{MachineConfiguration, OfflineFrameRecord, PaymentMode, TransactionRecord};

/// Largest number of printed copies a single session may order.
pub const MAX_SESSION_QUANTITY: u32 = 10;

/// Session-scoped state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Local session identifier, for log correlation.
    pub session_id: String,
    /// Configuration snapshot taken when the session began.
    pub config: Option<MachineConfiguration>,
    pub frame_family: String,
    pub quantity: u32,
    /// Unit price resolved from the snapshot's pricing list.
    pub price: i64,
    pub payment_mode: PaymentMode,
    /// Finished composite produced by the compositing collaborator.
    pub composite_path: Option<PathBuf>,
    pub event_id: Option<String>,
    /// Order id from a pending transaction, when the payment flow made one.
    pub order_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl SessionContext {
    /// Starts a session against a configuration snapshot.
    pub fn begin(config: Option<MachineConfiguration>, started_at: DateTime<Utc>) -> Self {
        let payment_mode = config
            .as_ref()
            .map(|c| c.payment_type)
            .unwrap_or_default();

        SessionContext {
            session_id: Uuid::new_v4().to_string(),
            config,
            frame_family: String::new(),
            quantity: 1,
            price: 0,
            payment_mode,
            composite_path: None,
            event_id: None,
            order_id: None,
            started_at,
        }
    }

    /// Chooses the frame family and copy count, pricing from the snapshot.
    ///
    /// Free sessions are priced at zero; otherwise the family must exist in
    /// the pricing list.
    pub fn select_frame(&mut self, frame_family: &str, quantity: u32) -> CoreResult<()> {
        if quantity == 0 || quantity > MAX_SESSION_QUANTITY {
            return Err(CoreError::InvalidQuantity {
                requested: quantity,
                max: MAX_SESSION_QUANTITY,
            });
        }

        let price = if self.payment_mode == PaymentMode::Free {
            0
        } else {
            self.config
                .as_ref()
                .and_then(|c| c.price_for(frame_family))
                .ok_or_else(|| CoreError::PriceNotFound(frame_family.to_string()))?
        };

        self.frame_family = frame_family.to_string();
        self.quantity = quantity;
        self.price = price;
        Ok(())
    }

    pub fn set_payment_mode(&mut self, mode: PaymentMode) {
        self.payment_mode = mode;
    }

    pub fn set_event(&mut self, event_id: impl Into<String>) {
        self.event_id = Some(event_id.into());
    }

    /// Records the order id handed out by a pending-transaction call.
    pub fn attach_order(&mut self, order_id: impl Into<String>) {
        self.order_id = Some(order_id.into());
    }

    pub fn attach_composite(&mut self, path: impl Into<PathBuf>) {
        self.composite_path = Some(path.into());
    }

    pub fn composite(&self) -> CoreResult<&Path> {
        self.composite_path
            .as_deref()
            .ok_or(CoreError::MissingComposite)
    }

    pub fn total_amount(&self) -> i64 {
        self.price * i64::from(self.quantity)
    }

    pub fn machine_code(&self) -> &str {
        self.config.as_ref().map(|c| c.machine_code.as_str()).unwrap_or("")
    }

    pub fn site_code(&self) -> &str {
        self.config.as_ref().map(|c| c.site_code.as_str()).unwrap_or("")
    }

    /// Returns the order id, generating a local one on first use.
    pub fn order_id_or_generate(&mut self) -> String {
        self.order_id.get_or_insert_with(generate_order_id).clone()
    }

    /// Builds the sale record for this session.
    pub fn transaction_record(&mut self, now: DateTime<Utc>) -> TransactionRecord {
        let order_id = self.order_id_or_generate();
        TransactionRecord {
            order_id,
            machine_code: self.machine_code().to_string(),
            site_code: self.site_code().to_string(),
            frame_family: self.frame_family.clone(),
            price: self.price,
            copies: i64::from(self.quantity),
            total_amount: self.total_amount(),
            payment_mode: self.payment_mode,
            event_id: self.event_id.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Builds the frame outbox record for an outbox-owned copy of the composite.
    pub fn frame_record(
        &self,
        frame_id: impl Into<String>,
        file_path: &Path,
        now: DateTime<Utc>,
    ) -> OfflineFrameRecord {
        OfflineFrameRecord {
            frame_id: frame_id.into(),
            machine_code: self.machine_code().to_string(),
            site_code: self.site_code().to_string(),
            file_path: file_path.to_string_lossy().into_owned(),
            event_id: self.event_id.clone(),
            created_at: now,
        }
    }

    /// Clears everything but the configuration snapshot, ready for the next
    /// customer.
    pub fn reset(&mut self, started_at: DateTime<Utc>) {
        *self = SessionContext::begin(self.config.take(), started_at);
    }
}
