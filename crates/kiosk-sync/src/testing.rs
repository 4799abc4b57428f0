//! In-process backend and record builders for unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use kiosk_core::validation::IdentityFallback;
use kiosk_core::{
    FramePrice, FrameTemplate, MachineConfiguration, OfflineFrameRecord, PaymentMode,
    TransactionRecord,
};

use crate::api::{PendingTransactionRequest, RemoteApi};
use crate::error::{SyncError, SyncResult};

/// Scriptable [`RemoteApi`].
#[derive(Default)]
pub struct FakeRemote {
    configuration: Mutex<Option<MachineConfiguration>>,
    catalog: Mutex<Option<Vec<FrameTemplate>>>,
    offline: Mutex<bool>,
    upload_failure: Mutex<Option<u16>>,
    uploaded_frames: Mutex<Vec<String>>,
    completed: Mutex<Vec<TransactionRecord>>,
    config_fetches: AtomicUsize,
    catalog_fetches: AtomicUsize,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
    fetch_entered: Notify,
}

impl FakeRemote {
    pub fn with_configuration(config: MachineConfiguration) -> Self {
        let fake = FakeRemote::default();
        fake.set_configuration(Some(config));
        fake
    }

    pub fn set_configuration(&self, config: Option<MachineConfiguration>) {
        *self.configuration.lock().unwrap() = config;
    }

    pub fn set_catalog(&self, catalog: Option<Vec<FrameTemplate>>) {
        *self.catalog.lock().unwrap() = catalog;
    }

    /// Every call fails with a network error until [`FakeRemote::recover`].
    pub fn go_offline(&self) {
        *self.offline.lock().unwrap() = true;
    }

    /// Uploads and completed transactions answer with `status`.
    pub fn fail_uploads_with(&self, status: u16) {
        *self.upload_failure.lock().unwrap() = Some(status);
    }

    pub fn recover(&self) {
        *self.offline.lock().unwrap() = false;
        *self.upload_failure.lock().unwrap() = None;
    }

    /// The next configuration fetch blocks until the returned handle is
    /// notified.
    pub fn hold_fetches(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.fetch_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once a configuration fetch is in flight.
    pub async fn fetch_started(&self) {
        self.fetch_entered.notified().await;
    }

    pub fn uploaded_frames(&self) -> Vec<String> {
        self.uploaded_frames.lock().unwrap().clone()
    }

    pub fn completed_transactions(&self) -> Vec<TransactionRecord> {
        self.completed.lock().unwrap().clone()
    }

    pub fn config_fetches(&self) -> usize {
        self.config_fetches.load(Ordering::SeqCst)
    }

    pub fn catalog_fetches(&self) -> usize {
        self.catalog_fetches.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> SyncResult<()> {
        if *self.offline.lock().unwrap() {
            return Err(SyncError::Network("connection refused".into()));
        }
        Ok(())
    }

    fn check_upload(&self) -> SyncResult<()> {
        self.check_online()?;
        match *self.upload_failure.lock().unwrap() {
            Some(status) => Err(SyncError::RemoteRejected {
                status,
                message: "scripted failure".into(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn fetch_configuration(
        &self,
        _machine_code: &str,
    ) -> SyncResult<Option<MachineConfiguration>> {
        self.config_fetches.fetch_add(1, Ordering::SeqCst);
        self.fetch_entered.notify_one();

        let gate = self.fetch_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.check_online()?;
        Ok(self.configuration.lock().unwrap().clone())
    }

    async fn fetch_frame_catalog(
        &self,
        _machine_code: &str,
    ) -> SyncResult<Option<Vec<FrameTemplate>>> {
        self.catalog_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.catalog.lock().unwrap().clone())
    }

    async fn upload_frame(&self, record: &OfflineFrameRecord) -> SyncResult<()> {
        self.check_upload()?;
        self.uploaded_frames
            .lock()
            .unwrap()
            .push(record.frame_id.clone());
        Ok(())
    }

    async fn create_completed_transaction(&self, record: &TransactionRecord) -> SyncResult<()> {
        self.check_upload()?;
        self.completed.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn create_pending_transaction(
        &self,
        request: &PendingTransactionRequest,
    ) -> SyncResult<Option<TransactionRecord>> {
        self.check_online()?;
        let now = Utc::now();
        Ok(Some(TransactionRecord {
            order_id: "ORD-PENDING-1".into(),
            machine_code: request.machine_code.clone(),
            site_code: request.site_code.clone(),
            frame_family: request.frame_family.clone(),
            price: request.amount,
            copies: 1,
            total_amount: request.amount,
            payment_mode: PaymentMode::default(),
            event_id: None,
            created_at: now,
            updated_at: now,
        }))
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn fallback_m100() -> IdentityFallback {
    IdentityFallback {
        static_machine_code: Some("M100".into()),
        static_site_code: Some("S01".into()),
        ..IdentityFallback::default()
    }
}

pub fn machine_config(offline: bool) -> MachineConfiguration {
    let mut config = MachineConfiguration::new("M100", "S01");
    config.offline = offline;
    config.prices = vec![
        FramePrice {
            frame_family: "standard".into(),
            price: 30_000,
        },
        FramePrice {
            frame_family: "wide".into(),
            price: 45_000,
        },
    ];
    config
}

pub fn template(id: &str, frame_family: &str) -> FrameTemplate {
    FrameTemplate {
        id: id.into(),
        machine_code: "M100".into(),
        frame_family: frame_family.into(),
        status: "active".into(),
        image: format!("{id}.png"),
        site_code: "S01".into(),
        created_at: None,
        updated_at: None,
        local_saved_at: Utc::now(),
    }
}

pub fn frame_record(frame_id: &str, path: &Path) -> OfflineFrameRecord {
    OfflineFrameRecord {
        frame_id: frame_id.into(),
        machine_code: "M100".into(),
        site_code: "S01".into(),
        file_path: path.to_string_lossy().into_owned(),
        event_id: None,
        created_at: Utc::now(),
    }
}

pub fn sale_record(order_id: &str) -> TransactionRecord {
    let now = Utc::now();
    TransactionRecord {
        order_id: order_id.into(),
        machine_code: "M100".into(),
        site_code: "S01".into(),
        frame_family: "standard".into(),
        price: 30_000,
        copies: 1,
        total_amount: 30_000,
        payment_mode: PaymentMode::Cash,
        event_id: None,
        created_at: now,
        updated_at: now,
    }
}
