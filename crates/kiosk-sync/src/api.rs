//! # Remote API
//!
//! The kiosk backend as seen by the sync core.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET  {base}/machine-config/{machineCode}  → Configuration | null      │
//! │  GET  {base}/frame-catalog/{machineCode}   → FrameTemplate[] | null    │
//! │  POST {base}/upload-frame          (multipart)         → bool          │
//! │  POST {base}/transactions/completed (JSON)             → bool          │
//! │  POST {base}/transactions/pending   (JSON)   → Transaction | null      │
//! │                                                                         │
//! │  Every body is wrapped: { "success": bool, "data": T, "message": str } │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`RemoteApi`] is the seam: [`HttpRemoteApi`] talks to the backend with
//! `reqwest`, tests substitute in-process fakes.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kiosk_core::{
    FramePrice, FrameTemplate, MachineConfiguration, OfflineFrameRecord, PaymentMode,
    TransactionRecord,
};

use crate::error::{SyncError, SyncResult};

const MAX_LOG_BODY_CHARS: usize = 512;

// =============================================================================
// Trait
// =============================================================================

/// Remote backend operations used by the sync core.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Current configuration for the machine, `None` if the backend has none.
    async fn fetch_configuration(
        &self,
        machine_code: &str,
    ) -> SyncResult<Option<MachineConfiguration>>;

    /// Frame catalog for the machine, `None` if the backend has none.
    async fn fetch_frame_catalog(&self, machine_code: &str)
        -> SyncResult<Option<Vec<FrameTemplate>>>;

    /// Uploads one composite. `Ok` only when the backend confirmed it.
    async fn upload_frame(&self, record: &OfflineFrameRecord) -> SyncResult<()>;

    /// Records a completed sale. `Ok` only when the backend confirmed it.
    async fn create_completed_transaction(&self, record: &TransactionRecord) -> SyncResult<()>;

    /// Opens a pending sale during the payment flow.
    async fn create_pending_transaction(
        &self,
        request: &PendingTransactionRequest,
    ) -> SyncResult<Option<TransactionRecord>>;
}

/// Runs a remote call under a hard deadline.
pub async fn bounded<T, F>(limit: Duration, call: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout(limit.as_secs())),
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// Uniform response wrapper.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemotePrice {
    frame_family: String,
    price: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteConfiguration {
    #[serde(default)]
    id: String,
    machine_code: String,
    #[serde(default)]
    site_code: String,
    #[serde(default)]
    payment_type: String,
    #[serde(default)]
    offline: bool,
    #[serde(default)]
    prices: Vec<RemotePrice>,
    #[serde(default = "default_image_timer")]
    image_timer: i64,
    #[serde(default = "default_true")]
    is_active: bool,
}

fn default_image_timer() -> i64 {
    5
}

fn default_true() -> bool {
    true
}

impl RemoteConfiguration {
    fn into_configuration(self) -> MachineConfiguration {
        let payment_type = PaymentMode::parse_lenient(&self.payment_type).unwrap_or_else(|| {
            warn!(
                payment_type = %self.payment_type,
                "Unknown payment type from backend, using default"
            );
            PaymentMode::default()
        });

        MachineConfiguration {
            id: self.id,
            machine_code: self.machine_code,
            site_code: self.site_code,
            payment_type,
            offline: self.offline,
            prices: self
                .prices
                .into_iter()
                .map(|p| FramePrice {
                    frame_family: p.frame_family,
                    price: p.price,
                })
                .collect(),
            image_timer_secs: self.image_timer,
            is_active: self.is_active,
            last_saved_at: None,
            version: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFrameTemplate {
    id: String,
    #[serde(default)]
    machine_code: String,
    frame_family: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    site_code: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl RemoteFrameTemplate {
    fn into_template(self, received_at: DateTime<Utc>) -> FrameTemplate {
        FrameTemplate {
            id: self.id,
            machine_code: self.machine_code,
            frame_family: self.frame_family,
            status: self.status,
            image: self.image,
            site_code: self.site_code,
            created_at: self.created_at,
            updated_at: self.updated_at,
            local_saved_at: received_at,
        }
    }
}

/// Body of `POST transactions/completed`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletedTransactionBody<'a> {
    machine_code: &'a str,
    site_code: &'a str,
    frame_family: &'a str,
    amount: i64,
    payment_method: &'static str,
    total_copies: i64,
    total_amount: i64,
    order_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<&'a str>,
}

impl<'a> From<&'a TransactionRecord> for CompletedTransactionBody<'a> {
    fn from(record: &'a TransactionRecord) -> Self {
        CompletedTransactionBody {
            machine_code: &record.machine_code,
            site_code: &record.site_code,
            frame_family: &record.frame_family,
            amount: record.price,
            payment_method: record.payment_mode.as_str(),
            total_copies: record.copies,
            total_amount: record.total_amount,
            order_id: &record.order_id,
            event_id: record.event_id.as_deref(),
        }
    }
}

/// Body of `POST transactions/pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransactionRequest {
    pub frame_family: String,
    pub amount: i64,
    pub machine_code: String,
    pub site_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteTransaction {
    order_id: String,
    #[serde(default)]
    total_copies: Option<i64>,
    #[serde(default)]
    total_amount: Option<i64>,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl RemoteTransaction {
    fn into_record(self, request: &PendingTransactionRequest, now: DateTime<Utc>) -> TransactionRecord {
        let created_at = self.created_at.unwrap_or(now);
        TransactionRecord {
            order_id: self.order_id,
            machine_code: request.machine_code.clone(),
            site_code: request.site_code.clone(),
            frame_family: request.frame_family.clone(),
            price: request.amount,
            copies: self.total_copies.unwrap_or(1),
            total_amount: self.total_amount.unwrap_or(request.amount),
            payment_mode: self
                .payment_method
                .as_deref()
                .and_then(PaymentMode::parse_lenient)
                .unwrap_or_default(),
            event_id: None,
            created_at,
            updated_at: created_at,
        }
    }
}

// =============================================================================
// Envelope Handling
// =============================================================================

fn preview(body: &str) -> String {
    let mut preview: String = body.chars().take(MAX_LOG_BODY_CHARS).collect();
    if body.chars().count() > MAX_LOG_BODY_CHARS {
        preview.push_str("...");
    }
    preview
}

/// Unwraps a response body, turning HTTP errors and `success: false` into
/// `RemoteRejected`.
fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> SyncResult<Option<T>> {
    if !(200..300).contains(&status) {
        debug!(status, body = %preview(body), "API response error");
        return Err(SyncError::RemoteRejected {
            status,
            message: preview(body),
        });
    }

    let envelope: Envelope<T> = serde_json::from_str(body)?;
    if !envelope.success {
        return Err(SyncError::RemoteRejected {
            status,
            message: envelope
                .message
                .unwrap_or_else(|| "request was not successful".to_string()),
        });
    }

    Ok(envelope.data)
}

/// A boolean answer counts as confirmation unless the backend says `false`.
fn parse_confirmation(status: u16, body: &str) -> SyncResult<()> {
    match parse_envelope::<bool>(status, body)? {
        Some(false) => Err(SyncError::RemoteRejected {
            status,
            message: "backend did not confirm".to_string(),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// HTTP Client
// =============================================================================

/// `reqwest` implementation of [`RemoteApi`].
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    client: reqwest::Client,
    base_url: url::Url,
}

impl HttpRemoteApi {
    /// Creates a client whose every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let base_url = url::Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(HttpRemoteApi {
            client,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// `<base>/<path>/<machine_code>` with the code as one escaped segment.
    fn machine_endpoint(&self, path: &str, machine_code: &str) -> SyncResult<url::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(path)
            .push(machine_code);
        Ok(url)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> SyncResult<Option<T>> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_envelope(status, &body)
    }

    async fn confirm(response: reqwest::Response) -> SyncResult<()> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_confirmation(status, &body)
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn fetch_configuration(
        &self,
        machine_code: &str,
    ) -> SyncResult<Option<MachineConfiguration>> {
        let response = self
            .client
            .get(self.machine_endpoint("machine-config", machine_code)?)
            .send()
            .await?;

        let remote: Option<RemoteConfiguration> = Self::read(response).await?;
        Ok(remote.map(RemoteConfiguration::into_configuration))
    }

    async fn fetch_frame_catalog(
        &self,
        machine_code: &str,
    ) -> SyncResult<Option<Vec<FrameTemplate>>> {
        let response = self
            .client
            .get(self.machine_endpoint("frame-catalog", machine_code)?)
            .send()
            .await?;

        let received_at = Utc::now();
        let remote: Option<Vec<RemoteFrameTemplate>> = Self::read(response).await?;
        Ok(remote.map(|templates| {
            templates
                .into_iter()
                .map(|t| t.into_template(received_at))
                .collect()
        }))
    }

    async fn upload_frame(&self, record: &OfflineFrameRecord) -> SyncResult<()> {
        let path = Path::new(&record.file_path);
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.jpg", record.frame_id));

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for(path))?;

        let mut form = Form::new()
            .part("file", part)
            .text("frameId", record.frame_id.clone())
            .text("machineCode", record.machine_code.clone())
            .text("siteCode", record.site_code.clone())
            .text("createdAt", record.created_at.to_rfc3339());
        if let Some(event_id) = &record.event_id {
            form = form.text("eventId", event_id.clone());
        }

        let response = self
            .client
            .post(self.endpoint("upload-frame"))
            .multipart(form)
            .send()
            .await?;

        Self::confirm(response).await
    }

    async fn create_completed_transaction(&self, record: &TransactionRecord) -> SyncResult<()> {
        let response = self
            .client
            .post(self.endpoint("transactions/completed"))
            .json(&CompletedTransactionBody::from(record))
            .send()
            .await?;

        Self::confirm(response).await
    }

    async fn create_pending_transaction(
        &self,
        request: &PendingTransactionRequest,
    ) -> SyncResult<Option<TransactionRecord>> {
        let response = self
            .client
            .post(self.endpoint("transactions/pending"))
            .json(request)
            .send()
            .await?;

        let remote: Option<RemoteTransaction> = Self::read(response).await?;
        Ok(remote.map(|t| t.into_record(request, Utc::now())))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
