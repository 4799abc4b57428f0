//! # Kiosk Configuration
//!
//! Static configuration for the sync core.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KIOSK_MACHINE_CODE=M100                                            │
//! │     KIOSK_API_URL=https://backend.example.com/api                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/kiosk-sync/kiosk.toml (Linux)                            │
//! │     %APPDATA%\kiosk\sync\config\kiosk.toml (Windows)                   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The machine/site codes here are the last link of the identity fallback
//! chain; AppSettings values win over them.
//!
//! ## Configuration File Format
//! ```toml
//! [machine]
//! code = "M100"
//! site_code = "S01"
//!
//! [api]
//! base_url = "https://backend.example.com/api"
//! timeout_secs = 60
//!
//! [store]
//! database_path = "C:/kiosk/kiosk.db"   # default: next to the executable
//!
//! [sync]
//! catalog_staleness_minutes = 30
//!
//! [fanout]
//! standard_spool_dir = "D:/spool/standard"
//! wide_spool_dir = "D:/spool/wide"
//! archive_dir = "D:/archive"
//! wide_families = ["wide", "double"]
//! max_attempts = 3
//! backoff_ms = 500
//!
//! [outbox]
//! spool_dir = "C:/kiosk/outbox"          # default: OS temp storage
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use kiosk_core::staleness::StalenessPolicy;
use kiosk_core::validation::IdentityFallback;
use kiosk_db::{DbConfig, DbResult};

use crate::error::{SyncError, SyncResult};
use crate::fanout::FanoutTargets;
use crate::retry::RetryPolicy;

// =============================================================================
// Sections
// =============================================================================

/// Static machine identity, used when AppSettings has none.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineSection {
    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub site_code: Option<String>,
}

/// Remote backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    /// Base URL every endpoint path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Hard bound on every remote call (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_timeout() -> u64 {
    kiosk_core::REMOTE_CALL_TIMEOUT_SECS
}

impl Default for ApiSection {
    fn default() -> Self {
        ApiSection {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

/// LocalStore location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSection {
    /// Database file. `None` places it next to the executable.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

/// Cache refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_staleness")]
    pub catalog_staleness_minutes: i64,
}

fn default_staleness() -> i64 {
    kiosk_core::CATALOG_STALENESS_MINUTES
}

impl Default for SyncSection {
    fn default() -> Self {
        SyncSection {
            catalog_staleness_minutes: default_staleness(),
        }
    }
}

/// Post-session fan-out destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutSection {
    #[serde(default = "default_standard_spool")]
    pub standard_spool_dir: PathBuf,

    #[serde(default = "default_wide_spool")]
    pub wide_spool_dir: PathBuf,

    #[serde(default = "default_archive")]
    pub archive_dir: PathBuf,

    /// Frame families printed on the wide/duplicating printer.
    #[serde(default = "default_wide_families")]
    pub wide_families: Vec<String>,

    /// Attempts per copy.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts (milliseconds).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "kiosk", "sync")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("kiosk-sync"))
}

fn default_standard_spool() -> PathBuf {
    data_dir().join("spool").join("standard")
}

fn default_wide_spool() -> PathBuf {
    data_dir().join("spool").join("wide")
}

fn default_archive() -> PathBuf {
    data_dir().join("archive")
}

fn default_wide_families() -> Vec<String> {
    vec!["wide".to_string(), "double".to_string()]
}

fn default_max_attempts() -> u32 {
    kiosk_core::FANOUT_MAX_ATTEMPTS
}

fn default_backoff_ms() -> u64 {
    kiosk_core::FANOUT_BACKOFF_MS
}

impl Default for FanoutSection {
    fn default() -> Self {
        FanoutSection {
            standard_spool_dir: default_standard_spool(),
            wide_spool_dir: default_wide_spool(),
            archive_dir: default_archive(),
            wide_families: default_wide_families(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Where outbox-owned copies of composites live until uploaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboxSection {
    /// `None` uses OS temp storage.
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete kiosk sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KioskConfig {
    #[serde(default)]
    pub machine: MachineSection,

    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub fanout: FanoutSection,

    #[serde(default)]
    pub outbox: OutboxSection,
}

impl KioskConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (kiosk.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading kiosk config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load kiosk config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Kiosk config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = url::Url::parse(&self.api.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.sync.catalog_staleness_minutes <= 0 {
            return Err(SyncError::InvalidConfig(
                "sync.catalog_staleness_minutes must be greater than 0".into(),
            ));
        }

        if self.fanout.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "fanout.max_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `KIOSK_*` overrides read through `lookup`.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(code) = lookup("KIOSK_MACHINE_CODE") {
            debug!(machine_code = %code, "Overriding machine code from environment");
            self.machine.code = Some(code);
        }

        if let Some(site) = lookup("KIOSK_SITE_CODE") {
            self.machine.site_code = Some(site);
        }

        if let Some(url) = lookup("KIOSK_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Some(timeout) = lookup("KIOSK_API_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.api.timeout_secs = secs,
                Err(_) => warn!(value = %timeout, "Ignoring invalid KIOSK_API_TIMEOUT_SECS"),
            }
        }

        if let Some(path) = lookup("KIOSK_DATABASE_PATH") {
            self.store.database_path = Some(PathBuf::from(path));
        }

        if let Some(dir) = lookup("KIOSK_OUTBOX_DIR") {
            self.outbox.spool_dir = Some(PathBuf::from(dir));
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "kiosk", "sync")
            .map(|dirs| dirs.config_dir().join("kiosk.toml"))
    }

    // =========================================================================
    // Derived Settings
    // =========================================================================

    /// LocalStore configuration for this kiosk.
    pub fn database_config(&self) -> DbResult<DbConfig> {
        match &self.store.database_path {
            Some(path) => Ok(DbConfig::new(path)),
            None => DbConfig::beside_executable(),
        }
    }

    /// Deadline applied to every remote call.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn staleness_policy(&self) -> StalenessPolicy {
        StalenessPolicy::new(chrono::Duration::minutes(self.sync.catalog_staleness_minutes))
    }

    pub fn fanout_targets(&self) -> FanoutTargets {
        FanoutTargets {
            standard_spool_dir: self.fanout.standard_spool_dir.clone(),
            wide_spool_dir: self.fanout.wide_spool_dir.clone(),
            archive_dir: self.fanout.archive_dir.clone(),
            wide_families: self.fanout.wide_families.clone(),
        }
    }

    pub fn fanout_retry(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.fanout.max_attempts,
            Duration::from_millis(self.fanout.backoff_ms),
        )
    }

    /// Directory holding outbox-owned composite copies.
    pub fn outbox_spool_dir(&self) -> PathBuf {
        self.outbox
            .spool_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("kiosk-outbox"))
    }

    /// Identity fallback seeded with the static codes only.
    pub fn static_identity(&self) -> IdentityFallback {
        IdentityFallback {
            static_machine_code: self.machine.code.clone(),
            static_site_code: self.machine.site_code.clone(),
            ..IdentityFallback::default()
        }
    }
}
