//! # Configuration Sync
//!
//! Keeps the cached machine configuration and frame catalog current.
//!
//! ## Refresh Triggers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       ConfigSyncService                                 │
//! │                                                                         │
//! │  app start / "Sync now" ──► sync_configuration()                       │
//! │                               ├── fetch config  ──► replace (1 tx)     │
//! │                               └── fetch catalog ──► replace_all (1 tx) │
//! │                                                                         │
//! │  frame_catalog() ──► offline AND catalog older than 30 min?            │
//! │                        ├── yes ──► passive catalog refresh, then read  │
//! │                        └── no  ──► read cache only                     │
//! │                                                                         │
//! │  Any network failure leaves the cache untouched and usable.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use kiosk_core::staleness::StalenessPolicy;
use kiosk_core::{
    Clock, FrameTemplate, MachineConfiguration, REMOTE_CALL_TIMEOUT_SECS, SETTING_MACHINE_CODE,
};
use kiosk_db::Database;

use crate::api::{bounded, RemoteApi};
use crate::config::KioskConfig;
use crate::error::{SyncError, SyncResult};

/// Fetches, caches and serves configuration and catalog.
#[derive(Clone)]
pub struct ConfigSyncService {
    db: Database,
    api: Arc<dyn RemoteApi>,
    clock: Arc<dyn Clock>,
    policy: StalenessPolicy,
    static_machine_code: Option<String>,
    call_timeout: Duration,
}

impl ConfigSyncService {
    pub fn new(db: Database, api: Arc<dyn RemoteApi>, clock: Arc<dyn Clock>) -> Self {
        ConfigSyncService {
            db,
            api,
            clock,
            policy: StalenessPolicy::default(),
            static_machine_code: None,
            call_timeout: Duration::from_secs(REMOTE_CALL_TIMEOUT_SECS),
        }
    }

    /// Service wired from the static configuration file.
    pub fn from_config(
        db: Database,
        api: Arc<dyn RemoteApi>,
        clock: Arc<dyn Clock>,
        config: &KioskConfig,
    ) -> Self {
        ConfigSyncService::new(db, api, clock)
            .with_policy(config.staleness_policy())
            .with_static_machine_code(config.machine.code.clone())
            .with_call_timeout(config.call_timeout())
    }

    pub fn with_policy(mut self, policy: StalenessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Machine code from the static configuration file, used when settings
    /// hold none.
    pub fn with_static_machine_code(mut self, machine_code: Option<String>) -> Self {
        self.static_machine_code = machine_code.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    async fn machine_code(&self) -> SyncResult<String> {
        let from_settings = self
            .db
            .settings()
            .get_value(SETTING_MACHINE_CODE)
            .await?
            .filter(|c| !c.trim().is_empty());

        from_settings
            .or_else(|| self.static_machine_code.clone())
            .ok_or(SyncError::MissingMachineCode)
    }

    // =========================================================================
    // Active Sync
    // =========================================================================

    /// Fetches configuration and catalog and persists whatever arrived.
    ///
    /// Returns true only when both halves were fetched and stored.
    pub async fn sync_configuration(&self) -> bool {
        let machine_code = match self.machine_code().await {
            Ok(code) => code,
            Err(e) => {
                warn!(error = %e, "Configuration sync skipped");
                return false;
            }
        };

        let config_ok = match self.refresh_configuration(&machine_code).await {
            Ok(()) => true,
            Err(e) => {
                warn!(machine_code = %machine_code, error = %e, "Configuration refresh failed, keeping cache");
                false
            }
        };

        let catalog_ok = match self.refresh_catalog(&machine_code).await {
            Ok(()) => true,
            Err(e) => {
                warn!(machine_code = %machine_code, error = %e, "Catalog refresh failed, keeping cache");
                false
            }
        };

        info!(config_ok, catalog_ok, "Configuration sync finished");
        config_ok && catalog_ok
    }

    async fn refresh_configuration(&self, machine_code: &str) -> SyncResult<()> {
        let fetched = bounded(self.call_timeout, self.api.fetch_configuration(machine_code)).await?;
        let Some(config) = fetched else {
            return Err(SyncError::RemoteRejected {
                status: 200,
                message: format!("no configuration for machine {machine_code}"),
            });
        };

        let stored = self.db.machine_config().replace(&config, self.clock.now()).await?;

        info!(
            machine_code = %stored.machine_code,
            offline = stored.offline,
            version = stored.version,
            "Configuration cached"
        );
        Ok(())
    }

    async fn refresh_catalog(&self, machine_code: &str) -> SyncResult<()> {
        let fetched = bounded(self.call_timeout, self.api.fetch_frame_catalog(machine_code)).await?;
        let Some(templates) = fetched else {
            return Err(SyncError::RemoteRejected {
                status: 200,
                message: format!("no frame catalog for machine {machine_code}"),
            });
        };

        let count = self.db.catalog().replace_all(&templates, self.clock.now()).await?;
        info!(templates = count, "Frame catalog cached");
        Ok(())
    }

    // =========================================================================
    // Cached Reads
    // =========================================================================

    /// The cached configuration. Never touches the network.
    pub async fn effective_configuration(&self) -> SyncResult<Option<MachineConfiguration>> {
        Ok(self.db.machine_config().get().await?)
    }

    /// The cached catalog, passively refreshed first when operating offline
    /// with a stale cache.
    pub async fn frame_catalog(&self) -> SyncResult<Vec<FrameTemplate>> {
        let offline = self
            .effective_configuration()
            .await?
            .is_some_and(|c| c.offline);
        let saved_at = self.db.catalog().last_saved_at().await?;

        if self.policy.should_refresh(offline, saved_at, self.clock.now()) {
            debug!(?saved_at, "Catalog stale, refreshing");
            match self.machine_code().await {
                Ok(code) => {
                    if let Err(e) = self.refresh_catalog(&code).await {
                        warn!(error = %e, "Passive catalog refresh failed, serving cache");
                    }
                }
                Err(e) => warn!(error = %e, "Passive catalog refresh skipped"),
            }
        }

        Ok(self.db.catalog().list().await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{machine_config, template, FakeRemote};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use kiosk_core::{ManualClock, SETTING_SITE_CODE};
    use kiosk_db::DbConfig;

    struct Fixture {
        db: Database,
        api: Arc<FakeRemote>,
        clock: Arc<ManualClock>,
        service: ConfigSyncService,
    }

    async fn fixture(remote_offline_flag: bool) -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let api = Arc::new(FakeRemote::with_configuration(machine_config(remote_offline_flag)));
        api.set_catalog(Some(vec![template("f1", "standard"), template("f2", "wide")]));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
        ));
        let service = ConfigSyncService::new(db.clone(), api.clone(), clock.clone())
            .with_static_machine_code(Some("M100".into()));

        Fixture {
            db,
            api,
            clock,
            service,
        }
    }

    #[tokio::test]
    async fn test_sync_caches_configuration_and_catalog() {
        let f = fixture(false).await;

        assert!(f.service.sync_configuration().await);

        let cached = f.service.effective_configuration().await.unwrap().unwrap();
        assert_eq!(cached.machine_code, "M100");
        assert_eq!(cached.version, 1);
        assert_eq!(f.service.frame_catalog().await.unwrap().len(), 2);
        assert_eq!(f.db.settings().get_value(SETTING_SITE_CODE).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sync_leaves_operator_identity_alone() {
        let f = fixture(false).await;
        let settings = f.db.settings();
        settings.set(SETTING_MACHINE_CODE, "M100").await.unwrap();
        settings.set(SETTING_SITE_CODE, "S99").await.unwrap();

        // Backend answers with site S01.
        assert!(f.service.sync_configuration().await);

        assert_eq!(
            settings.get_value(SETTING_MACHINE_CODE).await.unwrap().as_deref(),
            Some("M100")
        );
        assert_eq!(
            settings.get_value(SETTING_SITE_CODE).await.unwrap().as_deref(),
            Some("S99")
        );
        let cached = f.service.effective_configuration().await.unwrap().unwrap();
        assert_eq!(cached.site_code, "S01");
    }

    #[tokio::test]
    async fn test_network_failure_keeps_cache() {
        let f = fixture(false).await;
        assert!(f.service.sync_configuration().await);
        let before = f.service.effective_configuration().await.unwrap();

        f.api.go_offline();
        assert!(!f.service.sync_configuration().await);

        assert_eq!(f.service.effective_configuration().await.unwrap(), before);
        assert_eq!(f.service.frame_catalog().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_null_catalog_keeps_cached_catalog_but_stores_config() {
        let f = fixture(false).await;
        assert!(f.service.sync_configuration().await);

        let mut changed = machine_config(true);
        changed.site_code = "S02".into();
        f.api.set_configuration(Some(changed));
        f.api.set_catalog(None);

        assert!(!f.service.sync_configuration().await);

        let cached = f.service.effective_configuration().await.unwrap().unwrap();
        assert_eq!(cached.site_code, "S02");
        assert_eq!(cached.version, 2);
        assert_eq!(f.db.catalog().list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_machine_code_skips_sync() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let api = Arc::new(FakeRemote::with_configuration(machine_config(false)));
        let service = ConfigSyncService::new(db, api.clone(), Arc::new(kiosk_core::SystemClock))
            .with_static_machine_code(Some("   ".into()));

        assert!(!service.sync_configuration().await);
        assert_eq!(api.config_fetches(), 0);
    }

    #[tokio::test]
    async fn test_settings_machine_code_wins_over_static() {
        let f = fixture(false).await;
        f.db.settings().set(SETTING_MACHINE_CODE, "M200").await.unwrap();

        assert_eq!(f.service.machine_code().await.unwrap(), "M200");
    }

    #[tokio::test]
    async fn test_from_config_uses_configured_window() {
        let mut config = KioskConfig::default();
        config.machine.code = Some("M100".into());
        config.sync.catalog_staleness_minutes = 5;

        let f = fixture(true).await;
        let service = ConfigSyncService::from_config(f.db.clone(), f.api.clone(), f.clock.clone(), &config);
        assert!(service.sync_configuration().await);

        f.clock.advance(ChronoDuration::minutes(6));
        service.frame_catalog().await.unwrap();
        assert_eq!(f.api.catalog_fetches(), 2);
    }

    #[tokio::test]
    async fn test_passive_refresh_only_when_offline_and_stale() {
        let f = fixture(true).await;
        assert!(f.service.sync_configuration().await);
        assert_eq!(f.api.catalog_fetches(), 1);

        f.clock.advance(ChronoDuration::minutes(29));
        f.service.frame_catalog().await.unwrap();
        assert_eq!(f.api.catalog_fetches(), 1);

        f.clock.advance(ChronoDuration::minutes(2));
        f.service.frame_catalog().await.unwrap();
        assert_eq!(f.api.catalog_fetches(), 2);

        // The refresh reset the window.
        f.service.frame_catalog().await.unwrap();
        assert_eq!(f.api.catalog_fetches(), 2);
    }

    #[tokio::test]
    async fn test_no_passive_refresh_while_online() {
        let f = fixture(false).await;
        assert!(f.service.sync_configuration().await);

        f.clock.advance(ChronoDuration::hours(6));
        f.service.frame_catalog().await.unwrap();

        assert_eq!(f.api.catalog_fetches(), 1);
    }

    #[tokio::test]
    async fn test_failed_passive_refresh_serves_cache() {
        let f = fixture(true).await;
        assert!(f.service.sync_configuration().await);

        f.api.go_offline();
        f.clock.advance(ChronoDuration::minutes(45));

        assert_eq!(f.service.frame_catalog().await.unwrap().len(), 2);
        assert_eq!(f.api.catalog_fetches(), 2);
    }
}
