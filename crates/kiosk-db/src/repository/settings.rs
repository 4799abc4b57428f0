//! # Settings Repository
//!
//! String key/value settings. Holds the fallback machine and site codes
//! and the catalog's last-saved instant.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use kiosk_core::AppSetting;

/// Upsert shared with transactions that touch settings alongside other tables.
pub(crate) const UPSERT_SETTING_SQL: &str = r#"
    INSERT INTO app_settings (key, value, updated_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT (key) DO UPDATE SET
        value = excluded.value,
        updated_at = excluded.updated_at
"#;

/// Repository for application settings.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Reads a setting with its timestamp.
    pub async fn get(&self, key: &str) -> DbResult<Option<AppSetting>> {
        let setting = sqlx::query_as::<_, AppSetting>(
            "SELECT key, value, updated_at FROM app_settings WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(setting)
    }

    /// Reads only the value of a setting.
    pub async fn get_value(&self, key: &str) -> DbResult<Option<String>> {
        Ok(self.get(key).await?.map(|s| s.value))
    }

    /// Writes a setting, overwriting any previous value.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<AppSetting> {
        self.set_at(key, value, Utc::now()).await
    }

    /// Writes a setting with an explicit timestamp.
    pub async fn set_at(
        &self,
        key: &str,
        value: &str,
        updated_at: DateTime<Utc>,
    ) -> DbResult<AppSetting> {
        debug!(key = %key, "Writing setting");

        sqlx::query(UPSERT_SETTING_SQL)
            .bind(key)
            .bind(value)
            .bind(updated_at)
            .execute(&self.pool)
            .await?;

        Ok(AppSetting {
            key: key.to_string(),
            value: value.to_string(),
            updated_at,
        })
    }
}
