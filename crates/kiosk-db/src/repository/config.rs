//! # Machine Configuration Repository
//!
//! Stores the singleton machine configuration and its pricing list.
//!
//! ## Wholesale Replace
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   SINGLE TRANSACTION                                    │
//! │                                                                         │
//! │  1. SELECT version FROM machine_configuration WHERE slot = 1           │
//! │  2. DELETE FROM frame_prices            (dependents first)             │
//! │  3. UPSERT machine_configuration slot 1 (version + 1)                  │
//! │  4. INSERT INTO frame_prices ...        (one row per family)           │
//! │                                                                         │
//! │  COMMIT ← readers see the old configuration or the new one, never      │
//! │           an empty or mixed state. Any error rolls everything back.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;
use kiosk_core::{FramePrice, MachineConfiguration, PaymentMode};

/// Row shape of `machine_configuration`.
#[derive(Debug, sqlx::FromRow)]
struct ConfigRow {
    id: String,
    machine_code: String,
    site_code: String,
    payment_type: PaymentMode,
    offline: bool,
    image_timer_secs: i64,
    is_active: bool,
    last_saved_at: DateTime<Utc>,
    version: i64,
}

/// Repository for the cached machine configuration.
#[derive(Debug, Clone)]
pub struct MachineConfigRepository {
    pool: SqlitePool,
}

impl MachineConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MachineConfigRepository { pool }
    }

    /// Replaces the stored configuration and pricing list in one transaction.
    ///
    /// Returns the configuration as stored, with its new local version and
    /// `last_saved_at` set to `saved_at`.
    pub async fn replace(
        &self,
        config: &MachineConfiguration,
        saved_at: DateTime<Utc>,
    ) -> DbResult<MachineConfiguration> {
        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT version FROM machine_configuration WHERE slot = 1")
                .fetch_optional(&mut *tx)
                .await?;
        let version = current.unwrap_or(0) + 1;

        sqlx::query("DELETE FROM frame_prices WHERE config_slot = 1")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO machine_configuration (
                slot, id, machine_code, site_code, payment_type,
                offline, image_timer_secs, is_active, last_saved_at, version
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (slot) DO UPDATE SET
                id = excluded.id,
                machine_code = excluded.machine_code,
                site_code = excluded.site_code,
                payment_type = excluded.payment_type,
                offline = excluded.offline,
                image_timer_secs = excluded.image_timer_secs,
                is_active = excluded.is_active,
                last_saved_at = excluded.last_saved_at,
                version = excluded.version
            "#,
        )
        .bind(&config.id)
        .bind(&config.machine_code)
        .bind(&config.site_code)
        .bind(config.payment_type)
        .bind(config.offline)
        .bind(config.image_timer_secs)
        .bind(config.is_active)
        .bind(saved_at)
        .bind(version)
        .execute(&mut *tx)
        .await?;

        for (position, price) in config.prices.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO frame_prices (config_slot, frame_family, price, position)
                VALUES (1, ?1, ?2, ?3)
                "#,
            )
            .bind(&price.frame_family)
            .bind(price.price)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            machine_code = %config.machine_code,
            offline = config.offline,
            prices = config.prices.len(),
            version,
            "Machine configuration replaced"
        );

        let mut stored = config.clone();
        stored.version = version;
        stored.last_saved_at = Some(saved_at);
        Ok(stored)
    }

    /// Reads the cached configuration, if one was ever saved.
    pub async fn get(&self) -> DbResult<Option<MachineConfiguration>> {
        // Both reads share one snapshot.
        let mut tx = self.pool.begin().await?;

        let row: Option<ConfigRow> = sqlx::query_as(
            r#"
            SELECT id, machine_code, site_code, payment_type, offline,
                   image_timer_secs, is_active, last_saved_at, version
            FROM machine_configuration
            WHERE slot = 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            debug!("No cached machine configuration");
            return Ok(None);
        };

        let prices: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT frame_family, price
            FROM frame_prices
            WHERE config_slot = 1
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(MachineConfiguration {
            id: row.id,
            machine_code: row.machine_code,
            site_code: row.site_code,
            payment_type: row.payment_type,
            offline: row.offline,
            prices: prices
                .into_iter()
                .map(|(frame_family, price)| FramePrice { frame_family, price })
                .collect(),
            image_timer_secs: row.image_timer_secs,
            is_active: row.is_active,
            last_saved_at: Some(row.last_saved_at),
            version: row.version,
        }))
    }
}
