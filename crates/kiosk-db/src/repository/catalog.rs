//! # Frame Catalog Repository
//!
//! The cached frame-template catalog, replaced wholesale on every sync.
//!
//! The catalog's last-saved instant lives in `app_settings`
//! (`catalog.last_saved_at`) and is written in the same transaction as the
//! rows, so an empty catalog still carries a staleness timestamp.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::repository::settings::UPSERT_SETTING_SQL;
use kiosk_core::{FrameTemplate, SETTING_CATALOG_SAVED_AT};

/// Repository for the cached frame catalog.
#[derive(Debug, Clone)]
pub struct FrameCatalogRepository {
    pool: SqlitePool,
}

impl FrameCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        FrameCatalogRepository { pool }
    }

    /// Replaces the whole catalog in one transaction.
    ///
    /// Every stored template gets `local_saved_at = saved_at`. Returns the
    /// number of templates written.
    pub async fn replace_all(
        &self,
        templates: &[FrameTemplate],
        saved_at: DateTime<Utc>,
    ) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM frame_templates")
            .execute(&mut *tx)
            .await?;

        for template in templates {
            sqlx::query(
                r#"
                INSERT INTO frame_templates (
                    id, machine_code, frame_family, status, image,
                    site_code, created_at, updated_at, local_saved_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&template.id)
            .bind(&template.machine_code)
            .bind(&template.frame_family)
            .bind(&template.status)
            .bind(&template.image)
            .bind(&template.site_code)
            .bind(template.created_at)
            .bind(template.updated_at)
            .bind(saved_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(UPSERT_SETTING_SQL)
            .bind(SETTING_CATALOG_SAVED_AT)
            .bind(saved_at.to_rfc3339())
            .bind(saved_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(templates = templates.len(), "Frame catalog replaced");
        Ok(templates.len())
    }

    /// Lists the cached catalog, grouped by frame family.
    pub async fn list(&self) -> DbResult<Vec<FrameTemplate>> {
        let templates = sqlx::query_as::<_, FrameTemplate>(
            r#"
            SELECT id, machine_code, frame_family, status, image,
                   site_code, created_at, updated_at, local_saved_at
            FROM frame_templates
            ORDER BY frame_family ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(templates)
    }

    /// Lists templates of one frame family.
    pub async fn list_by_family(&self, frame_family: &str) -> DbResult<Vec<FrameTemplate>> {
        let templates = sqlx::query_as::<_, FrameTemplate>(
            r#"
            SELECT id, machine_code, frame_family, status, image,
                   site_code, created_at, updated_at, local_saved_at
            FROM frame_templates
            WHERE frame_family = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(frame_family)
        .fetch_all(&self.pool)
        .await?;

        Ok(templates)
    }

    /// When the catalog was last replaced, or `None` if it never was.
    pub async fn last_saved_at(&self) -> DbResult<Option<DateTime<Utc>>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM app_settings WHERE key = ?1")
                .bind(SETTING_CATALOG_SAVED_AT)
                .fetch_optional(&self.pool)
                .await?;

        raw.map(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| DbError::corrupt(SETTING_CATALOG_SAVED_AT, e.to_string()))
        })
        .transpose()
    }
}
