//! Admin-editable runtime settings
//!
//! Stored as JSON values keyed by name; loaded on top of the `[business]`
//! section of the config file for every request that prices or schedules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mealdash_core::config::{BusinessSection, SETTING_KEYS};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::db::DbError;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Setting {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

pub struct SettingsRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> SettingsRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn all(&self) -> Result<Vec<Setting>, DbError> {
        let rows = sqlx::query_as::<_, Setting>("SELECT key, value, updated_at FROM settings ORDER BY key")
            .fetch_all(self.pool)
            .await?;
        Ok(rows)
    }

    /// Validate against `base` and store. Unknown keys and bad values are
    /// refused before anything is written.
    pub async fn put(&self, base: &BusinessSection, key: &str, value: serde_json::Value) -> Result<Setting, DbError> {
        base.clone().apply_setting(key, &value)?;

        let setting = sqlx::query_as::<_, Setting>(
            r#"
            INSERT INTO settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            RETURNING key, value, updated_at
            "#,
        )
        .bind(key)
        .bind(&value)
        .fetch_one(self.pool)
        .await?;
        tracing::info!(key, "setting updated");
        Ok(setting)
    }

    /// `base` with every stored setting applied.
    ///
    /// A stored value that no longer validates is skipped with a warning so
    /// one bad row cannot take checkout down.
    pub async fn effective(&self, base: &BusinessSection) -> Result<BusinessSection, DbError> {
        let mut business = base.clone();
        for setting in self.all().await? {
            if let Err(e) = business.apply_setting(&setting.key, &setting.value) {
                tracing::warn!(key = %setting.key, error = %e, "ignoring invalid stored setting");
            }
        }
        Ok(business)
    }

    /// Stored values plus file defaults for keys never set, for the admin screen.
    pub async fn snapshot(&self, base: &BusinessSection) -> Result<BTreeMap<&'static str, serde_json::Value>, DbError> {
        let business = self.effective(base).await?;
        let mut out = BTreeMap::new();
        for key in SETTING_KEYS {
            let value = match key {
                "delivery_fee_cents" => serde_json::json!(business.delivery_fee_cents),
                "free_delivery_threshold_cents" => serde_json::json!(business.free_delivery_threshold_cents),
                "order_cutoff_hours" => serde_json::json!(business.order_cutoff_hours),
                _ => serde_json::json!(business.delivery_days.to_string()),
            };
            out.insert(key, value);
        }
        Ok(out)
    }
}
