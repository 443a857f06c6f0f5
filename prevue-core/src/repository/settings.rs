//! Settings repository

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Row, SqlitePool};

use crate::Result;

#[derive(Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<JsonValue>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let raw: String = r.try_get("value")?;
            Ok(serde_json::from_str(&raw)?)
        })
        .transpose()
    }

    pub async fn set(&self, key: &str, value: &JsonValue) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn all(&self) -> Result<Vec<(String, JsonValue)>> {
        let rows = sqlx::query("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let key: String = row.try_get("key")?;
                let raw: String = row.try_get("value")?;
                Ok((key, serde_json::from_str(&raw)?))
            })
            .collect()
    }
}
