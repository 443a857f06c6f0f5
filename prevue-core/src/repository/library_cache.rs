//! Library cache repository
//!
//! Persists the last synced library snapshot so schedules survive restarts
//! while Upstream is unreachable. Rows are replaced wholesale on sync.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::models::LibraryItem;
use crate::Result;

#[derive(Clone)]
pub struct LibraryCacheRepository {
    pool: SqlitePool,
}

impl LibraryCacheRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace the cached snapshot for a server in one transaction.
    pub async fn replace(&self, server_id: &str, items: &[LibraryItem]) -> Result<()> {
        let synced_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM library_cache WHERE server_id = ?")
            .bind(server_id)
            .execute(&mut *tx)
            .await?;
        for item in items {
            sqlx::query(
                "INSERT INTO library_cache (server_id, item_id, payload, synced_at) VALUES (?, ?, ?, ?)",
            )
            .bind(server_id)
            .bind(&item.id)
            .bind(serde_json::to_string(item)?)
            .bind(synced_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Load the cached snapshot with its sync timestamp.
    pub async fn load(&self, server_id: &str) -> Result<Option<(Vec<LibraryItem>, DateTime<Utc>)>> {
        let rows = sqlx::query(
            "SELECT payload, synced_at FROM library_cache WHERE server_id = ? ORDER BY item_id",
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let synced_at: DateTime<Utc> = rows[0].try_get("synced_at")?;
        let items = rows
            .into_iter()
            .map(|row| {
                let payload: String = row.try_get("payload")?;
                Ok(serde_json::from_str(&payload)?)
            })
            .collect::<Result<Vec<LibraryItem>>>()?;
        Ok(Some((items, synced_at)))
    }

    pub async fn clear(&self, server_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM library_cache WHERE server_id = ?")
            .bind(server_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
