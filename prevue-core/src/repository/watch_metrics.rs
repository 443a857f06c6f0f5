//! Watch session repository
//!
//! Lightweight viewing records fed by stream progress reports, aggregated
//! for the metrics endpoint.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::Result;

/// Aggregated viewing totals for one channel.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelWatchTotals {
    pub channel_number: Option<i64>,
    pub sessions: i64,
    pub total_watched_ms: i64,
}

#[derive(Clone)]
pub struct WatchMetricsRepository {
    pool: SqlitePool,
}

impl WatchMetricsRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a new watch session and return its row id.
    pub async fn start(
        &self,
        channel_number: Option<i64>,
        item_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO watch_sessions (channel_number, item_id, started_at, position_ms, updated_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(channel_number)
        .bind(item_id)
        .bind(started_at)
        .bind(started_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Advance the furthest-seen position of the most recent session for an
    /// item; opens one implicitly if none exists.
    pub async fn record_progress(
        &self,
        channel_number: Option<i64>,
        item_id: &str,
        position_ms: i64,
    ) -> Result<()> {
        let now = Utc::now();
        let updated = sqlx::query(
            r"
            UPDATE watch_sessions
            SET position_ms = MAX(position_ms, ?), updated_at = ?
            WHERE id = (
                SELECT id FROM watch_sessions WHERE item_id = ? ORDER BY started_at DESC LIMIT 1
            )
            ",
        )
        .bind(position_ms)
        .bind(now)
        .bind(item_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            let id = self.start(channel_number, item_id, now).await?;
            sqlx::query("UPDATE watch_sessions SET position_ms = ? WHERE id = ?")
                .bind(position_ms)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Viewing totals grouped by channel, most-watched first.
    pub async fn totals_by_channel(&self) -> Result<Vec<ChannelWatchTotals>> {
        let rows = sqlx::query(
            r"
            SELECT channel_number, COUNT(*) AS sessions, SUM(position_ms) AS total_ms
            FROM watch_sessions
            GROUP BY channel_number
            ORDER BY total_ms DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(ChannelWatchTotals {
                    channel_number: row.try_get("channel_number")?,
                    sessions: row.try_get("sessions")?,
                    total_watched_ms: row.try_get::<Option<i64>, _>("total_ms")?.unwrap_or(0),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::test_pool;

    #[tokio::test]
    async fn progress_tracks_furthest_position() {
        let repo = WatchMetricsRepository::new(test_pool().await);
        repo.record_progress(Some(1), "m1", 30_000).await.unwrap();
        repo.record_progress(Some(1), "m1", 90_000).await.unwrap();
        // Rewinds never reduce the recorded position.
        repo.record_progress(Some(1), "m1", 60_000).await.unwrap();

        let totals = repo.totals_by_channel().await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].channel_number, Some(1));
        assert_eq!(totals[0].sessions, 1);
        assert_eq!(totals[0].total_watched_ms, 90_000);
    }

    #[tokio::test]
    async fn totals_group_by_channel() {
        let repo = WatchMetricsRepository::new(test_pool().await);
        repo.record_progress(Some(1), "m1", 10_000).await.unwrap();
        repo.record_progress(Some(2), "m2", 50_000).await.unwrap();

        let totals = repo.totals_by_channel().await.unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].channel_number, Some(2));
        assert_eq!(totals[0].total_watched_ms, 50_000);
    }
}
