//! Schedule block repository

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::models::{ScheduleBlock, ScheduleProgram};
use crate::Result;

#[derive(Clone)]
pub struct BlockRepository {
    pool: SqlitePool,
}

impl BlockRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert keyed by (channel, block_start); a re-run replaces
    /// the program list and refreshes `created_at`.
    pub async fn upsert(&self, block: &ScheduleBlock) -> Result<()> {
        let programs = serde_json::to_string(&block.programs)?;
        sqlx::query(
            r"
            INSERT INTO schedule_blocks (channel_number, block_start, block_end, seed, programs, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (channel_number, block_start) DO UPDATE SET
                block_end = excluded.block_end,
                seed = excluded.seed,
                programs = excluded.programs,
                created_at = excluded.created_at
            ",
        )
        .bind(block.channel_number)
        .bind(block.block_start)
        .bind(block.block_end)
        .bind(&block.seed)
        .bind(programs)
        .bind(block.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        channel_number: i64,
        block_start: DateTime<Utc>,
    ) -> Result<Option<ScheduleBlock>> {
        let row = sqlx::query(
            "SELECT * FROM schedule_blocks WHERE channel_number = ? AND block_start = ?",
        )
        .bind(channel_number)
        .bind(block_start)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(from_row).transpose()
    }

    /// The block containing `at`, if one exists.
    pub async fn get_covering(
        &self,
        channel_number: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<ScheduleBlock>> {
        let row = sqlx::query(
            r"
            SELECT * FROM schedule_blocks
            WHERE channel_number = ? AND block_start <= ? AND block_end > ?
            ORDER BY block_start DESC
            LIMIT 1
            ",
        )
        .bind(channel_number)
        .bind(at)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(from_row).transpose()
    }

    /// Blocks of one channel overlapping `[from, to)`, ordered by start.
    pub async fn for_channel_in_range(
        &self,
        channel_number: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduleBlock>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM schedule_blocks
            WHERE channel_number = ? AND block_end > ? AND block_start < ?
            ORDER BY block_start
            ",
        )
        .bind(channel_number)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(from_row).collect()
    }

    /// All channels' blocks overlapping `[from, to)`, ordered by
    /// (channel, start). Feeds the cross-channel tracker before a
    /// generation pass.
    pub async fn all_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduleBlock>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM schedule_blocks
            WHERE block_end > ? AND block_start < ?
            ORDER BY channel_number, block_start
            ",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(from_row).collect()
    }

    /// Item ids aired on a channel during `[from, to)`. Drives cooldowns.
    pub async fn item_ids_in_range(
        &self,
        channel_number: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<std::collections::HashSet<String>> {
        let blocks = self.for_channel_in_range(channel_number, from, to).await?;
        let mut ids = std::collections::HashSet::new();
        for block in blocks {
            for program in &block.programs {
                if let Some(item_id) = program.item_id() {
                    if program.start_time() < to && program.end_time() > from {
                        ids.insert(item_id.to_string());
                    }
                }
            }
        }
        Ok(ids)
    }

    /// Remove blocks that ended before the cutoff. Returns rows deleted.
    pub async fn clean_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM schedule_blocks WHERE block_end < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_for_channel(&self, channel_number: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM schedule_blocks WHERE channel_number = ?")
            .bind(channel_number)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM schedule_blocks")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScheduleBlock> {
    let programs: String = row.try_get("programs")?;
    let programs: Vec<ScheduleProgram> = serde_json::from_str(&programs)?;
    Ok(ScheduleBlock {
        channel_number: row.try_get("channel_number")?,
        block_start: row.try_get::<DateTime<Utc>, _>("block_start")?,
        block_end: row.try_get::<DateTime<Utc>, _>("block_end")?,
        seed: row.try_get("seed")?,
        programs,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
