//! Tuning: (channel, now) → currently airing program + seek offset

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::ScheduleProgram;
use crate::repository::BlockRepository;
use crate::{Error, Result};

/// What a tune-in resolves to.
#[derive(Debug, Clone, Serialize)]
pub struct TuneResult {
    pub channel_number: i64,
    pub program: ScheduleProgram,
    /// The program airing after this one, possibly from the next block.
    pub next: Option<ScheduleProgram>,
    /// How far into the program the client joins, in milliseconds.
    pub seek_ms: i64,
}

#[derive(Clone)]
pub struct TuneResolver {
    blocks: BlockRepository,
}

impl TuneResolver {
    #[must_use]
    pub const fn new(blocks: BlockRepository) -> Self {
        Self { blocks }
    }

    /// Resolve the program airing on a channel at `now`.
    pub async fn current_program(
        &self,
        channel_number: i64,
        now: DateTime<Utc>,
    ) -> Result<TuneResult> {
        let current = self
            .blocks
            .get_covering(channel_number, now)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("No schedule for channel {channel_number}"))
            })?;

        // Flatten with the next block so "next" works at the block boundary.
        let mut programs = current.programs;
        if let Some(next_block) = self.blocks.get(channel_number, current.block_end).await? {
            programs.extend(next_block.programs);
        }

        let idx = programs
            .iter()
            .position(|p| p.start_time() <= now && now < p.end_time())
            .ok_or_else(|| {
                Error::NotFound(format!("Nothing airing on channel {channel_number}"))
            })?;

        let seek_ms = (now - programs[idx].start_time()).num_milliseconds();
        let next = programs.get(idx + 1).cloned();
        let program = programs.swap_remove(idx);

        Ok(TuneResult { channel_number, program, next, seek_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::library::tests::movie;
    use crate::models::ScheduleBlock;
    use crate::repository::test_support::test_pool;
    use chrono::Duration;

    async fn seeded_resolver() -> TuneResolver {
        let pool = test_pool().await;
        sqlx::query(
            "INSERT INTO channels (number, name, kind, item_ids, sort_order, created_at) VALUES (1, 'Ch', 'auto', '[]', 0, ?)",
        )
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        let blocks = BlockRepository::new(pool);
        let block_start: DateTime<Utc> = "2026-02-11T04:00:00Z".parse().unwrap();
        let mut programs = Vec::new();
        let mut cursor = block_start;
        for id in ["x", "y", "z"] {
            let end = cursor + Duration::hours(2);
            programs.push(ScheduleProgram::program(&movie(id, Some("PG")), cursor, end));
            cursor = end;
        }
        blocks
            .upsert(&ScheduleBlock {
                channel_number: 1,
                block_start,
                block_end: block_start + Duration::hours(24),
                seed: "s".to_string(),
                programs,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        TuneResolver::new(blocks)
    }

    #[tokio::test]
    async fn tuning_mid_program_returns_seek_offset() {
        let resolver = seeded_resolver().await;
        // Program "x" airs 04:00-06:00; tune in at 04:45.
        let result = resolver
            .current_program(1, "2026-02-11T04:45:00Z".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(result.program.item_id(), Some("x"));
        assert_eq!(result.seek_ms, 45 * 60_000);
        assert_eq!(result.next.unwrap().item_id(), Some("y"));
    }

    #[tokio::test]
    async fn tuning_at_program_start_has_zero_seek() {
        let resolver = seeded_resolver().await;
        let result = resolver
            .current_program(1, "2026-02-11T06:00:00Z".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(result.program.item_id(), Some("y"));
        assert_eq!(result.seek_ms, 0);
    }

    #[tokio::test]
    async fn missing_schedule_is_not_found() {
        let resolver = seeded_resolver().await;
        assert!(matches!(
            resolver
                .current_program(1, "2026-02-10T05:00:00Z".parse().unwrap())
                .await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            resolver
                .current_program(99, "2026-02-11T05:00:00Z".parse().unwrap())
                .await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn past_program_list_end_is_not_found() {
        let resolver = seeded_resolver().await;
        // The block covers 24 h but only 6 h carry programs in this seed.
        assert!(resolver
            .current_program(1, "2026-02-11T12:00:00Z".parse().unwrap())
            .await
            .is_err());
    }
}
