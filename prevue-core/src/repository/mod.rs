//! Persistence layer: typed repositories over the embedded SQLite store
//!
//! Each repository is a thin, cloneable wrapper around the shared pool.
//! Every mutation touching more than one table runs in a transaction.

pub mod blocks;
pub mod channels;
pub mod library_cache;
pub mod servers;
pub mod settings;
pub mod watch_metrics;

pub use blocks::BlockRepository;
pub use channels::{ChannelDraft, ChannelRepository, ChannelUpdate};
pub use library_cache::LibraryCacheRepository;
pub use servers::ServerRepository;
pub use settings::SettingsRepository;
pub use watch_metrics::WatchMetricsRepository;

use sqlx::SqlitePool;

use crate::Result;

/// Wipe every table, returning the store to its just-migrated state.
pub async fn factory_reset(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for table in [
        "watch_sessions",
        "schedule_blocks",
        "library_cache",
        "channels",
        "settings",
        "servers",
    ] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    tracing::warn!("Factory reset: all persistent state wiped");
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    /// Fresh in-memory database with migrations applied. One connection so
    /// the `:memory:` database is shared across all queries.
    pub(crate) async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("open in-memory sqlite");
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .expect("enable foreign keys");
        sqlx::migrate!("../migrations")
            .run(&pool)
            .await
            .expect("run migrations");
        pool
    }
}
