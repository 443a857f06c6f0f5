//! Database initialization

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::Config;

/// Open the embedded SQLite database: WAL journaling for concurrent
/// readers, foreign keys enforced, a generous busy timeout so the single
/// writer never surfaces spurious lock errors.
///
/// Migrations are run separately by the binary crate.
pub async fn init_database(config: &Config) -> Result<SqlitePool> {
    let path = config.data.database_path();
    std::fs::create_dir_all(&config.data.dir)
        .map_err(|e| anyhow::anyhow!("Cannot create data dir {}: {e}", config.data.dir))?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(10));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| anyhow::anyhow!("Database open failed for {path}: {e}"))?;

    info!(%path, "Database opened");
    Ok(pool)
}
