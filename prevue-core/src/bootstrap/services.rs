//! Service initialization and dependency wiring

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::repository::{
    BlockRepository, ChannelRepository, LibraryCacheRepository, ServerRepository,
    SettingsRepository, WatchMetricsRepository,
};
use crate::service::{
    Broadcaster, LibraryIndex, LibrarySync, LineupService, Scheduler, SessionRegistry,
    SettingsService, TokenCipher, TuneResolver,
};

/// Everything the HTTP layer and supervisor need, wired once at boot.
pub struct Services {
    pub pool: SqlitePool,
    pub servers: ServerRepository,
    pub channels: ChannelRepository,
    pub blocks: BlockRepository,
    pub watch_metrics: WatchMetricsRepository,
    pub settings: SettingsService,
    pub library: Arc<LibraryIndex>,
    pub library_sync: Arc<LibrarySync>,
    pub sessions: Arc<SessionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub scheduler: Arc<Scheduler>,
    pub lineup: Arc<LineupService>,
    pub tuner: TuneResolver,
}

/// Build the service graph over an opened pool.
pub fn init_services(pool: SqlitePool, config: &Config) -> Result<Services> {
    let cipher = TokenCipher::from_config(config.security.encryption_key.as_deref());

    let servers = ServerRepository::new(pool.clone(), cipher);
    let channels = ChannelRepository::new(pool.clone());
    let blocks = BlockRepository::new(pool.clone());
    let watch_metrics = WatchMetricsRepository::new(pool.clone());
    let settings = SettingsService::new(SettingsRepository::new(pool.clone()));
    let library_cache = LibraryCacheRepository::new(pool.clone());

    let library = Arc::new(LibraryIndex::new());
    let broadcaster = Arc::new(Broadcaster::new());
    let sessions = Arc::new(SessionRegistry::new());

    let library_sync = Arc::new(LibrarySync::new(
        library_cache,
        library.clone(),
        broadcaster.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        channels.clone(),
        blocks.clone(),
        settings.clone(),
        library.clone(),
        config.schedule.clone(),
        broadcaster.clone(),
    ));
    let lineup = Arc::new(LineupService::new(
        channels.clone(),
        settings.clone(),
        library.clone(),
        broadcaster.clone(),
    ));
    let tuner = TuneResolver::new(blocks.clone());

    Ok(Services {
        pool,
        servers,
        channels,
        blocks,
        watch_metrics,
        settings,
        library,
        library_sync,
        sessions,
        broadcaster,
        scheduler,
        lineup,
        tuner,
    })
}
