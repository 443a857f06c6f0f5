// Module: http
// HTTP/JSON REST API over the core services

pub mod channels;
pub mod error;
pub mod health;
pub mod iptv;
pub mod metrics;
pub mod middleware;
pub mod playback;
pub mod schedule;
pub mod servers;
pub mod settings;
pub mod stream;
pub mod websocket;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use prevue_core::bootstrap::Services;
use prevue_core::repository::{
    BlockRepository, ChannelRepository, ServerRepository, WatchMetricsRepository,
};
use prevue_core::service::{
    Broadcaster, LibraryIndex, LibrarySync, LineupService, Scheduler, SessionRegistry,
    SettingsService, TuneResolver,
};
use prevue_core::Config;
use prevue_proxy::Coalescer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: sqlx::SqlitePool,
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
    pub coalescer: Arc<Coalescer>,
    /// Pooled client for proxying stream bytes from Upstream.
    pub stream_client: reqwest::Client,
    /// XMLTV output cache keyed by (channel_count, hours, base_url).
    pub epg_cache: moka::sync::Cache<(usize, i64, String), String>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Arc<Config>, services: &Services) -> Self {
        Self {
            config,
            pool: services.pool.clone(),
            servers: services.servers.clone(),
            channels: services.channels.clone(),
            blocks: services.blocks.clone(),
            watch_metrics: services.watch_metrics.clone(),
            settings: services.settings.clone(),
            library: services.library.clone(),
            library_sync: services.library_sync.clone(),
            sessions: services.sessions.clone(),
            broadcaster: services.broadcaster.clone(),
            scheduler: services.scheduler.clone(),
            lineup: services.lineup.clone(),
            tuner: services.tuner.clone(),
            coalescer: Arc::new(Coalescer::new()),
            stream_client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(30))
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_default(),
            epg_cache: moka::sync::Cache::builder()
                .max_capacity(16)
                .time_to_live(Duration::from_secs(5 * 60))
                .build(),
        }
    }

    /// The active server and a client for it, or 404 when setup is pending.
    pub async fn upstream(
        &self,
    ) -> AppResult<(prevue_core::models::MediaServer, prevue_upstream::UpstreamClient)> {
        let server = self
            .servers
            .get_active()
            .await?
            .ok_or_else(|| AppError::not_found("No active media server configured"))?;
        let client = prevue_upstream::UpstreamClient::with_credentials(
            &server.base_url,
            &server.access_token,
            &server.upstream_user_id,
        );
        Ok((server, client))
    }
}

/// Assemble the full router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/auth/status", get(health::auth_status))
        .route("/api/servers", get(servers::list).post(servers::create))
        .route("/api/servers/{id}", put(servers::update).delete(servers::remove))
        .route("/api/servers/{id}/test", post(servers::test))
        .route("/api/servers/{id}/reauthenticate", post(servers::reauthenticate))
        .route("/api/servers/{id}/activate", post(servers::activate))
        .route("/api/channels", get(channels::list).post(channels::create))
        .route(
            "/api/channels/{number}",
            get(channels::get).put(channels::update).delete(channels::remove),
        )
        .route("/api/channels/{number}/regenerate", post(channels::regenerate))
        .route("/api/channels/regenerate", post(channels::regenerate_lineup))
        .route("/api/schedule", get(schedule::all))
        .route("/api/schedule/regenerate", post(schedule::regenerate))
        .route("/api/schedule/{channel}", get(schedule::for_channel))
        .route("/api/schedule/{channel}/now", get(schedule::now_playing))
        .route("/api/playback/{channel}", get(playback::tune))
        .route("/api/stream/stop", post(stream::stop))
        .route("/api/stream/progress", post(stream::progress))
        .route("/api/stream/proxy/{*path}", get(stream::proxy))
        .route("/api/stream/{item_id}", get(stream::master))
        .route("/api/settings", get(settings::list))
        .route("/api/settings/factory-reset", post(settings::factory_reset))
        .route("/api/settings/{key}", get(settings::get).put(settings::update))
        .route("/api/metrics/watch", get(metrics::watch_totals))
        .route("/api/iptv/playlist.m3u", get(iptv::playlist))
        .route("/api/iptv/epg.xml", get(iptv::epg))
        .route("/api/iptv/channel/{number}", get(iptv::channel))
        .route("/ws", get(websocket::websocket_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_api_key,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
