//! Boot sequencing and periodic maintenance
//!
//! Boot: verify the active Upstream server, sync (or rehydrate) the
//! library, materialize default channels on first run, then extend
//! schedules. Afterwards three timers keep the system live: schedule
//! upkeep every 15 minutes, extension every 4 hours, idle-session reaping
//! every 2 minutes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use prevue_core::bootstrap::Services;
use prevue_core::models::ChannelKind;
use prevue_core::repository::{ChannelRepository, ServerRepository};
use prevue_core::service::{
    LibrarySync, LineupService, Scheduler, SessionRegistry, SessionTerminator,
};
use prevue_upstream::UpstreamClient;

const MAINTAIN_INTERVAL: Duration = Duration::from_secs(15 * 60);
const EXTEND_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);
const REAP_INTERVAL: Duration = Duration::from_secs(2 * 60);

pub struct Supervisor {
    servers: ServerRepository,
    channels: ChannelRepository,
    library_sync: Arc<LibrarySync>,
    sessions: Arc<SessionRegistry>,
    scheduler: Arc<Scheduler>,
    lineup: Arc<LineupService>,
}

impl Supervisor {
    #[must_use]
    pub fn new(services: &Services) -> Self {
        Self {
            servers: services.servers.clone(),
            channels: services.channels.clone(),
            library_sync: services.library_sync.clone(),
            sessions: services.sessions.clone(),
            scheduler: services.scheduler.clone(),
            lineup: services.lineup.clone(),
        }
    }

    /// Boot sequence. Failures here are logged, not fatal: the HTTP API
    /// still comes up so the user can fix the server configuration.
    pub async fn boot(&self) {
        let server = match self.servers.get_active().await {
            Ok(Some(server)) => server,
            Ok(None) => {
                info!("No active media server; waiting for setup via the API");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Could not read active server during boot");
                return;
            }
        };

        let client = UpstreamClient::with_credentials(
            &server.base_url,
            &server.access_token,
            &server.upstream_user_id,
        );
        let synced = match client.test_connection().await {
            Ok(info_resp) => {
                info!(server = %info_resp.server_name, "Upstream reachable");
                match self.library_sync.sync(&server).await {
                    Ok(count) => {
                        info!(items = count, "Library synced at boot");
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "Boot sync failed, falling back to cache");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Upstream unreachable at boot, using cached library");
                false
            }
        };
        if !synced {
            match self.library_sync.rehydrate(&server.id).await {
                Ok(0) => warn!("No cached library available; schedules will be empty"),
                Ok(count) => info!(items = count, "Using cached library"),
                Err(e) => warn!(error = %e, "Library cache rehydration failed"),
            }
        }

        match self.channels.list().await {
            Ok(channels) if channels.is_empty() => {
                info!("No channels yet; materializing defaults");
                if let Err(e) = self.lineup.rebuild(ChannelKind::Auto, &[], &[]).await {
                    warn!(error = %e, "Default channel materialization failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not list channels during boot"),
        }

        let now = Utc::now();
        if let Err(e) = self.scheduler.extend_schedules(now).await {
            warn!(error = %e, "Schedule extension at boot failed");
        }
        if let Err(e) = self.scheduler.clean_old_blocks(now).await {
            warn!(error = %e, "Schedule cleanup at boot failed");
        }
    }

    /// Spawn the periodic maintenance tasks.
    #[must_use]
    pub fn start_timers(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        {
            let supervisor = self.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(MAINTAIN_INTERVAL);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = supervisor.scheduler.maintain_schedules(Utc::now()).await {
                        warn!(error = %e, "Schedule maintenance failed");
                    }
                }
            }));
        }

        {
            let supervisor = self.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(EXTEND_INTERVAL);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let now = Utc::now();
                    if let Err(e) = supervisor.scheduler.extend_schedules(now).await {
                        warn!(error = %e, "Schedule extension failed");
                    }
                    if let Err(e) = supervisor.scheduler.clean_old_blocks(now).await {
                        warn!(error = %e, "Schedule cleanup failed");
                    }
                }
            }));
        }

        {
            let supervisor = self.clone();
            handles.push(tokio::spawn(async move {
                let terminator = UpstreamTerminator { servers: supervisor.servers.clone() };
                let mut ticker = tokio::time::interval(REAP_INTERVAL);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let reaped = supervisor.sessions.reap_idle(&terminator).await;
                    if reaped > 0 {
                        info!(reaped, "Reaped idle playback sessions");
                    }
                }
            }));
        }

        handles
    }
}

/// Terminates Upstream transcode sessions for the idle reaper.
struct UpstreamTerminator {
    servers: ServerRepository,
}

#[async_trait]
impl SessionTerminator for UpstreamTerminator {
    async fn terminate(&self, play_session_id: &str) {
        let Ok(Some(server)) = self.servers.get_active().await else {
            return;
        };
        let client = UpstreamClient::with_credentials(
            &server.base_url,
            &server.access_token,
            &server.upstream_user_id,
        );
        if let Err(e) = client.stop_playback_session(play_session_id, None).await {
            warn!(error = %e, play_session_id, "Session stop during reap failed");
        }
        if let Err(e) = client.delete_transcoding_job(play_session_id).await {
            warn!(error = %e, play_session_id, "Transcode delete during reap failed");
        }
    }
}
