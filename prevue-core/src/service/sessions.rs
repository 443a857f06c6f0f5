//! Live playback session registry and idle reaping
//!
//! Process-local state mapping item ids to Upstream play sessions. Entries
//! are weak: a session that vanished mid-flight is simply recreated by the
//! next master-playlist request. Recreated empty on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::{Duration, Instant};

/// A tracked Upstream playback session for one item.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub play_session_id: String,
    pub media_source_id: String,
    pub started_at: DateTime<Utc>,
    pub last_activity: Instant,
}

/// Sessions considered idle after this long without proxy traffic.
pub const IDLE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Terminates a transcode session on Upstream. Seam for the reaper so the
/// registry stays testable without a server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionTerminator: Send + Sync {
    /// Best-effort: implementations log failures and return.
    async fn terminate(&self, play_session_id: &str);
}

/// Registry of live sessions, keyed by item id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, ActiveSession>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new session for an item, replacing any previous one.
    pub fn track(
        &self,
        item_id: impl Into<String>,
        play_session_id: impl Into<String>,
        media_source_id: impl Into<String>,
    ) {
        self.sessions.insert(
            item_id.into(),
            ActiveSession {
                play_session_id: play_session_id.into(),
                media_source_id: media_source_id.into(),
                started_at: Utc::now(),
                last_activity: Instant::now(),
            },
        );
    }

    #[must_use]
    pub fn get(&self, item_id: &str) -> Option<ActiveSession> {
        self.sessions.get(item_id).map(|s| s.clone())
    }

    /// Record proxy traffic for an item's session.
    pub fn touch(&self, item_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(item_id) {
            session.last_activity = Instant::now();
        }
    }

    /// Remove and return a session.
    pub fn drop_session(&self, item_id: &str) -> Option<ActiveSession> {
        self.sessions.remove(item_id).map(|(_, s)| s)
    }

    #[must_use]
    pub fn all(&self) -> Vec<(String, ActiveSession)> {
        self.sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove and return every session idle for at least `max_idle`.
    #[must_use]
    pub fn take_idle(&self, max_idle: Duration) -> Vec<(String, ActiveSession)> {
        let now = Instant::now();
        let idle_keys: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| now.duration_since(e.value().last_activity) >= max_idle)
            .map(|e| e.key().clone())
            .collect();
        idle_keys
            .into_iter()
            .filter_map(|k| self.sessions.remove(&k))
            .collect()
    }

    /// Reap idle sessions: terminate their Upstream transcodes (best-effort,
    /// idempotent) and drop the entries. Returns how many were reaped.
    pub async fn reap_idle(&self, terminator: &dyn SessionTerminator) -> usize {
        let idle = self.take_idle(IDLE_AFTER);
        let count = idle.len();
        for (item_id, session) in idle {
            tracing::info!(%item_id, play_session_id = %session.play_session_id, "Reaping idle session");
            terminator.terminate(&session.play_session_id).await;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn touch_keeps_sessions_alive() {
        let registry = SessionRegistry::new();
        registry.track("item1", "ps1", "src1");

        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        registry.touch("item1");
        tokio::time::advance(Duration::from_secs(4 * 60)).await;

        assert!(registry.take_idle(IDLE_AFTER).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_reaped_once() {
        let registry = SessionRegistry::new();
        registry.track("item1", "ps1", "src1");

        tokio::time::advance(Duration::from_secs(6 * 60)).await;

        let mut terminator = MockSessionTerminator::new();
        terminator
            .expect_terminate()
            .withf(|ps| ps == "ps1")
            .times(1)
            .returning(|_| ());

        assert_eq!(registry.reap_idle(&terminator).await, 1);
        assert!(registry.get("item1").is_none());

        // Second pass is a no-op: entry already gone.
        assert_eq!(registry.reap_idle(&terminator).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_sessions_survive_reaping() {
        let registry = SessionRegistry::new();
        registry.track("old", "ps-old", "src");
        tokio::time::advance(Duration::from_secs(6 * 60)).await;
        registry.track("fresh", "ps-fresh", "src");

        let mut terminator = MockSessionTerminator::new();
        terminator
            .expect_terminate()
            .withf(|ps| ps == "ps-old")
            .times(1)
            .returning(|_| ());

        assert_eq!(registry.reap_idle(&terminator).await, 1);
        assert!(registry.get("fresh").is_some());
    }

    #[test]
    fn track_replaces_previous_session() {
        let registry = SessionRegistry::new();
        registry.track("item1", "ps1", "src1");
        registry.track("item1", "ps2", "src2");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("item1").unwrap().play_session_id, "ps2");
        let dropped = registry.drop_session("item1").unwrap();
        assert_eq!(dropped.media_source_id, "src2");
        assert!(registry.is_empty());
    }
}
