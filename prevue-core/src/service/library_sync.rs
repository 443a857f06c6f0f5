//! Library synchronization
//!
//! Pulls the full item set from Upstream, swaps the in-memory snapshot and
//! persists it to the library cache. On boot the cache rehydrates the
//! snapshot so schedules keep working while Upstream is unreachable.

use std::sync::Arc;

use chrono::Utc;
use prevue_upstream::UpstreamClient;

use crate::models::{LibraryItem, MediaServer};
use crate::repository::LibraryCacheRepository;
use crate::service::broadcaster::{Broadcaster, Envelope};
use crate::service::library_index::{LibraryIndex, LibrarySnapshot};
use crate::Result;

pub struct LibrarySync {
    cache: LibraryCacheRepository,
    library: Arc<LibraryIndex>,
    broadcaster: Arc<Broadcaster>,
}

impl LibrarySync {
    #[must_use]
    pub const fn new(
        cache: LibraryCacheRepository,
        library: Arc<LibraryIndex>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self { cache, library, broadcaster }
    }

    /// Full sync from Upstream: fetch, convert, swap, persist.
    pub async fn sync(&self, server: &MediaServer) -> Result<usize> {
        let client = UpstreamClient::with_credentials(
            &server.base_url,
            &server.access_token,
            &server.upstream_user_id,
        );

        let broadcaster = self.broadcaster.clone();
        let mut progress = move |fetched: usize, total: Option<i64>| {
            broadcaster.send(Envelope::generation_progress(
                "sync",
                "Fetching library",
                Some(fetched),
                total.map(|t| t.max(0) as usize),
            ));
        };

        let upstream_items = client.fetch_all_items(Some(&mut progress)).await?;
        let items: Vec<LibraryItem> = upstream_items.into_iter().map(Into::into).collect();
        let count = items.len();

        self.cache.replace(&server.id, &items).await?;
        self.library.swap(LibrarySnapshot::new(items, Utc::now()));
        self.broadcaster.send(Envelope::library_synced(count));
        tracing::info!(items = count, server = %server.name, "Library synced");
        Ok(count)
    }

    /// Rebuild the in-memory snapshot from the persisted cache.
    /// Returns the number of items restored (0 when the cache is empty).
    pub async fn rehydrate(&self, server_id: &str) -> Result<usize> {
        match self.cache.load(server_id).await? {
            Some((items, synced_at)) => {
                let count = items.len();
                self.library.swap(LibrarySnapshot::new(items, synced_at));
                tracing::info!(items = count, "Library rehydrated from cache");
                Ok(count)
            }
            None => Ok(0),
        }
    }
}
