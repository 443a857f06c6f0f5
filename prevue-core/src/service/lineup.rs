//! Lineup rebuild orchestration
//!
//! Ties the materializer to the store: clears generated channels, runs the
//! materializer against the current snapshot and settings, persists the
//! drafts and announces the result.

use std::sync::Arc;

use chrono::Utc;

use crate::models::{Channel, ChannelKind, LibraryItem};
use crate::repository::ChannelRepository;
use crate::service::broadcaster::{Broadcaster, Envelope};
use crate::service::library_index::LibraryIndex;
use crate::service::materializer::{materialize, MaterializeContext};
use crate::service::presets::{self, DynamicSource, PresetKind};
use crate::service::settings::SettingsService;
use crate::Result;

pub struct LineupService {
    channels: ChannelRepository,
    settings: SettingsService,
    library: Arc<LibraryIndex>,
    broadcaster: Arc<Broadcaster>,
}

impl LineupService {
    #[must_use]
    pub const fn new(
        channels: ChannelRepository,
        settings: SettingsService,
        library: Arc<LibraryIndex>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self { channels, settings, library, broadcaster }
    }

    /// Whether the selected presets require Upstream collections and/or
    /// playlists, so callers fetch them only when needed.
    pub async fn wants_containers(&self) -> Result<(bool, bool)> {
        let selected = self.settings.selected_presets().await?;
        let mut collections = false;
        let mut playlists = false;
        for id in &selected {
            match presets::find(id).map(|p| p.kind) {
                Some(PresetKind::Dynamic(DynamicSource::Collections)) => collections = true,
                Some(PresetKind::Dynamic(DynamicSource::Playlists)) => playlists = true,
                _ => {}
            }
        }
        Ok((collections, playlists))
    }

    /// Rebuild all generated channels from the selected presets. Custom
    /// channels (and their names) survive.
    pub async fn rebuild(
        &self,
        kind: ChannelKind,
        collections: &[(String, Vec<LibraryItem>)],
        playlists: &[(String, Vec<LibraryItem>)],
    ) -> Result<Vec<Channel>> {
        let filters = self.settings.global_filters().await?;
        let selected = self.settings.selected_presets().await?;

        let existing = self.channels.list().await?;
        let custom_names: Vec<String> = existing
            .iter()
            .filter(|c| c.kind == ChannelKind::Custom)
            .map(|c| c.name.clone())
            .collect();

        self.channels
            .delete_by_kinds(&[ChannelKind::Auto, ChannelKind::Preset])
            .await?;

        let snapshot = self.library.current();
        let context = MaterializeContext {
            snapshot: &snapshot,
            filters: &filters,
            collections,
            playlists,
            existing_names: &custom_names,
            now: Utc::now(),
        };
        let mut drafts = materialize(&context, &selected);
        for draft in &mut drafts {
            draft.kind = kind;
        }

        let created = self.channels.insert_many(&drafts).await?;
        self.broadcaster.send(Envelope::channels_regenerated(created.len()));
        tracing::info!(channels = created.len(), "Lineup rebuilt");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::keys;
    use crate::models::ItemKind;
    use crate::repository::test_support::test_pool;
    use crate::repository::{ChannelDraft, SettingsRepository};
    use crate::service::library_index::LibrarySnapshot;
    use serde_json::json;

    fn item(id: &str, hours: i64) -> LibraryItem {
        let mut item = crate::models::library::tests::movie(id, Some("PG"));
        item.run_time_ticks = hours * 36_000_000_000;
        item.genres = vec!["Comedy".to_string()];
        item.kind = ItemKind::Movie;
        item
    }

    async fn lineup() -> (LineupService, ChannelRepository, SettingsService) {
        let pool = test_pool().await;
        let channels = ChannelRepository::new(pool.clone());
        let settings = SettingsService::new(SettingsRepository::new(pool));
        let library = Arc::new(LibraryIndex::new());
        library.swap(LibrarySnapshot::new(
            vec![item("c1", 3), item("c2", 2)],
            Utc::now(),
        ));
        let service = LineupService::new(
            channels.clone(),
            settings.clone(),
            library,
            Arc::new(Broadcaster::new()),
        );
        (service, channels, settings)
    }

    #[tokio::test]
    async fn rebuild_replaces_generated_channels_but_keeps_custom() {
        let (service, channels, settings) = lineup().await;
        settings
            .set(keys::SELECTED_PRESETS, &json!(["comedy"]))
            .await
            .unwrap();

        channels
            .insert(&ChannelDraft {
                name: "My Mixtape".to_string(),
                kind: ChannelKind::Custom,
                preset_id: None,
                filter: None,
                item_ids: vec!["c1".to_string()],
                sort_order: 0,
                ai_prompt: None,
            })
            .await
            .unwrap();

        let created = service.rebuild(ChannelKind::Preset, &[], &[]).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "Comedy");

        // Run again: generated channels replaced, custom untouched.
        let created = service.rebuild(ChannelKind::Preset, &[], &[]).await.unwrap();
        assert_eq!(created.len(), 1);

        let all = channels.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|c| c.name == "My Mixtape" && c.kind == ChannelKind::Custom));
    }

    #[tokio::test]
    async fn wants_containers_follows_selection() {
        let (service, _, settings) = lineup().await;
        assert_eq!(service.wants_containers().await.unwrap(), (false, false));
        settings
            .set(keys::SELECTED_PRESETS, &json!(["auto-collections", "comedy"]))
            .await
            .unwrap();
        assert_eq!(service.wants_containers().await.unwrap(), (true, false));
    }
}
