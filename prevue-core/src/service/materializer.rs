//! Channel materializer
//!
//! Resolves preset selections against the current library snapshot into
//! concrete channel drafts: filters applied, duration gates enforced,
//! content-type splits expanded, and names de-duplicated.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::{ChannelKind, GlobalFilters, ItemKind, LibraryItem};
use crate::repository::ChannelDraft;
use crate::service::library_index::LibrarySnapshot;
use crate::service::presets::{
    self, DynamicSource, PresetKind, PRIORITY_ACTORS, PRIORITY_COMPOSERS, PRIORITY_DIRECTORS,
};

/// Minimum total runtime for a channel to exist.
pub const MIN_CHANNEL_DURATION_MS: i64 = 4 * 3_600_000;
/// Cast/crew channels (directors, actors, composers) get a lower bar.
pub const MIN_CAST_CREW_DURATION_MS: i64 = 2 * 3_600_000;
/// Decades need this many items before earning a channel.
const MIN_ERA_ITEMS: usize = 10;
/// How many person/studio channels a dynamic preset may spawn.
const TOP_ENTITIES: usize = 10;

const MIN_DIRECTOR_ITEMS: usize = 2;
const MIN_ACTOR_ITEMS: usize = 5;
const MIN_COMPOSER_ITEMS: usize = 3;
const MIN_STUDIO_ITEMS: usize = 5;

/// Everything the materializer needs to run, resolved by the caller so the
/// algorithm itself stays synchronous and testable.
pub struct MaterializeContext<'a> {
    pub snapshot: &'a LibrarySnapshot,
    pub filters: &'a GlobalFilters,
    /// (name, member items) per Upstream collection.
    pub collections: &'a [(String, Vec<LibraryItem>)],
    /// (name, member items) per Upstream playlist.
    pub playlists: &'a [(String, Vec<LibraryItem>)],
    /// Names already taken (surviving custom channels).
    pub existing_names: &'a [String],
    pub now: DateTime<Utc>,
}

/// One named item set produced by a preset, before numbering.
struct ChannelConfig {
    name: String,
    preset_id: String,
    item_ids: Vec<String>,
}

/// Materialize the requested presets into channel drafts.
///
/// A preset id appearing k times in `preset_ids` yields k back-to-back
/// copies of each of its configurations, named `Base`, `Base 2`, ...
/// Name collisions against existing or newly produced channels resolve by
/// suffixing ` (2)`, ` (3)`, ...
#[must_use]
pub fn materialize(ctx: &MaterializeContext<'_>, preset_ids: &[String]) -> Vec<ChannelDraft> {
    let mut taken: HashSet<String> = ctx.existing_names.iter().cloned().collect();
    let mut drafts = Vec::new();
    let mut sort_order = 0_i64;

    for (preset_id, multiplicity) in count_multiplicities(preset_ids) {
        let Some(preset) = presets::find(&preset_id) else {
            tracing::warn!(%preset_id, "Unknown preset id, skipping");
            continue;
        };

        let configs = match &preset.kind {
            PresetKind::Static(filter) => {
                let items: Vec<&LibraryItem> = ctx
                    .snapshot
                    .items()
                    .filter(|item| ctx.filters.allows(item) && filter.matches(item, ctx.now))
                    .collect();
                let preset_allows_both = filter.include_movies && filter.include_episodes;
                gated_configs(
                    ctx,
                    &preset.id,
                    preset.name,
                    items,
                    MIN_CHANNEL_DURATION_MS,
                    preset_allows_both,
                )
            }
            PresetKind::Dynamic(source) => dynamic_configs(ctx, &preset.id, *source),
        };

        for config in configs {
            for copy in 1..=multiplicity {
                let base = if copy == 1 {
                    config.name.clone()
                } else {
                    format!("{} {copy}", config.name)
                };
                let name = unique_name(base, &mut taken);
                drafts.push(ChannelDraft {
                    name,
                    kind: ChannelKind::Preset,
                    preset_id: Some(config.preset_id.clone()),
                    filter: None,
                    item_ids: config.item_ids.clone(),
                    sort_order,
                    ai_prompt: None,
                });
                sort_order += 1;
            }
        }
    }

    drafts
}

/// Unique preset ids with multiplicities, in first-appearance order.
fn count_multiplicities(preset_ids: &[String]) -> Vec<(String, usize)> {
    let mut ordered: Vec<(String, usize)> = Vec::new();
    for id in preset_ids {
        if let Some(entry) = ordered.iter_mut().find(|(existing, _)| existing == id) {
            entry.1 += 1;
        } else {
            ordered.push((id.clone(), 1));
        }
    }
    ordered
}

/// Gate an item set on total runtime, optionally splitting it into
/// separate movie and TV channels. Each split is gated independently, so a
/// preset can yield one, both, or neither channel.
fn gated_configs(
    ctx: &MaterializeContext<'_>,
    preset_id: &str,
    name: &str,
    items: Vec<&LibraryItem>,
    gate_ms: i64,
    preset_allows_both: bool,
) -> Vec<ChannelConfig> {
    let both_kinds_enabled = ctx.filters.content_types.movies && ctx.filters.content_types.episodes;
    let should_split = ctx.filters.separate_content_types && both_kinds_enabled && preset_allows_both;

    let mut configs = Vec::new();
    if should_split {
        let (movies, episodes): (Vec<&LibraryItem>, Vec<&LibraryItem>) =
            items.into_iter().partition(|i| i.kind == ItemKind::Movie);
        if total_duration_ms(&movies) >= gate_ms {
            configs.push(config(preset_id, format!("{name} Movies"), &movies));
        }
        if total_duration_ms(&episodes) >= gate_ms {
            configs.push(config(preset_id, format!("{name} TV"), &episodes));
        }
    } else if total_duration_ms(&items) >= gate_ms {
        configs.push(config(preset_id, name.to_string(), &items));
    }
    configs
}

fn dynamic_configs(
    ctx: &MaterializeContext<'_>,
    preset_id: &str,
    source: DynamicSource,
) -> Vec<ChannelConfig> {
    match source {
        DynamicSource::Genres => {
            let mut entries: Vec<(String, Vec<&LibraryItem>)> = ctx
                .snapshot
                .lead_genres()
                .into_iter()
                .map(|(genre, items)| (genre, apply_global(ctx, items)))
                .filter(|(_, items)| !items.is_empty())
                .collect();
            entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));
            entries
                .into_iter()
                .flat_map(|(genre, items)| {
                    gated_configs(ctx, preset_id, &genre, items, MIN_CHANNEL_DURATION_MS, true)
                })
                .collect()
        }
        DynamicSource::Eras => {
            let mut entries: Vec<(i32, Vec<&LibraryItem>)> = ctx
                .snapshot
                .decades()
                .into_iter()
                .map(|(decade, items)| (decade, apply_global(ctx, items)))
                .filter(|(_, items)| items.len() >= MIN_ERA_ITEMS)
                .collect();
            entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));
            entries
                .into_iter()
                .filter(|(_, items)| total_duration_ms(items) >= MIN_CHANNEL_DURATION_MS)
                .map(|(decade, items)| {
                    config(preset_id, format!("{:02}s Channel", decade.rem_euclid(100)), &items)
                })
                .collect()
        }
        DynamicSource::Directors => people_configs(
            ctx,
            preset_id,
            &crate::models::PersonRole::Director,
            PRIORITY_DIRECTORS,
            MIN_DIRECTOR_ITEMS,
        ),
        DynamicSource::Actors => people_configs(
            ctx,
            preset_id,
            &crate::models::PersonRole::Actor,
            PRIORITY_ACTORS,
            MIN_ACTOR_ITEMS,
        ),
        DynamicSource::Composers => people_configs(
            ctx,
            preset_id,
            &crate::models::PersonRole::Composer,
            PRIORITY_COMPOSERS,
            MIN_COMPOSER_ITEMS,
        ),
        DynamicSource::Studios => {
            let mut entries: Vec<(String, Vec<&LibraryItem>)> = ctx
                .snapshot
                .studios()
                .into_iter()
                .map(|(studio, items)| (studio, apply_global(ctx, items)))
                .filter(|(_, items)| items.len() >= MIN_STUDIO_ITEMS)
                .collect();
            entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));
            entries.truncate(TOP_ENTITIES);
            entries
                .into_iter()
                .filter(|(_, items)| total_duration_ms(items) >= MIN_CHANNEL_DURATION_MS)
                .map(|(studio, items)| config(preset_id, studio, &items))
                .collect()
        }
        DynamicSource::Collections => container_configs(
            ctx,
            preset_id,
            ctx.collections,
            Some(MIN_CHANNEL_DURATION_MS),
        ),
        DynamicSource::Playlists => container_configs(ctx, preset_id, ctx.playlists, None),
    }
}

fn people_configs(
    ctx: &MaterializeContext<'_>,
    preset_id: &str,
    role: &crate::models::PersonRole,
    priority: &[&str],
    min_items: usize,
) -> Vec<ChannelConfig> {
    let entries: Vec<(String, Vec<&LibraryItem>)> = ctx
        .snapshot
        .people_index(role)
        .into_iter()
        .map(|(name, items)| (name, apply_global(ctx, items)))
        .filter(|(_, items)| items.len() >= min_items)
        .collect();

    priority_rank(entries, priority, TOP_ENTITIES)
        .into_iter()
        .filter(|(_, items)| total_duration_ms(items) >= MIN_CAST_CREW_DURATION_MS)
        .map(|(name, items)| config(preset_id, name, &items))
        .collect()
}

fn container_configs(
    ctx: &MaterializeContext<'_>,
    preset_id: &str,
    containers: &[(String, Vec<LibraryItem>)],
    gate_ms: Option<i64>,
) -> Vec<ChannelConfig> {
    containers
        .iter()
        .map(|(name, items)| {
            let items: Vec<&LibraryItem> =
                items.iter().filter(|i| ctx.filters.allows(i)).collect();
            (name, items)
        })
        .filter(|(_, items)| {
            !items.is_empty() && gate_ms.is_none_or(|gate| total_duration_ms(items) >= gate)
        })
        .map(|(name, items)| config(preset_id, name.clone(), &items))
        .collect()
}

/// Priority-first ranking: curated names present in the library come first
/// in curated order; the rest follow by descending item count.
fn priority_rank<'a>(
    mut entries: Vec<(String, Vec<&'a LibraryItem>)>,
    priority: &[&str],
    top_n: usize,
) -> Vec<(String, Vec<&'a LibraryItem>)> {
    let mut ranked = Vec::new();
    for wanted in priority {
        if let Some(pos) = entries
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(wanted))
        {
            ranked.push(entries.remove(pos));
        }
    }
    entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));
    ranked.extend(entries);
    ranked.truncate(top_n);
    ranked
}

fn apply_global<'a>(
    ctx: &MaterializeContext<'_>,
    items: Vec<&'a LibraryItem>,
) -> Vec<&'a LibraryItem> {
    items
        .into_iter()
        .filter(|item| ctx.filters.allows(item))
        .collect()
}

fn total_duration_ms(items: &[&LibraryItem]) -> i64 {
    items.iter().map(|i| i.duration_ms()).sum()
}

fn config(preset_id: &str, name: String, items: &[&LibraryItem]) -> ChannelConfig {
    ChannelConfig {
        name,
        preset_id: preset_id.to_string(),
        item_ids: items.iter().map(|i| i.id.clone()).collect(),
    }
}

/// Resolve a name against the taken set by suffixing ` (2)`, ` (3)`, ...
fn unique_name(base: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base} ({n})");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
