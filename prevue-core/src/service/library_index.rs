//! In-memory library snapshot with secondary indexes
//!
//! The snapshot is immutable once built. A sync constructs a fresh
//! [`LibrarySnapshot`] and swaps it in atomically; readers holding the old
//! `Arc` keep a consistent view and never observe a partial index.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::models::{ItemKind, LibraryItem, PersonRole};

/// How many top-billed actors per item feed the actor index.
const TOP_BILLED_ACTORS: usize = 3;

/// Immutable snapshot of the Upstream library.
#[derive(Debug, Default)]
pub struct LibrarySnapshot {
    items: BTreeMap<String, LibraryItem>,
    synced_at: Option<DateTime<Utc>>,
}

impl LibrarySnapshot {
    #[must_use]
    pub fn new(items: Vec<LibraryItem>, synced_at: DateTime<Utc>) -> Self {
        Self {
            items: items.into_iter().map(|i| (i.id.clone(), i)).collect(),
            synced_at: Some(synced_at),
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&LibraryItem> {
        self.items.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub const fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    /// All items in id order.
    pub fn items(&self) -> impl Iterator<Item = &LibraryItem> {
        self.items.values()
    }

    /// Resolve channel item ids against the snapshot, silently skipping ids
    /// that no longer exist (weak references).
    #[must_use]
    pub fn resolve(&self, ids: &[String]) -> Vec<LibraryItem> {
        ids.iter()
            .filter_map(|id| self.items.get(id).cloned())
            .collect()
    }

    /// Lead genre → items. Only the first genre of each item counts, so an
    /// "Action, Comedy" movie lands on the Action channel alone.
    #[must_use]
    pub fn lead_genres(&self) -> BTreeMap<String, Vec<&LibraryItem>> {
        let mut map: BTreeMap<String, Vec<&LibraryItem>> = BTreeMap::new();
        for item in self.items.values() {
            if let Some(genre) = item.lead_genre() {
                map.entry(genre.to_string()).or_default().push(item);
            }
        }
        map
    }

    /// Items whose genre list contains any of the given aliases
    /// (case-insensitive substring match). Used by preset filters, not by
    /// channel partitioning.
    #[must_use]
    pub fn items_with_genre(&self, aliases: &[&str]) -> Vec<&LibraryItem> {
        self.items
            .values()
            .filter(|item| {
                item.genres.iter().any(|g| {
                    let lower = g.to_lowercase();
                    aliases.iter().any(|a| lower.contains(&a.to_lowercase()))
                })
            })
            .collect()
    }

    /// Person name → items for a role. Actors index only the top three
    /// billed actors per item, so bit parts don't spawn channels.
    #[must_use]
    pub fn people_index(&self, role: &PersonRole) -> BTreeMap<String, Vec<&LibraryItem>> {
        let mut map: BTreeMap<String, Vec<&LibraryItem>> = BTreeMap::new();
        for item in self.items.values() {
            let names: Vec<&str> = if *role == PersonRole::Actor {
                item.people_with_role(role).take(TOP_BILLED_ACTORS).collect()
            } else {
                item.people_with_role(role).collect()
            };
            for name in names {
                map.entry(name.to_string()).or_default().push(item);
            }
        }
        map
    }

    /// Studio name → items.
    #[must_use]
    pub fn studios(&self) -> BTreeMap<String, Vec<&LibraryItem>> {
        let mut map: BTreeMap<String, Vec<&LibraryItem>> = BTreeMap::new();
        for item in self.items.values() {
            for studio in &item.studios {
                map.entry(studio.clone()).or_default().push(item);
            }
        }
        map
    }

    /// Decade (e.g. 1990) → items.
    #[must_use]
    pub fn decades(&self) -> BTreeMap<i32, Vec<&LibraryItem>> {
        let mut map: BTreeMap<i32, Vec<&LibraryItem>> = BTreeMap::new();
        for item in self.items.values() {
            if let Some(decade) = item.decade() {
                map.entry(decade).or_default().push(item);
            }
        }
        map
    }

    /// Movies only, in id order.
    #[must_use]
    pub fn movies(&self) -> Vec<&LibraryItem> {
        self.items
            .values()
            .filter(|i| i.kind == ItemKind::Movie)
            .collect()
    }
}

/// Process-wide handle to the current snapshot.
#[derive(Default)]
pub struct LibraryIndex {
    snapshot: RwLock<Arc<LibrarySnapshot>>,
}

impl LibraryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. Cheap: clones an `Arc`.
    #[must_use]
    pub fn current(&self) -> Arc<LibrarySnapshot> {
        self.snapshot.read().clone()
    }

    /// Atomically replace the snapshot.
    pub fn swap(&self, snapshot: LibrarySnapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::library::{PersonRef, UserState};

    fn item(id: &str, kind: ItemKind, genres: &[&str], people: Vec<PersonRef>) -> LibraryItem {
        LibraryItem {
            id: id.to_string(),
            kind,
            name: id.to_string(),
            series_id: None,
            series_name: None,
            season: None,
            episode: None,
            run_time_ticks: 36_000_000_000,
            genres: genres.iter().map(ToString::to_string).collect(),
            official_rating: None,
            production_year: Some(1994),
            date_added: None,
            studios: vec!["Studio A".to_string()],
            people,
            user_state: UserState::default(),
        }
    }

    fn actor(name: &str) -> PersonRef {
        PersonRef { name: name.to_string(), role: PersonRole::Actor }
    }

    fn snapshot() -> LibrarySnapshot {
        LibrarySnapshot::new(
            vec![
                item("a", ItemKind::Movie, &["Action", "Comedy"], vec![
                    actor("One"), actor("Two"), actor("Three"), actor("Four"),
                ]),
                item("b", ItemKind::Movie, &["Comedy"], vec![actor("One")]),
                item("c", ItemKind::Episode, &["Action"], vec![]),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn resolve_skips_unknown_ids() {
        let snap = snapshot();
        let resolved = snap.resolve(&[
            "a".to_string(),
            "missing".to_string(),
            "c".to_string(),
        ]);
        let ids: Vec<&str> = resolved.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn lead_genres_use_first_genre_only() {
        let snap = snapshot();
        let genres = snap.lead_genres();
        assert_eq!(genres["Action"].len(), 2); // a + c, not b
        assert_eq!(genres["Comedy"].len(), 1); // b only; a leads with Action
    }

    #[test]
    fn any_genre_lookup_matches_aliases() {
        let snap = snapshot();
        let comedies = snap.items_with_genre(&["comedy"]);
        assert_eq!(comedies.len(), 2); // a and b
    }

    #[test]
    fn actor_index_caps_at_top_billed() {
        let snap = snapshot();
        let actors = snap.people_index(&PersonRole::Actor);
        assert!(actors.contains_key("Three"));
        assert!(!actors.contains_key("Four")); // fourth-billed is ignored
        assert_eq!(actors["One"].len(), 2);
    }

    #[test]
    fn swap_is_atomic_for_existing_readers() {
        let index = LibraryIndex::new();
        index.swap(snapshot());
        let before = index.current();
        index.swap(LibrarySnapshot::new(vec![], Utc::now()));
        assert_eq!(before.len(), 3);
        assert!(index.current().is_empty());
    }
}
