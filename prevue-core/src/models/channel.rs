//! Channel model and filter predicate

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::library::{ItemKind, LibraryItem, PersonRole};

/// How a channel came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Created by the default materialization pass.
    Auto,
    /// Created from a user-selected preset.
    Preset,
    /// Hand-built by the user; survives regeneration.
    Custom,
}

impl ChannelKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Preset => "preset",
            Self::Custom => "custom",
        }
    }

    pub fn parse(raw: &str) -> crate::Result<Self> {
        match raw {
            "auto" => Ok(Self::Auto),
            "preset" => Ok(Self::Preset),
            "custom" => Ok(Self::Custom),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown channel kind: {other}"
            ))),
        }
    }
}

/// A channel in the lineup. `number` is the stable identity; names are
/// unique across the lineup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub number: i64,
    pub name: String,
    pub kind: ChannelKind,
    pub preset_id: Option<String>,
    pub filter: Option<ChannelFilter>,
    /// Item ids drawn from the library snapshot. Weak references: ids that
    /// no longer resolve are skipped at schedule time, not on write.
    pub item_ids: Vec<String>,
    pub sort_order: i64,
    pub ai_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
}

const fn default_true() -> bool {
    true
}

/// Composable predicate limiting which library items a channel may carry.
///
/// Empty lists mean "no constraint". Rating lists operate on the item's
/// `official_rating` string; genre matching is case-insensitive substring
/// containment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelFilter {
    pub genres: Vec<String>,
    pub exclude_genres: Vec<String>,
    /// Allow-list: when non-empty the item's rating must appear here.
    pub ratings: Vec<String>,
    pub exclude_ratings: Vec<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub min_duration_minutes: Option<i64>,
    pub max_duration_minutes: Option<i64>,
    pub added_within_days: Option<i64>,
    pub studios: Vec<String>,
    pub directors: Vec<String>,
    pub actors: Vec<String>,
    pub composers: Vec<String>,
    pub unwatched_only: bool,
    pub favorites_only: bool,
    pub continue_watching: bool,
    pub not_watched_in_days: Option<i64>,
    pub collection_id: Option<String>,
    pub playlist_id: Option<String>,
    #[serde(default = "default_true")]
    pub include_movies: bool,
    #[serde(default = "default_true")]
    pub include_episodes: bool,
}

impl ChannelFilter {
    /// Evaluate the predicate against one item.
    ///
    /// Collection/playlist membership is not checked here; the
    /// materializer resolves those ids against Upstream and intersects
    /// the member sets.
    #[must_use]
    pub fn matches(&self, item: &LibraryItem, now: DateTime<Utc>) -> bool {
        match item.kind {
            ItemKind::Movie if !self.include_movies => return false,
            ItemKind::Episode if !self.include_episodes => return false,
            _ => {}
        }

        if !self.genres.is_empty() && !self.genres.iter().any(|g| has_genre(item, g)) {
            return false;
        }
        if self.exclude_genres.iter().any(|g| has_genre(item, g)) {
            return false;
        }

        if !self.ratings.is_empty() {
            match item.official_rating.as_deref() {
                Some(rating) if self.ratings.iter().any(|r| r.eq_ignore_ascii_case(rating)) => {}
                _ => return false,
            }
        }
        if let Some(rating) = item.official_rating.as_deref() {
            if self.exclude_ratings.iter().any(|r| r.eq_ignore_ascii_case(rating)) {
                return false;
            }
        }

        if let Some(min) = self.year_min {
            if item.production_year.is_none_or(|y| y < min) {
                return false;
            }
        }
        if let Some(max) = self.year_max {
            if item.production_year.is_none_or(|y| y > max) {
                return false;
            }
        }

        let duration_min = item.duration_ms() / 60_000;
        if let Some(min) = self.min_duration_minutes {
            if duration_min < min {
                return false;
            }
        }
        if let Some(max) = self.max_duration_minutes {
            if duration_min > max {
                return false;
            }
        }

        if let Some(days) = self.added_within_days {
            let cutoff = now - Duration::days(days);
            if item.date_added.is_none_or(|added| added < cutoff) {
                return false;
            }
        }

        if !self.studios.is_empty()
            && !self
                .studios
                .iter()
                .any(|s| item.studios.iter().any(|is| is.eq_ignore_ascii_case(s)))
        {
            return false;
        }
        if !self.matches_people(&self.directors, item, &PersonRole::Director) {
            return false;
        }
        if !self.matches_people(&self.actors, item, &PersonRole::Actor) {
            return false;
        }
        if !self.matches_people(&self.composers, item, &PersonRole::Composer) {
            return false;
        }

        if self.unwatched_only && item.user_state.played {
            return false;
        }
        if self.favorites_only && !item.user_state.is_favorite {
            return false;
        }
        if self.continue_watching {
            let resumable = item
                .user_state
                .played_percentage
                .is_some_and(|p| p > 0.0 && p < 95.0);
            if !resumable {
                return false;
            }
        }
        if let Some(days) = self.not_watched_in_days {
            let cutoff = now - Duration::days(days);
            if item.user_state.last_played.is_some_and(|last| last >= cutoff) {
                return false;
            }
        }

        true
    }

    fn matches_people(&self, wanted: &[String], item: &LibraryItem, role: &PersonRole) -> bool {
        if wanted.is_empty() {
            return true;
        }
        wanted.iter().any(|name| {
            item.people_with_role(role)
                .any(|have| have.eq_ignore_ascii_case(name))
        })
    }
}

fn has_genre(item: &LibraryItem, wanted: &str) -> bool {
    let wanted = wanted.to_lowercase();
    item.genres
        .iter()
        .any(|g| g.to_lowercase().contains(&wanted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::library::{PersonRef, UserState};

    fn item(kind: ItemKind) -> LibraryItem {
        LibraryItem {
            id: "x".to_string(),
            kind,
            name: "X".to_string(),
            series_id: None,
            series_name: None,
            season: None,
            episode: None,
            run_time_ticks: 54_000_000_000, // 90 min
            genres: vec!["Science Fiction".to_string(), "Drama".to_string()],
            official_rating: Some("PG-13".to_string()),
            production_year: Some(1997),
            date_added: None,
            studios: vec!["Warner".to_string()],
            people: vec![
                PersonRef { name: "Jane Doe".to_string(), role: PersonRole::Director },
                PersonRef { name: "Lead Actor".to_string(), role: PersonRole::Actor },
            ],
            user_state: UserState::default(),
        }
    }

    fn now() -> DateTime<Utc> {
        "2026-02-11T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = ChannelFilter::default();
        assert!(filter.matches(&item(ItemKind::Movie), now()));
        assert!(filter.matches(&item(ItemKind::Episode), now()));
    }

    #[test]
    fn content_type_toggles_are_and() {
        let filter = ChannelFilter { include_episodes: false, ..Default::default() };
        assert!(filter.matches(&item(ItemKind::Movie), now()));
        assert!(!filter.matches(&item(ItemKind::Episode), now()));
    }

    #[test]
    fn genre_match_is_substring_any() {
        let filter = ChannelFilter {
            genres: vec!["science".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&item(ItemKind::Movie), now()));

        let filter = ChannelFilter {
            genres: vec!["western".to_string()],
            ..Default::default()
        };
        assert!(!filter.matches(&item(ItemKind::Movie), now()));
    }

    #[test]
    fn exclude_genres_disqualify() {
        let filter = ChannelFilter {
            exclude_genres: vec!["drama".to_string()],
            ..Default::default()
        };
        assert!(!filter.matches(&item(ItemKind::Movie), now()));
    }

    #[test]
    fn rating_allow_list_requires_membership() {
        let filter = ChannelFilter {
            ratings: vec!["PG-13".to_string(), "PG".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&item(ItemKind::Movie), now()));

        let mut unrated = item(ItemKind::Movie);
        unrated.official_rating = None;
        assert!(!filter.matches(&unrated, now()));

        let filter = ChannelFilter { ratings: vec!["R".to_string()], ..Default::default() };
        assert!(!filter.matches(&item(ItemKind::Movie), now()));
    }

    #[test]
    fn year_and_duration_bounds() {
        let filter = ChannelFilter {
            year_min: Some(1990),
            year_max: Some(1999),
            min_duration_minutes: Some(60),
            max_duration_minutes: Some(120),
            ..Default::default()
        };
        assert!(filter.matches(&item(ItemKind::Movie), now()));

        let mut out_of_range = item(ItemKind::Movie);
        out_of_range.production_year = Some(2005);
        assert!(!filter.matches(&out_of_range, now()));
    }

    #[test]
    fn people_filters_are_case_insensitive() {
        let filter = ChannelFilter {
            directors: vec!["jane doe".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&item(ItemKind::Movie), now()));

        let filter = ChannelFilter {
            composers: vec!["jane doe".to_string()],
            ..Default::default()
        };
        assert!(!filter.matches(&item(ItemKind::Movie), now()));
    }

    #[test]
    fn behavioral_flags() {
        let mut watched = item(ItemKind::Movie);
        watched.user_state.played = true;
        watched.user_state.last_played = Some("2026-02-10T00:00:00Z".parse().unwrap());

        let unwatched_filter = ChannelFilter { unwatched_only: true, ..Default::default() };
        assert!(!unwatched_filter.matches(&watched, now()));
        assert!(unwatched_filter.matches(&item(ItemKind::Movie), now()));

        let stale_filter = ChannelFilter {
            not_watched_in_days: Some(30),
            ..Default::default()
        };
        assert!(!stale_filter.matches(&watched, now()));
        assert!(stale_filter.matches(&item(ItemKind::Movie), now()));

        let mut resumable = item(ItemKind::Movie);
        resumable.user_state.played_percentage = Some(42.0);
        let continue_filter = ChannelFilter { continue_watching: true, ..Default::default() };
        assert!(continue_filter.matches(&resumable, now()));
        assert!(!continue_filter.matches(&item(ItemKind::Movie), now()));
    }

    #[test]
    fn filter_round_trips_through_json() {
        let filter = ChannelFilter {
            genres: vec!["Action".to_string()],
            year_min: Some(1980),
            include_episodes: false,
            ..Default::default()
        };
        let json = serde_json::to_string(&filter).unwrap();
        let parsed: ChannelFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.genres, filter.genres);
        assert_eq!(parsed.year_min, Some(1980));
        assert!(!parsed.include_episodes);
        assert!(parsed.include_movies);
    }

    #[test]
    fn missing_toggles_default_to_true() {
        let parsed: ChannelFilter = serde_json::from_str("{}").unwrap();
        assert!(parsed.include_movies);
        assert!(parsed.include_episodes);
    }
}
