//! Library item snapshot model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::clock::ticks_to_ms;

/// What kind of content an item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Movie,
    Episode,
}

impl ItemKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Episode => "episode",
        }
    }
}

/// Role of a credited person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonRole {
    Actor,
    Director,
    Composer,
    Other(String),
}

impl PersonRole {
    fn from_upstream(raw: &str) -> Self {
        match raw {
            "Actor" => Self::Actor,
            "Director" => Self::Director,
            "Composer" => Self::Composer,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A person credited on an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRef {
    pub name: String,
    pub role: PersonRole,
}

/// Per-user playback state from the Upstream account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserState {
    pub played: bool,
    pub is_favorite: bool,
    pub played_percentage: Option<f64>,
    pub last_played: Option<DateTime<Utc>>,
}

/// Immutable snapshot of one library item, refreshed on each sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: String,
    pub kind: ItemKind,
    pub name: String,
    pub series_id: Option<String>,
    pub series_name: Option<String>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    /// Runtime in Upstream 100-ns ticks; 0 when unknown (such items are
    /// skipped by the scheduler).
    pub run_time_ticks: i64,
    /// Ordered; the first entry is the item's lead genre.
    pub genres: Vec<String>,
    pub official_rating: Option<String>,
    pub production_year: Option<i32>,
    pub date_added: Option<DateTime<Utc>>,
    pub studios: Vec<String>,
    pub people: Vec<PersonRef>,
    pub user_state: UserState,
}

impl LibraryItem {
    /// Runtime normalized to milliseconds; 0 when unknown.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        ticks_to_ms(self.run_time_ticks)
    }

    #[must_use]
    pub fn lead_genre(&self) -> Option<&str> {
        self.genres.first().map(String::as_str)
    }

    /// Decade bucket of the production year (e.g. 1994 → 1990).
    #[must_use]
    pub fn decade(&self) -> Option<i32> {
        self.production_year.map(|y| (y / 10) * 10)
    }

    #[must_use]
    pub fn bucket(&self) -> RatingBucket {
        RatingBucket::for_rating(self.official_rating.as_deref())
    }

    /// People with a given role, by name.
    pub fn people_with_role<'a>(
        &'a self,
        role: &'a PersonRole,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.people
            .iter()
            .filter(move |p| &p.role == role)
            .map(|p| p.name.as_str())
    }
}

/// Coarse rating classification used to keep kids and adult content from
/// airing back to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingBucket {
    Kids,
    Adult,
}

const KIDS_RATINGS: &[&str] = &["G", "PG", "TV-Y", "TV-Y7", "TV-Y7-FV", "TV-G", "TV-PG"];

impl RatingBucket {
    /// Missing ratings classify as adult.
    #[must_use]
    pub fn for_rating(rating: Option<&str>) -> Self {
        match rating {
            Some(r) if KIDS_RATINGS.iter().any(|k| k.eq_ignore_ascii_case(r)) => Self::Kids,
            _ => Self::Adult,
        }
    }
}

impl From<prevue_upstream::types::Item> for LibraryItem {
    fn from(item: prevue_upstream::types::Item) -> Self {
        let kind = if item.item_type == "Episode" {
            ItemKind::Episode
        } else {
            ItemKind::Movie
        };
        let user_state = item.user_data.map(|u| UserState {
            played: u.played,
            is_favorite: u.is_favorite,
            played_percentage: u.played_percentage,
            last_played: u
                .last_played_date
                .as_deref()
                .and_then(parse_upstream_date),
        });
        Self {
            id: item.id,
            kind,
            name: item.name,
            series_id: item.series_id,
            series_name: item.series_name,
            season: item.parent_index_number,
            episode: item.index_number,
            run_time_ticks: item.run_time_ticks.unwrap_or(0),
            genres: item.genres,
            official_rating: item.official_rating,
            production_year: item.production_year,
            date_added: item.date_created.as_deref().and_then(parse_upstream_date),
            studios: item.studios.into_iter().map(|s| s.name).collect(),
            people: item
                .people
                .into_iter()
                .map(|p| PersonRef {
                    role: PersonRole::from_upstream(&p.person_type),
                    name: p.name,
                })
                .collect(),
            user_state: user_state.unwrap_or_default(),
        }
    }
}

fn parse_upstream_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
