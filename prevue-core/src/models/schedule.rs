//! Schedule block and program models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::library::{ItemKind, LibraryItem};

/// One entry in a schedule block: a real program or a gap-filling
/// interstitial. Persisted as a discriminated record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleProgram {
    Program(ProgramEntry),
    Interstitial(InterstitialEntry),
}

/// A scheduled library item with metadata derived at generation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub item_id: String,
    pub title: String,
    /// "S2E10 · Episode Name" for episodes.
    pub subtitle: Option<String>,
    pub content_type: ItemKind,
    pub series_id: Option<String>,
    pub year: Option<i32>,
    pub rating: Option<String>,
    /// Upstream-relative image paths; the client prefixes the server base.
    pub thumb_url: Option<String>,
    pub banner_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
}

/// "Coming Up Next" filler carrying no upstream item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterstitialEntry {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
}

impl ScheduleProgram {
    #[must_use]
    pub fn program(item: &LibraryItem, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let subtitle = match (item.kind, item.season, item.episode) {
            (ItemKind::Episode, Some(season), Some(episode)) => {
                Some(format!("S{season}E{episode} · {}", item.name))
            }
            (ItemKind::Episode, _, _) => Some(item.name.clone()),
            _ => None,
        };
        let title = match item.kind {
            ItemKind::Episode => item
                .series_name
                .clone()
                .unwrap_or_else(|| item.name.clone()),
            ItemKind::Movie => item.name.clone(),
        };
        Self::Program(ProgramEntry {
            item_id: item.id.clone(),
            title,
            subtitle,
            content_type: item.kind,
            series_id: item.series_id.clone(),
            year: item.production_year,
            rating: item.official_rating.clone(),
            thumb_url: Some(format!("/Items/{}/Images/Primary", item.id)),
            banner_url: Some(format!("/Items/{}/Images/Backdrop", item.id)),
            start_time: start,
            end_time: end,
            duration_ms: (end - start).num_milliseconds(),
        })
    }

    #[must_use]
    pub fn interstitial(title: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::Interstitial(InterstitialEntry {
            title: title.into(),
            start_time: start,
            end_time: end,
            duration_ms: (end - start).num_milliseconds(),
        })
    }

    #[must_use]
    pub const fn is_program(&self) -> bool {
        matches!(self, Self::Program(_))
    }

    #[must_use]
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Self::Program(p) => Some(&p.item_id),
            Self::Interstitial(_) => None,
        }
    }

    #[must_use]
    pub fn series_id(&self) -> Option<&str> {
        match self {
            Self::Program(p) => p.series_id.as_deref(),
            Self::Interstitial(_) => None,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Program(p) => &p.title,
            Self::Interstitial(i) => &i.title,
        }
    }

    #[must_use]
    pub const fn start_time(&self) -> DateTime<Utc> {
        match self {
            Self::Program(p) => p.start_time,
            Self::Interstitial(i) => i.start_time,
        }
    }

    #[must_use]
    pub const fn end_time(&self) -> DateTime<Utc> {
        match self {
            Self::Program(p) => p.end_time,
            Self::Interstitial(i) => i.end_time,
        }
    }

    #[must_use]
    pub const fn duration_ms(&self) -> i64 {
        match self {
            Self::Program(p) => p.duration_ms,
            Self::Interstitial(i) => i.duration_ms,
        }
    }
}

/// One generated schedule window for a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub channel_number: i64,
    pub block_start: DateTime<Utc>,
    pub block_end: DateTime<Utc>,
    /// Hex SHA-256 of (channel_number, block_start) that seeded the RNG.
    pub seed: String,
    pub programs: Vec<ScheduleProgram>,
    pub created_at: DateTime<Utc>,
}
