//! Settings catalog
//!
//! Settings are key → JSON value rows. Known keys are enumerated here and
//! unknown keys are rejected at the API boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::library::{ItemKind, LibraryItem};

/// Known setting keys.
pub mod keys {
    /// Global content filters applied by the materializer ([`super::GlobalFilters`]).
    pub const GLOBAL_FILTERS: &str = "global_filters";
    /// Preset ids (with multiplicity) the materializer builds channels from.
    pub const SELECTED_PRESETS: &str = "selected_presets";
    /// Whether the IPTV surface (M3U/XMLTV) is served.
    pub const IPTV_ENABLED: &str = "iptv_enabled";
    /// Default stream quality: `"auto"` or a video bitrate in bits/s.
    pub const STREAM_QUALITY: &str = "stream_quality";
    /// Set once the first-run setup has completed.
    pub const ONBOARDING_COMPLETE: &str = "onboarding_complete";

    pub const ALL: &[&str] = &[
        GLOBAL_FILTERS,
        SELECTED_PRESETS,
        IPTV_ENABLED,
        STREAM_QUALITY,
        ONBOARDING_COMPLETE,
    ];
}

/// Which content kinds are globally enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentTypes {
    pub movies: bool,
    pub episodes: bool,
}

impl Default for ContentTypes {
    fn default() -> Self {
        Self { movies: true, episodes: true }
    }
}

impl ContentTypes {
    #[must_use]
    pub const fn allows(&self, kind: ItemKind) -> bool {
        match kind {
            ItemKind::Movie => self.movies,
            ItemKind::Episode => self.episodes,
        }
    }
}

/// Global rating filter.
///
/// NOTE: the `ratings` list always enumerates *blocked* ratings, even when
/// `mode` is `"allow"` — the UI presents a deny-list under an allow-shaped
/// control and this service preserves that behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingFilter {
    pub mode: String,
    pub ratings: Vec<String>,
}

impl RatingFilter {
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.ratings.is_empty()
    }

    /// The deny-list, regardless of the declared mode.
    #[must_use]
    pub fn blocked(&self) -> &[String] {
        &self.ratings
    }
}

/// Global filters applied on top of every preset during materialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalFilters {
    pub content_types: ContentTypes,
    pub rating_filter: RatingFilter,
    pub blocked_genres: Vec<String>,
    pub separate_content_types: bool,
}

impl GlobalFilters {
    /// Whether an item passes the global gates.
    #[must_use]
    pub fn allows(&self, item: &LibraryItem) -> bool {
        if !self.content_types.allows(item.kind) {
            return false;
        }
        if let Some(rating) = item.official_rating.as_deref() {
            if self
                .rating_filter
                .blocked()
                .iter()
                .any(|r| r.eq_ignore_ascii_case(rating))
            {
                return false;
            }
        }
        if self.blocked_genres.iter().any(|blocked| {
            item.genres
                .iter()
                .any(|g| g.to_lowercase().contains(&blocked.to_lowercase()))
        }) {
            return false;
        }
        true
    }
}

/// Validate a setting value for a known key; unknown keys are rejected.
pub fn validate_setting(key: &str, value: &JsonValue) -> crate::Result<()> {
    match key {
        keys::GLOBAL_FILTERS => {
            serde_json::from_value::<GlobalFilters>(value.clone()).map_err(|e| {
                crate::Error::InvalidInput(format!("Invalid {key} value: {e}"))
            })?;
            Ok(())
        }
        keys::SELECTED_PRESETS => {
            serde_json::from_value::<Vec<String>>(value.clone()).map_err(|e| {
                crate::Error::InvalidInput(format!("Invalid {key} value: {e}"))
            })?;
            Ok(())
        }
        keys::IPTV_ENABLED | keys::ONBOARDING_COMPLETE => {
            if value.is_boolean() {
                Ok(())
            } else {
                Err(crate::Error::InvalidInput(format!(
                    "Setting {key} must be a boolean"
                )))
            }
        }
        keys::STREAM_QUALITY => match value {
            JsonValue::String(s) if s == "auto" => Ok(()),
            JsonValue::Number(n) if n.as_i64().is_some_and(|b| b > 0) => Ok(()),
            _ => Err(crate::Error::InvalidInput(
                "stream_quality must be \"auto\" or a positive bitrate".to_string(),
            )),
        },
        other => Err(crate::Error::InvalidInput(format!(
            "Unknown setting key: {other}"
        ))),
    }
}
