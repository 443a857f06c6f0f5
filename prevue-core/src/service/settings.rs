//! Typed settings access
//!
//! Wraps the settings repository with the key catalog: unknown keys are
//! rejected on write, and typed getters fall back to documented defaults
//! when a key has never been set.

use serde_json::Value as JsonValue;

use crate::models::settings::{keys, validate_setting, GlobalFilters};
use crate::repository::SettingsRepository;
use crate::Result;

/// Default preset selection for first boot.
pub const DEFAULT_PRESETS: &[&str] = &["auto-genres"];

#[derive(Clone)]
pub struct SettingsService {
    repo: SettingsRepository,
}

impl SettingsService {
    #[must_use]
    pub const fn new(repo: SettingsRepository) -> Self {
        Self { repo }
    }

    /// All persisted settings as (key, value) pairs.
    pub async fn all(&self) -> Result<Vec<(String, JsonValue)>> {
        self.repo.all().await
    }

    pub async fn get(&self, key: &str) -> Result<Option<JsonValue>> {
        if !keys::ALL.contains(&key) {
            return Err(crate::Error::InvalidInput(format!(
                "Unknown setting key: {key}"
            )));
        }
        self.repo.get(key).await
    }

    /// Validate and persist a setting.
    pub async fn set(&self, key: &str, value: &JsonValue) -> Result<()> {
        validate_setting(key, value)?;
        self.repo.set(key, value).await
    }

    pub async fn global_filters(&self) -> Result<GlobalFilters> {
        Ok(self
            .repo
            .get(keys::GLOBAL_FILTERS)
            .await?
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default())
    }

    pub async fn selected_presets(&self) -> Result<Vec<String>> {
        Ok(self
            .repo
            .get(keys::SELECTED_PRESETS)
            .await?
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(|| DEFAULT_PRESETS.iter().map(ToString::to_string).collect()))
    }

    pub async fn iptv_enabled(&self) -> Result<bool> {
        Ok(self
            .repo
            .get(keys::IPTV_ENABLED)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(true))
    }

    /// Configured default stream quality: `None` means auto/stream-copy,
    /// `Some(bps)` an explicit video bitrate.
    pub async fn stream_quality(&self) -> Result<Option<i64>> {
        Ok(self
            .repo
            .get(keys::STREAM_QUALITY)
            .await?
            .and_then(|v| v.as_i64()))
    }

    pub async fn onboarding_complete(&self) -> Result<bool> {
        Ok(self
            .repo
            .get(keys::ONBOARDING_COMPLETE)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }
}
