use serde::{Deserialize, Serialize};

/// Application configuration, loaded from environment variables.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("data", &self.data)
            .field("auth", &"<redacted>")
            .field("security", &"<redacted>")
            .field("schedule", &self.schedule)
            .field("logging", &self.logging)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the SQLite database file.
    pub dir: String,
}

impl DataConfig {
    #[must_use]
    pub fn database_path(&self) -> String {
        format!("{}/prevue.db", self.dir.trim_end_matches('/'))
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: "./data".to_string(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared API key gating `/api/*` and `/ws`. When unset, the API is open.
    pub api_key: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Key material for encrypting Upstream access tokens at rest.
    /// When unset, a key is derived from the machine identity.
    pub encryption_key: Option<String>,
    /// Allow Upstream base URLs that resolve to private/loopback addresses.
    pub allow_private_urls: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_key: None,
            allow_private_urls: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Length of one schedule block in hours.
    pub block_hours: i64,
    /// UTC hour (0-23) at which each broadcast day starts.
    pub day_start_hour: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            block_hours: 24,
            day_start_hour: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Build configuration from process environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a number, got {port:?}"))?;
        }
        if let Ok(dir) = std::env::var("PREVUE_DATA_DIR") {
            config.data.dir = dir;
        }
        if let Ok(key) = std::env::var("PREVUE_API_KEY") {
            if !key.is_empty() {
                config.auth.api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("DATA_ENCRYPTION_KEY") {
            if !key.is_empty() {
                config.security.encryption_key = Some(key);
            }
        }
        if let Ok(raw) = std::env::var("PREVUE_ALLOW_PRIVATE_URLS") {
            config.security.allow_private_urls = parse_bool_flag(&raw);
        }
        if let Ok(hours) = std::env::var("SCHEDULE_BLOCK_HOURS") {
            config.schedule.block_hours = hours
                .parse()
                .map_err(|_| anyhow::anyhow!("SCHEDULE_BLOCK_HOURS must be a number"))?;
        }
        if let Ok(hour) = std::env::var("SCHEDULE_DAY_START_HOUR") {
            config.schedule.day_start_hour = hour
                .parse()
                .map_err(|_| anyhow::anyhow!("SCHEDULE_DAY_START_HOUR must be a number"))?;
        }
        if let Ok(level) = std::env::var("PREVUE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("PREVUE_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Validate the configuration, collecting every problem found.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.schedule.day_start_hour > 23 {
            errors.push(format!(
                "SCHEDULE_DAY_START_HOUR must be 0-23, got {}",
                self.schedule.day_start_hour
            ));
        }
        if self.schedule.block_hours < 1 || self.schedule.block_hours > 24 * 7 {
            errors.push(format!(
                "SCHEDULE_BLOCK_HOURS must be between 1 and 168, got {}",
                self.schedule.block_hours
            ));
        }
        if let Some(ref key) = self.security.encryption_key {
            if key.len() < 32 {
                tracing::warn!(
                    "DATA_ENCRYPTION_KEY is shorter than the recommended 32 characters"
                );
            }
        }
        if let Some(ref key) = self.auth.api_key {
            if key.len() < 8 {
                errors.push("PREVUE_API_KEY must be at least 8 characters".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Truthy unless one of the conventional "off" spellings.
fn parse_bool_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 3080);
        assert_eq!(config.schedule.block_hours, 24);
        assert_eq!(config.schedule.day_start_hour, 4);
        assert!(config.security.allow_private_urls);
        assert!(config.auth.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bool_flag_spellings() {
        for falsy in ["0", "false", "no", "off", "  FALSE "] {
            assert!(!parse_bool_flag(falsy), "{falsy} should be false");
        }
        for truthy in ["1", "true", "yes", "on", "anything"] {
            assert!(parse_bool_flag(truthy), "{truthy} should be true");
        }
    }

    #[test]
    fn validate_rejects_bad_day_start() {
        let mut config = Config::default();
        config.schedule.day_start_hour = 24;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("SCHEDULE_DAY_START_HOUR"));
    }

    #[test]
    fn validate_rejects_short_api_key() {
        let mut config = Config::default();
        config.auth.api_key = Some("short".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn database_path_joins_dir() {
        let data = DataConfig { dir: "/var/lib/prevue/".to_string() };
        assert_eq!(data.database_path(), "/var/lib/prevue/prevue.db");
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = Config::default();
        config.auth.api_key = Some("super-secret-key".to_string());
        config.security.encryption_key = Some("super-secret-material".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
