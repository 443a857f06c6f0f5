//! Upstream server registration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered Upstream media server. At most one is active at a time.
///
/// `access_token` is held decrypted in memory; the store encrypts it at
/// rest with AES-256-GCM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaServer {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub upstream_user_id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl MediaServer {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        username: impl Into<String>,
        access_token: impl Into<String>,
        upstream_user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            base_url: base_url.into(),
            username: username.into(),
            access_token: access_token.into(),
            upstream_user_id: upstream_user_id.into(),
            is_active: false,
            created_at: Utc::now(),
        }
    }
}
