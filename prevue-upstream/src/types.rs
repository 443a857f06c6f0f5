//! Upstream API data structures
//!
//! Serde mappings for the Jellyfin-compatible JSON payloads the client
//! consumes. Field names on the wire are PascalCase.

use serde::Deserialize;

/// Authentication response
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    #[serde(rename = "AccessToken")]
    pub access_token: String,
    #[serde(rename = "User")]
    pub user: User,
}

/// User information (authentication response)
#[derive(Debug, Deserialize)]
pub struct User {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// System information (connection test)
#[derive(Debug, Deserialize)]
pub struct SystemInfo {
    #[serde(rename = "ServerName", default)]
    pub server_name: String,
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "Id", default)]
    pub id: String,
}

/// A person credited on an item (actor, director, composer, ...)
#[derive(Debug, Deserialize, Clone)]
pub struct Person {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub person_type: String,
}

/// Per-user playback state attached to an item
#[derive(Debug, Deserialize, Clone, Default)]
pub struct UserData {
    #[serde(rename = "Played", default)]
    pub played: bool,
    #[serde(rename = "IsFavorite", default)]
    pub is_favorite: bool,
    #[serde(rename = "PlayedPercentage", default)]
    pub played_percentage: Option<f64>,
    #[serde(rename = "LastPlayedDate", default)]
    pub last_played_date: Option<String>,
}

/// Studio credit
#[derive(Debug, Deserialize, Clone)]
pub struct Studio {
    #[serde(rename = "Name", default)]
    pub name: String,
}

/// Media item with the standard sync field projection
#[derive(Debug, Deserialize, Clone)]
pub struct Item {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub item_type: String,
    #[serde(rename = "SeriesId", default)]
    pub series_id: Option<String>,
    #[serde(rename = "SeriesName", default)]
    pub series_name: Option<String>,
    #[serde(rename = "ParentIndexNumber", default)]
    pub parent_index_number: Option<i32>,
    #[serde(rename = "IndexNumber", default)]
    pub index_number: Option<i32>,
    #[serde(rename = "RunTimeTicks", default)]
    pub run_time_ticks: Option<i64>,
    #[serde(rename = "Genres", default)]
    pub genres: Vec<String>,
    #[serde(rename = "OfficialRating", default)]
    pub official_rating: Option<String>,
    #[serde(rename = "ProductionYear", default)]
    pub production_year: Option<i32>,
    #[serde(rename = "DateCreated", default)]
    pub date_created: Option<String>,
    #[serde(rename = "Studios", default)]
    pub studios: Vec<Studio>,
    #[serde(rename = "People", default)]
    pub people: Vec<Person>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,
    #[serde(rename = "Overview", default)]
    pub overview: Option<String>,
    #[serde(rename = "UserData", default)]
    pub user_data: Option<UserData>,
}

/// Items listing response
#[derive(Debug, Deserialize)]
pub struct ItemsResponse {
    #[serde(rename = "Items", default)]
    pub items: Vec<Item>,
    #[serde(rename = "TotalRecordCount", default)]
    pub total_record_count: i64,
}

/// A single media source from PlaybackInfo
#[derive(Debug, Deserialize, Clone)]
pub struct MediaSource {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Container", default)]
    pub container: String,
    #[serde(rename = "SupportsTranscoding", default)]
    pub supports_transcoding: bool,
    #[serde(rename = "MediaStreams", default)]
    pub media_streams: Vec<MediaStream>,
}

/// One stream inside a media source
#[derive(Debug, Deserialize, Clone)]
pub struct MediaStream {
    #[serde(rename = "Type", default)]
    pub stream_type: String,
    #[serde(rename = "Codec", default)]
    pub codec: String,
    #[serde(rename = "VideoRange", default)]
    pub video_range: Option<String>,
    #[serde(rename = "Index", default)]
    pub index: i32,
}

/// Playback information response
#[derive(Debug, Deserialize)]
pub struct PlaybackInfoResponse {
    #[serde(rename = "PlaySessionId")]
    pub play_session_id: String,
    #[serde(rename = "MediaSources", default)]
    pub media_sources: Vec<MediaSource>,
}

impl MediaSource {
    /// True when any video stream reports an HDR range.
    #[must_use]
    pub fn is_hdr(&self) -> bool {
        self.media_streams.iter().any(|s| {
            s.stream_type == "Video"
                && s.video_range
                    .as_deref()
                    .is_some_and(|r| r.eq_ignore_ascii_case("hdr"))
        })
    }
}

/// Device profile advertised in PlaybackInfo requests: h264 + aac in ts
/// segments, matching the proxy's rewrite expectations.
#[must_use]
pub fn default_device_profile() -> serde_json::Value {
    serde_json::json!({
        "MaxStreamingBitrate": 120_000_000,
        "DirectPlayProfiles": [
            { "Container": "mp4,m4v,mkv", "Type": "Video", "VideoCodec": "h264", "AudioCodec": "aac,mp3" }
        ],
        "TranscodingProfiles": [
            {
                "Container": "ts",
                "Type": "Video",
                "VideoCodec": "h264",
                "AudioCodec": "aac",
                "Protocol": "hls",
                "BreakOnNonKeyFrames": true,
                "MaxAudioChannels": "2"
            }
        ],
        "SubtitleProfiles": [
            { "Format": "vtt", "Method": "Hls" }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_deserializes_full_projection() {
        let json = r#"{
            "Id": "abc",
            "Name": "The Thing",
            "Type": "Movie",
            "RunTimeTicks": 65520000000,
            "Genres": ["Horror", "Sci-Fi"],
            "OfficialRating": "R",
            "ProductionYear": 1982,
            "DateCreated": "2024-01-02T03:04:05Z",
            "Studios": [{"Name": "Universal"}],
            "People": [
                {"Name": "John Carpenter", "Type": "Director"},
                {"Name": "Kurt Russell", "Type": "Actor"}
            ],
            "UserData": {"Played": true, "IsFavorite": false, "PlayedPercentage": 99.1}
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "abc");
        assert_eq!(item.item_type, "Movie");
        assert_eq!(item.genres, vec!["Horror", "Sci-Fi"]);
        assert_eq!(item.run_time_ticks, Some(65_520_000_000));
        assert_eq!(item.people.len(), 2);
        assert_eq!(item.people[0].person_type, "Director");
        assert!(item.user_data.unwrap().played);
    }

    #[test]
    fn episode_deserializes_series_fields() {
        let json = r#"{
            "Id": "ep1",
            "Name": "Pilot",
            "Type": "Episode",
            "SeriesId": "show9",
            "SeriesName": "Some Show",
            "ParentIndexNumber": 1,
            "IndexNumber": 3
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.series_id.as_deref(), Some("show9"));
        assert_eq!(item.parent_index_number, Some(1));
        assert_eq!(item.index_number, Some(3));
        assert!(item.genres.is_empty());
    }

    #[test]
    fn playback_info_deserializes() {
        let json = r#"{
            "PlaySessionId": "ps-1",
            "MediaSources": [{
                "Id": "src-1",
                "Container": "mkv",
                "SupportsTranscoding": true,
                "MediaStreams": [
                    {"Type": "Video", "Codec": "hevc", "VideoRange": "HDR", "Index": 0},
                    {"Type": "Audio", "Codec": "aac", "Index": 1}
                ]
            }]
        }"#;
        let resp: PlaybackInfoResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.play_session_id, "ps-1");
        assert!(resp.media_sources[0].is_hdr());
    }

    #[test]
    fn items_response_defaults_when_empty() {
        let resp: ItemsResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.items.is_empty());
        assert_eq!(resp.total_record_count, 0);
    }

    #[test]
    fn device_profile_requests_hls_ts() {
        let profile = default_device_profile();
        let transcoding = profile["TranscodingProfiles"].as_array().unwrap();
        assert_eq!(transcoding[0]["Container"], "ts");
        assert_eq!(transcoding[0]["Protocol"], "hls");
        assert_eq!(transcoding[0]["BreakOnNonKeyFrames"], true);
    }
}
