//! Upstream media server client
//!
//! HTTP client for a Jellyfin-compatible media server ("Upstream"): user
//! authentication, library listing and sync, playback sessions, HLS stream
//! URLs and transcode job lifecycle. Everything above this crate treats the
//! Upstream transcoder as an opaque origin.

pub mod client;
pub mod error;
pub mod types;

pub use client::{StreamQuality, StreamSession, UpstreamClient};
pub use error::UpstreamError;
pub use types::{Item, ItemsResponse, PlaybackInfoResponse, SystemInfo};
