//! Prevue HTTP/JSON API
//!
//! axum router over the core services: server and channel management,
//! schedule reads, tuning, the HLS stream proxy, settings, IPTV emitters
//! and the websocket push channel.

pub mod http;

pub use http::{create_router, AppState};
