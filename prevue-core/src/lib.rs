//! Prevue core: models, persistence and scheduling services
//!
//! Turns a media library exposed by an Upstream server into a linear
//! cable-TV lineup: deterministic 24-hour schedule blocks per channel,
//! channel materialization from presets, tuning, and playback session
//! tracking. HTTP surfaces live in `prevue-api`; this crate owns the
//! domain logic and the embedded SQLite store.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod repository;
pub mod service;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};
