//! Shared types, error model, and configuration for buildtail.
//!
//! This crate is the foundation depended on by all other buildtail crates.
//! It provides:
//! - [`BuildTailError`], the unified error type
//! - Log API wire types ([`LogResponse`], [`LogChunk`]) and [`WatchSummary`]
//! - Configuration ([`AppConfig`], [`ProcessConfig`], [`PollConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, DEFAULT_TARGET_MARKER, FilteringConfig, PollConfig, PollingConfig,
    ProcessConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_api_token,
};
pub use error::{BuildTailError, Result};
pub use types::{LogChunk, LogResponse, RunId, StopReason, WatchSummary};
