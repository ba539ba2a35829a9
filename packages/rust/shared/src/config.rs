//! Application configuration for buildtail.
//!
//! User config lives at `~/.buildtail/buildtail.toml`.
//! CLI flags (and their environment variables) override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BuildTailError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "buildtail.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".buildtail";

/// Marker a build prints to tell the watcher it has seen enough.
pub const DEFAULT_TARGET_MARKER: &str = "AI STOPS HERE WITH THE LOGS";

// ---------------------------------------------------------------------------
// Config structs (matching buildtail.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// CI API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Polling loop settings.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Step log filtering settings.
    #[serde(default)]
    pub filtering: FilteringConfig,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the build API, without trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.bitrise.io/v0.1".into()
}
fn default_token_env() -> String {
    "BITRISE_API_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[polling]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds to wait between polls.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Polling stops once a chunk contains this text.
    #[serde(default = "default_target_marker")]
    pub target_marker: String,

    /// Extra attempts per poll before a fetch failure aborts the run.
    #[serde(default = "default_max_fetch_retries")]
    pub max_fetch_retries: u32,

    /// Delay before the first retry; doubled on every further retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            target_marker: default_target_marker(),
            max_fetch_retries: default_max_fetch_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_interval_secs() -> u64 {
    10
}
fn default_target_marker() -> String {
    DEFAULT_TARGET_MARKER.into()
}
fn default_max_fetch_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}

/// `[filtering]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilteringConfig {
    /// Apply keyword filtering to classified steps.
    #[serde(default)]
    pub enabled: bool,

    /// Pattern table, one `type: kw1, kw2` per line.
    #[serde(default)]
    pub patterns: String,

    /// Only post-process the failed step's log.
    #[serde(default)]
    pub focus_failed_step_only: bool,
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Inputs of the log post-processing pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Title of the step that failed; empty when not applicable.
    pub failed_step_title: String,
    /// Error message of the failed step; empty when not applicable.
    pub failed_step_error: String,
    pub filtering_enabled: bool,
    /// Raw pattern table text. Empty disables filtering regardless of the flag.
    pub filter_patterns: String,
    pub focus_failed_step_only: bool,
}

impl From<&AppConfig> for ProcessConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            failed_step_title: String::new(),
            failed_step_error: String::new(),
            filtering_enabled: config.filtering.enabled,
            filter_patterns: config.filtering.patterns.clone(),
            focus_failed_step_only: config.filtering.focus_failed_step_only,
        }
    }
}

/// Runtime polling configuration.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub target_marker: String,
    pub max_fetch_retries: u32,
    pub retry_backoff: Duration,
}

impl From<&AppConfig> for PollConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.polling.interval_secs),
            target_marker: config.polling.target_marker.clone(),
            max_fetch_retries: config.polling.max_fetch_retries,
            retry_backoff: Duration::from_millis(config.polling.retry_backoff_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.buildtail/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BuildTailError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.buildtail/buildtail.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BuildTailError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        BuildTailError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BuildTailError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BuildTailError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BuildTailError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the API token: an explicit non-empty value wins, otherwise the
/// env var named by `[api].token_env` must be set and non-empty.
pub fn resolve_api_token(config: &AppConfig, explicit: Option<&str>) -> Result<String> {
    if let Some(token) = explicit.filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    let var_name = &config.api.token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(BuildTailError::config(format!(
            "API token not found. Pass --token or set the {var_name} environment variable."
        ))),
    }
}
