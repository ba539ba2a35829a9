//! Core domain types for buildtail: log API wire shapes and watch summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying a single watch run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Log API wire types
// ---------------------------------------------------------------------------

/// One piece of build log text as returned by the log endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogChunk {
    /// Raw log text.
    #[serde(default)]
    pub chunk: String,
    /// Position of this chunk in the full log.
    #[serde(default)]
    pub position: u64,
}

/// Response body of `GET /apps/{app}/builds/{build}/log`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogResponse {
    #[serde(default)]
    pub log_chunks: Vec<LogChunk>,
    #[serde(default)]
    pub next_before_timestamp: String,
    #[serde(default)]
    pub next_after_timestamp: String,
    /// Set once the build has finished and its log was archived.
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiring_raw_log_url: Option<String>,
}

impl LogResponse {
    /// Highest chunk position in this response, if it carries any chunks.
    pub fn max_position(&self) -> Option<u64> {
        self.log_chunks.iter().map(|c| c.position).max()
    }
}

// ---------------------------------------------------------------------------
// WatchSummary
// ---------------------------------------------------------------------------

/// Why a watch run stopped polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The log was archived, i.e. the build finished.
    Archived,
    /// The target marker appeared in a chunk.
    TargetFound,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Archived => f.write_str("archived"),
            Self::TargetFound => f.write_str("target found"),
        }
    }
}

/// Outcome of one watch run, written as JSON with `--summary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSummary {
    pub run_id: RunId,
    pub app_slug: String,
    pub build_slug: String,
    /// Number of log-endpoint requests that succeeded.
    pub polls: u32,
    /// Number of non-empty chunks appended to the output file.
    pub chunks_written: usize,
    pub bytes_written: u64,
    /// Highest chunk position seen.
    pub last_position: u64,
    pub stop_reason: StopReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn log_response_decodes_api_payload() {
        let json = r#"{
            "log_chunks": [
                {"chunk": "+------+\n", "position": 0},
                {"chunk": "| (0) Git Clone |\n", "position": 1}
            ],
            "next_before_timestamp": "2024-01-01T00:00:00Z",
            "next_after_timestamp": "2024-01-01T00:00:05Z",
            "is_archived": false
        }"#;
        let parsed: LogResponse = serde_json::from_str(json).expect("deserialize");
        assert_eq!(parsed.log_chunks.len(), 2);
        assert_eq!(parsed.max_position(), Some(1));
        assert!(!parsed.is_archived);
        assert!(parsed.expiring_raw_log_url.is_none());
    }

    #[test]
    fn log_response_tolerates_missing_fields() {
        let parsed: LogResponse = serde_json::from_str(r#"{"is_archived": true}"#).unwrap();
        assert!(parsed.is_archived);
        assert!(parsed.log_chunks.is_empty());
        assert_eq!(parsed.max_position(), None);
    }

    #[test]
    fn watch_summary_serializes_stop_reason() {
        let summary = WatchSummary {
            run_id: RunId::new(),
            app_slug: "app".into(),
            build_slug: "build".into(),
            polls: 3,
            chunks_written: 5,
            bytes_written: 120,
            last_position: 4,
            stop_reason: StopReason::TargetFound,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        let json = serde_json::to_string(&summary).expect("serialize");
        assert!(json.contains("\"stop_reason\":\"target_found\""));
        let parsed: WatchSummary = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.stop_reason, StopReason::TargetFound);
        assert_eq!(parsed.chunks_written, 5);
    }
}
