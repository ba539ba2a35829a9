//! The watch loop: poll the build log until the build finishes or the
//! target marker shows up, appending every chunk to the output file.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use buildtail_client::BitriseClient;
use buildtail_shared::{
    BuildTailError, LogResponse, PollConfig, Result, RunId, StopReason, WatchSummary,
};

use crate::output::LogWriter;

/// Configuration for [`watch_build`].
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub app_slug: String,
    pub build_slug: String,
    /// Accumulated log destination; truncated when the run starts.
    pub output_file: PathBuf,
    pub poll: PollConfig,
}

/// Progress callback for reporting watch status.
pub trait WatchProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after a chunk was appended to the output file.
    fn chunk_written(&self, position: u64, total_bytes: u64);
    /// Called before sleeping until the next poll.
    fn waiting(&self, interval: Duration);
    /// Called when polling stops.
    fn done(&self, summary: &WatchSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl WatchProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn chunk_written(&self, _position: u64, _total_bytes: u64) {}
    fn waiting(&self, _interval: Duration) {}
    fn done(&self, _summary: &WatchSummary) {}
}

/// Poll the build log until it is archived or contains the target marker.
///
/// Fetch failures are retried per [`PollConfig`]; a failure that survives
/// the retries aborts the run. Chunks already written stay in the file.
#[instrument(skip_all, fields(app = %config.app_slug, build = %config.build_slug))]
pub async fn watch_build(
    config: &WatchConfig,
    client: &BitriseClient,
    progress: &dyn WatchProgress,
) -> Result<WatchSummary> {
    if config.app_slug.is_empty() || config.build_slug.is_empty() {
        return Err(BuildTailError::validation(
            "both an app slug and a build slug are required",
        ));
    }

    let run_id = RunId::new();
    let started_at = Utc::now();
    let marker = config.poll.target_marker.as_str();

    info!(
        %run_id,
        output = %config.output_file.display(),
        interval_secs = config.poll.interval.as_secs(),
        "starting to fetch build logs"
    );

    progress.phase("Preparing output file");
    let mut writer = LogWriter::create(&config.output_file)?;

    let mut position: u64 = 0;
    let mut polls: u32 = 0;
    let mut chunks_written: usize = 0;

    progress.phase("Fetching build logs");
    let stop_reason = loop {
        let response = fetch_with_retry(client, config, position).await?;
        polls += 1;

        let mut target_found = false;
        for chunk in &response.log_chunks {
            if !chunk.chunk.is_empty() {
                writer.append(&chunk.chunk)?;
                chunks_written += 1;
            }
            position = position.max(chunk.position);

            // An empty marker would match every chunk; treat it as disabled.
            if !marker.is_empty() && chunk.chunk.contains(marker) {
                info!(position = chunk.position, "found target message");
                target_found = true;
            }
        }
        if !response.log_chunks.is_empty() {
            progress.chunk_written(position, writer.bytes_written());
        }

        if target_found {
            break StopReason::TargetFound;
        }
        if response.is_archived {
            break StopReason::Archived;
        }

        debug!(position, "build still running");
        progress.waiting(config.poll.interval);
        tokio::time::sleep(config.poll.interval).await;
    };

    let summary = WatchSummary {
        run_id,
        app_slug: config.app_slug.clone(),
        build_slug: config.build_slug.clone(),
        polls,
        chunks_written,
        bytes_written: writer.bytes_written(),
        last_position: position,
        stop_reason,
        started_at,
        finished_at: Utc::now(),
    };

    info!(
        reason = %stop_reason,
        polls,
        chunks = chunks_written,
        bytes = summary.bytes_written,
        "log collection finished"
    );
    progress.done(&summary);

    Ok(summary)
}

/// One poll, retrying transient failures with doubling backoff.
async fn fetch_with_retry(
    client: &BitriseClient,
    config: &WatchConfig,
    position: u64,
) -> Result<LogResponse> {
    let mut attempt: u32 = 0;
    let mut delay = config.poll.retry_backoff;

    loop {
        match client
            .fetch_log_chunk(&config.app_slug, &config.build_slug, position)
            .await
        {
            Ok(response) => return Ok(response),
            Err(e) if e.is_transient() && attempt < config.poll.max_fetch_retries => {
                attempt += 1;
                warn!(
                    attempt,
                    max = config.poll.max_fetch_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "log fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use buildtail_client::ClientOptions;
    use buildtail_shared::DEFAULT_TARGET_MARKER;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOG_PATH: &str = "/apps/app1/builds/b1/log";

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bt-watch-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn client_for(server: &MockServer) -> BitriseClient {
        BitriseClient::new(&ClientOptions {
            base_url: server.uri(),
            token: "secret".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn watch_config(output_file: PathBuf) -> WatchConfig {
        WatchConfig {
            app_slug: "app1".into(),
            build_slug: "b1".into(),
            output_file,
            poll: PollConfig {
                interval: Duration::ZERO,
                target_marker: DEFAULT_TARGET_MARKER.into(),
                max_fetch_retries: 2,
                retry_backoff: Duration::from_millis(1),
            },
        }
    }

    fn log_body(chunks: &[(&str, u64)], archived: bool) -> String {
        let chunks: Vec<serde_json::Value> = chunks
            .iter()
            .map(|(text, pos)| serde_json::json!({ "chunk": text, "position": pos }))
            .collect();
        serde_json::json!({ "log_chunks": chunks, "is_archived": archived }).to_string()
    }

    #[tokio::test]
    async fn polls_until_archived() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(LOG_PATH))
            .and(query_param_is_missing("from"))
            .respond_with(ResponseTemplate::new(200).set_body_string(log_body(
                &[("| (0) Build |\n", 1), ("compiling\n", 2)],
                false,
            )))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(LOG_PATH))
            .and(query_param("from", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(log_body(&[("", 2), ("done\n", 3)], true)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tmp = temp_dir();
        let out = tmp.join("build.log");
        let summary = watch_build(&watch_config(out.clone()), &client_for(&server), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::Archived);
        assert_eq!(summary.polls, 2);
        assert_eq!(summary.chunks_written, 3);
        assert_eq!(summary.last_position, 3);
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "| (0) Build |\ncompiling\ndone\n"
        );
        assert_eq!(summary.bytes_written, 29);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn stops_at_target_marker() {
        let server = MockServer::start().await;
        let marker_line = format!("echo {DEFAULT_TARGET_MARKER}\n");

        Mock::given(method("GET"))
            .and(path(LOG_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(log_body(&[("step output\n", 1), (marker_line.as_str(), 2)], false)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tmp = temp_dir();
        let out = tmp.join("build.log");
        std::fs::write(&out, "left over from a previous run\n").unwrap();

        let summary = watch_build(&watch_config(out.clone()), &client_for(&server), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::TargetFound);
        assert_eq!(summary.polls, 1);
        let written = std::fs::read_to_string(&out).unwrap();
        assert!(!written.contains("previous run"));
        assert!(written.ends_with(&marker_line));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(LOG_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(LOG_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(log_body(&[("ok\n", 1)], true)))
            .mount(&server)
            .await;

        let tmp = temp_dir();
        let out = tmp.join("build.log");
        let summary = watch_build(&watch_config(out.clone()), &client_for(&server), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::Archived);
        assert_eq!(summary.polls, 1);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "ok\n");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn client_errors_abort_without_retry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(LOG_PATH))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = temp_dir();
        let err = watch_build(
            &watch_config(tmp.join("build.log")),
            &client_for(&server),
            &SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BuildTailError::Api { status: 404, .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(LOG_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let tmp = temp_dir();
        let err = watch_build(
            &watch_config(tmp.join("build.log")),
            &client_for(&server),
            &SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(err.is_transient());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn missing_slugs_are_rejected() {
        let server = MockServer::start().await;
        let tmp = temp_dir();
        let mut config = watch_config(tmp.join("build.log"));
        config.build_slug.clear();

        let err = watch_build(&config, &client_for(&server), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildTailError::Validation { .. }));
        assert!(!tmp.join("build.log").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
