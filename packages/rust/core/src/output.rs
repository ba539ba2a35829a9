//! Output files: the accumulated log, its optimized form, the workflow
//! definition, and the run summary.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use buildtail_client::BitriseClient;
use buildtail_shared::{BuildTailError, ProcessConfig, Result, WatchSummary};

/// File name the workflow definition is saved under.
pub const WORKFLOW_FILE_NAME: &str = "bitrise.yml";

// ---------------------------------------------------------------------------
// LogWriter
// ---------------------------------------------------------------------------

/// Append-only writer for the accumulated build log.
#[derive(Debug)]
pub struct LogWriter {
    path: PathBuf,
    file: File,
    bytes_written: u64,
}

impl LogWriter {
    /// Create (or truncate) the log file, creating parent directories.
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent_dir(path)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| BuildTailError::io(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            bytes_written: 0,
        })
    }

    /// Append a chunk exactly as received.
    pub fn append(&mut self, chunk: &str) -> Result<()> {
        self.file
            .write_all(chunk.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|e| BuildTailError::io(&self.path, e))?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

// ---------------------------------------------------------------------------
// Post-processing and side files
// ---------------------------------------------------------------------------

/// Run the step pipeline over `input` and write the result to `output`.
///
/// Returns the number of bytes written.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn optimize_output_file(input: &Path, output: &Path, config: &ProcessConfig) -> Result<usize> {
    let raw = std::fs::read_to_string(input).map_err(|e| BuildTailError::io(input, e))?;
    let optimized = buildtail_steps::process(&raw, config);

    write_file(output, optimized.as_bytes())?;
    info!(
        raw_bytes = raw.len(),
        optimized_bytes = optimized.len(),
        "optimized log written"
    );

    Ok(optimized.len())
}

/// Fetch the app's `bitrise.yml` and save it into `dir`.
#[instrument(skip_all, fields(app = app_slug, dir = %dir.display()))]
pub async fn save_workflow_context(
    client: &BitriseClient,
    app_slug: &str,
    dir: &Path,
) -> Result<PathBuf> {
    let yaml = client.fetch_workflow_yaml(app_slug).await?;

    std::fs::create_dir_all(dir).map_err(|e| BuildTailError::io(dir, e))?;
    let path = dir.join(WORKFLOW_FILE_NAME);
    write_file(&path, yaml.as_bytes())?;

    info!(path = %path.display(), "saved workflow context");
    Ok(path)
}

/// Write a run summary as pretty JSON.
pub fn write_summary(summary: &WatchSummary, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| BuildTailError::parse(format!("failed to serialize summary: {e}")))?;
    write_file(path, json.as_bytes())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    std::fs::write(path, contents).map_err(|e| BuildTailError::io(path, e))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| BuildTailError::io(parent, e))
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
