//! Watch-and-process orchestration for buildtail.
//!
//! This crate ties the API client, the output files, and the step pipeline
//! together into end-to-end workflows (e.g., [`watch::watch_build`]).

pub mod output;
pub mod watch;

pub use output::{LogWriter, optimize_output_file, save_workflow_context, write_summary};
pub use watch::{SilentProgress, WatchConfig, WatchProgress, watch_build};
