//! Build log post-processing.
//!
//! Splits an accumulated CI log into steps, attaches the failed step's error
//! message, and trims classified steps down to keyword windows so the result
//! is small enough for failure diagnosis. Everything here is pure: string in,
//! string out, no I/O and no errors.

pub mod filter;
pub mod inject;
pub mod patterns;
pub mod pipeline;
pub mod segment;

pub use filter::{filter_lines, filter_step};
pub use inject::{FailedStep, format_context_block, inject_failed_step_context};
pub use patterns::PatternTable;
pub use pipeline::{focus_failed_step, process, reassemble};
pub use segment::{StepRecord, extract_title, is_boundary_line, is_title_line, segment, split_steps};
