//! Splits a raw build log into step records.
//!
//! Bitrise frames every step with a header box:
//!
//! ```text
//! +------------------------------------------------------------------------------+
//! | (0) Git Clone Repository                                                     |
//! +------------------------------------------------------------------------------+
//! ```
//!
//! A step starts at its title line and runs until the next title line.
//! Anything before the first title line has no step to belong to and is dropped.

use crate::inject::{FailedStep, inject_failed_step_context};

/// Separator fragment drawn by the step header box.
const BOX_EDGE: &str = "+----";

/// Marks the `(N) ` step-number prefix of a title.
const NUMBER_SUFFIX: &str = ") ";

/// `) ` further in than this is part of the title, not the step-number prefix.
const MAX_NUMBER_PREFIX_LEN: usize = 10;

/// One logical step of a build log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Step title without the `(N)` prefix; may be empty.
    pub title: String,
    /// Every line of the step, title line first, each terminated by `\n`.
    pub body: String,
}

impl StepRecord {
    fn open(title_line: &str) -> Self {
        let mut body = String::with_capacity(title_line.len() + 1);
        body.push_str(title_line);
        body.push('\n');
        Self {
            title: extract_title(title_line),
            body,
        }
    }

    fn push_line(&mut self, line: &str) {
        self.body.push_str(line);
        self.body.push('\n');
    }
}

/// Whether `line` looks like part of a step header box.
pub fn is_boundary_line(line: &str) -> bool {
    line.contains(BOX_EDGE) && line.contains('|')
}

/// Whether `line` opens a new step.
///
/// Either a boundary line carrying a `) ` marker, or a framed header row such
/// as `| (0) Git Clone Repository |`.
pub fn is_title_line(line: &str) -> bool {
    (is_boundary_line(line) && line.contains(NUMBER_SUFFIX)) || is_framed_header(line)
}

fn is_framed_header(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.len() < 2 || !trimmed.starts_with('|') || !trimmed.ends_with('|') {
        return false;
    }
    let inner = trimmed[1..trimmed.len() - 1].trim();
    inner.starts_with('(') && inner.contains(NUMBER_SUFFIX)
}

/// Extract the step title from a header line like `| (0) Git Clone |`.
pub fn extract_title(line: &str) -> String {
    let Some(segment) = line.split('|').nth(1) else {
        return String::new();
    };
    let segment = segment.trim();

    match segment.find(NUMBER_SUFFIX) {
        Some(idx) if idx < MAX_NUMBER_PREFIX_LEN => {
            segment[idx + NUMBER_SUFFIX.len()..].trim().to_string()
        }
        _ => segment.to_string(),
    }
}

/// Split `raw_log` into steps without touching their bodies.
pub fn split_steps(raw_log: &str) -> Vec<StepRecord> {
    let mut steps = Vec::new();
    let mut current: Option<StepRecord> = None;

    // `split` rather than `lines`: a trailing newline leaves one empty line
    // on the last step, and reassembly relies on that.
    for line in raw_log.split('\n') {
        if is_title_line(line) {
            if let Some(step) = current.take() {
                steps.push(step);
            }
            current = Some(StepRecord::open(line));
        } else if let Some(step) = current.as_mut() {
            step.push_line(line);
        }
    }

    steps.extend(current);
    steps
}

/// Split `raw_log` into steps and attach the failed step's error message.
pub fn segment(raw_log: &str, failed: &FailedStep) -> Vec<StepRecord> {
    inject_failed_step_context(split_steps(raw_log), failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOXED_LOG: &str = "\
Build started
+------------------------------------------------------------------------------+
| (0) Git Clone Repository                                                     |
+------------------------------------------------------------------------------+
| id: git-clone                                                                |
cloning into /bitrise/src
+------------------------------------------------------------------------------+
| (1) Xcode Test for iOS                                                       |
+------------------------------------------------------------------------------+
Test Suite 'All tests' failed
";

    fn titles(steps: &[StepRecord]) -> Vec<&str> {
        steps.iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn no_markers_yields_no_steps() {
        let steps = split_steps("just some output\nand more output\n");
        assert!(steps.is_empty());
    }

    #[test]
    fn empty_log_yields_no_steps() {
        assert!(split_steps("").is_empty());
    }

    #[test]
    fn framed_headers_open_steps() {
        let steps = split_steps("| (0) Build |\nline1\n| (1) Test |\nline2\n");
        assert_eq!(titles(&steps), vec!["Build", "Test"]);
        assert!(steps[0].body.starts_with("| (0) Build |\n"));
        assert!(steps[1].body.starts_with("| (1) Test |\n"));
        assert_eq!(steps[0].body, "| (0) Build |\nline1\n");
        assert_eq!(steps[1].body, "| (1) Test |\nline2\n\n");
    }

    #[test]
    fn boundary_line_with_number_marker_opens_step() {
        let steps = split_steps("+---- | (3) Deploy | ----+\nuploading\n");
        assert_eq!(titles(&steps), vec!["Deploy"]);
    }

    #[test]
    fn boxed_log_segments_and_drops_preamble() {
        let steps = split_steps(BOXED_LOG);
        assert_eq!(titles(&steps), vec!["Git Clone Repository", "Xcode Test for iOS"]);
        assert!(!steps[0].body.contains("Build started"));
        // Box edges and detail rows stay with their step.
        assert!(steps[0].body.contains("| id: git-clone"));
        assert!(steps[0].body.trim_end().ends_with("+"));
        assert!(steps[1].body.contains("Test Suite 'All tests' failed"));
    }

    #[test]
    fn every_line_after_first_title_is_kept() {
        let steps = split_steps(BOXED_LOG);
        let rebuilt: String = steps.iter().map(|s| s.body.as_str()).collect();
        let first_title = BOXED_LOG.find("| (0)").unwrap();
        assert_eq!(rebuilt, format!("{}\n", &BOXED_LOG[first_title..]));
    }

    #[test]
    fn detail_rows_do_not_open_steps() {
        assert!(!is_title_line("| id: git-clone |"));
        assert!(!is_title_line("| Exit code: 1 (see above) for details |"));
        assert!(!is_title_line("|"));
        assert!(is_boundary_line("+-------+ |"));
        assert!(!is_boundary_line("+------------------+"));
    }

    #[test]
    fn extract_title_strips_step_number() {
        assert_eq!(
            extract_title("| (0) Git Clone Repository                |"),
            "Git Clone Repository"
        );
        assert_eq!(extract_title("| (12) Deploy to Bitrise.io |"), "Deploy to Bitrise.io");
    }

    #[test]
    fn extract_title_ignores_late_marker() {
        assert_eq!(
            extract_title("| Averyveryverylongword) tail |"),
            "Averyveryverylongword) tail"
        );
    }

    #[test]
    fn extract_title_without_pipe_is_empty() {
        assert_eq!(extract_title("no pipes here"), "");
    }

    #[test]
    fn reassembled_steps_resegment_to_same_titles() {
        let steps = split_steps(BOXED_LOG);
        let joined = steps
            .iter()
            .map(|s| s.body.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let again = split_steps(&joined);
        assert_eq!(titles(&again), titles(&steps));
    }

    #[test]
    fn segment_applies_failed_step_context() {
        let failed = FailedStep::new("xcode test", "exit status 65");
        let steps = segment(BOXED_LOG, &failed);
        assert!(steps[1].body.starts_with("=== FAILED STEP ERROR MESSAGE ===\n"));
        assert!(!steps[0].body.contains("exit status 65"));
    }
}
