//! Attaches the failed step's error message to that step's log.

use buildtail_shared::ProcessConfig;
use tracing::debug;

use crate::segment::StepRecord;

const OPEN_MARKER: &str = "=== FAILED STEP ERROR MESSAGE ===";
const CLOSE_MARKER: &str = "=== END ERROR MESSAGE ===";

/// The step the CI reported as failed, with its error message.
///
/// Both fields are empty when the build did not fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailedStep {
    pub title: String,
    pub error_message: String,
}

impl FailedStep {
    pub fn new(title: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            error_message: error_message.into(),
        }
    }

    /// Case-insensitive substring match against a step title.
    pub fn matches(&self, step_title: &str) -> bool {
        step_title
            .to_lowercase()
            .contains(&self.title.to_lowercase())
    }
}

impl From<&ProcessConfig> for FailedStep {
    fn from(config: &ProcessConfig) -> Self {
        Self::new(&config.failed_step_title, &config.failed_step_error)
    }
}

/// Block prepended to the failed step's body.
pub fn format_context_block(error_message: &str) -> String {
    format!("{OPEN_MARKER}\n{error_message}\n{CLOSE_MARKER}\n\n")
}

/// Prepend the error block to the first step matching `failed`.
///
/// Returns `steps` unchanged when either field of `failed` is empty or no
/// step title matches.
pub fn inject_failed_step_context(
    mut steps: Vec<StepRecord>,
    failed: &FailedStep,
) -> Vec<StepRecord> {
    if failed.title.is_empty() || failed.error_message.is_empty() {
        return steps;
    }

    match steps.iter_mut().find(|step| failed.matches(&step.title)) {
        Some(step) => {
            debug!(step = %step.title, "attaching error message to failed step");
            step.body = format_context_block(&failed.error_message) + &step.body;
        }
        None => debug!(failed = %failed.title, "failed step not found in log"),
    }

    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(title: &str, body: &str) -> StepRecord {
        StepRecord {
            title: title.into(),
            body: body.into(),
        }
    }

    #[test]
    fn prepends_block_to_matching_step() {
        let steps = vec![
            step("Git Clone", "| (0) Git Clone |\n"),
            step("Xcode Test for iOS", "| (1) Xcode Test for iOS |\nboom\n"),
        ];
        let out = inject_failed_step_context(steps, &FailedStep::new("XCODE TEST", "exit 65"));
        assert_eq!(out[0].body, "| (0) Git Clone |\n");
        assert_eq!(
            out[1].body,
            "=== FAILED STEP ERROR MESSAGE ===\nexit 65\n=== END ERROR MESSAGE ===\n\n\
             | (1) Xcode Test for iOS |\nboom\n"
        );
    }

    #[test]
    fn only_first_match_is_touched() {
        let steps = vec![step("Deploy staging", "a\n"), step("Deploy prod", "b\n")];
        let out = inject_failed_step_context(steps, &FailedStep::new("deploy", "denied"));
        assert!(out[0].body.contains("denied"));
        assert_eq!(out[1].body, "b\n");
    }

    #[test]
    fn empty_message_is_noop() {
        let steps = vec![step("Build", "x\n")];
        let out = inject_failed_step_context(steps.clone(), &FailedStep::new("Build", ""));
        assert_eq!(out, steps);
    }

    #[test]
    fn empty_title_is_noop() {
        let steps = vec![step("Build", "x\n")];
        let out = inject_failed_step_context(steps.clone(), &FailedStep::new("", "oops"));
        assert_eq!(out, steps);
    }

    #[test]
    fn missing_step_is_noop() {
        let steps = vec![step("Build", "x\n")];
        let out = inject_failed_step_context(steps.clone(), &FailedStep::new("Archive", "oops"));
        assert_eq!(out, steps);
    }

    #[test]
    fn context_block_shape() {
        assert_eq!(
            format_context_block("line one"),
            "=== FAILED STEP ERROR MESSAGE ===\nline one\n=== END ERROR MESSAGE ===\n\n"
        );
    }
}
