//! End-to-end post-processing: raw log → steps → filtered text.

use std::borrow::Cow;

use buildtail_shared::ProcessConfig;
use tracing::{debug, info, instrument, warn};

use crate::filter::filter_step;
use crate::inject::FailedStep;
use crate::patterns::PatternTable;
use crate::segment::{StepRecord, segment};

/// Separator between steps when filtering is applied.
const FILTERED_SEPARATOR: &str = "\n\n";

/// Post-process an accumulated build log.
///
/// 1. Optionally narrow the log to the failed step
/// 2. Segment into steps, attaching the failed step's error message
/// 3. Classify each step and keep only keyword windows for classified steps
/// 4. Join the results back into one text
///
/// Never fails: every miss falls back to less reduction, never to less output.
#[instrument(skip_all, fields(log_len = raw_log.len()))]
pub fn process(raw_log: &str, config: &ProcessConfig) -> String {
    let failed = FailedStep::from(config);

    let scoped: Cow<'_, str> = if config.focus_failed_step_only && !failed.title.is_empty() {
        info!(failed = %failed.title, "focusing on failed step");
        focus_failed_step(raw_log, &failed)
    } else {
        Cow::Borrowed(raw_log)
    };

    let steps = segment(&scoped, &failed);
    debug!(steps = steps.len(), "log segmented");

    if !config.filtering_enabled {
        return reassemble(&steps);
    }

    if config.filter_patterns.is_empty() {
        warn!("filtering is enabled but no filter patterns are configured; returning unfiltered logs");
        return reassemble(&steps);
    }

    let table = PatternTable::parse(&config.filter_patterns);
    filter_steps(&steps, &table)
}

/// Body of the first step matching `failed`, or the whole log if none does.
pub fn focus_failed_step<'a>(raw_log: &'a str, failed: &FailedStep) -> Cow<'a, str> {
    let steps = segment(raw_log, failed);
    match steps.into_iter().find(|step| failed.matches(&step.title)) {
        Some(step) => Cow::Owned(step.body),
        None => {
            warn!(failed = %failed.title, "failed step not found, using full log");
            Cow::Borrowed(raw_log)
        }
    }
}

/// Join step bodies with one blank line between steps.
pub fn reassemble(steps: &[StepRecord]) -> String {
    steps
        .iter()
        .map(|step| step.body.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn filter_steps(steps: &[StepRecord], table: &PatternTable) -> String {
    steps
        .iter()
        .map(|step| match table.classify(&step.title) {
            Some(step_type) => {
                info!(step = %step.title, step_type, "applying step filter");
                filter_step(&step.body, step_type, table)
            }
            None => {
                debug!(step = %step.title, "no patterns for step, keeping full log");
                step.body.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(FILTERED_SEPARATOR)
}
