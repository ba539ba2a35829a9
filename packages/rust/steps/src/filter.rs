//! Keyword windowing over a single step's log.

use std::collections::HashSet;

use crate::patterns::PatternTable;

/// Lines of lead-in kept before a matching line.
const CONTEXT_BEFORE: usize = 2;

/// Lines of trail kept after a matching line.
const CONTEXT_AFTER: usize = 3;

/// Reduce `body` to the lines around keyword hits for `step_type`.
///
/// Returns `body` unchanged when the type has no keywords or nothing matched.
pub fn filter_step(body: &str, step_type: &str, table: &PatternTable) -> String {
    let keywords = table.keywords_for(step_type);
    if keywords.is_empty() {
        return body.to_string();
    }
    filter_lines(body, keywords)
}

/// Keep a window of lines around every line containing any of `keywords`.
///
/// Windows are merged in original order and a line's exact text is emitted
/// at most once across all windows. Falls back to `body` if nothing matched.
pub fn filter_lines(body: &str, keywords: &[String]) -> String {
    let lines: Vec<&str> = body.split('\n').collect();
    let mut kept: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for (i, line) in lines.iter().enumerate() {
        // The window depends only on the line, not on which keyword hit.
        if !keywords.iter().any(|kw| line.contains(kw.as_str())) {
            continue;
        }

        let start = i.saturating_sub(CONTEXT_BEFORE);
        let end = (i + CONTEXT_AFTER + 1).min(lines.len());
        for &candidate in &lines[start..end] {
            if seen.insert(candidate) {
                kept.push(candidate);
            }
        }
    }

    if kept.is_empty() {
        return body.to_string();
    }
    kept.join("\n")
}
