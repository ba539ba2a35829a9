//! Step-type pattern table and title classification.
//!
//! The table is flat text, one step type per line:
//!
//! ```text
//! xcode: error:, warning:, ** BUILD FAILED **
//! test: FAILED, Assertion
//! ```
//!
//! Lines without a `:` are ignored.

/// One `type: kw1, kw2` line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PatternEntry {
    step_type: String,
    keywords: Vec<String>,
    /// The type name is immediately followed by `:` (no inner whitespace),
    /// so a `"{type}:"` prefix lookup can find this line.
    keyed: bool,
}

/// Parsed pattern table, in the order lines appear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternTable {
    entries: Vec<PatternEntry>,
}

impl PatternTable {
    /// Parse the flat `type: kw1, kw2` text. Never fails; malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .split('\n')
            .filter_map(|line| {
                let (left, right) = line.split_once(':')?;
                let step_type = left.trim();
                let keywords = right
                    .trim()
                    .split(',')
                    .map(str::trim)
                    .filter(|kw| !kw.is_empty())
                    .map(String::from)
                    .collect();
                Some(PatternEntry {
                    step_type: step_type.to_string(),
                    keywords,
                    keyed: left.trim_start() == step_type,
                })
            })
            .collect();

        Self { entries }
    }

    /// Map a step title to the first step type (table order) it contains.
    ///
    /// The title is lower-cased; type names are matched as-is, so they should
    /// be written in lower case. First match wins even if a later type is a
    /// longer match.
    pub fn classify(&self, title: &str) -> Option<&str> {
        if title.is_empty() {
            return None;
        }
        let title = title.to_lowercase();

        // An empty type name matches everything and means "no type".
        self.entries
            .iter()
            .find(|e| title.contains(e.step_type.as_str()))
            .map(|e| e.step_type.as_str())
            .filter(|t| !t.is_empty())
    }

    /// Keywords of the first line that starts with `"{step_type}:"`.
    ///
    /// Empty when no such line exists or it lists no keywords.
    pub fn keywords_for(&self, step_type: &str) -> &[String] {
        self.entries
            .iter()
            .find(|e| e.keyed && e.step_type == step_type)
            .map(|e| e.keywords.as_slice())
            .unwrap_or_default()
    }
}
