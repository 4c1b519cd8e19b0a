use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Parsed model output for one grading pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct FeedbackResult {
    pub(crate) submission_id: String,
    pub(crate) raw_response: String,
    pub(crate) errors: BTreeMap<usize, String>,
    pub(crate) feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct ParsedFeedback {
    pub(crate) errors: BTreeMap<usize, String>,
    pub(crate) feedback: String,
}

fn error_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+):\s*(.*)").expect("static error line pattern"))
}

/// Splits a model response into its leading `N: message` block and the prose after it.
///
/// Lines are consumed until the first blank one. Consumed lines that do not look like
/// `N: message` are dropped. When no error line is recognised the whole response is
/// returned as feedback.
pub(crate) fn parse(response: &str) -> ParsedFeedback {
    let mut errors = BTreeMap::new();
    let mut lines = response.lines();
    let mut consumed = 0usize;

    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        consumed += 1;

        let Some(captures) = error_line_pattern().captures(line) else {
            continue;
        };
        let Ok(line_number) = captures[1].parse::<usize>() else {
            continue;
        };
        errors.insert(line_number, captures[2].trim().to_string());
    }

    if errors.is_empty() {
        return ParsedFeedback { errors, feedback: response.to_string() };
    }

    tracing::debug!(consumed, recognised = errors.len(), "Parsed error lines from response");
    let remainder = lines.collect::<Vec<_>>().join("\n");
    ParsedFeedback { errors, feedback: remainder.trim().to_string() }
}
