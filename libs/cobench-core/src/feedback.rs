/// Feedback Composer - Bounded, Deterministic Diagnostic Text
///
/// Renders one short line per case and joins partition lines in the
/// problem's declared case order. Failure messages are truncated to
/// the first `feedback_length` characters, so identical failures
/// always truncate identically and no single case can overflow its
/// bound however long the overall text grows.
use std::collections::{BTreeMap, HashMap};

use crate::types::{CaseOutcome, CaseReport};

/// Keep the first `max_chars` characters. Char-based so multibyte
/// text never splits inside a code point.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// One line per case: id plus score, TIMEOUT, or a bounded error.
pub fn case_line(
    id: &str,
    outcome: &CaseOutcome,
    report: &CaseReport,
    feedback_length: usize,
) -> String {
    match outcome {
        CaseOutcome::Success { .. } => format!("{}: score={:.6}", id, report.primary()),
        CaseOutcome::Timeout => format!("{}: TIMEOUT", id),
        CaseOutcome::InvalidOutput { .. } | CaseOutcome::RuntimeFailure { .. } => {
            let message = report.error.as_deref().unwrap_or("unknown failure");
            format!("{}: ERROR - {}", id, truncate(message, feedback_length))
        }
    }
}

/// Partition feedback text: the partition's case lines joined by
/// newlines, in the order `ids` was given (the problem's case order).
pub fn compose(
    ids: &[String],
    outcomes: &HashMap<String, CaseOutcome>,
    reports: &BTreeMap<String, CaseReport>,
    feedback_length: usize,
) -> String {
    ids.iter()
        .filter_map(|id| {
            let outcome = outcomes.get(id)?;
            let report = reports.get(id)?;
            Some(case_line(id, outcome, report, feedback_length))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
