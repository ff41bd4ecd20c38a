/// Scoring - Normalization and Dev/Test Partitioning
///
/// Pure functions: (outcomes, problem config) -> normalized reports
/// and partition aggregates. Knows nothing about process execution.
///
/// **Scoring Rules:**
/// - A successful case maps its raw score and raw time through the
///   problem's `norm_score` / `norm_time` transforms.
/// - Any failure contributes the sentinel score `0.0` and keeps its
///   reason, bounded to `feedback_length` characters.
/// - Partition scores are unweighted means; an empty partition scores
///   `0.0` rather than faulting.
/// - The reported overall score is the test-partition score: dev is
///   for iterative tuning, test is the held-out judge.
use std::collections::BTreeMap;

use crate::feedback::truncate;
use crate::types::{CaseOutcome, CaseReport, Problem};

/// Normalized score recorded for every non-success outcome.
pub const FAILURE_SCORE: f64 = 0.0;

/// Map one terminal outcome to its normalized per-case record.
pub fn normalize(outcome: &CaseOutcome, problem: &Problem, feedback_length: usize) -> CaseReport {
    match outcome {
        CaseOutcome::Success {
            raw_score,
            raw_time,
            ..
        } => CaseReport {
            scores: vec![
                (problem.norm_score)(*raw_score),
                (problem.norm_time)(*raw_time),
            ],
            error: None,
        },
        CaseOutcome::InvalidOutput { reason } => failure_report(
            truncate(&format!("invalid output: {}", reason), feedback_length),
        ),
        CaseOutcome::RuntimeFailure { message } => {
            failure_report(truncate(message, feedback_length))
        }
        CaseOutcome::Timeout => failure_report(truncate("execution timed out", feedback_length)),
    }
}

fn failure_report(error: String) -> CaseReport {
    CaseReport {
        scores: vec![FAILURE_SCORE],
        error: Some(error),
    }
}

/// Split the configured case ids into (dev, test), preserving the
/// problem's declared order within each partition. Cases named by
/// `get_dev` are dev, everything else is test; a problem with no dev
/// declaration puts every case in test.
pub fn partition(problem: &Problem) -> (Vec<String>, Vec<String>) {
    let dev_set = (problem.get_dev)();
    let mut dev = Vec::new();
    let mut test = Vec::new();
    for case in &problem.cases {
        let is_dev = dev_set
            .as_ref()
            .map(|set| set.contains(&case.id))
            .unwrap_or(false);
        if is_dev {
            dev.push(case.id.clone());
        } else {
            test.push(case.id.clone());
        }
    }
    (dev, test)
}

/// Unweighted mean of the partition's primary scores. Empty partition
/// scores `0.0`.
pub fn mean_score(ids: &[String], reports: &BTreeMap<String, CaseReport>) -> f64 {
    if ids.is_empty() {
        return 0.0;
    }
    let total: f64 = ids
        .iter()
        .map(|id| reports.get(id).map(CaseReport::primary).unwrap_or(0.0))
        .sum();
    total / ids.len() as f64
}
