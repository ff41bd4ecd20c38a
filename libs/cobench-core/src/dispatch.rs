/// Work Dispatcher - Bounded Fan-Out Over Isolated Runners
///
/// Runs every case exactly once with at most `workers` execution units
/// active at a time. Cases are independent: completion order is
/// unspecified, one case's failure or timeout never cancels siblings,
/// and results stay keyed by case id so attribution survives any
/// completion order.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream, StreamExt};

use crate::engine::{ExecutionEngine, LoadedCandidate};
use crate::types::{CaseOutcome, TestCase};

/// Platform-derived concurrency level used when the caller does not
/// pin a worker count.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Stream of `(case_id, outcome)` pairs in completion order.
pub fn case_stream(
    engine: Arc<dyn ExecutionEngine>,
    loaded: Arc<LoadedCandidate>,
    cases: Vec<TestCase>,
    timeout: Duration,
    workers: usize,
) -> impl Stream<Item = (String, CaseOutcome)> + Send {
    stream::iter(cases)
        .map(move |case| {
            let engine = engine.clone();
            let loaded = loaded.clone();
            async move {
                let outcome = engine.run_case(&loaded, &case, timeout).await;
                (case.id, outcome)
            }
        })
        .buffer_unordered(workers.max(1))
}

/// Full barrier: resolves only after every case has a terminal outcome.
pub async fn run_cases(
    engine: Arc<dyn ExecutionEngine>,
    loaded: Arc<LoadedCandidate>,
    cases: Vec<TestCase>,
    timeout: Duration,
    workers: usize,
) -> HashMap<String, CaseOutcome> {
    case_stream(engine, loaded, cases, timeout, workers)
        .collect()
        .await
}
