use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Problem-supplied transform mapping a raw score or time onto a
/// comparable scale across problem domains.
pub type ScoreFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Problem-supplied dev-partition membership. `None` means the problem
/// declares no dev split and every case belongs to the test partition.
pub type DevFn = Arc<dyn Fn() -> Option<HashSet<String>> + Send + Sync>;

/// One problem instance: opaque identifier plus externally-loaded
/// input payload. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub payload: Value,
}

impl TestCase {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// Immutable problem configuration, owned by the config-loading
/// collaborator. The evaluator only reads it.
#[derive(Clone)]
pub struct Problem {
    pub name: String,
    pub description: String,
    pub solve_template: String,
    /// Ordered list of test cases; feedback text follows this order.
    pub cases: Vec<TestCase>,
    pub norm_score: ScoreFn,
    pub norm_time: ScoreFn,
    pub get_dev: DevFn,
}

impl Problem {
    /// Create a problem with identity normalization and no dev split.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            solve_template: String::new(),
            cases: Vec::new(),
            norm_score: Arc::new(|x| x),
            norm_time: Arc::new(|x| x),
            get_dev: Arc::new(|| None),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_solve_template(mut self, template: impl Into<String>) -> Self {
        self.solve_template = template.into();
        self
    }

    pub fn with_cases(mut self, cases: Vec<TestCase>) -> Self {
        self.cases = cases;
        self
    }

    pub fn with_norm_score(mut self, f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        self.norm_score = Arc::new(f);
        self
    }

    pub fn with_norm_time(mut self, f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        self.norm_time = Arc::new(f);
        self
    }

    pub fn with_get_dev(
        mut self,
        f: impl Fn() -> Option<HashSet<String>> + Send + Sync + 'static,
    ) -> Self {
        self.get_dev = Arc::new(f);
        self
    }

    /// Convenience for the common fixed-list dev split.
    pub fn with_dev_cases(self, ids: impl IntoIterator<Item = String>) -> Self {
        let set: HashSet<String> = ids.into_iter().collect();
        self.with_get_dev(move || Some(set.clone()))
    }
}

impl fmt::Debug for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem")
            .field("name", &self.name)
            .field("cases", &self.cases.len())
            .finish()
    }
}

/// Terminal outcome of running the candidate against one test case.
/// Produced exactly once per case per evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseOutcome {
    Success {
        raw_score: f64,
        raw_time: f64,
        raw_output: String,
    },
    /// Candidate returned a value that failed the problem's validity check.
    InvalidOutput { reason: String },
    /// Candidate raised, crashed, or produced no parseable result.
    RuntimeFailure { message: String },
    /// Candidate exceeded its wall-clock budget and was killed.
    Timeout,
}

/// Normalized per-case record. `scores[0]` drives aggregation; a
/// successful case also carries the normalized time as `scores[1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub scores: Vec<f64>,
    pub error: Option<String>,
}

impl CaseReport {
    /// The score used for partition aggregation.
    pub fn primary(&self) -> f64 {
        self.scores.first().copied().unwrap_or(0.0)
    }
}

/// Aggregate result of one evaluation call. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    /// Reported overall score. Policy: the held-out test-partition
    /// score; dev exists for iterative tuning.
    pub score: f64,
    pub dev_score: f64,
    pub test_score: f64,
    pub dev_feedback: String,
    pub test_feedback: String,
    /// Every configured case id appears exactly once, success or not.
    pub results: BTreeMap<String, CaseReport>,
}
