/// Evaluator Facade - One Candidate In, One Feedback Out
///
/// **Responsibility:**
/// Coordinate the execution engine, dispatcher, scoring, and feedback
/// composer behind the single `evaluate` contract.
///
/// This module is the glue layer - it knows nothing about:
/// - How candidates execute (engine's job)
/// - How raw scores normalize (scoring's job)
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dispatch;
use crate::engine::ExecutionEngine;
use crate::error::EvalError;
use crate::feedback;
use crate::scoring;
use crate::types::{CaseOutcome, CaseReport, Feedback, Problem};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_FEEDBACK_LENGTH: usize = 64;

/// Incremental progress from `evaluate_stream`: one event per
/// completed case in completion order, then the final aggregate.
#[derive(Debug, Clone)]
pub enum EvalEvent {
    Case { id: String, report: CaseReport },
    Finished(Feedback),
}

#[derive(Clone)]
pub struct Evaluator {
    problem: Arc<Problem>,
    engine: Arc<dyn ExecutionEngine>,
    timeout: Duration,
    workers: usize,
    feedback_length: usize,
}

impl Evaluator {
    pub fn new(problem: Problem, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            problem: Arc::new(problem),
            engine,
            timeout: DEFAULT_TIMEOUT,
            workers: dispatch::default_workers(),
            feedback_length: DEFAULT_FEEDBACK_LENGTH,
        }
    }

    /// Wall-clock budget per case.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bound on concurrently active execution units.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Per-case bound on diagnostic text, in characters.
    pub fn with_feedback_length(mut self, feedback_length: usize) -> Self {
        self.feedback_length = feedback_length;
        self
    }

    /// Evaluate one candidate against every configured case. Blocks
    /// until all cases have a terminal outcome. The only hard failure
    /// is a candidate that does not load; everything else comes back
    /// inside the `Feedback`.
    pub async fn evaluate(&self, code: &str) -> Result<Feedback, EvalError> {
        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            problem = %self.problem.name,
            cases = self.problem.cases.len(),
            workers = self.workers,
            "starting evaluation"
        );

        let loaded = Arc::new(self.engine.load(code).await?);
        let outcomes = dispatch::run_cases(
            self.engine.clone(),
            loaded,
            self.problem.cases.clone(),
            self.timeout,
            self.workers,
        )
        .await;

        let feedback = self.assemble(&outcomes);
        info!(
            run_id = %run_id,
            score = feedback.score,
            dev_score = feedback.dev_score,
            test_score = feedback.test_score,
            "evaluation complete"
        );
        Ok(feedback)
    }

    /// Same computation as `evaluate`, delivered incrementally. The
    /// load step still happens up front, so `LoadError` surfaces here
    /// rather than inside the stream.
    pub async fn evaluate_stream(
        &self,
        code: &str,
    ) -> Result<ReceiverStream<EvalEvent>, EvalError> {
        let loaded = Arc::new(self.engine.load(code).await?);
        let (tx, rx) = mpsc::channel(16);
        let this = self.clone();

        tokio::spawn(async move {
            let mut outcomes = HashMap::new();
            let mut stream = dispatch::case_stream(
                this.engine.clone(),
                loaded,
                this.problem.cases.clone(),
                this.timeout,
                this.workers,
            );
            while let Some((id, outcome)) = stream.next().await {
                let report = scoring::normalize(&outcome, &this.problem, this.feedback_length);
                debug!(case = %id, score = report.primary(), "case finished");
                outcomes.insert(id.clone(), outcome);
                if tx.send(EvalEvent::Case { id, report }).await.is_err() {
                    // Receiver gone; nothing left to report to.
                    return;
                }
            }
            let feedback = this.assemble(&outcomes);
            let _ = tx.send(EvalEvent::Finished(feedback)).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    fn assemble(&self, outcomes: &HashMap<String, CaseOutcome>) -> Feedback {
        let mut reports = BTreeMap::new();
        let mut resolved = HashMap::new();
        for case in &self.problem.cases {
            let outcome = outcomes.get(&case.id).cloned().unwrap_or_else(|| {
                CaseOutcome::RuntimeFailure {
                    message: "case produced no result".to_string(),
                }
            });
            let report = scoring::normalize(&outcome, &self.problem, self.feedback_length);
            reports.insert(case.id.clone(), report);
            resolved.insert(case.id.clone(), outcome);
        }

        let (dev_ids, test_ids) = scoring::partition(&self.problem);
        let dev_score = scoring::mean_score(&dev_ids, &reports);
        let test_score = scoring::mean_score(&test_ids, &reports);
        let dev_feedback = feedback::compose(&dev_ids, &resolved, &reports, self.feedback_length);
        let test_feedback = feedback::compose(&test_ids, &resolved, &reports, self.feedback_length);

        Feedback {
            score: test_score,
            dev_score,
            test_score,
            dev_feedback,
            test_feedback,
            results: reports,
        }
    }
}
