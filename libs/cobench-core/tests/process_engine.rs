//! Integration tests for the process-isolation engine, using the
//! POSIX shell toolchain so they run anywhere without extra runtimes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use cobench_core::error::LoadError;
use cobench_core::{
    CaseOutcome, Evaluator, ExecutionEngine, Problem, ProcessEngine, TestCase, Toolchain,
};

fn engine() -> ProcessEngine {
    ProcessEngine::new(Toolchain::shell())
}

fn case(id: &str) -> TestCase {
    TestCase::new(id, Value::String("payload".to_string()))
}

const OK_CANDIDATE: &str = r#"
solve() {
  read -r payload
  echo 'CASE_RESULT {"score": 2.0}'
}
solve
"#;

#[tokio::test]
async fn successful_case_reports_score_and_time() {
    let engine = engine();
    let loaded = engine.load(OK_CANDIDATE).await.unwrap();
    let outcome = engine
        .run_case(&loaded, &case("c1"), Duration::from_secs(10))
        .await;
    match outcome {
        CaseOutcome::Success {
            raw_score,
            raw_time,
            ..
        } => {
            assert_eq!(raw_score, 2.0);
            assert!(raw_time >= 0.0 && raw_time < 10.0);
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn candidate_diagnostics_survive_next_to_the_verdict() {
    let source = r#"
solve() {
  read -r payload
  echo "visiting 14 nodes"
  echo 'CASE_RESULT {"score": 7.5}'
}
solve
"#;
    let engine = engine();
    let loaded = engine.load(source).await.unwrap();
    let outcome = engine
        .run_case(&loaded, &case("c1"), Duration::from_secs(10))
        .await;
    match outcome {
        CaseOutcome::Success { raw_output, .. } => {
            assert_eq!(raw_output, "visiting 14 nodes");
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn verbose_candidate_still_succeeds_past_the_capture_cap() {
    // ~400KB of diagnostics before the verdict; the runner must keep
    // draining the pipe rather than let the writer die of SIGPIPE.
    let source = r#"
solve() {
  read -r payload
  i=0
  while [ $i -lt 4000 ]; do
    echo "relaxation pass $i: bound unchanged, pivoting on the densest remaining column of the tableau"
    i=$((i+1))
  done
  echo 'CASE_RESULT {"score": 5.0}'
}
solve
"#;
    let engine = engine();
    let loaded = engine.load(source).await.unwrap();
    let outcome = engine
        .run_case(&loaded, &case("c1"), Duration::from_secs(20))
        .await;
    match outcome {
        CaseOutcome::Success {
            raw_score,
            raw_output,
            ..
        } => {
            assert_eq!(raw_score, 5.0);
            // Diagnostics are bounded even though the verdict survived.
            assert!(raw_output.len() < 300 * 1024);
            assert!(raw_output.starts_with("relaxation pass 0"));
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn crashing_candidate_is_a_runtime_failure() {
    let source = r#"
solve() {
  read -r payload
  echo "solver exploded" >&2
  exit 3
}
solve
"#;
    let engine = engine();
    let loaded = engine.load(source).await.unwrap();
    let outcome = engine
        .run_case(&loaded, &case("c1"), Duration::from_secs(10))
        .await;
    match outcome {
        CaseOutcome::RuntimeFailure { message } => {
            assert!(message.contains("solver exploded"));
        }
        other => panic!("expected runtime failure, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_verdict_is_a_runtime_failure() {
    let source = r#"
solve() {
  read -r payload
  echo "forgot to report"
}
solve
"#;
    let engine = engine();
    let loaded = engine.load(source).await.unwrap();
    let outcome = engine
        .run_case(&loaded, &case("c1"), Duration::from_secs(10))
        .await;
    match outcome {
        CaseOutcome::RuntimeFailure { message } => {
            assert!(message.contains("no result record"));
        }
        other => panic!("expected runtime failure, got {:?}", other),
    }
}

#[tokio::test]
async fn rejected_solution_is_invalid_output() {
    let source = r#"
solve() {
  read -r payload
  echo 'CASE_RESULT {"valid": false, "reason": "bins overflow"}'
}
solve
"#;
    let engine = engine();
    let loaded = engine.load(source).await.unwrap();
    let outcome = engine
        .run_case(&loaded, &case("c1"), Duration::from_secs(10))
        .await;
    assert_eq!(
        outcome,
        CaseOutcome::InvalidOutput {
            reason: "bins overflow".to_string()
        }
    );
}

#[tokio::test]
async fn sleeping_candidate_times_out_within_bounded_overrun() {
    let source = r#"
solve() {
  read -r payload
  sleep 30
}
solve
"#;
    let engine = engine();
    let loaded = engine.load(source).await.unwrap();
    let started = Instant::now();
    let outcome = engine
        .run_case(&loaded, &case("c1"), Duration::from_secs(1))
        .await;
    assert_eq!(outcome, CaseOutcome::Timeout);
    assert!(
        started.elapsed() < Duration::from_secs(4),
        "kill must not wait for the sleep"
    );
}

#[tokio::test]
async fn syntax_error_is_a_fatal_load_error() {
    let source = r#"
solve() {
  if true; then
}
solve
"#;
    let err = engine().load(source).await.unwrap_err();
    assert!(matches!(err, LoadError::Compile { .. }));
}

#[tokio::test]
async fn missing_entry_point_is_a_fatal_load_error() {
    let err = engine().load("echo hello\n").await.unwrap_err();
    match err {
        LoadError::MissingEntryPoint { name } => assert_eq!(name, "solve"),
        other => panic!("expected missing entry point, got {:?}", other),
    }
}

#[tokio::test]
async fn harness_template_wraps_the_candidate() {
    let mut toolchain = Toolchain::shell();
    toolchain.harness = Some("{solution}\nsolve\n".to_string());
    let engine = ProcessEngine::new(toolchain);

    // Candidate defines the entry point only; the harness invokes it.
    let source = r#"
solve() {
  read -r payload
  echo 'CASE_RESULT {"score": 3.0}'
}
"#;
    let loaded = engine.load(source).await.unwrap();
    let outcome = engine
        .run_case(&loaded, &case("c1"), Duration::from_secs(10))
        .await;
    assert!(matches!(
        outcome,
        CaseOutcome::Success { raw_score, .. } if raw_score == 3.0
    ));
}

#[tokio::test]
async fn one_slow_case_never_stalls_its_siblings() {
    // The stdin payload carries the case id, so the candidate can
    // misbehave on exactly one case.
    let source = r#"
solve() {
  read -r payload
  case "$payload" in
    *slow*) sleep 30 ;;
    *) echo 'CASE_RESULT {"score": 1.0}' ;;
  esac
}
solve
"#;
    let problem = Problem::new("routing").with_cases(vec![
        case("fast1"),
        case("slow"),
        case("fast2"),
    ]);
    let evaluator = Evaluator::new(problem, Arc::new(engine()))
        .with_timeout(Duration::from_secs(1))
        .with_workers(4);

    let started = Instant::now();
    let feedback = evaluator.evaluate(source).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(6));

    assert_eq!(feedback.results.len(), 3);
    assert_eq!(feedback.results["fast1"].primary(), 1.0);
    assert_eq!(feedback.results["fast2"].primary(), 1.0);
    assert_eq!(feedback.results["slow"].primary(), 0.0);
    assert_eq!(
        feedback.results["slow"].error.as_deref(),
        Some("execution timed out")
    );
    assert!(feedback.test_feedback.contains("slow: TIMEOUT"));
}
