//! cobench-core - Sandboxed Benchmark Evaluator
//!
//! **Core Responsibility:**
//! Run untrusted heuristic code against a problem's test cases under
//! per-case process isolation and a hard wall-clock budget, then fold
//! the raw outcomes into one comparable, bounded-length Feedback.
//!
//! **Critical Architectural Boundary:**
//! - The engine knows HOW to execute (interpreter, scratch dir, kill
//!   on timeout) and nothing about scoring.
//! - Scoring (normalization, dev/test partitioning, aggregation) is
//!   pure and knows nothing about process management.
//! - The Evaluator facade is the glue between the two.
//!
//! **Why This Exists:**
//! Swappable execution backends without touching scoring logic, and
//! scoring logic that is testable without ever spawning a process.
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod feedback;
pub mod scoring;
pub mod types;

pub use engine::{ExecutionEngine, LoadedCandidate, ProcessEngine, Toolchain};
pub use error::{EvalError, LoadError};
pub use evaluator::{EvalEvent, Evaluator};
pub use types::{CaseOutcome, CaseReport, Feedback, Problem, TestCase};
