//! CLI commands: run one evaluation and persist its feedback.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use futures_util::StreamExt;
use tracing::info;

use cobench_core::{EvalEvent, Evaluator, Feedback, ProcessEngine};

use crate::problems::{self, TASK_LIST};

pub struct EvaluateArgs {
    pub problem: String,
    pub code: PathBuf,
    pub data_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub iteration: u32,
    pub timeout: u64,
    pub workers: Option<usize>,
    pub feedback_length: usize,
    pub progress: bool,
}

pub async fn evaluate(args: EvaluateArgs) -> Result<()> {
    let code = fs::read_to_string(&args.code)
        .with_context(|| format!("failed to read code file {}", args.code.display()))?;

    let (problem, toolchain) = problems::load_problem(&args.data_dir, &args.problem)?;
    let case_count = problem.cases.len();
    info!(
        problem = %args.problem,
        cases = case_count,
        toolchain = %toolchain.name,
        "problem loaded"
    );

    let engine = Arc::new(ProcessEngine::new(toolchain));
    let mut evaluator = Evaluator::new(problem, engine)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_feedback_length(args.feedback_length);
    if let Some(workers) = args.workers {
        evaluator = evaluator.with_workers(workers);
    }

    println!("Evaluating code on {} test cases...", case_count);
    let feedback = if args.progress {
        run_with_progress(&evaluator, &code).await?
    } else {
        evaluator
            .evaluate(&code)
            .await
            .context("evaluation failed")?
    };

    print_summary(&feedback);

    if let Some(output_dir) = &args.output_dir {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        let text_path = save_feedback(&feedback, output_dir, args.iteration)?;
        let json_path = save_detailed_results(&feedback, output_dir, args.iteration)?;
        println!("\nFeedback saved to: {}", text_path.display());
        println!("Detailed results saved to: {}", json_path.display());
    }

    Ok(())
}

async fn run_with_progress(evaluator: &Evaluator, code: &str) -> Result<Feedback> {
    let mut stream = evaluator
        .evaluate_stream(code)
        .await
        .context("evaluation failed")?;
    let mut finished = None;
    while let Some(event) = stream.next().await {
        match event {
            EvalEvent::Case { id, report } => match &report.error {
                Some(error) => println!("  {} -> {} ({})", id, report.primary(), error),
                None => println!("  {} -> {}", id, report.primary()),
            },
            EvalEvent::Finished(feedback) => finished = Some(feedback),
        }
    }
    match finished {
        Some(feedback) => Ok(feedback),
        None => bail!("evaluation stream ended without an aggregate result"),
    }
}

fn print_summary(feedback: &Feedback) {
    println!();
    println!("{}", "=".repeat(80));
    println!("EVALUATION RESULTS");
    println!("{}", "=".repeat(80));
    println!();
    println!("Overall Score: {:.4}", feedback.score);
    println!("Dev Score: {:.4}", feedback.dev_score);
    println!("Test Score: {:.4}", feedback.test_score);
    if !feedback.dev_feedback.is_empty() {
        println!("\nDev feedback:\n{}", feedback.dev_feedback);
    }
    if !feedback.test_feedback.is_empty() {
        println!("\nTest feedback:\n{}", feedback.test_feedback);
    }
    println!("\n{}", "=".repeat(80));
}

/// Human-readable feedback file, one per iteration.
pub fn save_feedback(feedback: &Feedback, output_dir: &Path, iteration: u32) -> Result<PathBuf> {
    let path = output_dir.join(format!("eval_{}.txt", iteration));
    let divider = "=".repeat(80);
    let body = format!(
        "Iteration {}\nTimestamp: {}\n{}\n\n\
         Overall Score: {:.6}\nDev Score: {:.6}\nTest Score: {:.6}\n\n\
         {}\nDEV FEEDBACK:\n{}\n{}\n\n{}\nTEST FEEDBACK:\n{}\n{}",
        iteration,
        Local::now().to_rfc3339(),
        divider,
        feedback.score,
        feedback.dev_score,
        feedback.test_score,
        divider,
        divider,
        feedback.dev_feedback,
        divider,
        divider,
        feedback.test_feedback,
    );
    fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Structured results, one JSON document per iteration.
pub fn save_detailed_results(
    feedback: &Feedback,
    output_dir: &Path,
    iteration: u32,
) -> Result<PathBuf> {
    let path = output_dir.join(format!("eval_{}.json", iteration));
    let document = serde_json::json!({
        "iteration": iteration,
        "timestamp": Local::now().to_rfc3339(),
        // Flat fields kept for older tooling that predates the
        // structured `scores` block.
        "overall_score": feedback.score,
        "dev_score": feedback.dev_score,
        "test_score": feedback.test_score,
        "feedback": feedback.dev_feedback,
        "scores": {
            "overall": feedback.score,
            "dev": feedback.dev_score,
            "test": feedback.test_score,
        },
        "dev_feedback": feedback.dev_feedback,
        "test_feedback": feedback.test_feedback,
        "detailed_results": feedback.results,
    });
    let text = serde_json::to_string_pretty(&document)?;
    fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Print the problem registry, marking which problems are present in
/// the data directory.
pub fn list_tasks(data_dir: &Path) -> Result<()> {
    println!("Supported problems:");
    for task in TASK_LIST {
        let present = data_dir.join(task).is_dir();
        let mark = if present { "*" } else { " " };
        println!("  {} {}", mark, task);
    }
    println!("\n(* = available under {})", data_dir.display());
    Ok(())
}
