mod commands;
mod problems;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cobench-cli")]
#[command(about = "Benchmark optimization heuristics against problem test sets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a solve-function implementation against one problem
    Evaluate {
        /// Problem name (e.g. "TSP", "Aircraft landing")
        #[arg(short, long)]
        problem: String,

        /// Path to the file containing the solve function
        #[arg(short, long)]
        code: PathBuf,

        /// Root directory holding the problem directories
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Directory to save feedback files into (optional)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Iteration number used in feedback file names
        #[arg(short, long, default_value = "0")]
        iteration: u32,

        /// Wall-clock budget per test case, in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Concurrently active execution units (default: all cores)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Per-case cap on diagnostic text, in characters
        #[arg(short, long, default_value = "64")]
        feedback_length: usize,

        /// Print each case result as it completes
        #[arg(long, default_value = "false")]
        progress: bool,
    },

    /// List the supported benchmark problems
    List {
        /// Root directory holding the problem directories
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            problem,
            code,
            data_dir,
            output_dir,
            iteration,
            timeout,
            workers,
            feedback_length,
            progress,
        } => {
            commands::evaluate(commands::EvaluateArgs {
                problem,
                code,
                data_dir,
                output_dir,
                iteration,
                timeout,
                workers,
                feedback_length,
                progress,
            })
            .await?;
        }
        Commands::List { data_dir } => {
            commands::list_tasks(&data_dir)?;
        }
    }

    Ok(())
}
