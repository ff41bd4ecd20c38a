/// Execution Engine - Abstraction for Candidate Execution
///
/// **Core Responsibility:**
/// Stage untrusted candidate source once, then execute it against one
/// test case at a time inside a fresh OS process with a hard
/// wall-clock cutoff, and classify whatever comes back.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (interpreter argv, scratch dir, kill
///   on timeout).
/// - Engine does NOT know scoring or normalization rules.
/// - Engine never lets a candidate failure escape as an error; every
///   per-case failure is a recorded `CaseOutcome`.
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::types::{CaseOutcome, TestCase};

/// Marker prefix the staged program must print before its JSON verdict.
pub const RESULT_MARKER: &str = "CASE_RESULT ";

/// Safety limits to prevent pathological inputs from reaching the sandbox
const MAX_SOURCE_BYTES: usize = 1024 * 1024; // 1MB
const MAX_CAPTURED_BYTES: usize = 256 * 1024; // per stream
const CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// How to check and run candidate source for one language.
///
/// `check` and `run` are argv templates; `{file}` is replaced with the
/// staged program path. An optional `harness` template with a
/// `{solution}` placeholder is wrapped around the candidate at load
/// time, so problem-specific validity checking runs inside the
/// sandboxed process alongside the candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toolchain {
    pub name: String,
    pub file_extension: String,
    /// Required entry-point function name, used in load diagnostics.
    pub entry_point: String,
    /// Literal text that must appear in the candidate source for the
    /// entry point to be considered defined (e.g. `def solve(`).
    pub entry_marker: String,
    /// Syntax-check argv; empty disables the check step.
    #[serde(default)]
    pub check: Vec<String>,
    pub run: Vec<String>,
    #[serde(default)]
    pub harness: Option<String>,
}

impl Toolchain {
    pub fn python() -> Self {
        Self {
            name: "python".to_string(),
            file_extension: "py".to_string(),
            entry_point: "solve".to_string(),
            entry_marker: "def solve(".to_string(),
            check: vec![
                "python3".to_string(),
                "-m".to_string(),
                "py_compile".to_string(),
                "{file}".to_string(),
            ],
            run: vec!["python3".to_string(), "{file}".to_string()],
            harness: None,
        }
    }

    pub fn shell() -> Self {
        Self {
            name: "shell".to_string(),
            file_extension: "sh".to_string(),
            entry_point: "solve".to_string(),
            entry_marker: "solve()".to_string(),
            check: vec!["sh".to_string(), "-n".to_string(), "{file}".to_string()],
            run: vec!["sh".to_string(), "{file}".to_string()],
            harness: None,
        }
    }

    fn argv(template: &[String], file: &Path) -> (String, Vec<String>) {
        let file = file.to_string_lossy();
        let mut parts = template
            .iter()
            .map(|part| part.replace("{file}", &file))
            .collect::<Vec<_>>();
        let program = parts.remove(0);
        (program, parts)
    }
}

/// Candidate source staged for execution. Dropping it removes the
/// scratch directory.
#[derive(Debug)]
pub struct LoadedCandidate {
    program: PathBuf,
    _scratch: Option<TempDir>,
}

impl LoadedCandidate {
    /// A candidate with no staged files, for engines that execute from
    /// memory (test stubs).
    pub fn detached() -> Self {
        Self {
            program: PathBuf::new(),
            _scratch: None,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Verdict record the staged program prints on its marker line.
#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default = "default_valid")]
    valid: bool,
    #[serde(default)]
    reason: Option<String>,
}

fn default_valid() -> bool {
    true
}

fn parse_verdict(stdout: &str) -> Result<Verdict, String> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| line.trim_start().starts_with(RESULT_MARKER));
    match line {
        Some(line) => {
            let body = &line.trim_start()[RESULT_MARKER.len()..];
            serde_json::from_str(body).map_err(|e| format!("malformed result record: {}", e))
        }
        None => Err("candidate produced no result record".to_string()),
    }
}

/// Stdout minus the verdict marker lines; this is the candidate's own
/// diagnostic output.
fn strip_marker_lines(stdout: &str) -> String {
    stdout
        .lines()
        .filter(|line| !line.trim_start().starts_with(RESULT_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drain a child stream to EOF, so the candidate never blocks on a
/// full pipe or dies of SIGPIPE after the capture budget is spent.
/// Verdict marker lines are always retained; everything else is kept
/// up to `MAX_CAPTURED_BYTES` and discarded past that.
async fn capture_output<R>(reader: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };
    let mut reader = BufReader::new(reader);
    let mut kept = String::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                if text.trim_start().starts_with(RESULT_MARKER) || kept.len() < MAX_CAPTURED_BYTES
                {
                    kept.push_str(&text);
                }
            }
        }
    }
    kept
}

/// Execution backend seam. The production implementation spawns OS
/// processes; tests substitute scripted engines.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Stage and check the candidate. Called exactly once per
    /// evaluation; a failure here aborts before any case runs.
    async fn load(&self, source: &str) -> Result<LoadedCandidate, LoadError>;

    /// Run one case in a fresh execution unit within `timeout`.
    /// Failures never propagate; they come back as outcomes.
    async fn run_case(
        &self,
        loaded: &LoadedCandidate,
        case: &TestCase,
        timeout: Duration,
    ) -> CaseOutcome;
}

/// Process-isolation engine: one interpreter process per case, payload
/// on stdin as JSON, verdict parsed from a marker line on stdout.
pub struct ProcessEngine {
    toolchain: Toolchain,
}

impl ProcessEngine {
    pub fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    async fn run_check(&self, program: &Path) -> Result<(), LoadError> {
        if self.toolchain.check.is_empty() {
            return Ok(());
        }
        let (cmd, args) = Toolchain::argv(&self.toolchain.check, program);
        let output = tokio::time::timeout(
            CHECK_TIMEOUT,
            Command::new(&cmd)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| LoadError::Compile {
            message: format!("syntax check did not finish within {:?}", CHECK_TIMEOUT),
        })?
        .map_err(LoadError::Setup)?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            Err(LoadError::Compile { message })
        }
    }
}

#[async_trait]
impl ExecutionEngine for ProcessEngine {
    async fn load(&self, source: &str) -> Result<LoadedCandidate, LoadError> {
        if source.len() > MAX_SOURCE_BYTES {
            return Err(LoadError::Compile {
                message: format!("source exceeds maximum size of {} bytes", MAX_SOURCE_BYTES),
            });
        }
        if !source.contains(&self.toolchain.entry_marker) {
            return Err(LoadError::MissingEntryPoint {
                name: self.toolchain.entry_point.clone(),
            });
        }

        let program_text = match &self.toolchain.harness {
            Some(template) => template.replace("{solution}", source),
            None => source.to_string(),
        };

        let scratch = tempfile::Builder::new()
            .prefix("cobench-")
            .tempdir()
            .map_err(LoadError::Setup)?;
        let program = scratch
            .path()
            .join(format!("candidate.{}", self.toolchain.file_extension));
        tokio::fs::write(&program, program_text)
            .await
            .map_err(LoadError::Setup)?;

        self.run_check(&program).await?;
        debug!(program = %program.display(), toolchain = %self.toolchain.name, "candidate staged");

        Ok(LoadedCandidate {
            program,
            _scratch: Some(scratch),
        })
    }

    async fn run_case(
        &self,
        loaded: &LoadedCandidate,
        case: &TestCase,
        timeout: Duration,
    ) -> CaseOutcome {
        if self.toolchain.run.is_empty() {
            return CaseOutcome::RuntimeFailure {
                message: "toolchain declares no run command".to_string(),
            };
        }
        let started = Instant::now();
        let (cmd, args) = Toolchain::argv(&self.toolchain.run, loaded.program());

        let mut child = match Command::new(&cmd)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return CaseOutcome::RuntimeFailure {
                    message: format!("failed to spawn `{}`: {}", cmd, e),
                }
            }
        };

        // Writer runs in its own task: a candidate that never reads
        // stdin must not wedge the runner on a full pipe.
        let payload = serde_json::json!({ "case": case.id, "input": case.payload }).to_string();
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                let _ = stdin.write_all(payload.as_bytes()).await;
                let _ = stdin.write_all(b"\n").await;
            });
        }

        let stdout_task = tokio::spawn(capture_output(child.stdout.take()));
        let stderr_task = tokio::spawn(capture_output(child.stderr.take()));

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return CaseOutcome::RuntimeFailure {
                    message: format!("failed to wait for candidate: {}", e),
                }
            }
            Err(_) => {
                // Hard cutoff: kill, trust nothing the process printed.
                let _ = child.kill().await;
                warn!(case = %case.id, ?timeout, "case exceeded budget, killed");
                return CaseOutcome::Timeout;
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let elapsed = started.elapsed().as_secs_f64();

        if !status.success() {
            let message = if stderr.trim().is_empty() {
                format!("candidate exited with {}", status)
            } else {
                stderr.trim().to_string()
            };
            return CaseOutcome::RuntimeFailure { message };
        }

        match parse_verdict(&stdout) {
            Ok(verdict) if !verdict.valid => CaseOutcome::InvalidOutput {
                reason: verdict
                    .reason
                    .unwrap_or_else(|| "solution failed validity check".to_string()),
            },
            Ok(verdict) => match verdict.score {
                Some(raw_score) => CaseOutcome::Success {
                    raw_score,
                    raw_time: elapsed,
                    raw_output: strip_marker_lines(&stdout),
                },
                None => CaseOutcome::RuntimeFailure {
                    message: "result record is missing a score".to_string(),
                },
            },
            Err(message) => CaseOutcome::RuntimeFailure { message },
        }
    }
}
