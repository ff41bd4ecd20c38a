//! Problem registry and directory loading.
//!
//! A problem directory holds a `problem.json` manifest (description,
//! solve template, toolchain, declarative normalization, optional dev
//! case list) plus one file per test case. Everything the evaluator
//! core treats as injected functions is compiled here, so the core
//! stays free of configuration concerns.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cobench_core::{Problem, TestCase, Toolchain};

pub const MANIFEST_FILE: &str = "problem.json";

/// The supported benchmark problems. An explicit table, injected into
/// commands as configuration, never ambient state.
pub const TASK_LIST: &[&str] = &[
    "Aircraft landing",
    "Assignment problem",
    "Assortment problem",
    "Bin packing - one-dimensional",
    "Capacitated warehouse location",
    "Common due date scheduling",
    "Constrained guillotine cutting",
    "Constrained non-guillotine cutting",
    "Container loading",
    "Container loading with weight restrictions",
    "Corporate structuring",
    "Crew scheduling",
    "Equitable partitioning problem",
    "Euclidean Steiner problem",
    "Flow shop scheduling",
    "Generalised assignment problem",
    "Graph colouring",
    "Hybrid Reentrant Shop Scheduling",
    "Job shop scheduling",
    "MIS",
    "Multi-Demand Multidimensional Knapsack problem",
    "Multidimensional knapsack problem",
    "Open shop scheduling",
    "Packing unequal circles",
    "Packing unequal circles area",
    "Packing unequal rectangles and squares",
    "Packing unequal rectangles and squares area",
    "Resource constrained shortest path",
    "Set covering",
    "Set partitioning",
    "TSP",
    "Uncapacitated warehouse location",
    "Unconstrained guillotine cutting",
    "Vehicle routing: period routing",
    "p-median - capacitated",
    "p-median - uncapacitated",
];

/// Declarative normalization transform, compiled to a closure for the
/// evaluator core. Identity when a problem declares nothing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormSpec {
    #[default]
    Identity,
    /// For minimization problems reported as costs.
    Negate,
    /// Maps cost c to 1/c; zero stays zero.
    Reciprocal,
    Affine {
        mul: f64,
        add: f64,
    },
}

impl NormSpec {
    pub fn compile(&self) -> impl Fn(f64) -> f64 + Send + Sync + 'static {
        let spec = *self;
        move |x| match spec {
            NormSpec::Identity => x,
            NormSpec::Negate => -x,
            NormSpec::Reciprocal => {
                if x == 0.0 {
                    0.0
                } else {
                    1.0 / x
                }
            }
            NormSpec::Affine { mul, add } => mul * x + add,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProblemManifest {
    pub description: String,
    #[serde(default)]
    pub solve_template: String,
    pub toolchain: Toolchain,
    #[serde(default)]
    pub norm_score: NormSpec,
    #[serde(default)]
    pub norm_time: NormSpec,
    /// Dev-partition case ids; absent means no dev split.
    #[serde(default)]
    pub dev: Option<Vec<String>>,
}

/// List case files under `dir`, skipping the manifest, hidden files,
/// and solution/parallel artifacts (path components ending in `_sol`
/// or `_par`). Sorted by relative path so case order is stable.
pub fn list_case_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    collect_case_files(dir, dir, &mut files)?;
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn collect_case_files(
    root: &Path,
    dir: &Path,
    files: &mut Vec<(String, PathBuf)>,
) -> Result<()> {
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to read problem directory {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name == MANIFEST_FILE {
            continue;
        }
        let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(&name);
        if stem.ends_with("_sol") || stem.ends_with("_par") {
            continue;
        }
        if path.is_dir() {
            collect_case_files(root, &path, files)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            files.push((rel, path));
        }
    }
    Ok(())
}

fn load_payload(path: &Path) -> Result<Value> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read case file {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if path.extension().map(|e| e == "json").unwrap_or(false) {
        serde_json::from_str(&text)
            .with_context(|| format!("case file {} is not valid JSON", path.display()))
    } else {
        Ok(Value::String(text))
    }
}

/// Load one problem directory into an evaluator-ready configuration.
pub fn load_problem(data_dir: &Path, task: &str) -> Result<(Problem, Toolchain)> {
    let dir = data_dir.join(task);
    if !dir.is_dir() {
        bail!(
            "problem directory not found: {} (known tasks: run `cobench-cli list`)",
            dir.display()
        );
    }

    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest_text = fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    let manifest: ProblemManifest = serde_json::from_str(&manifest_text)
        .with_context(|| format!("failed to parse {}", manifest_path.display()))?;

    let mut cases = Vec::new();
    for (id, path) in list_case_files(&dir)? {
        cases.push(TestCase::new(id, load_payload(&path)?));
    }
    if cases.is_empty() {
        bail!("problem `{}` has no test cases", task);
    }

    let norm_score = manifest.norm_score.compile();
    let norm_time = manifest.norm_time.compile();
    let mut problem = Problem::new(task)
        .with_description(manifest.description)
        .with_solve_template(manifest.solve_template)
        .with_cases(cases)
        .with_norm_score(norm_score)
        .with_norm_time(norm_time);
    if let Some(dev) = manifest.dev {
        problem = problem.with_dev_cases(dev);
    }

    Ok((problem, manifest.toolchain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn manifest_json() -> String {
        serde_json::json!({
            "description": "Pack items into the fewest bins.",
            "solve_template": "def solve(**kwargs):\n    ...",
            "toolchain": {
                "name": "shell",
                "file_extension": "sh",
                "entry_point": "solve",
                "entry_marker": "solve()",
                "check": ["sh", "-n", "{file}"],
                "run": ["sh", "{file}"]
            },
            "norm_score": { "kind": "reciprocal" },
            "dev": ["a.json"]
        })
        .to_string()
    }

    #[test]
    fn test_norm_spec_compile() {
        assert_eq!((NormSpec::Identity.compile())(4.0), 4.0);
        assert_eq!((NormSpec::Negate.compile())(4.0), -4.0);
        assert_eq!((NormSpec::Reciprocal.compile())(4.0), 0.25);
        assert_eq!((NormSpec::Reciprocal.compile())(0.0), 0.0);
        assert_eq!((NormSpec::Affine { mul: 2.0, add: 1.0 }.compile())(3.0), 7.0);
    }

    #[test]
    fn test_list_case_files_skips_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "{}").unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::write(dir.path().join("b.txt"), "payload").unwrap();
        fs::write(dir.path().join("b_sol.txt"), "answer key").unwrap();
        fs::write(dir.path().join(".hidden"), "x").unwrap();
        fs::create_dir(dir.path().join("big_par")).unwrap();
        fs::write(dir.path().join("big_par/case"), "x").unwrap();

        let files = list_case_files(dir.path()).unwrap();
        let ids: Vec<&str> = files.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a.json", "b.txt"]);
    }

    #[test]
    fn test_load_problem_builds_config() {
        let data = tempfile::tempdir().unwrap();
        let dir = data.path().join("Bin packing - one-dimensional");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), manifest_json()).unwrap();
        fs::write(dir.join("a.json"), r#"{"items": [3, 5, 8]}"#).unwrap();
        fs::write(dir.join("b.txt"), "3 5 8").unwrap();

        let (problem, toolchain) =
            load_problem(data.path(), "Bin packing - one-dimensional").unwrap();
        assert_eq!(problem.cases.len(), 2);
        assert_eq!(problem.cases[0].id, "a.json");
        assert_eq!(problem.cases[0].payload["items"][1], 5);
        assert_eq!(
            problem.cases[1].payload,
            Value::String("3 5 8".to_string())
        );
        // reciprocal normalization from the manifest
        assert_eq!((problem.norm_score)(4.0), 0.25);
        let dev = (problem.get_dev)().unwrap();
        assert!(dev.contains("a.json"));
        assert_eq!(toolchain.name, "shell");
    }

    #[test]
    fn test_load_problem_missing_dir() {
        let data = tempfile::tempdir().unwrap();
        assert!(load_problem(data.path(), "TSP").is_err());
    }

    #[test]
    fn test_task_list_is_stable_and_sorted() {
        let mut sorted = TASK_LIST.to_vec();
        sorted.sort();
        assert_eq!(sorted, TASK_LIST);
        assert!(TASK_LIST.contains(&"TSP"));
    }
}
