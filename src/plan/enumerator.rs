//! Benchmark and circuit-file discovery.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{OrchestratorError, PlanResult};
use crate::types::{BenchmarkName, TargetName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A benchmark directory; the tool walks it itself.
    Benchmark,
    /// One circuit file inside a benchmark.
    CircuitFile,
}

/// One unit of mining work, fixed once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub name: TargetName,
    pub path: PathBuf,
    pub kind: TargetKind,
}

impl Target {
    pub fn benchmark(name: impl Into<TargetName>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: TargetKind::Benchmark,
        }
    }

    pub fn circuit_file(name: impl Into<TargetName>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: TargetKind::CircuitFile,
        }
    }
}

/// Benchmark directories that survived filtering, plus the names that did not.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    pub targets: Vec<Target>,
    pub skipped: Vec<TargetName>,
}

/// Expand the benchmark root into benchmark targets.
///
/// With no names every immediate subdirectory is returned, in whatever order
/// the filesystem yields them. With names, each `root/name` must be a
/// directory; missing ones are warned about and skipped.
pub fn enumerate_benchmarks(root: &Path, names: &[TargetName]) -> PlanResult<Enumeration> {
    if !root.is_dir() {
        return Err(OrchestratorError::MissingRoot(root.to_path_buf()));
    }

    let enumeration = if names.is_empty() {
        Enumeration {
            targets: list_subdirectories(root)?,
            skipped: Vec::new(),
        }
    } else {
        filter_named(root, names)
    };

    if enumeration.targets.is_empty() {
        return Err(OrchestratorError::NoTargets(root.to_path_buf()));
    }

    debug!(
        "Enumerated {} benchmark(s) under {}",
        enumeration.targets.len(),
        root.display()
    );
    Ok(enumeration)
}

fn list_subdirectories(root: &Path) -> PlanResult<Vec<Target>> {
    let entries = fs::read_dir(root).map_err(|e| OrchestratorError::enumeration(root, e))?;

    let mut targets = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| OrchestratorError::enumeration(root, e))?;
        let path = entry.path();
        if path.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            targets.push(Target::benchmark(name, path));
        }
    }
    Ok(targets)
}

fn filter_named(root: &Path, names: &[TargetName]) -> Enumeration {
    let mut enumeration = Enumeration::default();
    for name in names {
        let path = root.join(name.as_str());
        if path.is_dir() {
            enumeration.targets.push(Target::benchmark(name.clone(), path));
        } else {
            warn!("Benchmark `{}` not found under {}, skipping", name, root.display());
            enumeration.skipped.push(name.clone());
        }
    }
    enumeration
}

/// Locate a single benchmark directory for the parallel surface.
pub fn benchmark_dir(root: &Path, benchmark: &BenchmarkName) -> PlanResult<PathBuf> {
    let dir = root.join(benchmark.as_str());
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(OrchestratorError::MissingBenchmark(dir))
    }
}

/// Immediate files in `dir` whose name ends with `suffix`, one target each.
///
/// Other entries are ignored. An empty result is not an error.
pub fn enumerate_circuit_files(dir: &Path, suffix: &str) -> PlanResult<Vec<Target>> {
    let entries = fs::read_dir(dir).map_err(|e| OrchestratorError::enumeration(dir, e))?;

    let mut targets = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| OrchestratorError::enumeration(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(suffix) {
            targets.push(Target::circuit_file(name, path));
        }
    }

    debug!(
        "Found {} `{}` file(s) in {}",
        targets.len(),
        suffix,
        dir.display()
    );
    Ok(targets)
}
