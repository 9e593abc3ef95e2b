//! Positional argument resolution.
//!
//! Both CLI surfaces take raw positional strings; this module turns them
//! into mining parameters plus the list of requested targets.

use crate::error::{OrchestratorError, PlanResult};
use crate::types::{BenchmarkName, MiningMode, MiningParameters, TargetName};

/// Result of resolving `<k_min> <k_max> [samples] [target ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArgs {
    pub k_min: i64,
    pub k_max: i64,
    pub samples: u64,
    /// Explicit targets in the order given. Empty means "all benchmarks".
    pub targets: Vec<TargetName>,
}

impl ResolvedArgs {
    pub fn parameters(&self, mode: MiningMode, exact: bool) -> MiningParameters {
        MiningParameters::new(self.k_min, self.k_max, self.samples)
            .with_mode(mode)
            .with_exact(exact)
    }
}

/// Result of resolving `<benchmark_name> <k_min> <k_max> [samples]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBenchmarkArgs {
    pub benchmark: BenchmarkName,
    pub k_min: i64,
    pub k_max: i64,
    pub samples: u64,
}

impl ResolvedBenchmarkArgs {
    pub fn parameters(&self, mode: MiningMode, exact: bool) -> MiningParameters {
        MiningParameters::new(self.k_min, self.k_max, self.samples)
            .with_mode(mode)
            .with_exact(exact)
    }
}

/// True when `arg` is non-empty and consists only of ASCII digits.
///
/// This is the only test used to tell a sample count from a target name, so
/// a benchmark literally named `500` is read as a sample count.
pub fn is_all_digits(arg: &str) -> bool {
    !arg.is_empty() && arg.bytes().all(|b| b.is_ascii_digit())
}

/// Resolve the all-benchmarks surface.
pub fn resolve_run_args(args: &[String], default_samples: u64) -> PlanResult<ResolvedArgs> {
    if args.len() < 2 {
        return Err(OrchestratorError::usage(
            "expected <k_min> <k_max> [samples] [target_name ...]",
        ));
    }

    let k_min = parse_k("k_min", &args[0])?;
    let k_max = parse_k("k_max", &args[1])?;

    let mut rest = &args[2..];
    let mut samples = default_samples;
    if let Some(next) = rest.first()
        && is_all_digits(next)
    {
        samples = parse_samples(next)?;
        rest = &rest[1..];
    }

    let targets = rest.iter().map(|s| TargetName::new(s.as_str())).collect();

    Ok(ResolvedArgs {
        k_min,
        k_max,
        samples,
        targets,
    })
}

/// Resolve the single-benchmark surface.
pub fn resolve_benchmark_args(
    args: &[String],
    default_samples: u64,
) -> PlanResult<ResolvedBenchmarkArgs> {
    if args.len() < 3 {
        return Err(OrchestratorError::usage(
            "expected <benchmark_name> <k_min> <k_max> [samples]",
        ));
    }
    if args.len() > 4 {
        return Err(OrchestratorError::usage(format!(
            "unexpected extra arguments: {}",
            args[4..].join(" ")
        )));
    }

    let benchmark = BenchmarkName::new(args[0].as_str());
    let k_min = parse_k("k_min", &args[1])?;
    let k_max = parse_k("k_max", &args[2])?;
    let samples = match args.get(3) {
        Some(raw) if is_all_digits(raw) => parse_samples(raw)?,
        Some(raw) => {
            return Err(OrchestratorError::usage(format!(
                "samples must be a non-negative integer, got `{raw}`"
            )));
        }
        None => default_samples,
    };

    Ok(ResolvedBenchmarkArgs {
        benchmark,
        k_min,
        k_max,
        samples,
    })
}

fn parse_k(label: &str, raw: &str) -> PlanResult<i64> {
    raw.trim().parse::<i64>().map_err(|_| {
        OrchestratorError::usage(format!("{label} must be an integer, got `{raw}`"))
    })
}

fn parse_samples(raw: &str) -> PlanResult<u64> {
    raw.parse::<u64>()
        .map_err(|_| OrchestratorError::usage(format!("samples out of range: `{raw}`")))
}
