//! Error types for plan construction.
//!
//! Every variant here is fatal and is raised before any mining process is
//! launched. Per-job failures are never errors at this level; they are
//! recorded in the run report instead.

use std::fmt;
use std::path::PathBuf;

/// Process exit code for every fatal orchestration error.
pub const FATAL_EXIT_CODE: i32 = 1;

/// Errors that abort a run before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// Malformed or insufficient positional arguments.
    Usage(String),

    /// The benchmark root does not exist.
    MissingRoot(PathBuf),

    /// A single-benchmark run named a directory that does not exist.
    MissingBenchmark(PathBuf),

    /// Every explicit target was filtered out, or the root has no benchmarks.
    NoTargets(PathBuf),

    /// Reading a directory failed.
    Enumeration { path: PathBuf, message: String },

    /// The configuration file could not be loaded.
    Config(String),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(msg) => write!(f, "Usage error: {}", msg),
            Self::MissingRoot(path) => {
                write!(f, "Benchmark root does not exist: {}", path.display())
            }
            Self::MissingBenchmark(path) => {
                write!(f, "Benchmark directory does not exist: {}", path.display())
            }
            Self::NoTargets(path) => {
                write!(f, "No valid benchmark targets found under {}", path.display())
            }
            Self::Enumeration { path, message } => {
                write!(f, "Failed to read {}: {}", path.display(), message)
            }
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for OrchestratorError {}

/// Result type for planning operations.
pub type PlanResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Exit code the binary should terminate with.
    pub fn exit_code(&self) -> i32 {
        FATAL_EXIT_CODE
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub(crate) fn enumeration(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Enumeration {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Pick the exit code for an error surfaced from `main`.
///
/// Anything that is not an `OrchestratorError` is still a failure before
/// dispatch and exits with the same code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<OrchestratorError>()
        .map(OrchestratorError::exit_code)
        .unwrap_or(FATAL_EXIT_CODE)
}
