//! Core value types shared by the planner and the dispatcher.
//!
//! NewType wrappers keep target names from being mixed up with arbitrary
//! strings, and `MiningParameters` is the by-value tuple every job carries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Samples per graph when the caller does not give an explicit count.
pub const DEFAULT_SAMPLES: u64 = 2000;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Display name of a target (a benchmark directory or a circuit file).
    ///
    /// The external tool keys its results directory by this name, so it is
    /// the directory or file name exactly as found on disk.
    TargetName
);

newtype_string!(
    /// Name of a benchmark subdirectory under the benchmark root.
    BenchmarkName
);

/// Analysis mode forwarded to the mining tool as `--mode`.
///
/// Kept as an enumeration rather than a flag so new modes can be added
/// without touching the job builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningMode {
    /// Qubit interaction graph.
    #[default]
    Comm,
    /// Operation dependency graph.
    Dataflow,
}

impl MiningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comm => "comm",
            Self::Dataflow => "dataflow",
        }
    }
}

impl fmt::Display for MiningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MiningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "comm" => Ok(Self::Comm),
            "dataflow" => Ok(Self::Dataflow),
            other => Err(format!("unknown mining mode `{other}` (expected comm or dataflow)")),
        }
    }
}

/// Parameters shared by every job of a run.
///
/// `k_min <= k_max` is not checked here; out-of-range values are passed
/// through and left for the mining tool to reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningParameters {
    pub k_min: i64,
    pub k_max: i64,
    pub samples: u64,
    pub mode: MiningMode,
    /// Exhaustive subgraph search instead of sampling.
    #[serde(default)]
    pub exact: bool,
}

impl MiningParameters {
    pub fn new(k_min: i64, k_max: i64, samples: u64) -> Self {
        Self {
            k_min,
            k_max,
            samples,
            mode: MiningMode::default(),
            exact: false,
        }
    }

    pub fn with_mode(mut self, mode: MiningMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_name_creation() {
        let name = TargetName::new("adder");
        assert_eq!(name.as_str(), "adder");
        assert_eq!(name.to_string(), "adder");
    }

    #[test]
    fn test_target_name_serde() {
        let name = TargetName::new("qft_8q.qasm");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"qft_8q.qasm\"");

        let parsed: TargetName = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, name);
    }

    #[test]
    fn test_mining_mode_parse() {
        assert_eq!("comm".parse::<MiningMode>().unwrap(), MiningMode::Comm);
        assert_eq!("DataFlow".parse::<MiningMode>().unwrap(), MiningMode::Dataflow);
        assert!("graph".parse::<MiningMode>().is_err());
    }

    #[test]
    fn test_mining_mode_default_is_comm() {
        assert_eq!(MiningMode::default(), MiningMode::Comm);
        assert_eq!(MiningMode::default().to_string(), "comm");
    }

    #[test]
    fn test_mining_mode_serde_lowercase() {
        let json = serde_json::to_string(&MiningMode::Dataflow).unwrap();
        assert_eq!(json, "\"dataflow\"");
    }

    #[test]
    fn test_parameters_are_copied_by_value() {
        let shared = MiningParameters::new(2, 3, DEFAULT_SAMPLES);
        let mut view = shared;
        view.samples = 10;
        assert_eq!(shared.samples, DEFAULT_SAMPLES);
        assert_eq!(view.samples, 10);
    }
}
