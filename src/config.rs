use serde::Deserialize;
use std::{collections::BTreeMap, env, fs, num::NonZeroUsize, path::PathBuf};

use crate::error::OrchestratorError;
use crate::types::{DEFAULT_SAMPLES, MiningMode};

/// On-disk orchestrator configuration.
///
/// Every field has a default so a partial file (or no file at all) is valid.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Interpreter used to run the mining script.
    pub interpreter: String,
    /// Path of the mining script handed to the interpreter.
    pub script: PathBuf,
    /// Directory holding one subdirectory per benchmark.
    #[serde(rename = "benchmarkRoot")]
    pub benchmark_root: PathBuf,
    /// Where the mining tool writes its results. Informational only.
    #[serde(rename = "resultsDir")]
    pub results_dir: PathBuf,
    /// Suffix a file must carry to be mined in single-benchmark mode.
    #[serde(rename = "fileSuffix")]
    pub file_suffix: String,
    #[serde(rename = "defaultSamples")]
    pub default_samples: u64,
    pub mode: MiningMode,
    pub exact: bool,
    /// Cap on concurrently running jobs in parallel mode. `None` launches all;
    /// zero is rejected at parse time.
    #[serde(rename = "maxParallel")]
    pub max_parallel: Option<NonZeroUsize>,
    /// Extra environment passed to every mining process.
    pub env: BTreeMap<String, String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            script: PathBuf::from("pattern_miner.py"),
            benchmark_root: PathBuf::from("benchmarks"),
            results_dir: PathBuf::from("results"),
            file_suffix: ".qasm".to_string(),
            default_samples: DEFAULT_SAMPLES,
            mode: MiningMode::Comm,
            exact: false,
            max_parallel: None,
            env: BTreeMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Load the config from the resolved path, or fall back to defaults
    /// when no config file exists.
    pub fn load() -> anyhow::Result<Self> {
        match resolve_config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::debug!("No orchestrator config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let cfg = Self::from_json(&raw).map_err(|e| {
            OrchestratorError::Config(format!("invalid config {}: {}", path.display(), e))
        })?;
        tracing::info!("Loaded orchestrator config from {}", path.display());
        Ok(cfg)
    }

    /// Parse a JSON document and expand `${VAR}` references from the
    /// process environment.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        Ok(cfg.expand_with(|name| env::var(name).ok()))
    }

    fn expand_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        self.interpreter = expand_env_vars(&self.interpreter, &lookup);
        self.script = expand_path(&self.script, &lookup);
        self.benchmark_root = expand_path(&self.benchmark_root, &lookup);
        self.results_dir = expand_path(&self.results_dir, &lookup);
        for val in self.env.values_mut() {
            *val = expand_env_vars(val, &lookup);
        }
        self
    }
}

/// Find the config file: `$COMMPAT_CONFIG`, then
/// `$XDG_CONFIG_HOME/commpat/orchestrator.json`, then `./commpat.json`.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("COMMPAT_CONFIG") {
        return Some(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("commpat").join("orchestrator.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("commpat.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

fn expand_path<F>(path: &std::path::Path, lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    PathBuf::from(expand_env_vars(&path.to_string_lossy(), lookup))
}

/// Replace `${NAME}` with the looked-up value; unknown names stay verbatim.
fn expand_env_vars<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Some(val) = lookup(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}
