//! Job construction: one mining-tool invocation per target.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::enumerator::Target;
use crate::config::OrchestratorConfig;
use crate::types::MiningParameters;

/// A fully specified invocation of the mining tool.
///
/// Each job owns its own argument vector and its own copy of the
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    /// Position in the plan, starting at 1.
    pub id: usize,
    pub target: Target,
    pub params: MiningParameters,
    pub program: String,
    pub args: Vec<String>,
    #[serde(skip)]
    pub env: BTreeMap<String, String>,
}

impl Job {
    /// Shell-like rendering for logs and dry runs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Builds jobs for a fixed interpreter and mining script.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    interpreter: String,
    script: PathBuf,
    env: BTreeMap<String, String>,
}

impl JobBuilder {
    pub fn new(interpreter: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.interpreter.clone(), config.script.clone()).with_env(config.env.clone())
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// `<interpreter> <script> <path> --k-min K --k-max K --mode M --samples N [--exact]`
    pub fn build(&self, id: usize, target: Target, params: MiningParameters) -> Job {
        let mut args = vec![
            self.script.to_string_lossy().into_owned(),
            target.path.to_string_lossy().into_owned(),
            "--k-min".to_string(),
            params.k_min.to_string(),
            "--k-max".to_string(),
            params.k_max.to_string(),
            "--mode".to_string(),
            params.mode.to_string(),
            "--samples".to_string(),
            params.samples.to_string(),
        ];
        if params.exact {
            args.push("--exact".to_string());
        }

        Job {
            id,
            target,
            params,
            program: self.interpreter.clone(),
            args,
            env: self.env.clone(),
        }
    }

    /// Build one job per target, numbering them from 1.
    pub fn build_all(&self, targets: Vec<Target>, params: MiningParameters) -> Vec<Job> {
        targets
            .into_iter()
            .enumerate()
            .map(|(i, target)| self.build(i + 1, target, params))
            .collect()
    }
}
