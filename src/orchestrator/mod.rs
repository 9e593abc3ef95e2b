//! Orchestrator: turns raw CLI arguments into an execution plan and runs it.
//!
//! All fatal conditions (usage errors, missing root, missing benchmark, no
//! targets) are raised while planning, before any mining process starts.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::OrchestratorConfig;
use crate::dispatch::{DispatchEvent, DispatchMode, Dispatcher, JobRunner, ProcessRunner, RunReport};
use crate::error::PlanResult;
use crate::plan::{self, Job, JobBuilder};
use crate::types::{MiningParameters, TargetName};

/// Jobs to run and how to run them. Built once per invocation.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub mode: DispatchMode,
    pub params: MiningParameters,
    pub jobs: Vec<Job>,
    /// Explicit targets that were requested but not found.
    pub skipped: Vec<TargetName>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    builder: JobBuilder,
    dispatcher: Dispatcher,
}

impl Orchestrator {
    /// Orchestrator that runs the mining tool as real child processes.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner::new()))
    }

    pub fn with_runner(config: OrchestratorConfig, runner: Arc<dyn JobRunner>) -> Self {
        let builder = JobBuilder::from_config(&config);
        Self {
            config,
            builder,
            dispatcher: Dispatcher::new(runner),
        }
    }

    /// Forward dispatch progress events to `sender`.
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<DispatchEvent>) -> Self {
        self.dispatcher = self.dispatcher.with_events(sender);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn benchmark_root(&self) -> &PathBuf {
        &self.config.benchmark_root
    }

    /// Plan for `<k_min> <k_max> [samples] [target_name ...]`: one job per
    /// benchmark directory, run sequentially.
    pub fn plan_all(&self, args: &[String]) -> PlanResult<ExecutionPlan> {
        let resolved = plan::resolve_run_args(args, self.config.default_samples)?;
        let params = resolved.parameters(self.config.mode, self.config.exact);

        let enumeration = plan::enumerate_benchmarks(self.benchmark_root(), &resolved.targets)?;
        let jobs = self.builder.build_all(enumeration.targets, params);

        info!(
            "Planned {} sequential job(s) (k_min={}, k_max={}, samples={}, mode={})",
            jobs.len(),
            params.k_min,
            params.k_max,
            params.samples,
            params.mode
        );

        Ok(ExecutionPlan {
            mode: DispatchMode::Sequential,
            params,
            jobs,
            skipped: enumeration.skipped,
        })
    }

    /// Plan for `<benchmark_name> <k_min> <k_max> [samples]`: one job per
    /// matching circuit file, run as a fork-join batch.
    pub fn plan_benchmark(&self, args: &[String]) -> PlanResult<ExecutionPlan> {
        let resolved = plan::resolve_benchmark_args(args, self.config.default_samples)?;
        let params = resolved.parameters(self.config.mode, self.config.exact);

        let dir = plan::benchmark_dir(self.benchmark_root(), &resolved.benchmark)?;
        let targets = plan::enumerate_circuit_files(&dir, &self.config.file_suffix)?;
        let jobs = self.builder.build_all(targets, params);

        info!(
            "Planned {} parallel job(s) for benchmark `{}` (k_min={}, k_max={}, samples={}, mode={})",
            jobs.len(),
            resolved.benchmark,
            params.k_min,
            params.k_max,
            params.samples,
            params.mode
        );

        Ok(ExecutionPlan {
            mode: DispatchMode::Parallel {
                max_parallel: self.config.max_parallel,
            },
            params,
            jobs,
            skipped: Vec::new(),
        })
    }

    pub async fn execute(&self, plan: ExecutionPlan) -> RunReport {
        let report = self.dispatcher.dispatch(plan.mode, plan.jobs).await;
        info!("Run {} complete: {}", report.run_id, report.summary());
        report
    }
}
