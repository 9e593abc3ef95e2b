// Job execution: the narrow seam between the orchestrator and the mining tool

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use crate::plan::Job;
use crate::types::TargetName;

/// Runs one job to completion and reports how it ended.
///
/// Implementations never fail: spawn and wait errors are folded into the
/// returned outcome so a bad job cannot stop the batch.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &Job) -> JobOutcome;
}

/// Runs the mining tool as a child process, inheriting stdout and stderr.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn run(&self, job: &Job) -> JobOutcome {
        let start = Instant::now();

        let mut cmd = Command::new(&job.program);
        cmd.args(&job.args)
            .envs(&job.env)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        debug!("Spawning job {}: {}", job.id, job.command_line());

        match cmd.status().await {
            Ok(status) => JobOutcome::exited(job, status.code(), status.success(), start.elapsed()),
            Err(e) => JobOutcome::spawn_failed(job, e, start.elapsed()),
        }
    }
}

/// Per-job record kept for the run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub job_id: usize,
    pub target: TargetName,
    pub path: PathBuf,
    /// `None` when the process was killed by a signal or never started.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub duration_secs: f64,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn exited(job: &Job, exit_code: Option<i32>, success: bool, elapsed: Duration) -> Self {
        Self {
            job_id: job.id,
            target: job.target.name.clone(),
            path: job.target.path.clone(),
            exit_code,
            success,
            duration_secs: elapsed.as_secs_f64(),
            error: None,
        }
    }

    pub fn spawn_failed(job: &Job, error: impl std::fmt::Display, elapsed: Duration) -> Self {
        Self::errored(job, format!("failed to start {}: {}", job.program, error), elapsed)
    }

    /// The task driving the job died (panicked or was cancelled) before it
    /// produced an outcome.
    pub fn aborted(job: &Job, reason: impl std::fmt::Display) -> Self {
        Self::errored(job, format!("job task aborted: {}", reason), Duration::ZERO)
    }

    fn errored(job: &Job, error: String, elapsed: Duration) -> Self {
        Self {
            job_id: job.id,
            target: job.target.name.clone(),
            path: job.target.path.clone(),
            exit_code: None,
            success: false,
            duration_secs: elapsed.as_secs_f64(),
            error: Some(error),
        }
    }

    /// Short status for console markers, e.g. `exit 0` or `signal`.
    pub fn status_label(&self) -> String {
        match (&self.error, self.exit_code) {
            (Some(err), _) => err.clone(),
            (None, Some(code)) => format!("exit {code}"),
            (None, None) => "terminated by signal".to_string(),
        }
    }
}
