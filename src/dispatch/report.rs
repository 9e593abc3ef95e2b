// Structured per-run report

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use super::executor::JobOutcome;
use super::scheduler::DispatchMode;

/// Everything known about a finished dispatch.
///
/// Failures recorded here never change the process exit code; the report
/// exists so they can be found without re-running the batch.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: DispatchMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub launched: usize,
    pub outcomes: Vec<JobOutcome>,
}

impl RunReport {
    pub fn new(mode: DispatchMode, started_at: DateTime<Utc>, launched: usize, mut outcomes: Vec<JobOutcome>) -> Self {
        outcomes.sort_by_key(|o| o.job_id);
        Self {
            run_id: Uuid::new_v4(),
            mode,
            started_at,
            finished_at: Utc::now(),
            launched,
            outcomes,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    pub fn summary(&self) -> String {
        let failed = self.outcomes.len() - self.succeeded();
        format!(
            "{} job(s) launched, {} succeeded, {} failed in {:.1}s",
            self.launched,
            self.succeeded(),
            failed,
            (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
        )
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
