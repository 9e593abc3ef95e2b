// Job dispatch: sequential and fork-join

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::executor::{JobOutcome, JobRunner};
use super::report::RunReport;
use crate::plan::Job;
use crate::types::TargetName;

/// How a plan's jobs are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchMode {
    /// One job at a time, in plan order.
    Sequential,
    /// All jobs at once, then wait for every one of them.
    /// `max_parallel` caps in-flight jobs; `None` launches everything.
    Parallel { max_parallel: Option<NonZeroUsize> },
}

/// Progress messages sent while a dispatch is running.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// A sequential job is about to start.
    JobStarted {
        job_id: usize,
        total: usize,
        target: TargetName,
    },
    /// Every parallel job has been spawned; sent before the join begins.
    Launched { count: usize },
    JobFinished { total: usize, outcome: JobOutcome },
}

/// Executes job lists through a `JobRunner`.
pub struct Dispatcher {
    runner: Arc<dyn JobRunner>,
    events: Option<mpsc::UnboundedSender<DispatchEvent>>,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self { runner, events: None }
    }

    /// Send progress events to `sender` during every dispatch.
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<DispatchEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    fn emit(&self, event: DispatchEvent) {
        if let Some(sender) = &self.events {
            // Receiver gone means nobody is listening any more
            let _ = sender.send(event);
        }
    }

    pub async fn dispatch(&self, mode: DispatchMode, jobs: Vec<Job>) -> RunReport {
        match mode {
            DispatchMode::Sequential => self.run_sequential(jobs).await,
            DispatchMode::Parallel { max_parallel } => self.run_parallel(jobs, max_parallel).await,
        }
    }

    /// Run jobs in order, each one finishing before the next starts.
    /// A failing job is recorded and the batch continues.
    pub async fn run_sequential(&self, jobs: Vec<Job>) -> RunReport {
        let started_at = Utc::now();
        let total = jobs.len();
        let mut outcomes = Vec::with_capacity(total);

        for job in &jobs {
            debug!("Starting job {}/{} ({})", job.id, total, job.target.name);
            self.emit(DispatchEvent::JobStarted {
                job_id: job.id,
                total,
                target: job.target.name.clone(),
            });

            let outcome = self.runner.run(job).await;
            self.finish(total, &outcome);
            outcomes.push(outcome);
        }

        RunReport::new(DispatchMode::Sequential, started_at, total, outcomes)
    }

    /// Launch every job, report the launched count, then wait for all of
    /// them regardless of exit status. There is no cancellation.
    pub async fn run_parallel(&self, jobs: Vec<Job>, max_parallel: Option<NonZeroUsize>) -> RunReport {
        let started_at = Utc::now();
        let semaphore = max_parallel.map(|limit| Arc::new(Semaphore::new(limit.get())));
        let mut tasks = JoinSet::new();
        // Jobs whose task has not returned an outcome yet
        let mut pending: BTreeMap<usize, Job> = BTreeMap::new();

        for job in jobs {
            pending.insert(job.id, job.clone());
            let runner = self.runner.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                // Hold the permit until the process exits
                let _permit = match semaphore {
                    Some(s) => s.acquire_owned().await.ok(),
                    None => None,
                };
                runner.run(&job).await
            });
        }

        let launched = tasks.len();
        match max_parallel {
            Some(limit) => info!(launched, "Launched {} job(s), at most {} running at once", launched, limit),
            None => info!(launched, "Launched {} job(s)", launched),
        }
        self.emit(DispatchEvent::Launched { count: launched });

        let mut outcomes: Vec<JobOutcome> = Vec::with_capacity(launched);
        let mut aborted: Vec<String> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    pending.remove(&outcome.job_id);
                    self.finish(launched, &outcome);
                    outcomes.push(outcome);
                }
                Err(e) => {
                    warn!("Job task aborted: {}", e);
                    aborted.push(e.to_string());
                }
            }
        }

        // A task that died took its job with it; whatever is left in
        // `pending` never produced an outcome.
        let mut reasons = aborted.into_iter();
        for job in pending.values() {
            let reason = reasons.next().unwrap_or_else(|| "no outcome returned".to_string());
            let outcome = JobOutcome::aborted(job, reason);
            self.finish(launched, &outcome);
            outcomes.push(outcome);
        }

        RunReport::new(DispatchMode::Parallel { max_parallel }, started_at, launched, outcomes)
    }

    fn finish(&self, total: usize, outcome: &JobOutcome) {
        debug!("Job {} ({}) finished: {}", outcome.job_id, outcome.target, outcome.status_label());
        if !outcome.success {
            warn!("Job {} ({}) did not succeed: {}", outcome.job_id, outcome.target, outcome.status_label());
        }
        self.emit(DispatchEvent::JobFinished {
            total,
            outcome: outcome.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{JobBuilder, Target};
    use crate::types::MiningParameters;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records start/end events and tracks how many jobs overlap.
    #[derive(Default)]
    struct RecordingRunner {
        events: Mutex<Vec<String>>,
        running: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
        finished: AtomicUsize,
        fail_target: Option<&'static str>,
    }

    #[async_trait]
    impl JobRunner for RecordingRunner {
        async fn run(&self, job: &Job) -> JobOutcome {
            self.events.lock().unwrap().push(format!("start {}", job.target.name));
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(20)).await;

            self.running.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().push(format!("end {}", job.target.name));

            let failed = self.fail_target == Some(job.target.name.as_str());
            JobOutcome::exited(job, Some(if failed { 1 } else { 0 }), !failed, Duration::from_millis(20))
        }
    }

    fn jobs(names: &[&str]) -> Vec<Job> {
        let targets = names
            .iter()
            .map(|n| Target::benchmark(*n, format!("bench/{n}")))
            .collect();
        JobBuilder::new("python3", "miner.py").build_all(targets, MiningParameters::new(2, 3, 2000))
    }

    #[tokio::test]
    async fn test_sequential_strict_ordering() {
        let runner = Arc::new(RecordingRunner::default());
        let dispatcher = Dispatcher::new(runner.clone());

        let report = dispatcher.run_sequential(jobs(&["a", "b", "c"])).await;

        let events = runner.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["start a", "end a", "start b", "end b", "start c", "end c"]
        );
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
        assert_eq!(report.launched, 3);
        assert_eq!(report.mode, DispatchMode::Sequential);
    }

    #[tokio::test]
    async fn test_sequential_continues_after_failure() {
        let runner = Arc::new(RecordingRunner {
            fail_target: Some("a"),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(runner.clone());

        let report = dispatcher.run_sequential(jobs(&["a", "b"])).await;

        assert_eq!(report.outcomes.len(), 2);
        assert!(!report.outcomes[0].success);
        assert!(report.outcomes[1].success);
    }

    #[tokio::test]
    async fn test_parallel_join_waits_for_all() {
        let runner = Arc::new(RecordingRunner {
            fail_target: Some("c"),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(runner.clone());

        let report = dispatcher.run_parallel(jobs(&["a", "b", "c", "d", "e"]), None).await;

        assert_eq!(report.launched, 5);
        assert_eq!(runner.started.load(Ordering::SeqCst), 5);
        assert_eq!(runner.finished.load(Ordering::SeqCst), 5);
        assert_eq!(runner.running.load(Ordering::SeqCst), 0);
        assert_eq!(report.outcomes.len(), 5);
        assert_eq!(report.failed().count(), 1);
    }

    #[tokio::test]
    async fn test_parallel_unbounded_overlaps() {
        let runner = Arc::new(RecordingRunner::default());
        let dispatcher = Dispatcher::new(runner.clone());

        dispatcher.run_parallel(jobs(&["a", "b", "c", "d"]), None).await;

        assert!(runner.peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_parallel_cap_limits_in_flight() {
        let runner = Arc::new(RecordingRunner::default());
        let dispatcher = Dispatcher::new(runner.clone());

        let report = dispatcher
            .run_parallel(jobs(&["a", "b", "c", "d", "e", "f"]), NonZeroUsize::new(2))
            .await;

        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(runner.finished.load(Ordering::SeqCst), 6);
        assert_eq!(report.mode, DispatchMode::Parallel { max_parallel: NonZeroUsize::new(2) });
    }

    #[tokio::test]
    async fn test_parallel_zero_jobs_returns_immediately() {
        let runner = Arc::new(RecordingRunner::default());
        let dispatcher = Dispatcher::new(runner.clone());

        let report = dispatcher.run_parallel(Vec::new(), None).await;

        assert_eq!(report.launched, 0);
        assert!(report.outcomes.is_empty());
    }

    /// Blocks every job on a shared gate until the test opens it.
    struct GatedRunner {
        gate: Semaphore,
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl JobRunner for GatedRunner {
        async fn run(&self, job: &Job) -> JobOutcome {
            self.started.fetch_add(1, Ordering::SeqCst);
            let _pass = self.gate.acquire().await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            JobOutcome::exited(job, Some(0), true, Duration::ZERO)
        }
    }

    #[tokio::test]
    async fn test_parallel_reports_launch_before_join() {
        let runner = Arc::new(GatedRunner {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(runner.clone()).with_events(tx);

        let handle = tokio::spawn(async move {
            dispatcher.run_parallel(jobs(&["a", "b", "c", "d", "e"]), None).await
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first, DispatchEvent::Launched { count: 5 });
        assert_eq!(runner.finished.load(Ordering::SeqCst), 0);
        assert!(!handle.is_finished());

        runner.gate.add_permits(5);
        let report = handle.await.unwrap();
        assert_eq!(report.launched, 5);
        assert_eq!(runner.finished.load(Ordering::SeqCst), 5);

        let mut finished = 0;
        while let Some(event) = rx.recv().await {
            if let DispatchEvent::JobFinished { total, .. } = event {
                assert_eq!(total, 5);
                finished += 1;
            }
        }
        assert_eq!(finished, 5);
    }

    struct PanickingRunner {
        panic_on: &'static str,
    }

    #[async_trait]
    impl JobRunner for PanickingRunner {
        async fn run(&self, job: &Job) -> JobOutcome {
            if job.target.name.as_str() == self.panic_on {
                panic!("runner blew up on {}", job.target.name);
            }
            JobOutcome::exited(job, Some(0), true, Duration::ZERO)
        }
    }

    #[tokio::test]
    async fn test_parallel_task_panic_is_recorded_as_failure() {
        let dispatcher = Dispatcher::new(Arc::new(PanickingRunner { panic_on: "b" }));

        let report = dispatcher.run_parallel(jobs(&["a", "b", "c"]), None).await;

        assert_eq!(report.launched, 3);
        assert_eq!(report.outcomes.len(), report.launched);
        let failed: Vec<&JobOutcome> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].target, TargetName::new("b"));
        assert!(failed[0].exit_code.is_none());
        assert!(failed[0].status_label().starts_with("job task aborted"));
    }

    #[tokio::test]
    async fn test_sequential_events_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(Arc::new(RecordingRunner::default())).with_events(tx);

        dispatcher.run_sequential(jobs(&["a", "b"])).await;
        drop(dispatcher);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(match event {
                DispatchEvent::JobStarted { job_id, total, .. } => format!("start {job_id}/{total}"),
                DispatchEvent::JobFinished { outcome, .. } => format!("finish {}", outcome.job_id),
                DispatchEvent::Launched { count } => format!("launched {count}"),
            });
        }
        assert_eq!(seen, vec!["start 1/2", "finish 1", "start 2/2", "finish 2"]);
    }

    #[tokio::test]
    async fn test_dispatch_selects_mode() {
        let runner = Arc::new(RecordingRunner::default());
        let dispatcher = Dispatcher::new(runner.clone());

        let report = dispatcher.dispatch(DispatchMode::Sequential, jobs(&["a", "b"])).await;
        assert_eq!(report.mode, DispatchMode::Sequential);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
    }
}
