// Core modules
pub mod cluster;
mod config;
pub mod dispatch;
mod error;
pub mod plan;
pub mod types;

mod orchestrator;

// Re-export key types and functions
pub use cluster::{AllocationContext, AllocationDescriptor, BatchPreamble, MailPolicy, render_batch_script};
pub use config::{OrchestratorConfig, resolve_config_path};
pub use dispatch::{DispatchEvent, DispatchMode, Dispatcher, JobOutcome, JobRunner, ProcessRunner, RunReport};
pub use error::{FATAL_EXIT_CODE, OrchestratorError, PlanResult, exit_code_for};
pub use orchestrator::{ExecutionPlan, Orchestrator};
pub use plan::{Job, JobBuilder, Target, TargetKind};
pub use types::{BenchmarkName, DEFAULT_SAMPLES, MiningMode, MiningParameters, TargetName};
