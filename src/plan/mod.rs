//! Plan construction: argument resolution, target discovery and job
//! building. Nothing in here launches a process.

pub mod enumerator;
pub mod job;
pub mod resolver;

pub use enumerator::{
    Enumeration, Target, TargetKind, benchmark_dir, enumerate_benchmarks, enumerate_circuit_files,
};
pub use job::{Job, JobBuilder};
pub use resolver::{
    ResolvedArgs, ResolvedBenchmarkArgs, is_all_digits, resolve_benchmark_args, resolve_run_args,
};
