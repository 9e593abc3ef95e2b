use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use commpat_orchestrator::{
    AllocationContext, AllocationDescriptor, BatchPreamble, DispatchEvent, ExecutionPlan,
    FATAL_EXIT_CODE, MailPolicy, MiningMode, Orchestrator, OrchestratorConfig, exit_code_for,
    render_batch_script,
};

#[derive(Parser)]
#[command(name = "commpat-orchestrator")]
#[command(about = "Batch driver for the circuit communication-pattern miner")]
struct Cli {
    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Commands,
}

/// Flags layered over the config file.
#[derive(Args)]
struct ConfigOverrides {
    /// Path to the orchestrator JSON config
    #[arg(long, global = true, env = "COMMPAT_CONFIG")]
    config: Option<PathBuf>,
    /// Directory holding one subdirectory per benchmark
    #[arg(long, global = true, env = "COMMPAT_BENCHMARK_ROOT")]
    benchmark_root: Option<PathBuf>,
    /// Interpreter used to run the mining script
    #[arg(long, global = true, env = "COMMPAT_INTERPRETER")]
    interpreter: Option<String>,
    /// Mining script path
    #[arg(long, global = true, env = "COMMPAT_SCRIPT")]
    script: Option<PathBuf>,
    /// Analysis mode passed to the miner (comm, dataflow)
    #[arg(long, global = true)]
    mode: Option<MiningMode>,
    /// Ask the miner for exhaustive search instead of sampling
    #[arg(long, global = true, overrides_with = "no_exact")]
    exact: bool,
    /// Sample even when the config file sets `exact`
    #[arg(long, global = true, overrides_with = "exact")]
    no_exact: bool,
    /// Cap on concurrently running jobs in run-bench (default: no cap)
    #[arg(long, global = true)]
    max_parallel: Option<NonZeroUsize>,
    /// Write a JSON run report to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,
    /// Print the planned commands without running them
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine every benchmark (or the named ones) one after another:
    /// <k_min> <k_max> [samples] [target_name ...]
    RunAll {
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,
    },
    /// Mine every circuit file of one benchmark in parallel:
    /// <benchmark_name> <k_min> <k_max> [samples]
    RunBench {
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,
    },
    /// Print a Slurm batch script that runs this orchestrator
    SubmitScript {
        #[arg(long, default_value = "commpat-mining")]
        job_name: String,
        #[arg(long)]
        account: Option<String>,
        #[arg(long)]
        partition: Option<String>,
        #[arg(long, default_value = "12:00:00")]
        time: String,
        #[arg(long, default_value_t = 1)]
        nodes: u32,
        #[arg(long, default_value_t = 1)]
        cores: u32,
        #[arg(long, default_value = "16G")]
        mem: String,
        #[arg(long, default_value = "none")]
        mail_type: MailPolicy,
        #[arg(long)]
        mail_user: Option<String>,
        /// Directory to cd into before running
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Environment activation line, e.g. "source .venv/bin/activate"
        #[arg(long)]
        activate: Option<String>,
        /// Orchestrator arguments to run inside the allocation
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        invocation: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(clap_exit_code(&e));
        }
    };

    if let Err(e) = init_tracing() {
        eprintln!("Error: failed to initialise logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(exit_code_for(&e) as u8)
        }
    }
}

/// Help and version output exit 0; every real parse error is a usage
/// error and shares the planning failures' exit code.
fn clap_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        FATAL_EXIT_CODE as u8
    } else {
        0
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("commpat_orchestrator=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    AllocationContext::from_env().log();

    match cli.command {
        Commands::RunAll { args } => {
            let orchestrator = build_orchestrator(&cli.overrides)?;
            let plan = orchestrator.plan_all(&args)?;
            execute(orchestrator, plan, &cli.overrides).await;
        }
        Commands::RunBench { args } => {
            let orchestrator = build_orchestrator(&cli.overrides)?;
            let plan = orchestrator.plan_benchmark(&args)?;
            execute(orchestrator, plan, &cli.overrides).await;
        }
        Commands::SubmitScript {
            job_name,
            account,
            partition,
            time,
            nodes,
            cores,
            mem,
            mail_type,
            mail_user,
            workdir,
            activate,
            invocation,
        } => {
            let alloc = AllocationDescriptor {
                job_name,
                account,
                partition,
                time_limit: time,
                nodes,
                cores,
                memory: mem,
                mail_policy: mail_type,
                mail_user,
            };
            let preamble = BatchPreamble {
                working_dir: workdir,
                activate,
            };
            let mut command = vec!["commpat-orchestrator".to_string()];
            command.extend(invocation);
            print!("{}", render_batch_script(&alloc, &preamble, &command));
        }
    }

    Ok(())
}

fn build_orchestrator(overrides: &ConfigOverrides) -> Result<Orchestrator> {
    let orchestrator = Orchestrator::new(load_config(overrides)?);
    let config = orchestrator.config();
    info!(
        "Using benchmark root {} and miner `{} {}`",
        config.benchmark_root.display(),
        config.interpreter,
        config.script.display()
    );
    Ok(orchestrator)
}

/// Config file first, then CLI and environment overrides.
fn load_config(overrides: &ConfigOverrides) -> Result<OrchestratorConfig> {
    let config = match &overrides.config {
        Some(path) => OrchestratorConfig::load_from(path)?,
        None => OrchestratorConfig::load()?,
    };
    Ok(apply_overrides(config, overrides))
}

fn apply_overrides(mut config: OrchestratorConfig, overrides: &ConfigOverrides) -> OrchestratorConfig {
    if let Some(root) = &overrides.benchmark_root {
        config.benchmark_root = root.clone();
    }
    if let Some(interpreter) = &overrides.interpreter {
        config.interpreter = interpreter.clone();
    }
    if let Some(script) = &overrides.script {
        config.script = script.clone();
    }
    if let Some(mode) = overrides.mode {
        config.mode = mode;
    }
    if overrides.exact {
        config.exact = true;
    } else if overrides.no_exact {
        config.exact = false;
    }
    if overrides.max_parallel.is_some() {
        config.max_parallel = overrides.max_parallel;
    }
    config
}

/// Run the plan. Nothing here affects the exit code: once jobs are
/// planned the orchestrator always exits 0.
async fn execute(orchestrator: Orchestrator, plan: ExecutionPlan, overrides: &ConfigOverrides) {
    if overrides.dry_run {
        println!("Dry run: {} job(s) planned", plan.jobs.len());
        for job in &plan.jobs {
            println!("  {}", job.command_line());
        }
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let console = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let orchestrator = orchestrator.with_events(tx);
    let report = orchestrator.execute(plan).await;
    // Closes the channel so the console drains and stops
    drop(orchestrator);
    if let Err(e) = console.await {
        warn!("Progress printer stopped early: {}", e);
    }

    println!("{}", report.summary());

    for failed in report.failed() {
        println!("  FAILED {} ({})", failed.target, failed.status_label());
    }

    if let Some(path) = &overrides.report {
        match report.write_json(path) {
            Ok(()) => info!("Wrote run report to {}", path.display()),
            Err(e) => warn!("Failed to write run report to {}: {}", path.display(), e),
        }
    }
}

fn print_event(event: &DispatchEvent) {
    match event {
        DispatchEvent::JobStarted { job_id, total, target } => {
            println!("[{}/{}] Starting {}", job_id, total, target)
        }
        DispatchEvent::Launched { count } => println!("Launched {} job(s)", count),
        DispatchEvent::JobFinished { total, outcome } => println!(
            "[{}/{}] Finished {} ({})",
            outcome.job_id,
            total,
            outcome.target,
            outcome.status_label()
        ),
    }
}
