//! Cluster scheduler integration.
//!
//! The orchestrator never negotiates resources. It can render a Slurm batch
//! script that runs one of its CLI surfaces inside an allocation, and it
//! reads the allocation's ambient environment for logging.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;

/// When the scheduler should send mail about the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailPolicy {
    #[default]
    None,
    Begin,
    End,
    Fail,
    All,
}

impl MailPolicy {
    fn as_slurm(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Begin => "BEGIN",
            Self::End => "END",
            Self::Fail => "FAIL",
            Self::All => "ALL",
        }
    }
}

impl std::str::FromStr for MailPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "begin" => Ok(Self::Begin),
            "end" => Ok(Self::End),
            "fail" => Ok(Self::Fail),
            "all" => Ok(Self::All),
            other => Err(format!("unknown mail policy `{other}`")),
        }
    }
}

/// Resources requested from the scheduler for one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationDescriptor {
    pub job_name: String,
    pub account: Option<String>,
    pub partition: Option<String>,
    /// Wall-clock ceiling in Slurm notation, e.g. `12:00:00`.
    pub time_limit: String,
    pub nodes: u32,
    pub cores: u32,
    /// Memory ceiling in Slurm notation, e.g. `64G`.
    pub memory: String,
    pub mail_policy: MailPolicy,
    pub mail_user: Option<String>,
}

impl Default for AllocationDescriptor {
    fn default() -> Self {
        Self {
            job_name: "commpat-mining".to_string(),
            account: None,
            partition: None,
            time_limit: "12:00:00".to_string(),
            nodes: 1,
            cores: 1,
            memory: "16G".to_string(),
            mail_policy: MailPolicy::None,
            mail_user: None,
        }
    }
}

/// Shell preamble run before the orchestrator inside the allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPreamble {
    pub working_dir: Option<PathBuf>,
    /// Line that activates the runtime environment, e.g. `source venv/bin/activate`.
    pub activate: Option<String>,
}

/// Render a Slurm batch script that runs `invocation` once.
pub fn render_batch_script(
    alloc: &AllocationDescriptor,
    preamble: &BatchPreamble,
    invocation: &[String],
) -> String {
    let mut script = String::from("#!/bin/bash\n");

    // Writing into a String cannot fail
    let _ = writeln!(script, "#SBATCH --job-name={}", alloc.job_name);
    if let Some(account) = &alloc.account {
        let _ = writeln!(script, "#SBATCH --account={}", account);
    }
    if let Some(partition) = &alloc.partition {
        let _ = writeln!(script, "#SBATCH --partition={}", partition);
    }
    let _ = writeln!(script, "#SBATCH --time={}", alloc.time_limit);
    let _ = writeln!(script, "#SBATCH --nodes={}", alloc.nodes);
    let _ = writeln!(script, "#SBATCH --cpus-per-task={}", alloc.cores);
    let _ = writeln!(script, "#SBATCH --mem={}", alloc.memory);
    let _ = writeln!(script, "#SBATCH --mail-type={}", alloc.mail_policy.as_slurm());
    if let Some(user) = &alloc.mail_user {
        let _ = writeln!(script, "#SBATCH --mail-user={}", user);
    }

    script.push('\n');
    if let Some(dir) = &preamble.working_dir {
        let _ = writeln!(script, "cd {}", shell_quote(&dir.to_string_lossy()));
    }
    if let Some(activate) = &preamble.activate {
        let _ = writeln!(script, "{}", activate);
    }

    let command = invocation
        .iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ");
    let _ = writeln!(script, "{}", command);
    script
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// What the scheduler tells us about the allocation we are running in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationContext {
    pub job_id: Option<String>,
    pub nodes: Option<u32>,
    pub cpus_on_node: Option<u32>,
    pub submit_dir: Option<PathBuf>,
}

impl AllocationContext {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            job_id: lookup("SLURM_JOB_ID"),
            nodes: lookup("SLURM_JOB_NUM_NODES").and_then(|v| v.parse().ok()),
            cpus_on_node: lookup("SLURM_CPUS_ON_NODE").and_then(|v| v.parse().ok()),
            submit_dir: lookup("SLURM_SUBMIT_DIR").map(PathBuf::from),
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.job_id.is_some()
    }

    pub fn log(&self) {
        if !self.is_allocated() {
            tracing::debug!("No scheduler allocation detected");
            return;
        }
        tracing::info!(
            job_id = self.job_id.as_deref(),
            "Running inside allocation (nodes={:?}, cpus_on_node={:?}, submit_dir={:?})",
            self.nodes,
            self.cpus_on_node,
            self.submit_dir
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_batch_script() {
        let alloc = AllocationDescriptor {
            account: Some("qc-lab".to_string()),
            partition: Some("cpu".to_string()),
            time_limit: "24:00:00".to_string(),
            cores: 32,
            memory: "128G".to_string(),
            mail_policy: MailPolicy::End,
            mail_user: Some("me@example.org".to_string()),
            ..Default::default()
        };
        let preamble = BatchPreamble {
            working_dir: Some(PathBuf::from("/scratch/commpat")),
            activate: Some("source .venv/bin/activate".to_string()),
        };
        let invocation: Vec<String> = ["commpat-orchestrator", "run-bench", "adder", "2", "4"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let script = render_batch_script(&alloc, &preamble, &invocation);
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "#!/bin/bash");
        assert!(lines.contains(&"#SBATCH --account=qc-lab"));
        assert!(lines.contains(&"#SBATCH --partition=cpu"));
        assert!(lines.contains(&"#SBATCH --time=24:00:00"));
        assert!(lines.contains(&"#SBATCH --cpus-per-task=32"));
        assert!(lines.contains(&"#SBATCH --mem=128G"));
        assert!(lines.contains(&"#SBATCH --mail-type=END"));
        assert!(lines.contains(&"#SBATCH --mail-user=me@example.org"));
        assert!(lines.contains(&"cd /scratch/commpat"));
        assert_eq!(lines[lines.len() - 2], "source .venv/bin/activate");
        assert_eq!(lines[lines.len() - 1], "commpat-orchestrator run-bench adder 2 4");
    }

    #[test]
    fn test_render_omits_unset_fields() {
        let script = render_batch_script(
            &AllocationDescriptor::default(),
            &BatchPreamble::default(),
            &["commpat-orchestrator".to_string()],
        );
        assert!(!script.contains("--account"));
        assert!(!script.contains("--partition"));
        assert!(!script.contains("--mail-user"));
        assert!(!script.contains("cd "));
        assert!(script.contains("#SBATCH --mail-type=NONE"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("adder"), "adder");
        assert_eq!(shell_quote("my bench"), "'my bench'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_allocation_context_from_lookup() {
        let ctx = AllocationContext::from_lookup(|name| match name {
            "SLURM_JOB_ID" => Some("81234".to_string()),
            "SLURM_JOB_NUM_NODES" => Some("1".to_string()),
            "SLURM_CPUS_ON_NODE" => Some("48".to_string()),
            "SLURM_SUBMIT_DIR" => Some("/home/u/commpat".to_string()),
            _ => None,
        });
        assert!(ctx.is_allocated());
        assert_eq!(ctx.cpus_on_node, Some(48));
        assert_eq!(ctx.submit_dir, Some(PathBuf::from("/home/u/commpat")));

        let none = AllocationContext::from_lookup(|_| None);
        assert!(!none.is_allocated());
        assert_eq!(none, AllocationContext::default());
    }

    #[test]
    fn test_mail_policy_parse() {
        assert_eq!("FAIL".parse::<MailPolicy>().unwrap(), MailPolicy::Fail);
        assert!("sometimes".parse::<MailPolicy>().is_err());
    }
}
