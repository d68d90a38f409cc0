//! Command-line surface: argument parsing, routing, and output shaping.
//! No reconciliation logic lives here; commands dispatch into the library.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::json;

use crate::config::ModuleConfig;
use crate::convergence::send_result;
use crate::error::RunError;
use crate::git::Git;
use crate::logging::LoggingConfig;
use crate::runner::{run_module, RunOptions, RunStatus};

#[derive(Debug, Parser)]
#[command(name = "runledger", version, about = "Run versioned modules and reconcile their results into git run-ledgers")]
pub struct Cli {
    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format override ("text" or "json").
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Suppress all logging.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Shortcut for --log-level debug.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clone a module, execute its entrypoint, and reconcile the results.
    Run {
        /// Module location: local directory or clonable git URL.
        module: String,

        /// Workdir for the ephemeral clone (temporary when omitted).
        workdir: Option<PathBuf>,

        /// Ledger repository path (defaults to <module>/runs).
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Upstream branch to pin the run to.
        #[arg(long)]
        upstream_branch: Option<String>,

        /// Lock acquisition timeout, seconds.
        #[arg(long)]
        lock_timeout: Option<u64>,

        /// Entrypoint execution timeout, seconds.
        #[arg(long)]
        execution_timeout: Option<u64>,

        /// Keep the workdir after the run.
        #[arg(long)]
        keep_workdir: bool,

        /// Print the run report as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Deliver an existing run commit according to a refspec
    /// (`remote[/[src][:dst]][!]`; trailing `!` selects pull-mode delivery).
    Send {
        /// Destination refspec.
        refspec: String,

        /// The commit to deliver.
        run_commit: String,

        /// Repository to send from (default: current directory).
        #[arg(long, default_value = ".")]
        repo: PathBuf,
    },
}

/// Logging configuration. Precedence: CLI flags over the module's
/// `runledger.toml` over defaults.
pub fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = base_logging_config(&cli.command);
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if cli.quiet {
        config.level = "off".to_string();
    }
    if let Some(level) = &cli.log_level {
        config.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.format = format.clone();
    }
    config
}

/// Module-level logging defaults for `run` against a local module. An
/// unreadable or invalid config falls back to defaults here; `run_module`
/// reports it properly later.
fn base_logging_config(command: &Commands) -> LoggingConfig {
    if let Commands::Run { module, .. } = command {
        let path = Path::new(module);
        if path.is_dir() {
            if let Ok(config) = ModuleConfig::load(path) {
                return config.logging;
            }
        }
    }
    LoggingConfig::default()
}

/// Execute a parsed command; returns the text to print on stdout.
pub fn execute(command: &Commands) -> Result<String, RunError> {
    match command {
        Commands::Run {
            module,
            workdir,
            ledger,
            upstream_branch,
            lock_timeout,
            execution_timeout,
            keep_workdir,
            json,
        } => {
            let opts = RunOptions {
                module: module.clone(),
                workdir: workdir.clone(),
                ledger: ledger.clone(),
                upstream_branch: upstream_branch.clone(),
                lock_timeout_s: *lock_timeout,
                execution_timeout_s: *execution_timeout,
                keep_workdir: *keep_workdir,
            };
            let report = run_module(&opts)?;

            if *json {
                let status = match &report.status {
                    RunStatus::Success => json!({"kind": "success"}),
                    RunStatus::Failure(code) => json!({"kind": "failure", "exit_code": code}),
                };
                let out = json!({
                    "status": status,
                    "base": report.base,
                    "run_commit": report.run_commit,
                    "ledger_tip": report.ledger_tip,
                    "state_commit": report.state_commit,
                    "message": report.message,
                    "workdir": report.workdir,
                });
                return Ok(serde_json::to_string_pretty(&out).unwrap_or_default());
            }

            let mut lines = vec![
                format!("run:    {} ({})", report.run_commit, report.message),
                format!("base:   {}", report.base),
                format!("ledger: {}", report.ledger_tip),
            ];
            match &report.state_commit {
                Some(sha) => lines.push(format!("state:  {sha}")),
                None => lines.push("state:  (unchanged)".to_string()),
            }
            if let Some(dir) = &report.workdir {
                lines.push(format!("workdir: {}", dir.display()));
            }
            if let RunStatus::Failure(code) = report.status {
                lines.push(format!("entrypoint failed with exit code {code}"));
            }
            Ok(lines.join("\n"))
        }

        Commands::Send {
            refspec,
            run_commit,
            repo,
        } => {
            let repo = Git::open(repo.as_path());
            send_result(&repo, refspec.as_str(), run_commit)?;
            Ok(format!("sent {run_commit} to {refspec}"))
        }
    }
}

/// Process exit code for an error: failed runs and delivery conflicts get
/// distinct codes so orchestrators can tell them apart.
pub fn exit_code(err: &RunError) -> i32 {
    match err {
        RunError::MergeConflict { .. } => 3,
        RunError::LockTimeout { .. } | RunError::ExecutionTimeout { .. } => 4,
        _ => 1,
    }
}
