//! Module configuration and workdir layout.
//!
//! A module declares its runtime surface through plain files at its root:
//! `STATE` and `OUT` are newline-separated path lists, `_MSG` is an optional
//! commit message consumed by the commit step, and `runledger.toml` can
//! override entrypoint and branch names, timeouts, and logging.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RunError;
use crate::logging::LoggingConfig;

/// Default entrypoint script at the module root.
pub const RUN_SCRIPT: &str = "run.sh";
/// Default ledger repository directory inside a local module.
pub const RUNS_DIR: &str = "runs";
/// Remote name registered in the workdir for the ledger repository.
pub const RUNS_REMOTE: &str = "runs";
/// Ledger branch name.
pub const RUNS_BRANCH: &str = "runs";
/// Path-list file of state paths to mirror into the upstream branch.
pub const STATE_FILE: &str = "STATE";
/// Path-list file of extra artifact paths to include in the run commit.
pub const OUT_FILE: &str = "OUT";
/// Success sentinel (empty file).
pub const SUCCESS_PATH: &str = "SUCCESS";
/// Failure sentinel (contains the exit code).
pub const FAILURE_PATH: &str = "FAILURE";
/// Captured entrypoint output directory.
pub const LOGS_DIR: &str = "logs";
pub const OUT_LOG: &str = "out";
pub const ERR_LOG: &str = "err";
/// Commit message file, consumed and deleted by the commit step.
pub const MSG_FILE: &str = "_MSG";
/// Optional per-module configuration file.
pub const CONFIG_FILE: &str = "runledger.toml";
/// Timestamp format used in generated commit messages.
pub const TIMESTAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S";

pub const DEFAULT_LOCK_TIMEOUT_S: u64 = 600;
pub const DEFAULT_EXECUTION_TIMEOUT_S: u64 = 3600;

/// Per-module configuration, loaded from `runledger.toml` when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Entrypoint script, relative to the module root.
    #[serde(default = "default_entrypoint")]
    pub entrypoint: String,

    /// Branch name for the runs ledger.
    #[serde(default = "default_ledger_branch")]
    pub ledger_branch: String,

    /// Upstream branch to pin runs to; defaults to the remote's HEAD branch.
    #[serde(default)]
    pub upstream_branch: Option<String>,

    /// Lock acquisition timeout in seconds.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_s: u64,

    /// Entrypoint execution timeout in seconds.
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_s: u64,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_entrypoint() -> String {
    RUN_SCRIPT.to_string()
}

fn default_ledger_branch() -> String {
    RUNS_BRANCH.to_string()
}

fn default_lock_timeout() -> u64 {
    DEFAULT_LOCK_TIMEOUT_S
}

fn default_execution_timeout() -> u64 {
    DEFAULT_EXECUTION_TIMEOUT_S
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            entrypoint: default_entrypoint(),
            ledger_branch: default_ledger_branch(),
            upstream_branch: None,
            lock_timeout_s: default_lock_timeout(),
            execution_timeout_s: default_execution_timeout(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ModuleConfig {
    /// Load `runledger.toml` from `dir`, falling back to defaults when the
    /// file is absent. A present-but-invalid file is an error.
    pub fn load(dir: &Path) -> Result<Self, RunError> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)?;
        toml::from_str(&text).map_err(|e| RunError::Config {
            path,
            detail: e.to_string(),
        })
    }
}

/// Read a newline-separated path list (`STATE` / `OUT`). A missing file is an
/// empty list; blank lines are skipped.
pub fn load_path_list(path: &Path) -> Result<Vec<PathBuf>, RunError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}
