//! Module runner: the clone → execute → commit → reconcile pipeline.
//!
//! A run never executes inside the module checkout itself. The module is
//! cloned into an ephemeral workdir, pinned to the upstream tip observed at
//! clone time, and everything the entrypoint produces is committed there with
//! that pinned revision as sole parent. Reconciliation then folds the run
//! commit into the runs ledger and its declared state paths back upstream.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{
    load_path_list, ModuleConfig, ERR_LOG, FAILURE_PATH, LOGS_DIR, MSG_FILE, OUT_FILE, OUT_LOG,
    RUNS_DIR, STATE_FILE, SUCCESS_PATH, TIMESTAMP_FMT,
};
use crate::error::{GitError, RunError};
use crate::git::{Git, Revision};
use crate::ledger::LedgerReconciler;
use crate::state::StateReconciler;

/// Remote name a fresh clone gives its source module.
const ORIGIN: &str = "origin";

/// Parameters for a single module run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Module location: a local directory or any clonable git URL.
    pub module: String,
    /// Explicit workdir; a temporary directory is created when absent.
    pub workdir: Option<PathBuf>,
    /// Ledger repository path; defaults to `<module>/runs` for local modules.
    pub ledger: Option<PathBuf>,
    /// Upstream branch override.
    pub upstream_branch: Option<String>,
    pub lock_timeout_s: Option<u64>,
    pub execution_timeout_s: Option<u64>,
    /// Keep the workdir around after the run instead of deleting it.
    pub keep_workdir: bool,
}

/// Outcome of the entrypoint process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failure(i32),
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }
}

/// Everything a completed run produced and where it went.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    /// Upstream revision the run was pinned to.
    pub base: Revision,
    /// The run commit (parent: `base`).
    pub run_commit: Revision,
    /// Ledger tip after reconciliation.
    pub ledger_tip: Revision,
    /// State commit pushed upstream, when the run changed state.
    pub state_commit: Option<Revision>,
    pub message: String,
    /// Where the run's working copy remains, when it was retained (an
    /// explicit workdir, or `keep_workdir`). `None` once a temporary
    /// workdir has been discarded.
    pub workdir: Option<PathBuf>,
}

/// Execute a module once and reconcile the result.
pub fn run_module(opts: &RunOptions) -> Result<RunReport, RunError> {
    let module_path = local_module_path(&opts.module);
    let module_url = match &module_path {
        Some(path) => path.to_string_lossy().into_owned(),
        None => opts.module.clone(),
    };

    let ledger_path = resolve_ledger(opts, module_path.as_deref())?;

    let (workdir_path, tempdir) = prepare_workdir(opts)?;
    let workdir = Git::clone_repo(&module_url, &workdir_path)?;
    ensure_identity(&workdir)?;

    let config = ModuleConfig::load(workdir.dir())?;
    let lock_timeout = Duration::from_secs(
        opts.lock_timeout_s.unwrap_or(config.lock_timeout_s),
    );
    let execution_timeout = Duration::from_secs(
        opts.execution_timeout_s.unwrap_or(config.execution_timeout_s),
    );

    if let Some(path) = &module_path {
        let module = Git::open(path.as_path());
        module.allow_pushes()?;
        // The default ledger nests inside the module; keep it invisible to it.
        if opts.ledger.is_none() {
            module.ensure_ignored(Path::new(RUNS_DIR))?;
        }
    }

    // Pin the run to the upstream tip as observed at clone time. Everything
    // downstream (classification, reparenting, state lineage) keys off this.
    let upstream = upstream_branch(&workdir, opts, &config)?;
    let upstream_ref = format!("{ORIGIN}/{upstream}");
    let base = workdir
        .sha(Some(&upstream_ref), false)?
        .ok_or_else(|| GitError::MissingRevision {
            reference: upstream_ref.clone(),
            dir: workdir.dir().to_path_buf(),
        })?;
    workdir.checkout_detached(&base)?;
    info!(module = %opts.module, upstream = %upstream, base = %base, workdir = %workdir_path.display(), "run pinned");

    let state_paths = load_path_list(&workdir_path.join(STATE_FILE))?;
    let out_paths = load_path_list(&workdir_path.join(OUT_FILE))?;

    let status = execute_entrypoint(&workdir_path, &config.entrypoint, execution_timeout)?;
    let message = run_message(&workdir_path, &status)?;
    let run_commit = commit_run(&workdir, &status, &message, &state_paths, &out_paths)?;
    info!(run = %run_commit, status = status_label(&status), "run committed");

    let ledger_tip = LedgerReconciler::new(&workdir, &ledger_path, &config.ledger_branch, lock_timeout)
        .reconcile(&base, &run_commit, &message)?;

    let state_commit = StateReconciler::new(
        &workdir,
        module_path.as_deref(),
        ORIGIN,
        &upstream,
        lock_timeout,
    )
    .reconcile(&base, &run_commit, &state_paths)?;

    let workdir_path = match tempdir {
        Some(tempdir) if opts.keep_workdir => {
            let kept = tempdir.into_path();
            info!(workdir = %kept.display(), "workdir kept");
            Some(kept)
        }
        // Dropping the guard deletes the temporary workdir.
        Some(_) => None,
        None => Some(workdir_path),
    };

    Ok(RunReport {
        status,
        base,
        run_commit,
        ledger_tip,
        state_commit,
        message,
        workdir: workdir_path,
    })
}

fn status_label(status: &RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "success",
        RunStatus::Failure(_) => "failure",
    }
}

fn local_module_path(module: &str) -> Option<PathBuf> {
    let path = Path::new(module);
    if path.is_dir() {
        fs::canonicalize(path).ok()
    } else {
        None
    }
}

fn resolve_ledger(opts: &RunOptions, module_path: Option<&Path>) -> Result<PathBuf, RunError> {
    if let Some(ledger) = &opts.ledger {
        return Ok(ledger.clone());
    }
    let module_path = module_path.ok_or_else(|| RunError::Config {
        path: PathBuf::from(&opts.module),
        detail: "remote modules require an explicit ledger path".to_string(),
    })?;
    let ledger = module_path.join(RUNS_DIR);
    if !ledger.exists() {
        debug!(ledger = %ledger.display(), "creating default ledger");
        Git::clone_repo(&module_path.to_string_lossy(), &ledger)?;
    }
    Ok(ledger)
}

fn prepare_workdir(opts: &RunOptions) -> Result<(PathBuf, Option<tempfile::TempDir>), RunError> {
    match &opts.workdir {
        Some(path) => {
            if path.exists() && fs::read_dir(path)?.next().is_some() {
                return Err(RunError::WorkdirNotEmpty(path.clone()));
            }
            Ok((path.clone(), None))
        }
        None => {
            let tempdir = tempfile::Builder::new().prefix("runledger-").tempdir()?;
            Ok((tempdir.path().to_path_buf(), Some(tempdir)))
        }
    }
}

/// Commits need an identity even on hosts with no global git config.
fn ensure_identity(repo: &Git) -> Result<(), GitError> {
    if repo.config_value("user.email").is_none() {
        repo.set_config("user.name", "runledger")?;
        repo.set_config("user.email", "runledger@localhost")?;
    }
    Ok(())
}

fn upstream_branch(
    workdir: &Git,
    opts: &RunOptions,
    config: &ModuleConfig,
) -> Result<String, RunError> {
    if let Some(branch) = &opts.upstream_branch {
        return Ok(branch.clone());
    }
    if let Some(branch) = &config.upstream_branch {
        return Ok(branch.clone());
    }
    if let Some(branch) = workdir.head_branch_of(ORIGIN)? {
        return Ok(branch);
    }
    // Clone of an oddly configured source: fall back to what got checked out.
    workdir.current_branch()?.ok_or_else(|| {
        RunError::Config {
            path: workdir.dir().to_path_buf(),
            detail: "cannot determine upstream branch (detached clone, no override)".to_string(),
        }
    })
}

/// Run the entrypoint with stdout/stderr captured under `logs/`, bounded by
/// the execution timeout. Timeout kills the child and is fatal.
fn execute_entrypoint(
    workdir: &Path,
    entrypoint: &str,
    timeout: Duration,
) -> Result<RunStatus, RunError> {
    let script = workdir.join(entrypoint);
    if !script.exists() {
        return Err(RunError::EntrypointMissing {
            script: PathBuf::from(entrypoint),
            workdir: workdir.to_path_buf(),
        });
    }

    let logs = workdir.join(LOGS_DIR);
    fs::create_dir_all(&logs)?;
    let out = File::create(logs.join(OUT_LOG))?;
    let err = File::create(logs.join(ERR_LOG))?;

    debug!(script = %script.display(), "executing entrypoint");
    let mut child = Command::new("sh")
        .arg(&script)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(out))
        .stderr(Stdio::from(err))
        .spawn()?;

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() >= timeout {
            warn!(script = %script.display(), "execution timeout; killing entrypoint");
            child.kill()?;
            child.wait()?;
            return Err(RunError::ExecutionTimeout {
                script: PathBuf::from(entrypoint),
                timeout_s: timeout.as_secs(),
            });
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    match status.code() {
        Some(0) => Ok(RunStatus::Success),
        Some(code) => Ok(RunStatus::Failure(code)),
        // Killed by signal.
        None => Ok(RunStatus::Failure(-1)),
    }
}

/// Commit message: the entrypoint's `_MSG` file (consumed), or a generated
/// timestamped status line.
fn run_message(workdir: &Path, status: &RunStatus) -> Result<String, RunError> {
    let msg_path = workdir.join(MSG_FILE);
    if msg_path.exists() {
        let message = fs::read_to_string(&msg_path)?.trim().to_string();
        fs::remove_file(&msg_path)?;
        if !message.is_empty() {
            return Ok(message);
        }
    }
    let label = match status {
        RunStatus::Success => "success".to_string(),
        RunStatus::Failure(code) => format!("failure (exit {code})"),
    };
    Ok(format!("{}: {label}", Utc::now().format(TIMESTAMP_FMT)))
}

/// Write the outcome sentinel, stage the run's products, and commit with the
/// pinned base as the only parent.
fn commit_run(
    workdir: &Git,
    status: &RunStatus,
    message: &str,
    state_paths: &[PathBuf],
    out_paths: &[PathBuf],
) -> Result<Revision, RunError> {
    let dir = workdir.dir();
    match status {
        RunStatus::Success => {
            fs::write(dir.join(SUCCESS_PATH), "")?;
            remove_if_present(&dir.join(FAILURE_PATH))?;
        }
        RunStatus::Failure(code) => {
            fs::write(dir.join(FAILURE_PATH), format!("{code}\n"))?;
            remove_if_present(&dir.join(SUCCESS_PATH))?;
        }
    }

    let mut to_add: Vec<PathBuf> = vec![
        PathBuf::from(LOGS_DIR).join(OUT_LOG),
        PathBuf::from(LOGS_DIR).join(ERR_LOG),
        PathBuf::from(SUCCESS_PATH),
        PathBuf::from(FAILURE_PATH),
    ];
    to_add.extend(state_paths.iter().cloned());
    to_add.extend(out_paths.iter().cloned());
    workdir.add(&to_add)?;

    // -a picks up tracked modifications and deletions (stale sentinel, _MSG).
    workdir.commit_all(message)?;
    Ok(workdir.head()?)
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
