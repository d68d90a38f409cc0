//! State reconciliation.
//!
//! Folds a run's declared state paths back into the module's upstream
//! branch. Only paths listed in the module's `STATE` file travel upstream;
//! everything else a run produced stays in the ledger. A run that left its
//! state paths untouched produces no upstream commit at all.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::TIMESTAMP_FMT;
use crate::error::RunError;
use crate::git::{Git, Revision};
use crate::lock::RepoLock;

/// Pushes state-path changes from run commits to the module's upstream.
pub struct StateReconciler<'a> {
    workdir: &'a Git,
    /// Local module checkout to lock and open for pushes, when the module
    /// lives on the filesystem. `None` for true remote modules.
    module_path: Option<&'a Path>,
    remote: &'a str,
    branch: &'a str,
    lock_timeout: Duration,
}

impl<'a> StateReconciler<'a> {
    pub fn new(
        workdir: &'a Git,
        module_path: Option<&'a Path>,
        remote: &'a str,
        branch: &'a str,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            workdir,
            module_path,
            remote,
            branch,
            lock_timeout,
        }
    }

    /// Mirror `state_paths` from `run_commit`'s tree onto the upstream
    /// branch, recording lineage from both `base` and the run.
    ///
    /// Returns the pushed state commit, or `None` when the run changed no
    /// state (in which case the upstream is not touched at all).
    pub fn reconcile(
        &self,
        base: &str,
        run_commit: &str,
        state_paths: &[PathBuf],
    ) -> Result<Option<Revision>, RunError> {
        if state_paths.is_empty() {
            debug!("no state paths declared; skipping state reconciliation");
            return Ok(None);
        }

        let _lock = match self.module_path {
            Some(path) => {
                let lock = RepoLock::acquire(path, self.lock_timeout)?;
                Git::open(path).allow_pushes()?;
                Some(lock)
            }
            None => None,
        };

        // Stand on the pinned base with the run's tree overlaid, unstaged;
        // staging just the state paths isolates their diff against the base.
        self.workdir.checkout_and_reset_detached(base, run_commit)?;
        self.workdir.add(state_paths)?;

        if !self.workdir.has_staged_changes()? {
            info!(base, run = run_commit, "run changed no state; upstream untouched");
            self.workdir.reset_hard(base)?;
            return Ok(None);
        }

        let message = format!("{}: update state", Utc::now().format(TIMESTAMP_FMT));
        self.workdir.commit(&message)?;

        // Rewrite the commit with explicit lineage from both histories: the
        // base it applies to and the run that produced it.
        let state_commit = self.workdir.commit_tree(&message, &[base, run_commit], "HEAD")?;
        self.workdir.reset_hard(&state_commit)?;
        self.workdir
            .push(self.remote, Some(&state_commit), Some(self.branch))?;

        info!(
            base,
            run = run_commit,
            state = %state_commit,
            branch = self.branch,
            "state pushed upstream"
        );
        Ok(Some(state_commit))
    }
}
