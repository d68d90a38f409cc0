//! Runs-ledger reconciliation.
//!
//! Merges a freshly produced run commit into the shared ledger branch. The
//! heart of it is a three-way classification of how the run's base revision
//! relates to the current ledger tip, and the commit graph synthesized for
//! each case. No content merging ever happens: the run's own tree is
//! authoritative, only the graph records both histories.

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::config::RUNS_REMOTE;
use crate::error::RunError;
use crate::git::{Git, Revision};
use crate::lock::RepoLock;

/// Relationship between a run's base revision and the current ledger tip.
///
/// Exactly one variant holds for any `(base, tip)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerRelation {
    /// The ledger branch does not exist yet.
    Unborn,
    /// The ledger tip is an ancestor of the base: the run started at or
    /// beyond the ledger's knowledge, so the run commit fast-forwards it.
    FastForward,
    /// The base is an ancestor of the ledger tip: the ledger advanced while
    /// the run executed; the run commit is reparented onto the tip.
    LedgerAhead(Revision),
    /// Neither revision is an ancestor of the other: a two-parent merge
    /// commit records both histories.
    Divergent(Revision),
}

/// Classify `(base, tip)`. Checks the fast-forward direction first, so a
/// run whose base *is* the tip fast-forwards rather than reparenting.
pub fn classify(git: &Git, base: &str, tip: Option<&str>) -> Result<LedgerRelation, RunError> {
    let Some(tip) = tip else {
        return Ok(LedgerRelation::Unborn);
    };
    if git.is_ancestor(tip, base)? {
        Ok(LedgerRelation::FastForward)
    } else if git.is_ancestor(base, tip)? {
        Ok(LedgerRelation::LedgerAhead(tip.to_string()))
    } else {
        Ok(LedgerRelation::Divergent(tip.to_string()))
    }
}

/// Reconciles run commits into a ledger repository through a workdir clone.
pub struct LedgerReconciler<'a> {
    workdir: &'a Git,
    ledger_path: &'a Path,
    branch: &'a str,
    lock_timeout: Duration,
}

impl<'a> LedgerReconciler<'a> {
    pub fn new(
        workdir: &'a Git,
        ledger_path: &'a Path,
        branch: &'a str,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            workdir,
            ledger_path,
            branch,
            lock_timeout,
        }
    }

    /// Advance the ledger branch to contain `run_commit`'s contribution and
    /// push it. Returns the new ledger tip.
    ///
    /// The entire tip-lookup → classify → branch-move → push sequence holds
    /// the ledger repository's lock.
    pub fn reconcile(
        &self,
        base: &str,
        run_commit: &str,
        message: &str,
    ) -> Result<Revision, RunError> {
        let _lock = RepoLock::acquire(self.ledger_path, self.lock_timeout)?;

        // The ledger may be a non-bare checkout; let it receive pushes.
        let ledger = Git::open(self.ledger_path);
        ledger.allow_pushes()?;

        if self.workdir.remote_url(RUNS_REMOTE).is_err() {
            self.workdir
                .add_remote(RUNS_REMOTE, &self.ledger_path.to_string_lossy())?;
        }
        self.workdir.fetch(&[RUNS_REMOTE])?;

        let remote_ref = format!("{RUNS_REMOTE}/{}", self.branch);
        let tip = self.workdir.sha(Some(&remote_ref), true)?;

        // Local ledger branch in the fresh workdir clone, starting at the run.
        self.workdir.checkout(self.branch, Some(run_commit))?;

        let relation = classify(self.workdir, base, tip.as_deref())?;
        let new_tip = match &relation {
            LedgerRelation::Unborn => {
                info!(branch = self.branch, run = run_commit, "ledger branch created at run commit");
                run_commit.to_string()
            }
            LedgerRelation::FastForward => {
                info!(branch = self.branch, run = run_commit, base, "run fast-forwards ledger");
                run_commit.to_string()
            }
            LedgerRelation::LedgerAhead(tip) => {
                let reparented = self.workdir.commit_tree(message, &[tip], run_commit)?;
                info!(
                    branch = self.branch,
                    run = run_commit,
                    tip = %tip,
                    reparented = %reparented,
                    "ledger advanced past base; run commit reparented onto tip"
                );
                reparented
            }
            LedgerRelation::Divergent(tip) => {
                let merged = self.workdir.commit_tree(message, &[base, tip], run_commit)?;
                info!(
                    branch = self.branch,
                    run = run_commit,
                    base,
                    tip = %tip,
                    merged = %merged,
                    "histories diverged; synthesized two-parent merge carrying run tree"
                );
                merged
            }
        };

        if new_tip != run_commit {
            self.workdir.reset_hard(&new_tip)?;
        }
        self.workdir.push(RUNS_REMOTE, None, Some(self.branch))?;
        Ok(new_tip)
    }
}
