//! Result delivery to downstream repositories.
//!
//! A refspec names where a run commit should land and how. Push mode is a
//! plain `git push` with the facade's merge-and-retry fallback. Pull mode
//! inverts control for destinations that refuse direct pushes to their
//! checked-out branch: the commit travels on a throwaway branch and the
//! destination merges it on its own side, keeping its working tree honest.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::RunError;
use crate::git::Git;
use crate::refspec::{RefSpec, SpecInput};

/// Deliver `run_commit` from `repo` according to `spec`.
///
/// The spec's src defaults to the run commit itself; its remote defaults to
/// the repository's first configured remote.
pub fn send_result(
    repo: &Git,
    spec: impl Into<SpecInput>,
    run_commit: &str,
) -> Result<(), RunError> {
    let spec = RefSpec::coerce(spec)?;
    let remote = match &spec.remote {
        Some(remote) => remote.clone(),
        None => repo.default_remote()?,
    };
    let src = spec.src.clone().unwrap_or_else(|| run_commit.to_string());

    if !spec.pull {
        // With no refs at all, a bare push of the current branch; otherwise
        // the run commit stands in for a missing src.
        match (&spec.src, &spec.dst) {
            (None, None) => repo.push(&remote, None, None)?,
            (_, dst) => repo.push(&remote, Some(&src), dst.as_deref())?,
        }
        info!(remote = %remote, src = %src, dst = spec.dst.as_deref().unwrap_or(&src), "result pushed");
        return Ok(());
    }

    // Pull mode needs to drive a merge inside the destination, so the
    // remote must resolve to a repository on this filesystem.
    let url = repo.remote_url(&remote)?;
    let dest_path = Path::new(&url);
    if !dest_path.is_dir() {
        return Err(RunError::UnsupportedPullRemote { remote, url });
    }
    let dest = Git::open(dest_path);

    let checked_out = dest.current_branch()?;
    let dst = match spec.dst.clone().or_else(|| checked_out.clone()) {
        Some(dst) => dst,
        None => {
            // Detached destination with no explicit dst: nothing to merge into.
            return Err(RunError::UnsupportedPullRemote {
                remote,
                url: format!("{url} (detached HEAD, no destination branch)"),
            });
        }
    };

    if checked_out.as_deref() != Some(dst.as_str()) {
        // The destination branch is not checked out; a direct push cannot
        // disturb its working tree.
        debug!(remote = %remote, dst = %dst, "destination branch not checked out; pushing directly");
        repo.push(&remote, Some(&src), Some(&dst))?;
        return Ok(());
    }

    let tmp_branch = format!("runledger-{}", Utc::now().format("%Y%m%dT%H%M%S%3f"));
    repo.push(&remote, Some(&src), Some(&tmp_branch))?;

    match dest.merge(&tmp_branch) {
        Ok(()) => {
            dest.delete_branch(&tmp_branch)?;
            info!(remote = %remote, src = %src, dst = %dst, "result merged at destination");
            Ok(())
        }
        Err(err) => {
            if dest.has_unmerged_paths()? {
                // Content conflict: abort so the destination stays usable,
                // keep the temp branch for manual resolution.
                dest.merge_abort()?;
                Err(RunError::MergeConflict {
                    dest: dest_path.to_path_buf(),
                    dst,
                    tmp_branch,
                })
            } else {
                Err(RunError::MergeBlocked {
                    dest: dest_path.to_path_buf(),
                    dst,
                    tmp_branch,
                    detail: err.to_string(),
                })
            }
        }
    }
}
