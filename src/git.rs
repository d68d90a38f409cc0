//! Git plumbing facade.
//!
//! Thin, synchronous wrapper around the handful of git primitives the rest of
//! the crate needs: hash lookups, ancestry tests, low-level commit
//! construction, branch moves, fetch/push. Every operation is a direct
//! subprocess call with no business logic; each `Git` handle owns its own
//! working directory, so concurrent runs in one process never share cwd state.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, warn};

use crate::error::GitError;

/// Content-derived revision identifier (full 40-hex sha).
pub type Revision = String;

/// Handle to a single git repository working directory.
#[derive(Debug, Clone)]
pub struct Git {
    dir: PathBuf,
}

impl Git {
    /// Wrap an existing repository directory.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Git { dir: dir.into() }
    }

    /// Clone `url` into `dir` and return a handle to the clone.
    pub fn clone_repo(url: &str, dir: &Path) -> Result<Git, GitError> {
        let output = Command::new("git")
            .args(["clone", url])
            .arg(dir)
            .output()?;
        check_status(&output, &format!("clone {url} {}", dir.display()), dir)?;
        Ok(Git::open(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn exec(&self, args: &[&str]) -> Result<Output, GitError> {
        debug!(dir = %self.dir.display(), "git {}", args.join(" "));
        Ok(Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()?)
    }

    /// Run a command, failing with captured stderr on non-zero exit.
    fn run(&self, args: &[&str]) -> Result<(), GitError> {
        let output = self.exec(args)?;
        check_status(&output, &args.join(" "), &self.dir)
    }

    /// Run a command and return trimmed stdout.
    fn output(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.exec(args)?;
        check_status(&output, &args.join(" "), &self.dir)?;
        let text = String::from_utf8(output.stdout).map_err(|_| GitError::InvalidOutput {
            args: args.join(" "),
        })?;
        Ok(text.trim().to_string())
    }

    fn success(&self, args: &[&str]) -> bool {
        self.exec(args).map(|o| o.status.success()).unwrap_or(false)
    }

    /// Resolve a reference to a commit sha. `None` means `HEAD`.
    ///
    /// With `missing_ok`, an unresolvable reference yields `Ok(None)` instead
    /// of an error.
    pub fn sha(&self, reference: Option<&str>, missing_ok: bool) -> Result<Option<Revision>, GitError> {
        let reference = reference.unwrap_or("HEAD");
        let spec = format!("{reference}^{{commit}}");
        let output = self.exec(&["rev-parse", "--verify", "--quiet", &spec])?;
        if output.status.success() {
            let text = String::from_utf8(output.stdout).map_err(|_| GitError::InvalidOutput {
                args: format!("rev-parse {reference}"),
            })?;
            Ok(Some(text.trim().to_string()))
        } else if missing_ok {
            Ok(None)
        } else {
            Err(GitError::MissingRevision {
                reference: reference.to_string(),
                dir: self.dir.clone(),
            })
        }
    }

    /// Resolve `HEAD` to a commit sha.
    pub fn head(&self) -> Result<Revision, GitError> {
        self.sha(None, false)?.ok_or_else(|| GitError::MissingRevision {
            reference: "HEAD".to_string(),
            dir: self.dir.clone(),
        })
    }

    /// Tree id of a commit-ish reference.
    pub fn tree(&self, reference: &str) -> Result<String, GitError> {
        self.output(&["rev-parse", &format!("{reference}^{{tree}}")])
    }

    /// Synthesize a commit with an explicit tree and explicit parent list,
    /// bypassing the index and the current branch. The tree is taken from
    /// `tree_source` (a commit-ish); no content merge happens here.
    pub fn commit_tree(
        &self,
        message: &str,
        parents: &[&str],
        tree_source: &str,
    ) -> Result<Revision, GitError> {
        let tree = self.tree(tree_source)?;
        let mut args = vec!["commit-tree", &tree, "-m", message];
        for parent in parents {
            args.push("-p");
            args.push(parent);
        }
        self.output(&args)
    }

    /// Whether `ancestor` is reachable from `descendant` via parent edges.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        let output = self.exec(&["merge-base", "--is-ancestor", ancestor, descendant])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitError::CommandFailed {
                args: format!("merge-base --is-ancestor {ancestor} {descendant}"),
                dir: self.dir.clone(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    pub fn branch_exists(&self, name: &str) -> bool {
        self.success(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{name}")])
    }

    /// Check out a branch, creating it at `create_from` if it does not exist.
    /// Returns the sha the branch points at.
    pub fn checkout(&self, branch: &str, create_from: Option<&str>) -> Result<Revision, GitError> {
        if !self.branch_exists(branch) {
            let from = create_from.ok_or_else(|| GitError::MissingRevision {
                reference: branch.to_string(),
                dir: self.dir.clone(),
            })?;
            self.run(&["branch", branch, from])?;
        }
        self.run(&["checkout", "--quiet", branch])?;
        self.head()
    }

    /// Check out a commit-ish in detached-HEAD form.
    pub fn checkout_detached(&self, reference: &str) -> Result<Revision, GitError> {
        self.run(&[
            "-c",
            "advice.detachedHead=false",
            "checkout",
            "--quiet",
            "--detach",
            reference,
        ])?;
        self.head()
    }

    /// Force the working tree to match `new_tree` while the branch still
    /// points at its current sha (created at `create_from` if missing).
    /// Leaves the difference unstaged, ready to be added and committed —
    /// a cherry-pick of the snapshot that cannot conflict.
    pub fn checkout_and_reset(
        &self,
        branch: &str,
        create_from: Option<&str>,
        new_tree: &str,
    ) -> Result<Revision, GitError> {
        let current = self.checkout(branch, create_from)?;
        self.apply_snapshot(&current, new_tree)?;
        Ok(current)
    }

    /// Detached-HEAD variant of [`checkout_and_reset`](Self::checkout_and_reset).
    pub fn checkout_and_reset_detached(
        &self,
        reference: &str,
        new_tree: &str,
    ) -> Result<Revision, GitError> {
        let current = self.checkout_detached(reference)?;
        self.apply_snapshot(&current, new_tree)?;
        Ok(current)
    }

    fn apply_snapshot(&self, current: &str, new_tree: &str) -> Result<(), GitError> {
        self.run(&["reset", "--quiet", "--hard", new_tree])?;
        self.run(&["reset", "--quiet", current])
    }

    pub fn reset_hard(&self, reference: &str) -> Result<(), GitError> {
        self.run(&["reset", "--quiet", "--hard", reference])
    }

    pub fn fetch(&self, remotes: &[&str]) -> Result<(), GitError> {
        for remote in remotes {
            self.run(&["fetch", "--quiet", remote])?;
        }
        Ok(())
    }

    /// Push `src` to `dst` on `remote`, mirroring `git push` refspec
    /// defaulting (`src` alone pushes `src`; `dst` alone pushes `HEAD:dst`).
    ///
    /// On a rejected push, fetches, merges the remote tip with "prefer ours"
    /// conflict resolution, and retries once; a second rejection is fatal.
    pub fn push(&self, remote: &str, src: Option<&str>, dst: Option<&str>) -> Result<(), GitError> {
        let (refspec, merge_target) = match (src, dst) {
            (None, None) => (None, None),
            (Some(s), None) => (Some(s.to_string()), Some(s.to_string())),
            (s, Some(d)) if s == Some(d) => (Some(d.to_string()), Some(d.to_string())),
            // Fully qualified destination, so raw shas can create branches.
            (s, Some(d)) => (
                Some(format!("{}:refs/heads/{d}", s.unwrap_or("HEAD"))),
                Some(d.to_string()),
            ),
        };

        let mut args = vec!["push", "--quiet", remote];
        if let Some(refspec) = &refspec {
            args.push(refspec);
        }

        match self.run(&args) {
            Ok(()) => Ok(()),
            Err(first) => {
                let Some(target) = merge_target else {
                    return Err(first);
                };
                warn!(
                    remote,
                    refspec = refspec.as_deref().unwrap_or(""),
                    "push rejected; merging remote tip (prefer ours) and retrying"
                );
                self.fetch(&[remote])?;
                self.run(&["merge", "-X", "ours", "--no-edit", &format!("{remote}/{target}")])?;
                self.run(&args).map_err(|err| match err {
                    GitError::CommandFailed { stderr, .. } => GitError::PushRejected {
                        remote: remote.to_string(),
                        refspec: refspec.unwrap_or_default(),
                        stderr,
                    },
                    other => other,
                })
            }
        }
    }

    /// Stage the given paths, silently skipping ones that do not exist.
    pub fn add<P: AsRef<Path>>(&self, paths: &[P]) -> Result<(), GitError> {
        let existing: Vec<String> = paths
            .iter()
            .map(AsRef::as_ref)
            .filter(|p| self.dir.join(p).exists())
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        if existing.is_empty() {
            return Ok(());
        }
        let mut args: Vec<&str> = vec!["add", "--"];
        args.extend(existing.iter().map(String::as_str));
        self.run(&args)
    }

    pub fn add_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.run(&["remote", "add", name, url])
    }

    pub fn remote_url(&self, name: &str) -> Result<String, GitError> {
        self.output(&["remote", "get-url", name])
    }

    /// Name of the repository's (first) configured remote.
    pub fn default_remote(&self) -> Result<String, GitError> {
        let remotes = self.output(&["remote"])?;
        remotes
            .lines()
            .next()
            .map(str::to_string)
            .ok_or_else(|| GitError::MissingRevision {
                reference: "remote".to_string(),
                dir: self.dir.clone(),
            })
    }

    /// The branch HEAD is on, or `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>, GitError> {
        let output = self.exec(&["symbolic-ref", "--short", "--quiet", "HEAD"])?;
        if output.status.success() {
            let text = String::from_utf8(output.stdout).map_err(|_| GitError::InvalidOutput {
                args: "symbolic-ref HEAD".to_string(),
            })?;
            Ok(Some(text.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// The default (HEAD) branch of a remote, as recorded by the clone.
    pub fn head_branch_of(&self, remote: &str) -> Result<Option<String>, GitError> {
        let output = self.exec(&["symbolic-ref", "--short", "--quiet", &format!("refs/remotes/{remote}/HEAD")])?;
        if output.status.success() {
            let text = String::from_utf8(output.stdout).map_err(|_| GitError::InvalidOutput {
                args: format!("symbolic-ref refs/remotes/{remote}/HEAD"),
            })?;
            let full = text.trim();
            // "origin/main" -> "main"
            Ok(full.strip_prefix(&format!("{remote}/")).map(str::to_string))
        } else {
            Ok(None)
        }
    }

    /// Allow pushes into this (possibly checked-out, non-bare) repository.
    pub fn allow_pushes(&self) -> Result<(), GitError> {
        self.set_config("receive.denyCurrentBranch", "ignore")
    }

    pub fn set_config(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.run(&["config", key, value])
    }

    /// Effective config value for `key`, if any.
    pub fn config_value(&self, key: &str) -> Option<String> {
        self.output(&["config", "--get", key])
            .ok()
            .filter(|v| !v.is_empty())
    }

    /// Commit all staged and tracked-modified content. Empty commits are
    /// allowed so that a run with no output still leaves evidence.
    pub fn commit_all(&self, message: &str) -> Result<(), GitError> {
        // -q avoids status output; --allow-empty keeps no-op runs recordable.
        self.run(&["commit", "-a", "-q", "--allow-empty", "-m", message])
    }

    pub fn commit(&self, message: &str) -> Result<(), GitError> {
        self.run(&["commit", "-q", "-m", message])
    }

    /// Whether the index differs from HEAD.
    pub fn has_staged_changes(&self) -> Result<bool, GitError> {
        let output = self.exec(&["diff", "--cached", "--quiet"])?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(GitError::CommandFailed {
                args: "diff --cached --quiet".to_string(),
                dir: self.dir.clone(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.success(&["check-ignore", "-q", &path.to_string_lossy()])
    }

    /// Append `path` to `.gitignore` unless it is already ignored.
    pub fn ensure_ignored(&self, path: &Path) -> Result<(), GitError> {
        if self.is_ignored(path) {
            return Ok(());
        }
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(".gitignore"))?;
        writeln!(file, "{}", path.display())?;
        Ok(())
    }

    pub fn merge(&self, reference: &str) -> Result<(), GitError> {
        self.run(&["merge", "--no-edit", reference])
    }

    pub fn merge_abort(&self) -> Result<(), GitError> {
        self.run(&["merge", "--abort"])
    }

    /// Whether the index holds unmerged (conflicted) entries.
    pub fn has_unmerged_paths(&self) -> Result<bool, GitError> {
        Ok(!self.output(&["ls-files", "-u"])?.is_empty())
    }

    pub fn delete_branch(&self, name: &str) -> Result<(), GitError> {
        self.run(&["branch", "-q", "-D", name])
    }
}

fn check_status(output: &Output, args: &str, dir: &Path) -> Result<(), GitError> {
    if output.status.success() {
        Ok(())
    } else {
        Err(GitError::CommandFailed {
            args: args.to_string(),
            dir: dir.to_path_buf(),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
