//! Repository locking.
//!
//! Named, timeout-bounded mutual exclusion over a repository path, guarding
//! the short read-classify-write-push critical sections of reconciliation.
//! Uses advisory file locks (`flock(2)` on Unix) via the `fs2` crate; the OS
//! releases the lock if the holding process dies, so there is no stale-lock
//! cleanup to do.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use crate::error::RunError;

/// Default lock file name inside a guarded repository.
pub const LOCK_FILE_NAME: &str = ".LOCK";

/// An exclusive lock on a repository directory.
///
/// Released automatically when dropped.
pub struct RepoLock {
    _file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Acquire the repository's `.LOCK` within `timeout`.
    ///
    /// A timed-out acquisition is fatal to the caller by design: silently
    /// waiting longer risks deadlocking an orchestrator.
    pub fn acquire(repo_dir: &Path, timeout: Duration) -> Result<Self, RunError> {
        Self::acquire_named(repo_dir, LOCK_FILE_NAME, timeout)
    }

    /// Acquire a lock with a custom file name under `dir`.
    pub fn acquire_named(dir: &Path, name: &str, timeout: Duration) -> Result<Self, RunError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(name);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let start = Instant::now();
        let poll_interval = Duration::from_millis(10);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(path = %path.display(), "lock acquired");
                    return Ok(RepoLock { _file: file, path });
                }
                Err(_) if start.elapsed() >= timeout => {
                    return Err(RunError::LockTimeout {
                        path,
                        timeout_s: timeout.as_secs(),
                    });
                }
                Err(_) => std::thread::sleep(poll_interval),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "lock released");
    }
}
