//! Error types for the runledger run/reconcile pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the git plumbing facade.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {args} failed in {dir} (exit {status}): {stderr}")]
    CommandFailed {
        args: String,
        dir: PathBuf,
        status: i32,
        stderr: String,
    },

    #[error("revision not found: {reference} (in {dir})")]
    MissingRevision { reference: String, dir: PathBuf },

    #[error("push of {refspec} to {remote} rejected twice (merge-and-retry exhausted): {stderr}")]
    PushRejected {
        remote: String,
        refspec: String,
        stderr: String,
    },

    #[error("git produced non-UTF-8 output for {args}")]
    InvalidOutput { args: String },

    #[error("git I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Structured refspec parse/validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefSpecError {
    #[error("invalid refspec {spec:?}: src/dst require a remote")]
    MissingRemote { spec: String },

    #[error("invalid refspec {spec:?}: pull mode requires both src and dst, or neither")]
    PullRequiresSrcDst { spec: String },

    #[error("invalid refspec: {0}")]
    Malformed(String),
}

/// Top-level errors for running a module and reconciling its result.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    RefSpec(#[from] RefSpecError),

    #[error("failed to lock {path} within {timeout_s}s")]
    LockTimeout { path: PathBuf, timeout_s: u64 },

    #[error("no entrypoint found at {script} in module clone {workdir}")]
    EntrypointMissing { script: PathBuf, workdir: PathBuf },

    #[error("entrypoint {script} exceeded execution timeout of {timeout_s}s")]
    ExecutionTimeout { script: PathBuf, timeout_s: u64 },

    #[error(
        "merge of {tmp_branch} into {dst} at {dest} hit content conflicts; \
         merge aborted, {tmp_branch} left for manual resolution"
    )]
    MergeConflict {
        dest: PathBuf,
        dst: String,
        tmp_branch: String,
    },

    #[error("merge of {tmp_branch} into {dst} at {dest} could not run: {detail}")]
    MergeBlocked {
        dest: PathBuf,
        dst: String,
        tmp_branch: String,
        detail: String,
    },

    #[error("pull-mode delivery requires a local-path remote; {remote} resolves to {url}")]
    UnsupportedPullRemote { remote: String, url: String },

    #[error("invalid configuration in {path}: {detail}")]
    Config { path: PathBuf, detail: String },

    #[error("workdir {0} already exists and is not empty")]
    WorkdirNotEmpty(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
