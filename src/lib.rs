//! Runledger: execute versioned modules in ephemeral clones and reconcile
//! their results into shared git run-ledgers.
//!
//! A *module* is a git repository with an entrypoint script. Each run clones
//! the module, pins itself to the upstream tip observed at clone time,
//! executes the entrypoint, and commits everything it produced with that
//! pinned revision as sole parent. The run commit is then folded into a
//! *runs ledger* (an append-only branch recording every run, including
//! failures) and any declared *state paths* are mirrored back onto the
//! module's upstream branch. Concurrent runs are safe: divergence is
//! resolved structurally in the commit graph, never by content merging.
//!
//! The [`runner`] module drives the whole pipeline; [`convergence`] delivers
//! finished run commits to downstream repositories addressed by compact
//! [`refspec`]s.

pub mod cli;
pub mod config;
pub mod convergence;
pub mod error;
pub mod git;
pub mod ledger;
pub mod lock;
pub mod logging;
pub mod refspec;
pub mod runner;
pub mod state;

pub use config::ModuleConfig;
pub use convergence::send_result;
pub use error::{GitError, RefSpecError, RunError};
pub use git::{Git, Revision};
pub use ledger::{LedgerRelation, LedgerReconciler};
pub use lock::RepoLock;
pub use refspec::RefSpec;
pub use runner::{run_module, RunOptions, RunReport, RunStatus};
pub use state::StateReconciler;
