//! Integration tests for the run/reconcile pipeline against real git repos.

mod test_utils;

mod concurrent_runs;
mod delivery;
mod run_pipeline;
mod state_reconciliation;
