//! State paths travelling back to the module's upstream branch.

use runledger::runner::run_module;

use super::test_utils::*;

#[test]
fn state_commit_has_dual_lineage_and_carries_only_state() {
    let module = tempfile::tempdir().unwrap();
    init_module(
        module.path(),
        &[
            (
                "run.sh",
                "echo 7 > counter\necho artifact > extra.txt\n",
            ),
            ("counter", "0\n"),
            ("STATE", "counter\n"),
            ("OUT", "extra.txt\n"),
        ],
    );
    let base = sha_of(module.path(), "main");

    let report = run_module(&run_opts(module.path())).unwrap();
    let state = report.state_commit.expect("counter changed");

    assert_eq!(sha_of(module.path(), "main"), state);
    assert_eq!(
        parents_of(module.path(), &state),
        format!("{base} {}", report.run_commit)
    );
    assert_eq!(show(module.path(), "main:counter"), "7");

    // Artifacts and run bookkeeping stay in the ledger, never upstream.
    let files = git(module.path(), &["ls-tree", "-r", "--name-only", "main"]);
    assert!(!files.contains("extra.txt"));
    assert!(!files.contains("SUCCESS"));
    assert!(!files.contains("logs"));
}

#[test]
fn run_without_state_change_leaves_upstream_untouched() {
    let module = tempfile::tempdir().unwrap();
    init_module(
        module.path(),
        &[
            ("run.sh", "echo artifact > extra.txt\n"),
            ("counter", "0\n"),
            ("STATE", "counter\n"),
            ("OUT", "extra.txt\n"),
        ],
    );
    let base = sha_of(module.path(), "main");

    let report = run_module(&run_opts(module.path())).unwrap();

    assert_eq!(report.state_commit, None);
    assert_eq!(sha_of(module.path(), "main"), base);
    // The run itself is still in the ledger.
    assert_eq!(
        sha_of(&module.path().join("runs"), "runs"),
        report.ledger_tip
    );
}

#[test]
fn rerun_producing_identical_state_is_a_no_op() {
    let module = tempfile::tempdir().unwrap();
    init_module(
        module.path(),
        &[
            ("run.sh", "echo 5 > counter\n"),
            ("counter", "0\n"),
            ("STATE", "counter\n"),
        ],
    );

    let first = run_module(&run_opts(module.path())).unwrap();
    let state = first.state_commit.expect("counter moved to 5");
    assert_eq!(sha_of(module.path(), "main"), state);

    // Same output, new base already holds it: nothing to push.
    let second = run_module(&run_opts(module.path())).unwrap();
    assert_eq!(second.state_commit, None);
    assert_eq!(sha_of(module.path(), "main"), state);
}
