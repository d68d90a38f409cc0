//! End-to-end behavior of a single `run_module` invocation.

use std::fs;

use runledger::runner::{run_module, RunStatus};

use super::test_utils::*;

#[test]
fn successful_run_is_recorded_in_a_fresh_ledger() {
    let module = tempfile::tempdir().unwrap();
    init_module(
        module.path(),
        &[
            ("run.sh", "echo hello\necho oops >&2\necho artifact > result.txt\n"),
            ("OUT", "result.txt\n"),
        ],
    );
    let base = sha_of(module.path(), "main");

    let report = run_module(&run_opts(module.path())).unwrap();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.base, base);
    // Sole parent is the pinned base.
    let ledger = module.path().join("runs");
    assert_eq!(parents_of(&ledger, &report.run_commit), base);
    // First run: the ledger branch is born at the run commit.
    assert_eq!(report.ledger_tip, report.run_commit);
    assert_eq!(sha_of(&ledger, "runs"), report.run_commit);

    // Everything the run produced is in the commit.
    let files = git(&ledger, &["ls-tree", "-r", "--name-only", &report.run_commit]);
    assert!(files.contains("SUCCESS"));
    assert!(files.contains("logs/out"));
    assert!(files.contains("logs/err"));
    assert!(files.contains("result.txt"));
    assert_eq!(show(&ledger, &format!("{}:logs/out", report.run_commit)), "hello");
    assert_eq!(show(&ledger, &format!("{}:logs/err", report.run_commit)), "oops");
    assert_eq!(show(&ledger, &format!("{}:result.txt", report.run_commit)), "artifact");

    // Default generated message carries the outcome.
    assert!(report.message.ends_with(": success"), "message: {}", report.message);

    // The nested ledger stays invisible to the module repository.
    let status = git(module.path(), &["status", "--porcelain", "runs"]);
    assert!(status.is_empty(), "ledger dir should be ignored: {status}");
}

#[test]
fn failed_run_still_lands_in_the_ledger() {
    let module = tempfile::tempdir().unwrap();
    init_module(module.path(), &[("run.sh", "echo partial > result.txt\nexit 3\n")]);

    let report = run_module(&run_opts(module.path())).unwrap();

    assert_eq!(report.status, RunStatus::Failure(3));
    assert!(report.message.contains("failure (exit 3)"), "message: {}", report.message);

    let ledger = module.path().join("runs");
    assert_eq!(sha_of(&ledger, "runs"), report.run_commit);
    let files = git(&ledger, &["ls-tree", "-r", "--name-only", &report.run_commit]);
    assert!(files.contains("FAILURE"));
    assert!(!files.lines().any(|f| f == "SUCCESS"));
    assert_eq!(show(&ledger, &format!("{}:FAILURE", report.run_commit)), "3");
}

#[test]
fn sequential_runs_form_a_linear_ledger() {
    let module = tempfile::tempdir().unwrap();
    init_module(module.path(), &[("run.sh", "date +%s%N > stamp.txt\n"), ("OUT", "stamp.txt\n")]);

    let first = run_module(&run_opts(module.path())).unwrap();
    let second = run_module(&run_opts(module.path())).unwrap();

    // Module tip never moved, so the second run reparents onto the first:
    // one straight line of runs, newest tree on top.
    let ledger = module.path().join("runs");
    let tip = sha_of(&ledger, "runs");
    assert_eq!(tip, second.ledger_tip);
    assert_eq!(parents_of(&ledger, &tip), first.ledger_tip);
    assert_eq!(tree_of(&ledger, &tip), tree_of(&ledger, &second.run_commit));
    // No run is ever lost from the ledger's history.
    git(&ledger, &["merge-base", "--is-ancestor", &first.run_commit, &tip]);
}

#[test]
fn msg_file_becomes_the_commit_message_and_is_consumed() {
    let module = tempfile::tempdir().unwrap();
    init_module(
        module.path(),
        &[("run.sh", "printf 'processed 42 records' > _MSG\n")],
    );

    let report = run_module(&run_opts(module.path())).unwrap();

    assert_eq!(report.message, "processed 42 records");
    let ledger = module.path().join("runs");
    assert_eq!(subject_of(&ledger, &report.run_commit), "processed 42 records");
    let files = git(&ledger, &["ls-tree", "-r", "--name-only", &report.run_commit]);
    assert!(!files.lines().any(|f| f == "_MSG"));
}

#[test]
fn explicit_workdir_holds_the_run_products() {
    let module = tempfile::tempdir().unwrap();
    init_module(module.path(), &[("run.sh", "echo out\n")]);

    let workdir = tempfile::tempdir().unwrap();
    let mut opts = run_opts(module.path());
    opts.workdir = Some(workdir.path().to_path_buf());

    let report = run_module(&opts).unwrap();
    assert_eq!(report.workdir.as_deref(), Some(workdir.path()));
    assert!(workdir.path().join("SUCCESS").exists());
    assert_eq!(
        fs::read_to_string(workdir.path().join("logs/out")).unwrap(),
        "out\n"
    );
}

#[test]
fn discarded_temporary_workdir_is_not_reported() {
    let module = tempfile::tempdir().unwrap();
    init_module(module.path(), &[("run.sh", "true\n")]);

    let report = run_module(&run_opts(module.path())).unwrap();
    // The temporary clone is gone by the time the report exists; no path
    // to a deleted directory leaks out.
    assert_eq!(report.workdir, None);
}

#[test]
fn kept_temporary_workdir_is_reported_and_survives() {
    let module = tempfile::tempdir().unwrap();
    init_module(module.path(), &[("run.sh", "echo out\n")]);

    let mut opts = run_opts(module.path());
    opts.keep_workdir = true;

    let report = run_module(&opts).unwrap();
    let kept = report.workdir.expect("kept workdir is reported");
    assert!(kept.join("SUCCESS").exists());
    assert!(kept.join("logs/out").exists());
    fs::remove_dir_all(kept).unwrap();
}

#[test]
fn explicit_ledger_path_is_used() {
    let module = tempfile::tempdir().unwrap();
    init_module(module.path(), &[("run.sh", "true\n")]);

    let ledger_parent = tempfile::tempdir().unwrap();
    let ledger = ledger_parent.path().join("ledger");
    git(ledger_parent.path(), &["init", "-q", "--bare", "ledger"]);

    let mut opts = run_opts(module.path());
    opts.ledger = Some(ledger.clone());

    let report = run_module(&opts).unwrap();
    assert_eq!(sha_of(&ledger, "runs"), report.ledger_tip);
    assert!(!module.path().join("runs").exists());
}
