//! Delivering finished run commits to downstream repositories.

use std::fs;

use runledger::convergence::send_result;
use runledger::git::Git;
use runledger::runner::run_module;

use super::test_utils::*;

#[test]
fn run_commit_pushes_to_a_downstream_branch() {
    let module = tempfile::tempdir().unwrap();
    init_module(module.path(), &[("run.sh", "echo result > out.txt\n"), ("OUT", "out.txt\n")]);

    let workdir = tempfile::tempdir().unwrap();
    let mut opts = run_opts(module.path());
    opts.workdir = Some(workdir.path().to_path_buf());
    let report = run_module(&opts).unwrap();

    let downstream = tempfile::tempdir().unwrap();
    init_module(downstream.path(), &[("README", "downstream\n")]);

    let repo = Git::open(workdir.path());
    repo.add_remote("downstream", &downstream.path().to_string_lossy())
        .unwrap();
    send_result(&repo, "downstream/:results", &report.run_commit).unwrap();

    assert_eq!(sha_of(downstream.path(), "results"), report.run_commit);
    assert_eq!(show(downstream.path(), "results:out.txt"), "result");
}

#[test]
fn pull_mode_merges_the_run_into_a_working_checkout() {
    let module = tempfile::tempdir().unwrap();
    init_module(module.path(), &[("run.sh", "echo result > out.txt\n"), ("OUT", "out.txt\n")]);

    // A sibling checkout of the same module, sitting on its own main.
    let dest_parent = tempfile::tempdir().unwrap();
    let dest_path = dest_parent.path().join("dest");
    git(dest_parent.path(), &["clone", "-q", &module.path().to_string_lossy(), "dest"]);
    git(&dest_path, &["config", "user.name", "test-user"]);
    git(&dest_path, &["config", "user.email", "test@example.com"]);

    let workdir = tempfile::tempdir().unwrap();
    let mut opts = run_opts(module.path());
    opts.workdir = Some(workdir.path().to_path_buf());
    let report = run_module(&opts).unwrap();

    let repo = Git::open(workdir.path());
    repo.add_remote("dest", &dest_path.to_string_lossy()).unwrap();
    send_result(&repo, "dest!", &report.run_commit).unwrap();

    // The destination merged on its own side: run reachable, tree updated.
    git(&dest_path, &["merge-base", "--is-ancestor", &report.run_commit, "HEAD"]);
    assert_eq!(
        fs::read_to_string(dest_path.join("out.txt")).unwrap(),
        "result\n"
    );
}
