//! Ledger behavior when module history and runs advance independently.

use std::fs;

use runledger::runner::run_module;

use super::test_utils::*;

#[test]
fn divergent_histories_merge_structurally() {
    let module = tempfile::tempdir().unwrap();
    init_module(module.path(), &[("run.sh", "echo done > out.txt\n"), ("OUT", "out.txt\n")]);

    let first = run_module(&run_opts(module.path())).unwrap();

    // The module advances on its own while the ledger holds the first run.
    fs::write(module.path().join("doc.txt"), "edited upstream\n").unwrap();
    git(module.path(), &["add", "doc.txt"]);
    git(module.path(), &["commit", "-q", "-m", "upstream edit"]);
    let new_base = sha_of(module.path(), "main");

    let second = run_module(&run_opts(module.path())).unwrap();
    assert_eq!(second.base, new_base);

    // Neither history contains the other, so the tip is a two-parent merge
    // carrying the second run's tree verbatim.
    let ledger = module.path().join("runs");
    let tip = sha_of(&ledger, "runs");
    assert_eq!(tip, second.ledger_tip);
    assert_eq!(parents_of(&ledger, &tip), format!("{new_base} {}", first.ledger_tip));
    assert_eq!(tree_of(&ledger, &tip), tree_of(&ledger, &second.run_commit));

    // The merge commit's tree saw the upstream edit (the run was based on it).
    assert_eq!(show(&ledger, &format!("{tip}:doc.txt")), "edited upstream");

    // Both lines of history remain reachable.
    git(&ledger, &["merge-base", "--is-ancestor", &first.run_commit, &tip]);
    git(&ledger, &["merge-base", "--is-ancestor", &new_base, &tip]);
}

#[test]
fn state_advancement_fast_forwards_the_next_run() {
    let module = tempfile::tempdir().unwrap();
    init_module(
        module.path(),
        &[
            ("run.sh", "n=$(cat counter); echo $((n + 1)) > counter\n"),
            ("counter", "0\n"),
            ("STATE", "counter\n"),
        ],
    );

    let first = run_module(&run_opts(module.path())).unwrap();
    let state = first.state_commit.clone().expect("counter changed");
    assert_eq!(sha_of(module.path(), "main"), state);

    // The state commit descends from the first run, so the second run's base
    // already contains the ledger tip: a plain fast-forward, no merge.
    let second = run_module(&run_opts(module.path())).unwrap();
    assert_eq!(second.base, state);

    let ledger = module.path().join("runs");
    let tip = sha_of(&ledger, "runs");
    assert_eq!(tip, second.run_commit);
    assert_eq!(parents_of(&ledger, &tip), state);
    git(&ledger, &["merge-base", "--is-ancestor", &first.run_commit, &tip]);
}
