//! Shared fixtures: tiny git-backed modules with shell entrypoints.

use std::fs;
use std::path::Path;
use std::process::Command;

use runledger::runner::RunOptions;

/// Run git in `dir`, asserting success, returning trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {:?} in {} failed: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// Initialize a module repository at `dir` with the given files committed,
/// on branch `main`.
pub fn init_module(dir: &Path, files: &[(&str, &str)]) {
    git(dir, &["init", "-q", "-b", "main"]);
    git(dir, &["config", "user.name", "test-user"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    for (name, contents) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "initial"]);
}

/// Options for a plain run of the module at `dir`.
pub fn run_opts(dir: &Path) -> RunOptions {
    RunOptions {
        module: dir.to_string_lossy().into_owned(),
        ..Default::default()
    }
}

/// Commit content of `path` on the given commit-ish, without touching the
/// working tree.
pub fn show(dir: &Path, spec: &str) -> String {
    git(dir, &["show", spec])
}

/// Parent shas of a commit, space-separated in order.
pub fn parents_of(dir: &Path, commit: &str) -> String {
    git(dir, &["log", "--no-walk", "--format=%P", commit])
}

/// Subject line of a commit.
pub fn subject_of(dir: &Path, commit: &str) -> String {
    git(dir, &["log", "--no-walk", "--format=%s", commit])
}

/// Tree id of a commit-ish.
pub fn tree_of(dir: &Path, commit: &str) -> String {
    git(dir, &["rev-parse", &format!("{commit}^{{tree}}")])
}

/// Resolve a ref in `dir` to a sha.
pub fn sha_of(dir: &Path, reference: &str) -> String {
    git(dir, &["rev-parse", reference])
}
