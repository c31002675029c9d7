//! Git operations (spec §4.4) via the system `git` binary.
//!
//! Grounded directly on the teacher's `shipper/src/git.rs`: shell out with
//! `std::process::Command`, check the exit status, and wrap stderr into the
//! error instead of trying to drive `git2`/libgit2 bindings.

use std::path::Path;
use std::process::Command;

use crate::error::DaemonError;

fn run(args: &[&str], cwd: Option<&Path>) -> Result<String, DaemonError> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd
        .output()
        .map_err(|e| DaemonError::Config(format!("failed to run git {args:?}: {e}")))?;
    if !output.status.success() {
        return Err(DaemonError::Config(format!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Resolve `refname` on `repo_url` to a commit hash via `git ls-remote`,
/// without a local clone (spec §4.4 step 1).
pub fn resolve_ref(repo_url: &str, refname: &str) -> Result<String, DaemonError> {
    let out = run(&["ls-remote", repo_url, refname], None)?;
    out.lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_string)
        .ok_or_else(|| DaemonError::UnknownRef(refname.to_string()))
}

/// Shallow-clone `repo_url` at `commit` into `dest` (spec §4.4 step 2).
pub fn clone_at(repo_url: &str, commit: &str, dest: &Path) -> Result<(), DaemonError> {
    run(
        &[
            "clone",
            "--quiet",
            "--no-checkout",
            repo_url,
            dest.to_str().unwrap_or_default(),
        ],
        None,
    )?;
    run(&["checkout", "--quiet", commit], Some(dest))?;
    Ok(())
}
