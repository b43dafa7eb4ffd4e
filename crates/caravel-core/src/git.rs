//! Shell-backed git provider.
//!
//! Every operation runs the `git` binary inside the catalog root. Failures
//! carry the subcommand and stderr so the user can re-run the underlying
//! command; nothing is retried, since partial git state is externally
//! observable.

use crate::error::{CaravelError, Result};
use crate::promote::GitProvider;
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct ShellGit {
    root: PathBuf,
    default_branch: String,
}

impl ShellGit {
    /// Provider for the repository at `root`. The default branch is taken
    /// from `origin/HEAD` when available, falling back to `main`.
    pub fn new(root: impl Into<PathBuf>) -> ShellGit {
        let root = root.into();
        let default_branch = detect_default_branch(&root).unwrap_or_else(|| "main".to_string());
        ShellGit {
            root,
            default_branch,
        }
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> ShellGit {
        self.default_branch = branch.into();
        self
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        tracing::debug!(?args, "running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| CaravelError::Git(format!("failed to run git: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaravelError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn has_remote_branch(&self) -> bool {
        self.git(&[
            "rev-parse",
            "--verify",
            &format!("origin/{}", self.default_branch),
        ])
        .is_ok()
    }
}

fn detect_default_branch(root: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["symbolic-ref", "--short", "refs/remotes/origin/HEAD"])
        .current_dir(root)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let full = String::from_utf8_lossy(&output.stdout).trim().to_string();
    // "origin/main" -> "main"
    full.split_once('/').map(|(_, b)| b.to_string())
}

impl GitProvider for ShellGit {
    fn ensure_clean_and_up_to_date(&self) -> Result<()> {
        let status = self.git(&["status", "--porcelain"])?;
        if !status.is_empty() {
            return Err(CaravelError::DirtyWorkingCopy);
        }
        let current = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if current != self.default_branch {
            return Err(CaravelError::NotOnDefaultBranch {
                current,
                default: self.default_branch.clone(),
            });
        }
        // Up-to-date check only makes sense with a remote tracking branch.
        if self.has_remote_branch() {
            self.git(&["fetch", "origin", &self.default_branch])?;
            let local = self.git(&["rev-parse", "HEAD"])?;
            let remote = self.git(&[
                "rev-parse",
                &format!("origin/{}", self.default_branch),
            ])?;
            if local != remote {
                return Err(CaravelError::Git(format!(
                    "branch {} is not up to date with origin; pull first",
                    self.default_branch
                )));
            }
        }
        Ok(())
    }

    fn create_and_push_branch(
        &self,
        branch: &str,
        files: &[PathBuf],
        message: &str,
    ) -> Result<()> {
        self.git(&["checkout", "-b", branch])?;
        for file in files {
            let path = file.to_str().ok_or_else(|| {
                CaravelError::Git(format!("non-UTF8 path: {}", file.display()))
            })?;
            self.git(&["add", path])?;
        }
        self.git(&["commit", "-m", message])?;
        if self.git(&["remote", "get-url", "origin"]).is_ok() {
            self.git(&["push", "-u", "origin", branch])?;
        }
        Ok(())
    }

    fn checkout_default_branch(&self) -> Result<()> {
        self.git(&["checkout", &self.default_branch])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_git(dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-b", "main"]);
        run_git(dir.path(), &["config", "user.name", "test"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn clean_repo_on_default_branch_passes() {
        let repo = make_repo();
        let git = ShellGit::new(repo.path()).with_default_branch("main");
        git.ensure_clean_and_up_to_date().unwrap();
    }

    #[test]
    fn dirty_repo_is_rejected() {
        let repo = make_repo();
        std::fs::write(repo.path().join("stray.yaml"), "x: 1\n").unwrap();
        let git = ShellGit::new(repo.path()).with_default_branch("main");
        assert!(matches!(
            git.ensure_clean_and_up_to_date(),
            Err(CaravelError::DirtyWorkingCopy)
        ));
    }

    #[test]
    fn wrong_branch_is_rejected() {
        let repo = make_repo();
        run_git(repo.path(), &["checkout", "-b", "feature"]);
        let git = ShellGit::new(repo.path()).with_default_branch("main");
        assert!(matches!(
            git.ensure_clean_and_up_to_date(),
            Err(CaravelError::NotOnDefaultBranch { .. })
        ));
    }

    #[test]
    fn branch_commit_and_checkout_back() {
        let repo = make_repo();
        let file = repo.path().join("environments/prod/releases/foo.yaml");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "kind: Release\n").unwrap();

        let git = ShellGit::new(repo.path()).with_default_branch("main");
        git.create_and_push_branch("promote/staging-to-prod/foo", &[file], "Promote foo")
            .unwrap();

        let output = Command::new("git")
            .args(["log", "-1", "--format=%s"])
            .current_dir(repo.path())
            .output()
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&output.stdout).trim(),
            "Promote foo"
        );

        git.checkout_default_branch().unwrap();
        let output = Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .current_dir(repo.path())
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "main");
    }
}
