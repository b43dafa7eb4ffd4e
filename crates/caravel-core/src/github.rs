//! Pull-request provider backed by the GitHub CLI (`gh`).
//!
//! Runs `gh pr create` non-interactively in the catalog root. `GH_TOKEN` is
//! honored by `gh` itself; update-notifier prompts are suppressed so the
//! subprocess can never block waiting for a terminal.

use crate::error::{CaravelError, Result};
use crate::promote::{PullRequestProvider, PullRequestSpec};
use std::path::PathBuf;
use std::process::Command;

pub struct GhPullRequests {
    root: PathBuf,
}

impl GhPullRequests {
    pub fn new(root: impl Into<PathBuf>) -> GhPullRequests {
        GhPullRequests { root: root.into() }
    }
}

impl PullRequestProvider for GhPullRequests {
    fn create(&self, spec: &PullRequestSpec) -> Result<String> {
        let mut cmd = Command::new("gh");
        cmd.args(["pr", "create", "--head", &spec.branch])
            .args(["--title", &spec.title])
            .args(["--body", &spec.body])
            .current_dir(&self.root)
            .env("GH_NO_UPDATE_NOTIFIER", "1")
            .env("GH_PROMPT_DISABLED", "1");
        for label in &spec.labels {
            cmd.args(["--label", label]);
        }
        if spec.draft {
            cmd.arg("--draft");
        }

        tracing::debug!(branch = %spec.branch, "creating pull request via gh");
        let output = cmd
            .output()
            .map_err(|e| CaravelError::PullRequest(format!("failed to run gh: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaravelError::PullRequest(format!(
                "gh pr create failed: {}",
                stderr.trim()
            )));
        }
        // gh prints the PR URL as the last line of stdout.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let url = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default()
            .trim()
            .to_string();
        if url.is_empty() {
            return Err(CaravelError::PullRequest(
                "gh pr create returned no URL".to_string(),
            ));
        }
        Ok(url)
    }
}
