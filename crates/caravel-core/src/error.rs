use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaravelError {
    #[error("not a catalog: no environments/ directory found under {0}")]
    NotACatalog(PathBuf),

    #[error("working copy has uncommitted changes: commit or stash them first")]
    DirtyWorkingCopy,

    #[error("working copy is on branch '{current}', expected default branch '{default}'")]
    NotOnDefaultBranch { current: String, default: String },

    #[error("environment not found: {0}")]
    UnknownEnvironment(String),

    #[error("release(s) not found: {0}")]
    UnknownReleases(String),

    #[error("environment {from} is not promotable to {to}")]
    PromotionNotAllowed { from: String, to: String },

    #[error("environment {0} does not allow auto-merge")]
    AutoMergeNotAllowed(String),

    #[error(
        "release {release} has pre-release version {version} which cannot be promoted to {environment}"
    )]
    PrereleaseBlocked {
        release: String,
        version: String,
        environment: String,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("git: {0}")]
    Git(String),

    #[error("pull request: {0}")]
    PullRequest(String),

    #[error("prompt: {0}")]
    Prompt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CaravelError>;
