//! The promotion state machine.
//!
//! Drives one promotion run end to end: working-copy check, environment
//! resolution, candidate computation, selection, preview, confirmation, and
//! apply (write files, branch, commit, push, pull request). All side effects
//! go through injected collaborator traits so the flow is testable without
//! git, GitHub, or a terminal.
//!
//! Soft stops (nothing to promote, user cancelled) are [`Outcome`] values,
//! never errors. Everything fatal is reported before any file is written,
//! except collaborator failures during the final apply, which leave an
//! uncommitted working copy for the next run's clean-check to catch.

use crate::catalog::{Catalog, Environment};
use crate::cross::{self, CrossReleaseList};
use crate::diff;
use crate::error::{CaravelError, Result};
use crate::merge;
use crate::yaml::Document;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Collaborator contracts
// ---------------------------------------------------------------------------

pub trait GitProvider {
    /// Fails when the working copy has uncommitted changes or is not on an
    /// up-to-date default branch.
    fn ensure_clean_and_up_to_date(&self) -> Result<()>;
    fn create_and_push_branch(
        &self,
        branch: &str,
        files: &[PathBuf],
        message: &str,
    ) -> Result<()>;
    fn checkout_default_branch(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct PullRequestSpec {
    pub branch: String,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub draft: bool,
}

pub trait PullRequestProvider {
    /// Opens a pull request and returns its URL.
    fn create(&self, spec: &PullRequestSpec) -> Result<String>;
}

/// One selectable release with its before/after versions for display.
#[derive(Debug, Clone)]
pub struct ReleaseChoice {
    pub name: String,
    /// Version currently in the target environment, `None` for a new file.
    pub current: Option<String>,
    /// Version that would be promoted in.
    pub incoming: String,
}

pub trait PromptProvider {
    fn select_environment(&self, role: &str, options: &[String]) -> Result<String>;
    /// Returns the names of the releases to promote.
    fn select_releases(&self, choices: &[ReleaseChoice]) -> Result<Vec<String>>;
    /// Presents the previews and asks for a go/no-go.
    fn confirm(&self, previews: &[ReleasePreview]) -> Result<bool>;
}

pub trait DocumentWriter {
    fn write(&self, document: &Document) -> Result<()>;
}

/// Default writer: serializes the document at its own path.
pub struct FsDocumentWriter;

impl DocumentWriter for FsDocumentWriter {
    fn write(&self, document: &Document) -> Result<()> {
        crate::io::atomic_write(&document.path, &document.to_bytes())
    }
}

// ---------------------------------------------------------------------------
// Options / outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PromoteOptions {
    pub from: Option<String>,
    pub to: Option<String>,
    /// Explicit release names; an unknown name is a fatal error.
    pub releases: Vec<String>,
    pub all: bool,
    pub omit: Vec<String>,
    pub keep_prerelease: bool,
    pub auto_merge: bool,
    pub draft: bool,
    pub no_prompt: bool,
    /// Stop after rendering previews; writes nothing.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ReleasePreview {
    pub name: String,
    pub from_version: Option<String>,
    pub to_version: String,
    /// True when the target environment has no file for this release yet.
    pub missing: bool,
    pub path: PathBuf,
    pub diff: String,
}

#[derive(Debug)]
pub enum Outcome {
    Applied {
        branch: String,
        pr_url: String,
        previews: Vec<ReleasePreview>,
    },
    Previewed(Vec<ReleasePreview>),
    /// Every candidate was already in sync with the target.
    UpToDate,
    NoCandidates,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    WorkingCopyChecked,
    EnvironmentsResolved,
    CandidatesComputed,
    Selected,
    Previewed,
    Confirmed,
}

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

pub struct Promotion<'a> {
    catalog: &'a Catalog,
    git: &'a dyn GitProvider,
    pull_requests: &'a dyn PullRequestProvider,
    prompt: &'a dyn PromptProvider,
    writer: &'a dyn DocumentWriter,
}

impl<'a> Promotion<'a> {
    pub fn new(
        catalog: &'a Catalog,
        git: &'a dyn GitProvider,
        pull_requests: &'a dyn PullRequestProvider,
        prompt: &'a dyn PromptProvider,
        writer: &'a dyn DocumentWriter,
    ) -> Promotion<'a> {
        Promotion {
            catalog,
            git,
            pull_requests,
            prompt,
            writer,
        }
    }

    pub fn run(&self, opts: &PromoteOptions) -> Result<Outcome> {
        let mut state = State::Idle;

        self.git.ensure_clean_and_up_to_date()?;
        advance(&mut state, State::WorkingCopyChecked);

        let (source, target) = self.resolve_environments(opts)?;
        advance(&mut state, State::EnvironmentsResolved);
        tracing::info!(from = %source.name, to = %target.name, "promotion environments resolved");

        // Rejected up front, before anything is computed or written.
        if opts.auto_merge && !target.promotion.allow_auto_merge {
            return Err(CaravelError::AutoMergeNotAllowed(target.name.clone()));
        }

        let envs = vec![source.clone(), target.clone()];
        let mut list = CrossReleaseList::build(self.catalog, &envs);
        cross::create_missing_target_releases(&mut list);
        list.items.retain(cross::promotable);
        advance(&mut state, State::CandidatesComputed);
        if list.items.is_empty() {
            return Ok(Outcome::NoCandidates);
        }

        let selected = self.select_releases(opts, &list)?;
        advance(&mut state, State::Selected);
        if selected.is_empty() {
            return Ok(Outcome::NoCandidates);
        }

        self.check_prerelease_policy(opts, &target, &list, &selected)?;

        let candidates = self.compute_previews(&list, &selected);
        advance(&mut state, State::Previewed);
        if candidates.is_empty() {
            return Ok(Outcome::UpToDate);
        }
        let previews: Vec<ReleasePreview> =
            candidates.iter().map(|c| c.preview.clone()).collect();
        if opts.dry_run {
            return Ok(Outcome::Previewed(previews));
        }

        if !opts.no_prompt && !self.prompt.confirm(&previews)? {
            tracing::info!("promotion cancelled, no harm done");
            return Ok(Outcome::Cancelled);
        }
        advance(&mut state, State::Confirmed);

        self.apply(opts, &source, &target, candidates)
    }

    fn resolve_environments(&self, opts: &PromoteOptions) -> Result<(Environment, Environment)> {
        let source = match &opts.from {
            Some(name) => self
                .catalog
                .environment(name)
                .ok_or_else(|| CaravelError::UnknownEnvironment(name.clone()))?
                .clone(),
            None => {
                let picked = self
                    .prompt
                    .select_environment("source", &self.catalog.environment_names())?;
                self.catalog
                    .environment(&picked)
                    .ok_or_else(|| CaravelError::UnknownEnvironment(picked.clone()))?
                    .clone()
            }
        };

        let target = match &opts.to {
            Some(name) => {
                let env = self
                    .catalog
                    .environment(name)
                    .ok_or_else(|| CaravelError::UnknownEnvironment(name.clone()))?;
                if !env.accepts_promotion_from(&source.name) {
                    return Err(CaravelError::PromotionNotAllowed {
                        from: source.name.clone(),
                        to: env.name.clone(),
                    });
                }
                env.clone()
            }
            None => {
                let options: Vec<String> = self
                    .catalog
                    .environments
                    .iter()
                    .filter(|e| e.accepts_promotion_from(&source.name))
                    .map(|e| e.name.clone())
                    .collect();
                if options.is_empty() {
                    return Err(CaravelError::PromotionNotAllowed {
                        from: source.name.clone(),
                        to: "any environment".to_string(),
                    });
                }
                let picked = self.prompt.select_environment("target", &options)?;
                self.catalog
                    .environment(&picked)
                    .ok_or_else(|| CaravelError::UnknownEnvironment(picked.clone()))?
                    .clone()
            }
        };
        Ok((source, target))
    }

    fn select_releases(
        &self,
        opts: &PromoteOptions,
        list: &CrossReleaseList,
    ) -> Result<Vec<String>> {
        let mut selected: Vec<String> = if !opts.releases.is_empty() {
            // Exact names must exist; glob patterns select whatever matches.
            let mut unknown = Vec::new();
            let mut picked = Vec::new();
            for wanted in &opts.releases {
                if is_pattern(wanted) {
                    for item in &list.items {
                        if matches_pattern(wanted, &item.name) && !picked.contains(&item.name) {
                            picked.push(item.name.clone());
                        }
                    }
                } else if list.get(wanted).is_some() {
                    if !picked.contains(wanted) {
                        picked.push(wanted.clone());
                    }
                } else {
                    unknown.push(wanted.clone());
                }
            }
            if !unknown.is_empty() {
                return Err(CaravelError::UnknownReleases(unknown.join(", ")));
            }
            picked
        } else if opts.all {
            list.items.iter().map(|i| i.name.clone()).collect()
        } else {
            let choices: Vec<ReleaseChoice> = list
                .items
                .iter()
                .map(|item| ReleaseChoice {
                    name: item.name.clone(),
                    current: item
                        .target()
                        .filter(|r| !r.missing)
                        .map(|r| r.version.clone()),
                    incoming: item
                        .source()
                        .map(|r| r.version.clone())
                        .unwrap_or_default(),
                })
                .collect();
            self.prompt.select_releases(&choices)?
        };
        selected.retain(|name| !opts.omit.contains(name));
        Ok(selected)
    }

    /// Non-prerelease rule: a pre-release or build-tagged version cannot move
    /// into an environment that disallows promotion from pull requests,
    /// unless the owning project (or the invocation) opts out.
    fn check_prerelease_policy(
        &self,
        opts: &PromoteOptions,
        target: &Environment,
        list: &CrossReleaseList,
        selected: &[String],
    ) -> Result<()> {
        if opts.keep_prerelease || target.promotion.from_pull_requests {
            return Ok(());
        }
        for name in selected {
            let Some(source) = list.get(name).and_then(|i| i.source()) else {
                continue;
            };
            if !is_prerelease(&source.version) {
                continue;
            }
            let project_allows = source
                .project
                .as_deref()
                .and_then(|p| self.catalog.project(p))
                .map(|p| p.promotion.allow_prereleases)
                .unwrap_or(false);
            if project_allows {
                continue;
            }
            return Err(CaravelError::PrereleaseBlocked {
                release: name.clone(),
                version: source.version.clone(),
                environment: target.name.clone(),
            });
        }
        Ok(())
    }

    /// Merge every selected release and pair the preview with the candidate
    /// document, so apply writes exactly what was shown. In-sync releases are
    /// excluded here.
    fn compute_previews(&self, list: &CrossReleaseList, selected: &[String]) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for name in selected {
            let Some(item) = list.get(name) else { continue };
            let (Some(source), Some(target)) = (item.source(), item.target()) else {
                continue;
            };
            let (candidate, old_text) = if target.missing {
                // Synthesized by create_missing_target_releases; already merged.
                (target.document.clone(), String::new())
            } else {
                let merged = merge::merge(&target.document, &source.document);
                if merged.to_bytes() == target.document.to_bytes() {
                    tracing::debug!(release = %name, "already in sync, skipping");
                    continue;
                }
                (merged, target.document.to_text())
            };
            let rel = candidate
                .relative_to(&self.catalog.root)
                .unwrap_or_else(|| candidate.path.clone());
            let diff = diff::unified(
                &old_text,
                &candidate.to_text(),
                &format!("a/{}", rel.display()),
                &format!("b/{}", rel.display()),
            );
            candidates.push(Candidate {
                preview: ReleasePreview {
                    name: name.clone(),
                    from_version: if target.missing {
                        None
                    } else {
                        Some(target.version.clone())
                    },
                    to_version: source.version.clone(),
                    missing: target.missing,
                    path: candidate.path.clone(),
                    diff,
                },
                document: candidate,
            });
        }
        candidates
    }

    fn apply(
        &self,
        opts: &PromoteOptions,
        source: &Environment,
        target: &Environment,
        candidates: Vec<Candidate>,
    ) -> Result<Outcome> {
        let mut files = Vec::new();
        for candidate in &candidates {
            self.writer.write(&candidate.document)?;
            files.push(candidate.document.path.clone());
        }
        let previews: Vec<ReleasePreview> =
            candidates.into_iter().map(|c| c.preview).collect();

        let branch = branch_name(&source.name, &target.name, &previews);
        let (title, body) = commit_message(&source.name, &target.name, &previews);
        let message = format!("{title}\n\n{body}");
        self.git.create_and_push_branch(&branch, &files, &message)?;

        let mut labels = vec![
            "promotion".to_string(),
            format!("from:{}", source.name),
            format!("to:{}", target.name),
        ];
        for preview in &previews {
            labels.push(format!("release:{}", preview.name));
        }
        if opts.auto_merge {
            labels.push("auto-merge".to_string());
        }
        let pr_url = self.pull_requests.create(&PullRequestSpec {
            branch: branch.clone(),
            title,
            body: pull_request_body(&body),
            labels,
            draft: opts.draft,
        })?;
        self.git.checkout_default_branch()?;
        tracing::info!(%branch, %pr_url, "promotion applied");

        Ok(Outcome::Applied {
            branch,
            pr_url,
            previews,
        })
    }
}

/// A previewed release paired with the merged document to write.
struct Candidate {
    preview: ReleasePreview,
    document: Document,
}

fn advance(state: &mut State, next: State) {
    tracing::debug!(from = ?state, to = ?next, "promotion state transition");
    *state = next;
}

/// Lenient pre-release check: an optional leading `v` is stripped; anything
/// unparseable counts as a release version (the policy only blocks versions
/// that are positively pre-release or build-tagged).
pub fn is_prerelease(version: &str) -> bool {
    let trimmed = version.strip_prefix('v').unwrap_or(version);
    match semver::Version::parse(trimmed) {
        Ok(v) => !v.pre.is_empty() || !v.build.is_empty(),
        Err(_) => false,
    }
}

/// Deterministic branch name from the promotion edge and the selection.
pub fn branch_name(source: &str, target: &str, previews: &[ReleasePreview]) -> String {
    let suffix = if previews.len() == 1 {
        sanitize(&previews[0].name)
    } else {
        let mut names: Vec<&str> = previews.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        let mut hasher = Sha256::new();
        hasher.update(names.join("\n").as_bytes());
        let token = hex::encode(&hasher.finalize()[..4]);
        format!("{}-releases-{token}", previews.len())
    };
    format!(
        "promote/{}-to-{}/{suffix}",
        sanitize(source),
        sanitize(target)
    )
}

fn is_pattern(text: &str) -> bool {
    text.contains(|c| c == '*' || c == '?')
}

/// Glob match with `*` (any run) and `?` (any one character).
fn matches_pattern(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ni;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ni = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

fn sanitize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '-' })
        .collect()
}

/// Commit subject and body. One line per release; full per-release lines when
/// the batch has more than one.
pub fn commit_message(source: &str, target: &str, previews: &[ReleasePreview]) -> (String, String) {
    let line = |p: &ReleasePreview| {
        let old = p.from_version.as_deref().unwrap_or("none");
        format!("{}: {} -> {}", p.name, old, p.to_version)
    };
    if previews.len() == 1 {
        let p = &previews[0];
        let title = format!("Promote {} from {source} to {target}", line(p));
        let body = format!(
            "Promoting release {} from environment {source} to {target}.\n",
            p.name
        );
        (title, body)
    } else {
        let title = format!(
            "Promote {} releases from {source} to {target}",
            previews.len()
        );
        let mut body = String::new();
        for p in previews {
            body.push_str(&format!("- {}\n", line(p)));
        }
        (title, body)
    }
}

/// Render the PR body from the commit body plus a generation footer.
pub fn pull_request_body(commit_body: &str) -> String {
    format!(
        "{commit_body}\nGenerated by caravel at {}.\n",
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    )
}
