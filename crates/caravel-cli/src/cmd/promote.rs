use crate::output::print_json;
use crate::prompt::InquirePrompt;
use anyhow::{Context, Result};
use caravel_core::catalog::Catalog;
use caravel_core::git::ShellGit;
use caravel_core::github::GhPullRequests;
use caravel_core::promote::{FsDocumentWriter, Outcome, PromoteOptions, Promotion, ReleasePreview};
use std::path::Path;

pub fn run(root: &Path, opts: PromoteOptions, json: bool) -> Result<()> {
    let catalog = Catalog::load(root)
        .with_context(|| format!("loading catalog at {}", root.display()))?;
    let git = ShellGit::new(root);
    let pull_requests = GhPullRequests::new(root);
    let prompt = InquirePrompt;
    let writer = FsDocumentWriter;

    let promotion = Promotion::new(&catalog, &git, &pull_requests, &prompt, &writer);
    let outcome = promotion.run(&opts)?;

    match outcome {
        Outcome::Applied {
            branch,
            pr_url,
            previews,
        } => {
            if json {
                print_json(&serde_json::json!({
                    "status": "applied",
                    "branch": branch,
                    "pullRequest": pr_url,
                    "releases": preview_rows(&previews),
                }))?;
            } else {
                for preview in &previews {
                    println!(
                        "promoted {}: {} -> {}",
                        preview.name,
                        preview.from_version.as_deref().unwrap_or("none"),
                        preview.to_version
                    );
                }
                println!("{}", pr_url);
            }
        }
        Outcome::Previewed(previews) => {
            if json {
                print_json(&serde_json::json!({
                    "status": "previewed",
                    "releases": preview_rows(&previews),
                }))?;
            } else {
                for preview in &previews {
                    println!("{}", preview.diff);
                }
                println!();
                println!("dry run: no files written, no pull request opened");
            }
        }
        Outcome::UpToDate => {
            if json {
                print_json(&serde_json::json!({ "status": "up-to-date" }))?;
            } else {
                println!("everything already in sync, nothing to promote");
            }
        }
        Outcome::NoCandidates => {
            if json {
                print_json(&serde_json::json!({ "status": "no-candidates" }))?;
            } else {
                println!("no promotable releases between these environments");
            }
        }
        Outcome::Cancelled => {
            if json {
                print_json(&serde_json::json!({ "status": "cancelled" }))?;
            } else {
                println!("cancelled");
            }
        }
    }
    Ok(())
}

fn preview_rows(previews: &[ReleasePreview]) -> Vec<serde_json::Value> {
    previews
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "from": p.from_version,
                "to": p.to_version,
                "missing": p.missing,
                "path": p.path,
            })
        })
        .collect()
}
