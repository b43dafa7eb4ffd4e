use crate::output::{print_json, print_table};
use anyhow::{Context, Result};
use caravel_core::catalog::Catalog;
use caravel_core::cross::{all_releases_synced, CrossReleaseList};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ListSubcommand {
    /// Releases across every environment
    Releases {
        /// Only show releases present in this environment
        #[arg(long)]
        env: Option<String>,
    },
    /// Environments and their promotion policies
    Environments,
    /// Projects known to the catalog
    Projects,
}

pub fn run(root: &Path, subcommand: ListSubcommand, json: bool) -> Result<()> {
    let catalog = Catalog::load(root)
        .with_context(|| format!("loading catalog at {}", root.display()))?;
    match subcommand {
        ListSubcommand::Releases { env } => releases(&catalog, env.as_deref(), json),
        ListSubcommand::Environments => environments(&catalog, json),
        ListSubcommand::Projects => projects(&catalog, json),
    }
}

fn releases(catalog: &Catalog, env: Option<&str>, json: bool) -> Result<()> {
    let mut environments = catalog.environments.clone();
    environments.sort_by_key(|e| e.order);
    if let Some(name) = env {
        if !environments.iter().any(|e| e.name == name) {
            anyhow::bail!("unknown environment: {name}");
        }
    }

    let list = CrossReleaseList::build(catalog, &environments);
    let items: Vec<_> = list
        .items
        .iter()
        .filter(|item| match env {
            Some(name) => environments
                .iter()
                .position(|e| e.name == name)
                .and_then(|slot| item.release_in(slot))
                .is_some(),
            None => true,
        })
        .collect();

    if json {
        let rows: Vec<serde_json::Value> = items
            .iter()
            .map(|item| {
                let versions: serde_json::Map<String, serde_json::Value> = environments
                    .iter()
                    .enumerate()
                    .map(|(slot, e)| {
                        let version = item
                            .release_in(slot)
                            .map(|r| serde_json::Value::String(r.version.clone()))
                            .unwrap_or(serde_json::Value::Null);
                        (e.name.clone(), version)
                    })
                    .collect();
                serde_json::json!({
                    "name": item.name,
                    "environments": versions,
                    "synced": all_releases_synced(item),
                })
            })
            .collect();
        return print_json(&rows);
    }

    let mut headers: Vec<&str> = vec!["RELEASE"];
    for e in &environments {
        headers.push(&e.name);
    }
    headers.push("SYNCED");

    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|item| {
            let mut row = vec![item.name.clone()];
            for slot in 0..environments.len() {
                row.push(match item.release_in(slot) {
                    Some(r) => r.version.clone(),
                    None => "-".to_string(),
                });
            }
            row.push(if all_releases_synced(item) {
                "yes".to_string()
            } else {
                String::new()
            });
            row
        })
        .collect();
    print_table(&headers, rows);
    Ok(())
}

fn environments(catalog: &Catalog, json: bool) -> Result<()> {
    let mut environments = catalog.environments.clone();
    environments.sort_by_key(|e| e.order);

    if json {
        let rows: Vec<serde_json::Value> = environments
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "order": e.order,
                    "allowAutoMerge": e.promotion.allow_auto_merge,
                    "fromPullRequests": e.promotion.from_pull_requests,
                    "fromEnvironments": e.promotion.from_environments,
                })
            })
            .collect();
        return print_json(&rows);
    }

    let rows: Vec<Vec<String>> = environments
        .iter()
        .map(|e| {
            vec![
                e.name.clone(),
                e.order.to_string(),
                if e.promotion.allow_auto_merge {
                    "yes".to_string()
                } else {
                    "no".to_string()
                },
                if e.promotion.from_pull_requests {
                    "pull requests".to_string()
                } else {
                    e.promotion.from_environments.join(", ")
                },
            ]
        })
        .collect();
    print_table(&["NAME", "ORDER", "AUTO-MERGE", "PROMOTES FROM"], rows);
    Ok(())
}

fn projects(catalog: &Catalog, json: bool) -> Result<()> {
    if json {
        let rows: Vec<serde_json::Value> = catalog
            .projects
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "owners": p.owners,
                    "repository": p.repository,
                    "allowPrereleases": p.promotion.allow_prereleases,
                })
            })
            .collect();
        return print_json(&rows);
    }

    let rows: Vec<Vec<String>> = catalog
        .projects
        .iter()
        .map(|p| {
            vec![
                p.name.clone(),
                p.owners.join(", "),
                p.repository.clone().unwrap_or_else(|| "-".to_string()),
                if p.promotion.allow_prereleases {
                    "yes".to_string()
                } else {
                    "no".to_string()
                },
            ]
        })
        .collect();
    print_table(&["NAME", "OWNERS", "REPOSITORY", "PRERELEASES"], rows);
    Ok(())
}
