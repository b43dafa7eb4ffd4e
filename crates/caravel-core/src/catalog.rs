//! On-disk catalog model: environments, projects, and releases.
//!
//! Layout: `environments/<name>/env.yaml`, releases anywhere under
//! `environments/<name>/releases/`, projects under `projects/`. Everything is
//! loaded once per invocation and treated as immutable during a promotion
//! run; only the files written back to disk persist.

use crate::error::{CaravelError, Result};
use crate::yaml::Document;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const ENVIRONMENT_KIND: &str = "Environment";
pub const PROJECT_KIND: &str = "Project";
pub const RELEASE_KIND: &str = "Release";

// ---------------------------------------------------------------------------
// Typed specs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PromotionPolicy {
    pub allow_auto_merge: bool,
    pub from_pull_requests: bool,
    pub from_environments: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EnvironmentSpec {
    order: i32,
    promotion: PromotionPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectPromotion {
    pub allow_prereleases: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProjectSpec {
    owners: Vec<String>,
    repository: Option<String>,
    promotion: ProjectPromotion,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TypedFile<S> {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    spec: S,
}

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Environment {
    pub name: String,
    pub order: i32,
    pub promotion: PromotionPolicy,
    /// Directory holding this environment's files.
    pub dir: PathBuf,
}

impl Environment {
    /// True iff promotion from `source` into this environment is allowed.
    pub fn accepts_promotion_from(&self, source: &str) -> bool {
        self.promotion
            .from_environments
            .iter()
            .any(|n| n == source)
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.dir.join("releases")
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub owners: Vec<String>,
    pub repository: Option<String>,
    pub promotion: ProjectPromotion,
}

/// One environment's instance of a deployable unit.
#[derive(Debug, Clone)]
pub struct Release {
    pub name: String,
    pub project: Option<String>,
    pub version: String,
    pub environment: String,
    /// True when synthesized as a stand-in for a target environment that has
    /// no file yet.
    pub missing: bool,
    pub document: Document,
}

impl Release {
    pub fn from_document(environment: &str, document: Document) -> Release {
        let name = if document.metadata_name.is_empty() {
            document
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string()
        } else {
            document.metadata_name.clone()
        };
        let version = document
            .tree
            .scalar_at(&["spec", "version"])
            .unwrap_or_default()
            .to_string();
        let project = document
            .tree
            .scalar_at(&["spec", "project"])
            .map(str::to_string);
        Release {
            name,
            project,
            version,
            environment: environment.to_string(),
            missing: false,
            document,
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Catalog {
    pub root: PathBuf,
    pub environments: Vec<Environment>,
    pub projects: Vec<Project>,
    pub releases: Vec<Release>,
}

impl Catalog {
    pub fn load(root: &Path) -> Result<Catalog> {
        let env_root = root.join("environments");
        if !env_root.is_dir() {
            return Err(CaravelError::NotACatalog(root.to_path_buf()));
        }

        let mut environments = Vec::new();
        let mut releases = Vec::new();
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&env_root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let env_file = dir.join("env.yaml");
            if !env_file.is_file() {
                tracing::debug!(dir = %dir.display(), "skipping directory without env.yaml");
                continue;
            }
            let doc = Document::load(&env_file)?;
            if doc.kind != ENVIRONMENT_KIND {
                tracing::debug!(path = %env_file.display(), kind = %doc.kind, "skipping non-environment document");
                continue;
            }
            let typed: TypedFile<EnvironmentSpec> = serde_yaml::from_slice(&doc.bytes)?;
            let name = if typed.metadata.name.is_empty() {
                dir.file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string()
            } else {
                typed.metadata.name
            };
            for release in load_releases(&name, &dir)? {
                releases.push(release);
            }
            environments.push(Environment {
                name,
                order: typed.spec.order,
                promotion: typed.spec.promotion,
                dir,
            });
        }
        environments.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        releases.sort_by(|a, b| a.name.cmp(&b.name));

        let projects = load_projects(root)?;
        Ok(Catalog {
            root: root.to_path_buf(),
            environments,
            projects,
            releases,
        })
    }

    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name == name)
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn environment_names(&self) -> Vec<String> {
        self.environments.iter().map(|e| e.name.clone()).collect()
    }
}

fn load_releases(environment: &str, env_dir: &Path) -> Result<Vec<Release>> {
    let releases_dir = env_dir.join("releases");
    if !releases_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in WalkDir::new(&releases_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let doc = Document::load(path)?;
        if doc.kind != RELEASE_KIND {
            tracing::debug!(path = %path.display(), kind = %doc.kind, "skipping non-release document");
            continue;
        }
        out.push(Release::from_document(environment, doc));
    }
    Ok(out)
}

fn load_projects(root: &Path) -> Result<Vec<Project>> {
    let dir = root.join("projects");
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("yaml"))
        .collect();
    paths.sort();
    for path in paths {
        let doc = Document::load(&path)?;
        if doc.kind != PROJECT_KIND {
            tracing::debug!(path = %path.display(), kind = %doc.kind, "skipping non-project document");
            continue;
        }
        let typed: TypedFile<ProjectSpec> = serde_yaml::from_slice(&doc.bytes)?;
        out.push(Project {
            name: if typed.metadata.name.is_empty() {
                doc.metadata_name.clone()
            } else {
                typed.metadata.name
            },
            owners: typed.spec.owners,
            repository: typed.spec.repository,
            promotion: typed.spec.promotion,
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::Path;

    pub fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    pub fn env_yaml(name: &str, order: i32, from: &[&str], auto_merge: bool) -> String {
        let from_list = from.join(", ");
        format!(
            "apiVersion: caravel.dev/v1alpha1\nkind: Environment\nmetadata:\n  name: {name}\nspec:\n  order: {order}\n  promotion:\n    allowAutoMerge: {auto_merge}\n    fromPullRequests: false\n    fromEnvironments: [{from_list}]\n"
        )
    }

    pub fn release_yaml(name: &str, version: &str) -> String {
        format!(
            "apiVersion: caravel.dev/v1alpha1\nkind: Release\nmetadata:\n  name: {name}\nspec:\n  project: shop\n  version: {version}\n  values:\n    replicas: 2\n"
        )
    }
}
