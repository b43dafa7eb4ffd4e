//! Cross-environment release alignment.
//!
//! A [`CrossRelease`] is one named release viewed across an ordered list of
//! environments: slot `i` holds the release's instance in environment `i`, or
//! `None` where the environment has no file for it.

use crate::catalog::{Catalog, Environment, Release};
use crate::lock::is_locked;
use crate::merge;
use crate::yaml::{Node, NodeValue};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct CrossRelease {
    pub name: String,
    /// Positionally aligned with the owning list's environments.
    pub releases: Vec<Option<Release>>,
}

impl CrossRelease {
    pub fn release_in(&self, index: usize) -> Option<&Release> {
        self.releases.get(index).and_then(Option::as_ref)
    }

    /// Source release of a two-environment projection.
    pub fn source(&self) -> Option<&Release> {
        self.release_in(0)
    }

    /// Target release of a two-environment projection.
    pub fn target(&self) -> Option<&Release> {
        self.release_in(1)
    }
}

#[derive(Debug, Clone)]
pub struct CrossReleaseList {
    pub environments: Vec<Environment>,
    /// All cross-releases, sorted by name.
    pub items: Vec<CrossRelease>,
}

impl CrossReleaseList {
    /// Bucket every catalog release by environment slot.
    pub fn build(catalog: &Catalog, environments: &[Environment]) -> CrossReleaseList {
        let mut by_name: BTreeMap<String, CrossRelease> = BTreeMap::new();
        for release in &catalog.releases {
            let Some(slot) = environments
                .iter()
                .position(|e| e.name == release.environment)
            else {
                continue;
            };
            let item = by_name
                .entry(release.name.clone())
                .or_insert_with(|| CrossRelease {
                    name: release.name.clone(),
                    releases: vec![None; environments.len()],
                });
            item.releases[slot] = Some(release.clone());
        }
        CrossReleaseList {
            environments: environments.to_vec(),
            items: by_name.into_values().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CrossRelease> {
        self.items.iter().find(|i| i.name == name)
    }
}

/// True iff promotion of this cross-release makes sense: exactly two
/// environments under consideration and a release present in the source slot.
pub fn promotable(item: &CrossRelease) -> bool {
    item.releases.len() == 2 && item.source().is_some()
}

/// True iff the release exists everywhere, nothing is synthesized, and all
/// instances agree on content (ignoring the values of locked fields, so
/// per-environment secrets don't count as drift).
pub fn all_releases_synced(item: &CrossRelease) -> bool {
    let mut prints = Vec::with_capacity(item.releases.len());
    for slot in &item.releases {
        match slot {
            Some(release) if !release.missing => {
                prints.push(content_fingerprint(&release.document.tree));
            }
            _ => return false,
        }
    }
    prints.windows(2).all(|w| w[0] == w[1])
}

/// Structural hash of a tree that skips the value of any locked node.
pub fn content_fingerprint(tree: &Node) -> String {
    let mut hasher = Sha256::new();
    hash_node(tree, false, &mut hasher);
    hex::encode(hasher.finalize())
}

fn hash_node(node: &Node, inherited_lock: bool, hasher: &mut Sha256) {
    let locked = inherited_lock || is_locked(node);
    if let Some(tag) = node.tag.as_str() {
        hasher.update(b"t:");
        hasher.update(tag.as_bytes());
    }
    match &node.value {
        NodeValue::Scalar(value) => {
            hasher.update(b"s:");
            if locked {
                hasher.update(b"<locked>");
            } else {
                hasher.update(value.as_bytes());
            }
        }
        NodeValue::Alias(name) => {
            hasher.update(b"a:");
            hasher.update(name.as_bytes());
        }
        NodeValue::Mapping(entries) => {
            hasher.update(b"m{");
            for entry in entries {
                hash_node(&entry.key, locked, hasher);
                hasher.update(b"=");
                hash_node(&entry.value, locked, hasher);
                hasher.update(b";");
            }
            hasher.update(b"}");
        }
        NodeValue::Sequence(items) => {
            hasher.update(b"q[");
            for item in items {
                hash_node(item, locked, hasher);
                hasher.update(b";");
            }
            hasher.update(b"]");
        }
    }
}

/// For every promotable cross-release missing its target instance, synthesize
/// one by merging the source against an absent target. The synthesized file
/// mirrors the source's path relative to its environment directory, under the
/// target environment's directory.
pub fn create_missing_target_releases(list: &mut CrossReleaseList) {
    if list.environments.len() != 2 {
        return;
    }
    let source_env = list.environments[0].clone();
    let target_env = list.environments[1].clone();
    for item in &mut list.items {
        if !promotable(item) || item.target().is_some() {
            continue;
        }
        let Some(source) = item.source() else { continue };
        let relative = source
            .document
            .relative_to(&source_env.dir)
            .unwrap_or_else(|| std::path::PathBuf::from(source.document.file_name()));
        let target_path = target_env.dir.join(relative);
        let document = merge::merge_documents(None, &source.document, &target_path);
        let mut release = Release::from_document(&target_env.name, document);
        release.missing = true;
        item.releases[1] = Some(release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testutil::{env_yaml, release_yaml, write};
    use crate::lock::LOCKED_PLACEHOLDER;
    use crate::yaml::Document;
    use tempfile::TempDir;

    fn two_env_catalog() -> (TempDir, Catalog) {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "environments/staging/env.yaml",
            &env_yaml("staging", 1, &[], false),
        );
        write(
            dir.path(),
            "environments/prod/env.yaml",
            &env_yaml("prod", 2, &["staging"], true),
        );
        write(
            dir.path(),
            "environments/staging/releases/foo.yaml",
            &release_yaml("foo", "1.2.4"),
        );
        let catalog = Catalog::load(dir.path()).unwrap();
        (dir, catalog)
    }

    fn tree(text: &str) -> Node {
        Document::parse("t.yaml", text.as_bytes().to_vec())
            .unwrap()
            .tree
    }

    #[test]
    fn promotable_requires_source_slot() {
        let (_dir, catalog) = two_env_catalog();
        let list = CrossReleaseList::build(&catalog, &catalog.environments.clone());
        let foo = list.get("foo").unwrap();
        assert!(promotable(foo));

        let empty_source = CrossRelease {
            name: "bar".to_string(),
            releases: vec![None, foo.releases[0].clone()],
        };
        assert!(!promotable(&empty_source));

        let three_envs = CrossRelease {
            name: "baz".to_string(),
            releases: vec![foo.releases[0].clone(), None, None],
        };
        assert!(!promotable(&three_envs));
    }

    #[test]
    fn fingerprint_ignores_locked_values() {
        let a = tree("spec:\n  password: !lock one\n  image: v1\n");
        let b = tree("spec:\n  password: !lock two\n  image: v1\n");
        let c = tree("spec:\n  password: !lock one\n  image: v2\n");
        assert_eq!(content_fingerprint(&a), content_fingerprint(&b));
        assert_ne!(content_fingerprint(&a), content_fingerprint(&c));
    }

    #[test]
    fn synced_detection_tolerates_locked_drift() {
        let (dir, _) = two_env_catalog();
        write(
            dir.path(),
            "environments/staging/releases/db.yaml",
            "kind: Release\nmetadata:\n  name: db\nspec:\n  version: 1.0.0\n  password: !lock aaa\n",
        );
        write(
            dir.path(),
            "environments/prod/releases/db.yaml",
            "kind: Release\nmetadata:\n  name: db\nspec:\n  version: 1.0.0\n  password: !lock bbb\n",
        );
        let catalog = Catalog::load(dir.path()).unwrap();
        let list = CrossReleaseList::build(&catalog, &catalog.environments.clone());
        assert!(all_releases_synced(list.get("db").unwrap()));
        // foo exists only in staging.
        assert!(!all_releases_synced(list.get("foo").unwrap()));
    }

    #[test]
    fn missing_target_is_synthesized_with_placeholders() {
        let (dir, _) = two_env_catalog();
        write(
            dir.path(),
            "environments/staging/releases/foo.yaml",
            "kind: Release\nmetadata:\n  name: foo\nspec:\n  version: 1.2.4\n  apiKey: !lock abc123\n",
        );
        let catalog = Catalog::load(dir.path()).unwrap();
        let mut list = CrossReleaseList::build(&catalog, &catalog.environments.clone());
        create_missing_target_releases(&mut list);

        let foo = list.get("foo").unwrap();
        let target = foo.target().unwrap();
        assert!(target.missing);
        assert_eq!(target.environment, "prod");
        assert_eq!(target.version, "1.2.4");
        assert_eq!(
            target.document.path,
            dir.path().join("environments/prod/releases/foo.yaml")
        );
        assert_eq!(
            target.document.tree.scalar_at(&["spec", "apiKey"]),
            Some(LOCKED_PLACEHOLDER)
        );
        // Nothing written to disk yet.
        assert!(!target.document.path.exists());
    }
}
