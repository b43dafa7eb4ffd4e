//! The promotion merge: combine a target environment's existing document with
//! a source environment's document into the new target document.
//!
//! Parameter order is always (target, source). The source tree is
//! pre-processed once before recursion: local nodes are purged and every
//! locked scalar is rewritten to the manual placeholder. The target tree is
//! evaluated in place, never pre-processed. Inputs are never mutated; every
//! pass returns a new tree so callers can diff before/after.

use crate::lock::{is_local, is_locked, mark_locked_as_placeholder, purge_local};
use crate::yaml::{Document, MapEntry, Node, NodeValue, Style};
use std::path::Path;

/// Merge `source` into `target`, producing the document to write back at the
/// target's path.
pub fn merge(target: &Document, source: &Document) -> Document {
    merge_documents(Some(target), source, &target.path.clone())
}

/// Merge with an optional target. An absent target adopts the prepared source
/// wholesale (locals purged, locked scalars placeholdered) and is re-homed at
/// `target_path`; this is how a brand-new environment first receives its
/// "needs attention" markers.
pub fn merge_documents(
    target: Option<&Document>,
    source: &Document,
    target_path: &Path,
) -> Document {
    let prepared = prepare_source(&source.tree);
    let merged = merge_nodes(target.map(|d| &d.tree), prepared.as_ref())
        .unwrap_or_else(|| Node::mapping(Vec::new()));
    let base = target.unwrap_or(source);
    base.with_tree(merged).at_path(target_path)
}

/// Pre-process a source tree for promotion: purge `!local` subtrees, then
/// rewrite every locked scalar to the placeholder sentinel.
pub fn prepare_source(tree: &Node) -> Option<Node> {
    purge_local(tree).map(|t| mark_locked_as_placeholder(&t, false))
}

/// The recursive merge. `source` must already be prepared. Returns `None`
/// when the path should not exist in the merged output.
pub fn merge_nodes(target: Option<&Node>, source: Option<&Node>) -> Option<Node> {
    match (target, source) {
        (None, None) => None,
        (Some(t), None) => Some(t.clone()),
        // A lock in the target pins its value; the source is ignored at and
        // below this path.
        (Some(t), Some(_)) if is_locked(t) => Some(t.clone()),
        // A locked source never overwrites an already-configured target
        // value; its placeholder is informational only.
        (Some(t), Some(s)) if is_locked(s) => Some(t.clone()),
        // A local node in the target is that environment's own content.
        (Some(t), Some(_)) if is_local(t) => Some(t.clone()),
        (None, Some(s)) => Some(s.clone()),
        (Some(t), Some(s)) => match (&t.value, &s.value) {
            (NodeValue::Mapping(_), NodeValue::Mapping(_)) => merge_mappings(t, s),
            (NodeValue::Sequence(_), NodeValue::Sequence(_)) => merge_sequences(t, s),
            // Kind mismatch, scalars, aliases: the source value wins, carrying
            // over the target's comments so human notes survive the update.
            _ => Some(adopt_source(t, s)),
        },
    }
}

fn merge_mappings(target: &Node, source: &Node) -> Option<Node> {
    let mut entries: Vec<MapEntry> = Vec::new();
    for te in target.entries() {
        let key = te.key.as_scalar();
        let sv = key.and_then(|k| source.get(k));
        if let Some(value) = merge_nodes(Some(&te.value), sv) {
            entries.push(MapEntry {
                key: te.key.clone(),
                value,
            });
        }
    }
    for se in source.entries() {
        let key = se.key.as_scalar();
        let seen = key.is_some_and(|k| target.get(k).is_some());
        if seen {
            continue;
        }
        if let Some(value) = merge_nodes(None, Some(&se.value)) {
            entries.push(MapEntry {
                key: se.key.clone(),
                value,
            });
        }
    }
    if entries.is_empty() {
        return None;
    }
    let mut out = target.clone();
    out.value = NodeValue::Mapping(entries);
    out.style = merged_style(target, source);
    Some(out)
}

fn merge_sequences(target: &Node, source: &Node) -> Option<Node> {
    let t_items = target.items();
    let s_items = source.items();
    let mut items = Vec::new();
    for i in 0..t_items.len().max(s_items.len()) {
        if let Some(item) = merge_nodes(t_items.get(i), s_items.get(i)) {
            items.push(item);
        }
    }
    if items.is_empty() {
        return None;
    }
    let mut out = target.clone();
    out.value = NodeValue::Sequence(items);
    out.style = merged_style(target, source);
    Some(out)
}

/// The merged container keeps the target's visual style unless the source is
/// explicitly more compact (flow), avoiding gratuitous reformatting.
fn merged_style(target: &Node, source: &Node) -> Style {
    if source.style == Style::Flow {
        Style::Flow
    } else {
        target.style
    }
}

/// Source value with the target's comments retained when the source carries
/// none of its own.
fn adopt_source(target: &Node, source: &Node) -> Node {
    let mut out = source.clone();
    if out.head_comment.is_empty() {
        out.head_comment = target.head_comment.clone();
    }
    if out.line_comment.is_none() {
        out.line_comment = target.line_comment.clone();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LOCKED_PLACEHOLDER;
    use crate::yaml::Document;

    fn doc(text: &str) -> Document {
        Document::parse("test.yaml", text.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn locked_target_value_is_never_replaced() {
        let target = doc("spec:\n  replicas: !lock 5\n  image: v1\n");
        let source = doc("spec:\n  replicas: 2\n  image: v2\n");
        let merged = merge(&target, &source);
        assert_eq!(merged.tree.scalar_at(&["spec", "replicas"]), Some("5"));
        assert_eq!(merged.tree.scalar_at(&["spec", "image"]), Some("v2"));
    }

    #[test]
    fn locked_source_keeps_existing_target_value() {
        let target = doc("spec:\n  password: configured\n");
        let source = doc("spec:\n  password: !lock secret\n");
        let merged = merge(&target, &source);
        assert_eq!(
            merged.tree.scalar_at(&["spec", "password"]),
            Some("configured")
        );
    }

    #[test]
    fn locked_source_into_absent_target_becomes_placeholder() {
        let target = doc("spec:\n  image: v1\n");
        let source = doc("spec:\n  image: v2\n  password: !lock secret\n");
        let merged = merge(&target, &source);
        assert_eq!(
            merged.tree.scalar_at(&["spec", "password"]),
            Some(LOCKED_PLACEHOLDER)
        );
        // The lock tag is carried so the next promotion still treats it as pinned.
        assert!(crate::lock::is_locked(
            merged.tree.get_path(&["spec", "password"]).unwrap()
        ));
    }

    #[test]
    fn local_source_nodes_never_cross_environments() {
        let target = doc("spec:\n  image: v1\n");
        let source = doc("spec:\n  image: v2\n  wiring: !local\n    host: db1\n");
        let merged = merge(&target, &source);
        assert!(merged.tree.get_path(&["spec", "wiring"]).is_none());
    }

    #[test]
    fn local_target_nodes_are_preserved() {
        let target = doc("spec:\n  wiring: !local\n    host: db9\n");
        let source = doc("spec:\n  image: v2\n");
        let merged = merge(&target, &source);
        assert_eq!(
            merged.tree.scalar_at(&["spec", "wiring", "host"]),
            Some("db9")
        );
    }

    #[test]
    fn nested_lock_scenario() {
        // T = {a: b, e: {f: g, h: i}}, S = {e: {!lock f: q, r: s}}
        let target = doc("a: b\ne:\n  f: g\n  h: i\n");
        let source = doc("e:\n  f: !lock q\n  r: s\n");
        let merged = merge(&target, &source);
        assert_eq!(merged.tree.scalar_at(&["a"]), Some("b"));
        assert_eq!(merged.tree.scalar_at(&["e", "f"]), Some("g"));
        assert_eq!(merged.tree.scalar_at(&["e", "h"]), Some("i"));
        assert_eq!(merged.tree.scalar_at(&["e", "r"]), Some("s"));
    }

    #[test]
    fn unlocked_promotion_is_idempotent() {
        let target = doc("spec:\n  image: v1\n  extras:\n    a: 1\n");
        let source = doc("spec:\n  image: v2\n  extras:\n    b: 2\n");
        let once = merge(&target, &source);
        let twice = merge(&once, &source);
        assert_eq!(once.to_bytes(), twice.to_bytes());
    }

    #[test]
    fn kind_mismatch_adopts_source() {
        let target = doc("value:\n  nested: x\n");
        let source = doc("value: plain\n");
        let merged = merge(&target, &source);
        assert_eq!(merged.tree.scalar_at(&["value"]), Some("plain"));
    }

    #[test]
    fn empty_recursive_result_disappears() {
        let target = doc("spec:\n  only: !local\n    a: 1\nname: x\n");
        let source = doc("name: y\n");
        // Target's local entry survives untouched; but a source-only subtree
        // that purges to nothing must not appear as an empty mapping.
        let source2 = doc("name: y\nextra:\n  gone: !local v\n");
        let merged = merge(&target, &source2);
        assert!(merged.tree.get("extra").is_none());
        let merged2 = merge(&target, &source);
        assert_eq!(merged2.tree.scalar_at(&["name"]), Some("y"));
    }

    #[test]
    fn absent_target_adopts_prepared_source() {
        let source = doc(
            "apiVersion: v1\nkind: Release\nmetadata:\n  name: foo\nspec:\n  version: 1.2.4\n  password: !lock secret\n  wiring: !local w\n",
        );
        let merged = merge_documents(None, &source, Path::new("environments/prod/releases/foo.yaml"));
        assert_eq!(merged.path, Path::new("environments/prod/releases/foo.yaml"));
        assert_eq!(merged.tree.scalar_at(&["spec", "version"]), Some("1.2.4"));
        assert_eq!(
            merged.tree.scalar_at(&["spec", "password"]),
            Some(LOCKED_PLACEHOLDER)
        );
        assert!(merged.tree.get_path(&["spec", "wiring"]).is_none());
    }

    #[test]
    fn source_flow_style_wins_over_block() {
        let target = doc("chart:\n  repo: stable\n  name: app\n");
        let source = doc("chart: {repo: stable, name: app2}\n");
        let merged = merge(&target, &source);
        let chart = merged.tree.get("chart").unwrap();
        assert_eq!(chart.style, Style::Flow);
        assert_eq!(chart.scalar_at(&["name"]), Some("app2"));
    }

    #[test]
    fn target_comments_survive_value_updates() {
        let target = doc("image: v1 # pinned by ops\n");
        let source = doc("image: v2\n");
        let merged = merge(&target, &source);
        assert!(merged.to_text().contains("# pinned by ops"));
        assert_eq!(merged.tree.scalar_at(&["image"]), Some("v2"));
    }
}
