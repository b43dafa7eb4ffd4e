//! Locked/local node semantics.
//!
//! An author marks a field `!lock` in an environment's file to pin its value
//! against promotion, and `!local` to keep the field out of every other
//! environment entirely. Both transforms here return new trees; merge inputs
//! are never mutated in place.

use crate::yaml::{MapEntry, Node, NodeValue, Tag};

/// Value inserted where a newly-introduced locked field needs a manual,
/// environment-specific value.
pub const LOCKED_PLACEHOLDER: &str = "TODO fill in for this environment";

/// True iff the node is pinned against promotion via the `!lock` tag.
pub fn is_locked(node: &Node) -> bool {
    node.tag == Tag::Lock
}

/// True iff the node is environment-exclusive via the `!local` tag.
pub fn is_local(node: &Node) -> bool {
    node.tag == Tag::Local
}

/// Structural copy in which every scalar under a locked node (including a
/// locked scalar itself) has its value replaced by [`LOCKED_PLACEHOLDER`].
/// `inherited` carries lock state down from an ancestor.
pub fn mark_locked_as_placeholder(node: &Node, inherited: bool) -> Node {
    let locked = inherited || is_locked(node);
    let mut out = node.clone();
    out.value = match &node.value {
        NodeValue::Scalar(text) => {
            if locked {
                out.quote = crate::yaml::Quote::Plain;
                NodeValue::Scalar(LOCKED_PLACEHOLDER.to_string())
            } else {
                NodeValue::Scalar(text.clone())
            }
        }
        NodeValue::Mapping(entries) => NodeValue::Mapping(
            entries
                .iter()
                .map(|e| MapEntry {
                    key: e.key.clone(),
                    value: mark_locked_as_placeholder(&e.value, locked),
                })
                .collect(),
        ),
        NodeValue::Sequence(items) => NodeValue::Sequence(
            items
                .iter()
                .map(|i| mark_locked_as_placeholder(i, locked))
                .collect(),
        ),
        NodeValue::Alias(name) => NodeValue::Alias(name.clone()),
    };
    out
}

/// Structural copy with every local node removed. A wholly-local node
/// collapses to `None`, never to an empty container.
pub fn purge_local(node: &Node) -> Option<Node> {
    if is_local(node) {
        return None;
    }
    let mut out = node.clone();
    out.value = match &node.value {
        NodeValue::Mapping(entries) => {
            let kept: Vec<MapEntry> = entries
                .iter()
                .filter(|e| !is_local(&e.key) && !is_local(&e.value))
                .filter_map(|e| {
                    purge_local(&e.value).map(|value| MapEntry {
                        key: e.key.clone(),
                        value,
                    })
                })
                .collect();
            if kept.is_empty() && !entries.is_empty() {
                return None;
            }
            NodeValue::Mapping(kept)
        }
        NodeValue::Sequence(items) => {
            let kept: Vec<Node> = items.iter().filter_map(purge_local).collect();
            if kept.is_empty() && !items.is_empty() {
                return None;
            }
            NodeValue::Sequence(kept)
        }
        other => other.clone(),
    };
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::Document;

    fn tree(text: &str) -> Node {
        Document::parse("test.yaml", text.as_bytes().to_vec())
            .unwrap()
            .tree
    }

    #[test]
    fn locked_scalar_becomes_placeholder() {
        let t = tree("password: !lock hunter2\nname: foo\n");
        let out = mark_locked_as_placeholder(&t, false);
        assert_eq!(out.scalar_at(&["password"]), Some(LOCKED_PLACEHOLDER));
        assert_eq!(out.scalar_at(&["name"]), Some("foo"));
        // Input untouched.
        assert_eq!(t.scalar_at(&["password"]), Some("hunter2"));
    }

    #[test]
    fn lock_on_mapping_rewrites_all_descendants() {
        let t = tree("creds: !lock\n  user: admin\n  pass: secret\n");
        let out = mark_locked_as_placeholder(&t, false);
        assert_eq!(out.scalar_at(&["creds", "user"]), Some(LOCKED_PLACEHOLDER));
        assert_eq!(out.scalar_at(&["creds", "pass"]), Some(LOCKED_PLACEHOLDER));
        // The lock tag itself survives the rewrite.
        assert!(is_locked(out.get("creds").unwrap()));
    }

    #[test]
    fn purge_removes_local_entries() {
        let t = tree("wiring: !local\n  host: db1\nname: foo\n");
        let out = purge_local(&t).unwrap();
        assert!(out.get("wiring").is_none());
        assert_eq!(out.scalar_at(&["name"]), Some("foo"));
    }

    #[test]
    fn purge_removes_local_sequence_items() {
        let t = tree("items:\n  - keep\n  - !local drop\n");
        let out = purge_local(&t).unwrap();
        let items = out.get("items").unwrap().items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_scalar(), Some("keep"));
    }

    #[test]
    fn wholly_local_node_collapses_to_absence() {
        // A container left with nothing after the purge vanishes outright.
        let t = tree("only: !local\n  a: 1\n");
        assert!(purge_local(&t).is_none());

        let t = tree("only: !local\n  a: 1\nname: foo\n");
        let out = purge_local(&t).unwrap();
        assert!(out.get("only").is_none());
        assert_eq!(out.entries().len(), 1);

        let local_root = tree("a: 1\n").get("a").unwrap().clone();
        let mut tagged = local_root;
        tagged.tag = crate::yaml::Tag::Local;
        assert!(purge_local(&tagged).is_none());
    }
}
