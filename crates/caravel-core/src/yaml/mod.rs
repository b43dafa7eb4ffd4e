//! Round-trippable YAML document model.
//!
//! A [`Document`] owns the parsed tree of one catalog file plus the layout
//! metadata needed to serialize it back to its original text. Typed access to
//! environment/project specs goes through serde_yaml on the raw bytes; the
//! tree is for the merge engine, which must preserve comments and `!` tags.

mod emitter;
pub mod node;
mod parser;

pub use node::{MapEntry, Node, NodeValue, Quote, Style, Tag};

use crate::error::{CaravelError, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    /// Raw serialized form as read from disk (or produced by `with_tree`).
    pub bytes: Vec<u8>,
    pub tree: Node,
    pub api_version: String,
    pub kind: String,
    pub metadata_name: String,
    /// Detected indentation width, used when re-serializing.
    pub indent: usize,
    doc_start: bool,
    foot_comment: Vec<String>,
}

impl Document {
    pub fn parse(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<Document> {
        let path = path.into();
        let text = String::from_utf8_lossy(&bytes);
        let parsed = parser::parse(&text).map_err(|e| CaravelError::Parse {
            path: path.clone(),
            line: e.line,
            message: e.message,
        })?;
        let api_version = parsed.root.scalar_at(&["apiVersion"]).unwrap_or("").to_string();
        let kind = parsed.root.scalar_at(&["kind"]).unwrap_or("").to_string();
        let metadata_name = parsed
            .root
            .scalar_at(&["metadata", "name"])
            .unwrap_or("")
            .to_string();
        Ok(Document {
            path,
            bytes,
            tree: parsed.root,
            api_version,
            kind,
            metadata_name,
            indent: parsed.indent,
            doc_start: parsed.doc_start,
            foot_comment: parsed.foot_comment,
        })
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Document> {
        let path = path.into();
        let bytes = std::fs::read(&path)?;
        Document::parse(path, bytes)
    }

    /// Serialize the current tree. Equals `bytes` for unmodified documents in
    /// the supported subset (modulo trailing-newline normalization).
    pub fn to_bytes(&self) -> Vec<u8> {
        emitter::emit(&self.tree, self.indent, self.doc_start, &self.foot_comment).into_bytes()
    }

    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }

    /// A copy of this document carrying a new tree (and re-derived bytes),
    /// keeping path and layout settings. Used by the merge engine, which
    /// never mutates its inputs.
    pub fn with_tree(&self, tree: Node) -> Document {
        let mut doc = Document {
            tree,
            ..self.clone()
        };
        doc.bytes = doc.to_bytes();
        doc
    }

    /// A copy re-homed at `path`, for synthesized target releases.
    pub fn at_path(&self, path: impl Into<PathBuf>) -> Document {
        Document {
            path: path.into(),
            ..self.clone()
        }
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Path of this document relative to `base`, when it lives under it.
    pub fn relative_to(&self, base: &Path) -> Option<PathBuf> {
        self.path.strip_prefix(base).ok().map(Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE: &str = "apiVersion: caravel.dev/v1alpha1\nkind: Release\nmetadata:\n  name: foo\nspec:\n  version: 1.2.3\n";

    #[test]
    fn parse_derives_header_fields() {
        let doc = Document::parse("foo.yaml", RELEASE.as_bytes().to_vec()).unwrap();
        assert_eq!(doc.api_version, "caravel.dev/v1alpha1");
        assert_eq!(doc.kind, "Release");
        assert_eq!(doc.metadata_name, "foo");
        assert_eq!(doc.indent, 2);
    }

    #[test]
    fn to_bytes_round_trips() {
        let doc = Document::parse("foo.yaml", RELEASE.as_bytes().to_vec()).unwrap();
        assert_eq!(doc.to_bytes(), RELEASE.as_bytes());
    }

    #[test]
    fn with_tree_rederives_bytes() {
        let doc = Document::parse("foo.yaml", RELEASE.as_bytes().to_vec()).unwrap();
        let mut tree = doc.tree.clone();
        if let NodeValue::Mapping(entries) = &mut tree.value {
            entries.retain(|e| e.key.as_scalar() != Some("spec"));
        }
        let changed = doc.with_tree(tree);
        assert!(!changed.to_text().contains("version"));
        assert_eq!(changed.path, doc.path);
    }

    #[test]
    fn parse_error_carries_path_and_line() {
        let err = Document::parse("bad.yaml", b"a: 1\na: 2\n".to_vec()).unwrap_err();
        match err {
            CaravelError::Parse { path, line, .. } => {
                assert_eq!(path, PathBuf::from("bad.yaml"));
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
