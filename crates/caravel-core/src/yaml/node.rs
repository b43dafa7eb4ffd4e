//! Generic tree representation of one YAML document.
//!
//! Nodes keep enough layout metadata (tag, quoting, block/flow style, head and
//! trailing comments, anchors) to re-serialize a parsed file back to its
//! original text. The merge engine operates on this tree directly.

/// Structural annotation attached to a node via a `!` tag.
///
/// `!lock` pins a value against promotion; `!local` keeps a node out of other
/// environments entirely. Any other tag is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Tag {
    #[default]
    None,
    Lock,
    Local,
    Other(String),
}

impl Tag {
    pub fn parse(text: &str) -> Tag {
        match text {
            "!lock" => Tag::Lock,
            "!local" => Tag::Local,
            other => Tag::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tag::None => None,
            Tag::Lock => Some("!lock"),
            Tag::Local => Some("!local"),
            Tag::Other(s) => Some(s),
        }
    }
}

/// Container layout: block (one entry per line) or flow (`{..}` / `[..]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Block,
    Flow,
}

/// Scalar presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quote {
    #[default]
    Plain,
    Single,
    Double,
    /// `|` block scalar; the value holds the raw lines joined by newlines.
    Literal,
    /// `>` block scalar, carried verbatim like `Literal`.
    Folded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeValue {
    Scalar(String),
    Mapping(Vec<MapEntry>),
    Sequence(Vec<Node>),
    /// `*name` reference; opaque and atomic during merge.
    Alias(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub key: Node,
    pub value: Node,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub value: NodeValue,
    pub tag: Tag,
    pub quote: Quote,
    pub style: Style,
    /// Block sequence whose `-` items sit at the owning key's indent instead
    /// of one level deeper.
    pub indentless: bool,
    pub anchor: Option<String>,
    /// Comment/blank lines directly above the node (`""` is a blank line,
    /// other entries start with `#`).
    pub head_comment: Vec<String>,
    /// Trailing `# ...` on the same line.
    pub line_comment: Option<String>,
}

impl Node {
    pub fn scalar(value: impl Into<String>) -> Node {
        Node {
            value: NodeValue::Scalar(value.into()),
            tag: Tag::None,
            quote: Quote::Plain,
            style: Style::Block,
            indentless: false,
            anchor: None,
            head_comment: Vec::new(),
            line_comment: None,
        }
    }

    pub fn mapping(entries: Vec<MapEntry>) -> Node {
        Node {
            value: NodeValue::Mapping(entries),
            ..Node::scalar("")
        }
    }

    pub fn sequence(items: Vec<Node>) -> Node {
        Node {
            value: NodeValue::Sequence(items),
            ..Node::scalar("")
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.value, NodeValue::Scalar(_))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self.value, NodeValue::Mapping(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.value, NodeValue::Sequence(_))
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match &self.value {
            NodeValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn entries(&self) -> &[MapEntry] {
        match &self.value {
            NodeValue::Mapping(e) => e,
            _ => &[],
        }
    }

    pub fn items(&self) -> &[Node] {
        match &self.value {
            NodeValue::Sequence(i) => i,
            _ => &[],
        }
    }

    /// Look up a mapping value by scalar key.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries()
            .iter()
            .find(|e| e.key.as_scalar() == Some(key))
            .map(|e| &e.value)
    }

    /// Follow a path of mapping keys from this node.
    pub fn get_path(&self, path: &[&str]) -> Option<&Node> {
        let mut node = self;
        for key in path {
            node = node.get(key)?;
        }
        Some(node)
    }

    /// Scalar value at a mapping key path, if present.
    pub fn scalar_at(&self, path: &[&str]) -> Option<&str> {
        self.get_path(path).and_then(Node::as_scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: Node) -> MapEntry {
        MapEntry {
            key: Node::scalar(key),
            value,
        }
    }

    #[test]
    fn get_path_walks_nested_mappings() {
        let tree = Node::mapping(vec![entry(
            "spec",
            Node::mapping(vec![entry("version", Node::scalar("1.2.3"))]),
        )]);
        assert_eq!(tree.scalar_at(&["spec", "version"]), Some("1.2.3"));
        assert_eq!(tree.scalar_at(&["spec", "chart"]), None);
    }

    #[test]
    fn tag_parse_recognizes_lock_and_local() {
        assert_eq!(Tag::parse("!lock"), Tag::Lock);
        assert_eq!(Tag::parse("!local"), Tag::Local);
        assert_eq!(Tag::parse("!custom"), Tag::Other("!custom".to_string()));
        assert_eq!(Tag::Lock.as_str(), Some("!lock"));
    }
}
