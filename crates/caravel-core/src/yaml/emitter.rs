//! Serializer for the node tree.
//!
//! Output matches what the parser accepts, so parse -> emit round-trips
//! byte-identically for files in the supported subset, modulo documented
//! normalizations: one space before trailing comments, tag-then-anchor marker
//! order, canonical `{a: 1, b: 2}` flow spacing, and a single trailing
//! newline.

use super::node::{Node, NodeValue, Quote, Style};

pub(crate) struct Emitter {
    indent: usize,
    out: String,
}

pub(crate) fn emit(root: &Node, indent: usize, doc_start: bool, foot_comment: &[String]) -> String {
    let mut e = Emitter {
        indent: indent.max(1),
        out: String::new(),
    };
    if doc_start {
        e.out.push_str("---\n");
    }
    match &root.value {
        NodeValue::Mapping(_) => e.emit_mapping_block(root, 0),
        NodeValue::Sequence(_) => e.emit_sequence_block(root, 0),
        _ => {
            e.out.push_str(&scalar_repr(root));
            e.out.push('\n');
        }
    }
    for line in foot_comment {
        e.out.push_str(line);
        e.out.push('\n');
    }
    e.out
}

impl Emitter {
    fn pad(&self, depth: usize) -> String {
        " ".repeat(depth * self.indent)
    }

    fn emit_head_comments(&mut self, node: &Node, depth: usize) {
        for line in &node.head_comment {
            if line.is_empty() {
                self.out.push('\n');
            } else {
                self.out.push_str(&self.pad(depth));
                self.out.push_str(line);
                self.out.push('\n');
            }
        }
    }

    fn emit_mapping_block(&mut self, node: &Node, depth: usize) {
        for entry in node.entries() {
            self.emit_head_comments(&entry.key, depth);
            let prefix = format!("{}{}:", self.pad(depth), scalar_repr(&entry.key));
            self.emit_entry_value(prefix, &entry.key, &entry.value, depth);
        }
    }

    /// Emit `prefix` (ending in `:` or `-`) followed by the value, inline when
    /// possible and as a nested block otherwise.
    fn emit_entry_value(&mut self, prefix: String, key: &Node, value: &Node, depth: usize) {
        let markers = marker_repr(value);
        match &value.value {
            NodeValue::Mapping(entries) if value.style == Style::Block && !entries.is_empty() => {
                self.out.push_str(&prefix);
                if !markers.is_empty() {
                    self.out.push(' ');
                    self.out.push_str(markers.trim_end());
                }
                self.push_comment(key.line_comment.as_deref());
                self.out.push('\n');
                self.emit_mapping_block(value, depth + 1);
            }
            NodeValue::Sequence(items) if value.style == Style::Block && !items.is_empty() => {
                self.out.push_str(&prefix);
                if !markers.is_empty() {
                    self.out.push(' ');
                    self.out.push_str(markers.trim_end());
                }
                self.push_comment(key.line_comment.as_deref());
                self.out.push('\n');
                let child_depth = if value.indentless { depth } else { depth + 1 };
                self.emit_sequence_block(value, child_depth);
            }
            NodeValue::Scalar(text)
                if matches!(value.quote, Quote::Literal | Quote::Folded) =>
            {
                let header = match (value.quote, text.ends_with('\n')) {
                    (Quote::Literal, true) => "|",
                    (Quote::Literal, false) => "|-",
                    (_, true) => ">",
                    (_, false) => ">-",
                };
                self.out.push_str(&prefix);
                self.out.push(' ');
                self.out.push_str(&markers);
                self.out.push_str(header);
                self.push_comment(key.line_comment.as_deref());
                self.out.push('\n');
                for line in text.trim_end_matches('\n').split('\n') {
                    if line.is_empty() {
                        self.out.push('\n');
                    } else {
                        self.out.push_str(&self.pad(depth + 1));
                        self.out.push_str(line);
                        self.out.push('\n');
                    }
                }
            }
            NodeValue::Scalar(text)
                if text.is_empty()
                    && value.quote == Quote::Plain
                    && value.tag == super::node::Tag::None
                    && value.anchor.is_none() =>
            {
                // Null value: bare `key:`.
                self.out.push_str(&prefix);
                self.push_comment(
                    key.line_comment
                        .as_deref()
                        .or(value.line_comment.as_deref()),
                );
                self.out.push('\n');
            }
            _ => {
                let line = format!("{prefix} {markers}{}", flow_repr(value));
                self.out.push_str(line.trim_end());
                self.push_comment(value.line_comment.as_deref());
                self.out.push('\n');
            }
        }
    }

    fn emit_sequence_block(&mut self, node: &Node, depth: usize) {
        for item in node.items() {
            self.emit_head_comments(item, depth);
            match &item.value {
                NodeValue::Mapping(entries) if item.style == Style::Block && !entries.is_empty() => {
                    // Compact notation: first entry shares the dash line.
                    let first = &entries[0];
                    let prefix = format!(
                        "{}- {}:",
                        self.pad(depth),
                        scalar_repr(&first.key)
                    );
                    self.emit_entry_value(prefix, &first.key, &first.value, depth);
                    let rest = Node::mapping(entries[1..].to_vec());
                    self.emit_mapping_block(&rest, depth + 1);
                }
                NodeValue::Sequence(items) if item.style == Style::Block && !items.is_empty() => {
                    self.out.push_str(&self.pad(depth));
                    self.out.push_str("-\n");
                    self.emit_sequence_block(item, depth + 1);
                }
                _ => {
                    let line = format!(
                        "{}- {}{}",
                        self.pad(depth),
                        marker_repr(item),
                        flow_repr(item)
                    );
                    self.out.push_str(line.trim_end());
                    self.push_comment(item.line_comment.as_deref());
                    self.out.push('\n');
                }
            }
        }
    }

    fn push_comment(&mut self, comment: Option<&str>) {
        if let Some(c) = comment {
            self.out.push(' ');
            self.out.push_str(c);
        }
    }
}

/// `!tag ` and `&anchor ` markers, tag first.
fn marker_repr(node: &Node) -> String {
    let mut out = String::new();
    if let Some(tag) = node.tag.as_str() {
        out.push_str(tag);
        out.push(' ');
    }
    if let Some(anchor) = &node.anchor {
        out.push('&');
        out.push_str(anchor);
        out.push(' ');
    }
    out
}

/// Inline (single-line) representation of a node, without markers.
fn flow_repr(node: &Node) -> String {
    match &node.value {
        NodeValue::Scalar(_) => scalar_repr(node),
        NodeValue::Alias(name) => format!("*{name}"),
        NodeValue::Mapping(entries) => {
            let inner = entries
                .iter()
                .map(|e| {
                    format!(
                        "{}: {}{}",
                        scalar_repr(&e.key),
                        marker_repr(&e.value),
                        flow_repr(&e.value)
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{inner}}}")
        }
        NodeValue::Sequence(items) => {
            let inner = items
                .iter()
                .map(|i| format!("{}{}", marker_repr(i), flow_repr(i)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("[{inner}]")
        }
    }
}

fn scalar_repr(node: &Node) -> String {
    let text = node.as_scalar().unwrap_or("");
    match node.quote {
        Quote::Single => format!("'{}'", text.replace('\'', "''")),
        Quote::Double => format!("\"{}\"", escape_double(text)),
        _ => text.to_string(),
    }
}

fn escape_double(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    fn roundtrip(text: &str) {
        let parsed = parse(text).unwrap();
        let emitted = emit(&parsed.root, parsed.indent, parsed.doc_start, &parsed.foot_comment);
        assert_eq!(emitted, text, "round-trip mismatch");
    }

    #[test]
    fn roundtrips_release_document() {
        roundtrip(
            "apiVersion: caravel.dev/v1alpha1\nkind: Release\nmetadata:\n  name: foo\nspec:\n  project: shop\n  version: 1.2.3\n  values:\n    replicas: 2\n",
        );
    }

    #[test]
    fn roundtrips_comments_and_blank_lines() {
        roundtrip("# header\nname: foo # inline\n\n# section\nspec:\n  a: b\n");
    }

    #[test]
    fn roundtrips_tags_and_flow() {
        roundtrip(
            "spec:\n  password: !lock hunter2\n  wiring: !local\n    host: db1\n  chart: {repo: stable, name: app}\n  tags: [a, b]\n",
        );
    }

    #[test]
    fn roundtrips_sequences_of_mappings() {
        roundtrip("env:\n  - name: A\n    value: x\n  - name: B\n    value: y\n");
    }

    #[test]
    fn roundtrips_indentless_sequences() {
        roundtrip("owners:\n- alice\n- bob\n");
        roundtrip("spec:\n  tags:\n  - a\n  - b\n  next: 1\n");
    }

    #[test]
    fn roundtrips_literal_block() {
        roundtrip("script: |\n  line one\n  line two\nafter: x\n");
    }

    #[test]
    fn roundtrips_quoted_scalars() {
        roundtrip("a: \"with: colon\"\nb: 'it''s'\n");
    }

    #[test]
    fn roundtrips_doc_start_and_foot() {
        roundtrip("---\na: 1\n# the end\n");
    }

    #[test]
    fn roundtrips_four_space_indent() {
        roundtrip("spec:\n    values:\n        replicas: 2\n");
    }

    #[test]
    fn roundtrips_null_value() {
        roundtrip("spec:\n  empty:\n  next: 1\n");
    }

    #[test]
    fn roundtrips_anchor_and_alias() {
        roundtrip("base: &defaults\n  a: 1\nother: *defaults\n");
    }
}
