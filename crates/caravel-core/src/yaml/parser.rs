//! Parser for the block-YAML subset used by catalog files.
//!
//! serde_yaml cannot round-trip comments or `!` tags, and promotions must not
//! destroy either, so catalog documents go through this parser instead. It
//! covers what catalog files actually contain: block mappings and sequences,
//! flow collections, plain/quoted scalars, `|`/`>` block scalars, comments,
//! tags, and anchors/aliases. Multi-document streams and complex keys are
//! rejected with a positioned error.

use super::node::{MapEntry, Node, NodeValue, Quote, Style, Tag};

#[derive(Debug)]
pub(crate) struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            line,
            message: message.into(),
        }
    }
}

type PResult<T> = std::result::Result<T, ParseError>;

/// Result of parsing one document's text.
#[derive(Debug)]
pub(crate) struct Parsed {
    pub root: Node,
    pub doc_start: bool,
    pub foot_comment: Vec<String>,
    /// Detected indentation width (smallest non-zero indent step), default 2.
    pub indent: usize,
}

/// One non-blank, non-comment source line with its gathered head comments.
struct Item {
    indent: usize,
    text: String,
    line: usize,
    head: Vec<String>,
}

pub(crate) fn parse(text: &str) -> PResult<Parsed> {
    let mut items: Vec<Item> = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut doc_start = false;
    let mut in_block_scalar: Option<usize> = None;

    for (idx, raw) in text.lines().enumerate() {
        let number = idx + 1;
        let trimmed = raw.trim_start_matches(' ');
        let indent = raw.len() - trimmed.len();

        // Lines inside a block scalar are content, never comments.
        if let Some(parent_indent) = in_block_scalar {
            if trimmed.is_empty() || indent > parent_indent {
                items.push(Item {
                    indent,
                    text: trimmed.to_string(),
                    line: number,
                    head: Vec::new(),
                });
                continue;
            }
            in_block_scalar = None;
        }

        if trimmed.is_empty() {
            pending.push(String::new());
            continue;
        }
        if trimmed.starts_with('#') {
            pending.push(trimmed.to_string());
            continue;
        }
        if trimmed == "---" && items.is_empty() {
            doc_start = true;
            continue;
        }
        if trimmed.starts_with("--- ") || (trimmed == "---" && !items.is_empty()) {
            return Err(ParseError::new(
                number,
                "multi-document streams are not supported",
            ));
        }
        if block_scalar_header(trimmed) {
            in_block_scalar = Some(indent);
        }
        items.push(Item {
            indent,
            text: trimmed.to_string(),
            line: number,
            head: std::mem::take(&mut pending),
        });
    }

    let indent_width = detect_indent(&items);
    let mut parser = Parser { items, pos: 0 };
    let root = if parser.items.is_empty() {
        Node::mapping(Vec::new())
    } else {
        parser.parse_node(0)?
    };
    if let Some(item) = parser.items.get(parser.pos) {
        return Err(ParseError::new(
            item.line,
            format!("unexpected content at indent {}", item.indent),
        ));
    }

    Ok(Parsed {
        root,
        doc_start,
        foot_comment: pending,
        indent: indent_width,
    })
}

/// True when a `key: ...` remainder announces a `|` or `>` block scalar.
fn block_scalar_header(line: &str) -> bool {
    match split_colon(line) {
        Some((_, rest)) => {
            let (_, _, remainder) = strip_markers(rest.trim());
            matches!(remainder, "|" | "|-" | ">" | ">-")
        }
        None => false,
    }
}

fn detect_indent(items: &[Item]) -> usize {
    let mut smallest = 0usize;
    for item in items {
        if item.indent > 0 && (smallest == 0 || item.indent < smallest) {
            smallest = item.indent;
        }
    }
    if smallest == 0 {
        2
    } else {
        smallest
    }
}

struct Parser {
    items: Vec<Item>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Item> {
        self.items.get(self.pos)
    }

    fn parse_node(&mut self, indent: usize) -> PResult<Node> {
        let item = match self.peek() {
            Some(i) => i,
            None => return Ok(Node::scalar("")),
        };
        if item.text == "-" || item.text.starts_with("- ") {
            self.parse_sequence(indent)
        } else {
            self.parse_mapping(indent)
        }
    }

    fn parse_sequence(&mut self, indent: usize) -> PResult<Node> {
        let mut items_out: Vec<Node> = Vec::new();
        while let Some(item) = self.peek() {
            if item.indent != indent || !(item.text == "-" || item.text.starts_with("- ")) {
                break;
            }
            let head = self.items[self.pos].head.clone();
            let line = self.items[self.pos].line;
            let rest = self.items[self.pos]
                .text
                .trim_start_matches('-')
                .trim_start()
                .to_string();

            let mut node = if rest.is_empty() {
                self.pos += 1;
                self.parse_child_block(indent, line)?
            } else if is_mapping_start(&rest) {
                // Compact notation: the first mapping entry shares the dash line.
                self.items[self.pos].text = rest;
                self.items[self.pos].indent = indent + 2;
                self.items[self.pos].head = Vec::new();
                self.parse_mapping(indent + 2)?
            } else {
                self.pos += 1;
                let (text, line_comment) = split_line_comment(&rest);
                let mut v = self.parse_fragment(&text, indent, line)?;
                v.line_comment = line_comment;
                v
            };
            node.head_comment = head;
            items_out.push(node);
        }
        Ok(Node::sequence(items_out))
    }

    fn parse_mapping(&mut self, indent: usize) -> PResult<Node> {
        let mut entries: Vec<MapEntry> = Vec::new();
        while let Some(item) = self.peek() {
            if item.indent != indent || item.text == "-" || item.text.starts_with("- ") {
                break;
            }
            let line = item.line;
            let head = item.head.clone();
            let (text, line_comment) = split_line_comment(&item.text);
            let (key_text, rest) = split_colon(&text)
                .ok_or_else(|| ParseError::new(line, format!("expected 'key:' in '{text}'")))?;
            self.pos += 1;

            let mut key = parse_scalar_token(key_text.trim(), line)?;
            key.head_comment = head;
            if entries
                .iter()
                .any(|e| e.key.as_scalar() == key.as_scalar() && key.is_scalar())
            {
                return Err(ParseError::new(
                    line,
                    format!("duplicate mapping key '{}'", key_text.trim()),
                ));
            }

            let rest = rest.trim();
            let (tag, anchor, remainder) = strip_markers(rest);
            let mut value = if remainder.is_empty() {
                key.line_comment = line_comment;
                self.parse_child_block(indent, line)?
            } else if let Some(quote) = match remainder {
                "|" | "|-" => Some(Quote::Literal),
                ">" | ">-" => Some(Quote::Folded),
                _ => None,
            } {
                key.line_comment = line_comment;
                self.parse_block_scalar(indent, quote, remainder.ends_with('-'))?
            } else {
                let mut v = self.parse_fragment(remainder, indent, line)?;
                v.line_comment = line_comment;
                v
            };
            if tag != Tag::None {
                value.tag = tag;
            }
            if anchor.is_some() {
                value.anchor = anchor;
            }
            entries.push(MapEntry { key, value });
        }
        Ok(Node::mapping(entries))
    }

    /// Parse the block nested under the current line, or a null scalar when
    /// nothing deeper follows. A sequence may sit at the key's own indent
    /// (indentless form); a mapping at that indent is a sibling, not a child.
    fn parse_child_block(&mut self, parent_indent: usize, _line: usize) -> PResult<Node> {
        match self.peek() {
            Some(item) if item.indent > parent_indent => {
                let child_indent = item.indent;
                self.parse_node(child_indent)
            }
            Some(item)
                if item.indent == parent_indent
                    && (item.text == "-" || item.text.starts_with("- ")) =>
            {
                let mut node = self.parse_sequence(parent_indent)?;
                node.indentless = true;
                Ok(node)
            }
            _ => Ok(Node::scalar("")),
        }
    }

    fn parse_block_scalar(&mut self, parent_indent: usize, quote: Quote, strip: bool) -> PResult<Node> {
        let mut lines: Vec<(usize, String)> = Vec::new();
        while let Some(item) = self.peek() {
            if !item.text.is_empty() && item.indent <= parent_indent {
                break;
            }
            lines.push((item.indent, self.items[self.pos].text.clone()));
            self.pos += 1;
        }
        // Trailing blank lines belong to whatever follows, not the scalar.
        while matches!(lines.last(), Some((_, t)) if t.is_empty()) {
            lines.pop();
        }
        let base = lines
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .map(|(i, _)| *i)
            .min()
            .unwrap_or(parent_indent + 2);
        let mut text = lines
            .iter()
            .map(|(i, t)| {
                if t.is_empty() {
                    String::new()
                } else {
                    format!("{}{}", " ".repeat(i - base), t)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        if !strip && !text.is_empty() {
            text.push('\n');
        }
        let mut node = Node::scalar(text);
        node.quote = quote;
        Ok(node)
    }

    /// Parse an inline fragment: flow collection, alias, or scalar.
    fn parse_fragment(&mut self, fragment: &str, _indent: usize, line: usize) -> PResult<Node> {
        let (tag, anchor, remainder) = strip_markers(fragment);
        let mut node = if remainder.starts_with('{') || remainder.starts_with('[') {
            let mut cursor = Cursor::new(remainder, line);
            let node = cursor.flow_value()?;
            cursor.skip_ws();
            if !cursor.done() {
                return Err(ParseError::new(line, "trailing characters after flow value"));
            }
            node
        } else if let Some(name) = remainder.strip_prefix('*') {
            Node {
                value: NodeValue::Alias(name.to_string()),
                ..Node::scalar("")
            }
        } else {
            parse_scalar_token(remainder, line)?
        };
        if tag != Tag::None {
            node.tag = tag;
        }
        if anchor.is_some() {
            node.anchor = anchor;
        }
        Ok(node)
    }
}

/// True when an inline fragment starts a mapping entry (`key: value`).
fn is_mapping_start(fragment: &str) -> bool {
    if fragment.starts_with('{') || fragment.starts_with('[') {
        return false;
    }
    split_colon(fragment).is_some()
}

/// Split `key: rest` at the first unquoted colon followed by space or EOL.
fn split_colon(text: &str) -> Option<(String, String)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b':' => {
                    if i + 1 == bytes.len() || bytes[i + 1] == b' ' {
                        return Some((text[..i].to_string(), text[i + 1..].to_string()));
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Split a trailing ` # comment` off a content line, respecting quotes.
fn split_line_comment(text: &str) -> (String, Option<String>) {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    for i in 0..bytes.len() {
        match quote {
            Some(q) => {
                if bytes[i] == q {
                    quote = None;
                }
            }
            None => match bytes[i] {
                b'"' | b'\'' => quote = Some(bytes[i]),
                b'#' if i > 0 && bytes[i - 1] == b' ' => {
                    let content = text[..i].trim_end().to_string();
                    return (content, Some(text[i..].to_string()));
                }
                _ => {}
            },
        }
    }
    (text.to_string(), None)
}

/// Strip leading `!tag` and `&anchor` markers (either order) off a fragment.
fn strip_markers(fragment: &str) -> (Tag, Option<String>, &str) {
    let mut tag = Tag::None;
    let mut anchor = None;
    let mut rest = fragment.trim();
    loop {
        if rest.starts_with('!') && tag == Tag::None {
            let end = rest.find(' ').unwrap_or(rest.len());
            tag = Tag::parse(&rest[..end]);
            rest = rest[end..].trim_start();
        } else if rest.starts_with('&') && anchor.is_none() {
            let end = rest.find(' ').unwrap_or(rest.len());
            anchor = Some(rest[1..end].to_string());
            rest = rest[end..].trim_start();
        } else {
            return (tag, anchor, rest);
        }
    }
}

fn parse_scalar_token(fragment: &str, line: usize) -> PResult<Node> {
    let mut node = Node::scalar("");
    if let Some(inner) = fragment.strip_prefix('"') {
        let Some(end) = find_closing_double(inner) else {
            return Err(ParseError::new(line, "unterminated double-quoted scalar"));
        };
        node.value = NodeValue::Scalar(unescape_double(&inner[..end]));
        node.quote = Quote::Double;
    } else if let Some(inner) = fragment.strip_prefix('\'') {
        let Some(stripped) = inner.strip_suffix('\'') else {
            return Err(ParseError::new(line, "unterminated single-quoted scalar"));
        };
        node.value = NodeValue::Scalar(stripped.replace("''", "'"));
        node.quote = Quote::Single;
    } else {
        if fragment.contains(": ") {
            return Err(ParseError::new(
                line,
                format!("ambiguous plain scalar '{fragment}'"),
            ));
        }
        node.value = NodeValue::Scalar(fragment.trim().to_string());
    }
    Ok(node)
}

fn find_closing_double(inner: &str) -> Option<usize> {
    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn unescape_double(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Character cursor over a single-line flow collection.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, line: usize) -> Cursor<'a> {
        Cursor { text, pos: 0, line }
    }

    fn done(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, message)
    }

    fn flow_value(&mut self) -> PResult<Node> {
        self.skip_ws();
        let rest = &self.text[self.pos..];
        let (tag, anchor, stripped) = strip_markers(rest);
        self.pos += rest.len() - stripped.len();

        let mut node = match self.peek() {
            Some(b'{') => self.flow_mapping()?,
            Some(b'[') => self.flow_sequence()?,
            Some(b'*') => {
                self.bump();
                let name = self.take_plain(&[b',', b'}', b']']);
                Node {
                    value: NodeValue::Alias(name.trim().to_string()),
                    ..Node::scalar("")
                }
            }
            Some(b'"') | Some(b'\'') => self.quoted_scalar()?,
            Some(_) => {
                let raw = self.take_plain(&[b',', b'}', b']', b':']);
                parse_scalar_token(raw.trim(), self.line)?
            }
            None => return Err(self.err("unexpected end of flow value")),
        };
        if tag != Tag::None {
            node.tag = tag;
        }
        if anchor.is_some() {
            node.anchor = anchor;
        }
        Ok(node)
    }

    fn flow_mapping(&mut self) -> PResult<Node> {
        self.bump(); // '{'
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b'}') {
                self.bump();
                break;
            }
            let key = self.flow_value()?;
            self.skip_ws();
            if self.bump() != Some(b':') {
                return Err(self.err("expected ':' in flow mapping"));
            }
            let value = self.flow_value()?;
            entries.push(MapEntry { key, value });
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.bump();
                }
                Some(b'}') => {}
                _ => return Err(self.err("expected ',' or '}' in flow mapping")),
            }
        }
        let mut node = Node::mapping(entries);
        node.style = Style::Flow;
        Ok(node)
    }

    fn flow_sequence(&mut self) -> PResult<Node> {
        self.bump(); // '['
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b']') {
                self.bump();
                break;
            }
            items.push(self.flow_value()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.bump();
                }
                Some(b']') => {}
                _ => return Err(self.err("expected ',' or ']' in flow sequence")),
            }
        }
        let mut node = Node::sequence(items);
        node.style = Style::Flow;
        Ok(node)
    }

    fn quoted_scalar(&mut self) -> PResult<Node> {
        let quote = self.bump().unwrap_or(b'"');
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'\\' && quote == b'"' {
                self.pos += 2;
                continue;
            }
            if b == quote {
                let raw = &self.text[start..self.pos];
                self.bump();
                let mut node = Node::scalar(if quote == b'"' {
                    unescape_double(raw)
                } else {
                    raw.replace("''", "'")
                });
                node.quote = if quote == b'"' {
                    Quote::Double
                } else {
                    Quote::Single
                };
                return Ok(node);
            }
            self.pos += 1;
        }
        Err(self.err("unterminated quoted scalar in flow value"))
    }

    fn take_plain(&mut self, stops: &[u8]) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if stops.contains(&b) {
                break;
            }
            self.pos += 1;
        }
        self.text[start..self.pos].to_string()
    }
}
