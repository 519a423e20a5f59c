//! Lossless HTML tree parsing and serialization.
//!
//! The transformation pipeline must round-trip test files byte-for-byte
//! except where it deliberately mutates them, so every node keeps the raw
//! source text it was parsed from: text, comments and doctypes are stored
//! as raw slices, and elements keep their exact open/close tag text next
//! to the parsed tag name and attributes. Serializing an untouched tree
//! reproduces the input exactly.
//!
//! `<script>` and `<style>` contents are raw text per the HTML spec: the
//! parser scans them to the matching close tag without interpreting `<`.

use std::borrow::Cow;
use std::fmt::Write as _;
use thiserror::Error;

/// Markup parsing errors. Input files are assumed well-formed; anything
/// that breaks that assumption is fatal for the file.
#[derive(Debug, Error)]
pub enum MarkupError {
    #[error("unexpected end of input inside `{0}`")]
    UnexpectedEof(&'static str),

    #[error("close tag `</{0}>` has no matching open tag")]
    UnmatchedCloseTag(String),

    #[error("`<{0}>` is never closed")]
    UnclosedElement(String),
}

// ============================================================================
// Nodes
// ============================================================================

/// A single node of the document tree.
#[derive(Debug, Clone)]
pub enum Node {
    /// Raw text, including insignificant whitespace and indentation.
    Text(String),
    /// A full comment, `<!-- ... -->`.
    Comment(String),
    /// A doctype marker, `<!DOCTYPE ...>`.
    Doctype(String),
    Element(Element),
}

/// An element node.
///
/// `open_raw`/`close_raw` hold the exact tag text from the source so that
/// untouched elements serialize unchanged (attribute order, quoting and
/// whitespace included). Programmatically created elements synthesize them.
#[derive(Debug, Clone)]
pub struct Element {
    /// Tag name, lowercased for matching.
    pub name: String,
    /// Attributes with unquoted values, names lowercased.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
    open_raw: String,
    close_raw: Option<String>,
}

impl Element {
    /// Create a new element with an open and close tag.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
            open_raw: format!("<{name}>"),
            close_raw: Some(format!("</{name}>")),
        }
    }

    /// Builder-style attribute addition. Values are attribute-escaped.
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self.regen_open_tag();
        self
    }

    /// Builder-style text content. The text is entity-escaped unless this
    /// is a raw-text element.
    pub fn with_text(mut self, text: &str) -> Self {
        let content = if is_raw_text_element(&self.name) {
            text.to_string()
        } else {
            escape_text(text).into_owned()
        };
        self.children = vec![Node::Text(content)];
        self
    }

    /// Get an attribute value by (case-insensitive) name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text content of direct text children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let Node::Text(t) = child {
                out.push_str(t);
            }
        }
        out
    }

    /// Replace the element's children with a single raw text node.
    pub fn set_text(&mut self, text: &str) {
        self.children = vec![Node::Text(text.to_string())];
    }

    /// Rewrite the value of an existing attribute in place.
    ///
    /// The open tag text is patched by substituting the old value, which
    /// preserves the original quoting style and attribute order. Returns
    /// false if the attribute is absent.
    pub fn rewrite_attr_value(&mut self, name: &str, new_value: &str) -> bool {
        let Some((_, old)) = self.attrs.iter_mut().find(|(n, _)| n == name) else {
            return false;
        };
        let old_value = std::mem::replace(old, new_value.to_string());
        if old_value.is_empty() {
            // No text to substitute; rebuild the tag instead.
            self.regen_open_tag();
        } else {
            self.open_raw = self.open_raw.replacen(&old_value, new_value, 1);
        }
        true
    }

    /// Rebuild the open tag from the parsed name and attributes.
    fn regen_open_tag(&mut self) {
        let mut tag = format!("<{}", self.name);
        for (name, value) in &self.attrs {
            if value.is_empty() {
                write!(tag, " {name}").ok();
            } else {
                write!(tag, " {name}=\"{}\"", escape_attr(value)).ok();
            }
        }
        tag.push('>');
        self.open_raw = tag;
    }

    fn serialize_into(&self, out: &mut String) {
        out.push_str(&self.open_raw);
        for child in &self.children {
            child.serialize_into(out);
        }
        if let Some(close) = &self.close_raw {
            out.push_str(close);
        }
    }
}

impl Node {
    fn serialize_into(&self, out: &mut String) {
        match self {
            Node::Text(raw) | Node::Comment(raw) | Node::Doctype(raw) => out.push_str(raw),
            Node::Element(el) => el.serialize_into(out),
        }
    }
}

// ============================================================================
// Document
// ============================================================================

/// A parsed HTML document: an ordered forest of top-level nodes.
#[derive(Debug, Clone)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    /// Parse an HTML document. Fatal on markup the well-formedness
    /// assumption does not cover (stray close tags, EOF inside a tag).
    pub fn parse(input: &str) -> Result<Self, MarkupError> {
        Parser::new(input).parse()
    }

    /// Serialize the tree back to text. Byte-identical to the input for
    /// untouched trees.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.serialize_into(&mut out);
        }
        out
    }

    /// Visit every element depth-first in document order.
    pub fn for_each_element_mut<F: FnMut(&mut Element)>(&mut self, mut f: F) {
        fn walk<F: FnMut(&mut Element)>(nodes: &mut [Node], f: &mut F) {
            for node in nodes {
                if let Node::Element(el) = node {
                    f(el);
                    walk(&mut el.children, f);
                }
            }
        }
        walk(&mut self.nodes, &mut f);
    }

    /// Collect references to all elements matching a tag-name predicate,
    /// in document order.
    pub fn find_all<P: Fn(&Element) -> bool>(&self, pred: P) -> Vec<&Element> {
        fn walk<'a, P: Fn(&Element) -> bool>(
            nodes: &'a [Node],
            pred: &P,
            out: &mut Vec<&'a Element>,
        ) {
            for node in nodes {
                if let Node::Element(el) = node {
                    if pred(el) {
                        out.push(el);
                    }
                    walk(&el.children, pred, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.nodes, &pred, &mut out);
        out
    }

    /// Whether any element with the given tag name exists.
    pub fn has_element(&self, tag: &str) -> bool {
        !self.find_all(|el| el.name == tag).is_empty()
    }

    /// Insert `new` immediately after the first element matching `pred`,
    /// preceded by a whitespace node matching the matched element's own
    /// indentation so siblings stay visually aligned.
    ///
    /// Returns true if a match was found and the node spliced in.
    pub fn insert_after<P: Fn(&Element) -> bool>(&mut self, pred: P, new: Node) -> bool {
        fn walk<P: Fn(&Element) -> bool>(
            nodes: &mut Vec<Node>,
            pred: &P,
            new: &mut Option<Node>,
        ) -> bool {
            for i in 0..nodes.len() {
                if let Node::Element(el) = &nodes[i] {
                    if pred(el) {
                        let ws = preceding_indent(nodes, i);
                        let node = new.take().unwrap_or(Node::Text(String::new()));
                        nodes.insert(i + 1, node);
                        nodes.insert(i + 1, Node::Text(ws));
                        return true;
                    }
                }
                if let Node::Element(el) = &mut nodes[i]
                    && walk(&mut el.children, pred, new)
                {
                    return true;
                }
            }
            false
        }
        walk(&mut self.nodes, &pred, &mut Some(new))
    }

    /// Insert `new` as the first child of the first element with the given
    /// tag name, reusing the element's internal indentation when present.
    ///
    /// Returns true if such an element was found.
    pub fn insert_first_child(&mut self, tag: &str, new: Node) -> bool {
        fn walk(nodes: &mut [Node], tag: &str, new: &mut Option<Node>) -> bool {
            for node in nodes {
                if let Node::Element(el) = node {
                    if el.name == tag {
                        let ws = match el.children.first() {
                            Some(Node::Text(t)) if t.starts_with('\n') => leading_ws(t),
                            _ => "\n".to_string(),
                        };
                        let node = new.take().unwrap_or(Node::Text(String::new()));
                        el.children.insert(0, node);
                        el.children.insert(0, Node::Text(ws));
                        return true;
                    }
                    if walk(&mut el.children, tag, new) {
                        return true;
                    }
                }
            }
            false
        }
        walk(&mut self.nodes, tag, &mut Some(new))
    }

    /// Insert `new` at the top level, immediately after the doctype marker
    /// if one exists. Returns true if a doctype anchor was found.
    pub fn insert_after_doctype(&mut self, new: Node) -> bool {
        for i in 0..self.nodes.len() {
            if matches!(self.nodes[i], Node::Doctype(_)) {
                self.nodes.insert(i + 1, new);
                self.nodes.insert(i + 1, Node::Text("\n".to_string()));
                return true;
            }
        }
        false
    }

    /// Insert `new` at the very beginning of the document.
    pub fn insert_at_start(&mut self, new: Node) {
        self.nodes.insert(0, Node::Text("\n".to_string()));
        self.nodes.insert(0, new);
    }
}

/// Indentation string for a node spliced in after position `i`: the final
/// newline-plus-indent run of the preceding text sibling, or a bare newline.
fn preceding_indent(nodes: &[Node], i: usize) -> String {
    if i > 0
        && let Node::Text(t) = &nodes[i - 1]
        && let Some(pos) = t.rfind('\n')
        && t[pos + 1..].chars().all(|c| c == ' ' || c == '\t')
    {
        return t[pos..].to_string();
    }
    "\n".to_string()
}

/// The leading whitespace run of a text node.
fn leading_ws(t: &str) -> String {
    let end = t
        .find(|c: char| !c.is_ascii_whitespace())
        .unwrap_or(t.len());
    t[..end].to_string()
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(mut self) -> Result<Document, MarkupError> {
        let mut stack: Vec<Element> = Vec::new();
        let mut top: Vec<Node> = Vec::new();

        macro_rules! push {
            ($node:expr) => {
                match stack.last_mut() {
                    Some(parent) => parent.children.push($node),
                    None => top.push($node),
                }
            };
        }

        while self.pos < self.input.len() {
            let rest = &self.input[self.pos..];

            if !rest.starts_with('<') {
                let end = rest.find('<').unwrap_or(rest.len());
                push!(Node::Text(rest[..end].to_string()));
                self.pos += end;
                continue;
            }

            if rest.starts_with("<!--") {
                let end = rest.find("-->").ok_or(MarkupError::UnexpectedEof("comment"))?;
                push!(Node::Comment(rest[..end + 3].to_string()));
                self.pos += end + 3;
            } else if rest.starts_with("<!") {
                let end = rest.find('>').ok_or(MarkupError::UnexpectedEof("doctype"))?;
                push!(Node::Doctype(rest[..=end].to_string()));
                self.pos += end + 1;
            } else if rest.starts_with("</") {
                let end = rest.find('>').ok_or(MarkupError::UnexpectedEof("close tag"))?;
                let name = rest[2..end].trim().to_ascii_lowercase();
                self.pos += end + 1;
                self.close_element(&name, &mut stack, &mut top)?;
            } else {
                let (raw, name, attrs, self_closing) = self.read_open_tag()?;
                let mut element = Element {
                    name: name.clone(),
                    attrs,
                    children: Vec::new(),
                    open_raw: raw,
                    close_raw: None,
                };

                if self_closing || is_void_element(&name) {
                    push!(Node::Element(element));
                } else if is_raw_text_element(&name) {
                    let (content, close_raw) = self.read_raw_text(&name)?;
                    if !content.is_empty() {
                        element.children.push(Node::Text(content));
                    }
                    element.close_raw = Some(close_raw);
                    push!(Node::Element(element));
                } else {
                    stack.push(element);
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(MarkupError::UnclosedElement(open.name.clone()));
        }
        Ok(Document { nodes: top })
    }

    /// Handle a close tag: pop the stack down to the matching element.
    /// Intermediate elements are implicitly closed (they parsed without a
    /// close tag, so serialization stays faithful).
    fn close_element(
        &mut self,
        name: &str,
        stack: &mut Vec<Element>,
        top: &mut Vec<Node>,
    ) -> Result<(), MarkupError> {
        if !stack.iter().any(|el| el.name == name) {
            return Err(MarkupError::UnmatchedCloseTag(name.to_string()));
        }
        loop {
            let mut el = stack.pop().expect("match checked above");
            let matched = el.name == name;
            if matched {
                // Reconstruct the exact close tag from the source.
                let start = self.input[..self.pos]
                    .rfind("</")
                    .expect("close tag just consumed");
                el.close_raw = Some(self.input[start..self.pos].to_string());
            }
            match stack.last_mut() {
                Some(parent) => parent.children.push(Node::Element(el)),
                None => top.push(Node::Element(el)),
            }
            if matched {
                return Ok(());
            }
        }
    }

    /// Read an open tag starting at `self.pos` (which points at `<`).
    /// Returns (raw tag text, lowercased name, attrs, self_closing).
    #[allow(clippy::type_complexity)]
    fn read_open_tag(
        &mut self,
    ) -> Result<(String, String, Vec<(String, String)>, bool), MarkupError> {
        let rest = &self.input[self.pos..];
        let mut quote: Option<char> = None;
        let mut end = None;
        for (i, c) in rest.char_indices().skip(1) {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None if c == '"' || c == '\'' => quote = Some(c),
                None if c == '>' => {
                    end = Some(i);
                    break;
                }
                None => {}
            }
        }
        let end = end.ok_or(MarkupError::UnexpectedEof("open tag"))?;
        let raw = &rest[..=end];
        self.pos += end + 1;

        let inner = raw[1..raw.len() - 1].trim_end_matches('/');
        let name_end = inner
            .find(|c: char| c.is_ascii_whitespace() || c == '/')
            .unwrap_or(inner.len());
        let name = inner[..name_end].to_ascii_lowercase();
        let attrs = parse_attributes(&inner[name_end..]);
        let self_closing = raw.ends_with("/>");

        Ok((raw.to_string(), name, attrs, self_closing))
    }

    /// Consume raw text content up to the matching close tag of a raw-text
    /// element (script/style). Returns (content, raw close tag).
    fn read_raw_text(&mut self, name: &str) -> Result<(String, String), MarkupError> {
        let rest = &self.input[self.pos..];
        let lower = rest.to_ascii_lowercase();
        let needle = format!("</{name}");
        let close_start = lower
            .find(&needle)
            .ok_or(MarkupError::UnexpectedEof("raw text element"))?;
        let close_end = rest[close_start..]
            .find('>')
            .ok_or(MarkupError::UnexpectedEof("raw text close tag"))?;

        let content = rest[..close_start].to_string();
        let close_raw = rest[close_start..=close_start + close_end].to_string();
        self.pos += close_start + close_end + 1;
        Ok((content, close_raw))
    }
}

// ============================================================================
// Element Classification & Escaping
// ============================================================================

/// Check if an HTML tag is a void element (no close tag, no children).
#[inline]
pub fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "source"
            | "track"
            | "wbr"
    )
}

/// Check if tag is a raw text element (content is not markup).
///
/// Per HTML spec: script and style content is "raw text".
#[inline]
pub fn is_raw_text_element(tag: &str) -> bool {
    matches!(tag, "script" | "style")
}

/// Escape HTML special characters in text content.
#[inline]
pub fn escape_text(s: &str) -> Cow<'_, str> {
    if !s.contains(['<', '>', '&']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Escape HTML special characters in attribute values.
#[inline]
fn escape_attr(s: &str) -> Cow<'_, str> {
    if !s.contains(['<', '>', '&', '"']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Parse HTML-style attributes from the tail of an open tag.
///
/// Input: ` src="foo.js" class='a b' disabled`
/// Output: `vec![("src", "foo.js"), ("class", "a b"), ("disabled", "")]`
fn parse_attributes(s: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_whitespace() || c == '/' {
            continue;
        }

        // Read attribute name
        let mut name = String::new();
        name.push(c);
        while let Some(&next) = chars.peek() {
            if next == '=' || next.is_whitespace() {
                break;
            }
            name.push(next);
            chars.next();
        }

        // Skip whitespace before a possible '='
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            match chars.peek() {
                Some(&q) if q == '"' || q == '\'' => {
                    chars.next();
                    for c in chars.by_ref() {
                        if c == q {
                            break;
                        }
                        value.push(c);
                    }
                }
                _ => {
                    while let Some(&c) = chars.peek() {
                        if c.is_whitespace() {
                            break;
                        }
                        value.push(c);
                        chars.next();
                    }
                }
            }
        }

        attrs.push((name.to_ascii_lowercase(), value));
    }
    attrs
}

// ============================================================================
// Tests
// ============================================================================
