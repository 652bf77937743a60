//! Content tree – the [`ContentNode`] model and an HTML parser for the
//! controlled subset the engine paginates.
//!
//! Supported elements:
//! - Block: div, p, h1-h6, ul, ol, li, blockquote, section, article
//! - Inline: span, strong/b, em/i, u, a, code, br
//! - Atomic (never split across pages): img, table, hr, pre, and any element
//!   with `page-break-inside: avoid`
//! - Page-break markers: `<break/>`, `<pagebreak/>`, `class="page-break"`,
//!   `data-page-break`, and `page-break-before/after: always` styles

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Tree types
// ---------------------------------------------------------------------------

/// The tag name of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tag {
    Div,
    P,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Ul,
    Ol,
    Li,
    Blockquote,
    Table,
    Thead,
    Tbody,
    Tr,
    Td,
    Th,
    Span,
    Strong,
    Em,
    Underline,
    Anchor,
    Code,
    Pre,
    Br,
    Hr,
    Img,
    Break,
    Body,
    Html,
    Head,
    /// Catch-all for unknown tags – laid out like a div.
    Unknown(String),
}

impl Tag {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "div" | "section" | "article" | "main" | "header" | "footer" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "h5" => Tag::H5,
            "h6" => Tag::H6,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "blockquote" => Tag::Blockquote,
            "table" => Tag::Table,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "span" => Tag::Span,
            "strong" | "b" => Tag::Strong,
            "em" | "i" => Tag::Em,
            "u" => Tag::Underline,
            "a" => Tag::Anchor,
            "code" => Tag::Code,
            "pre" => Tag::Pre,
            "br" => Tag::Br,
            "hr" => Tag::Hr,
            "img" => Tag::Img,
            "break" | "pagebreak" => Tag::Break,
            "body" => Tag::Body,
            "html" => Tag::Html,
            "head" => Tag::Head,
            other => Tag::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Tag::Div => "div",
            Tag::P => "p",
            Tag::H1 => "h1",
            Tag::H2 => "h2",
            Tag::H3 => "h3",
            Tag::H4 => "h4",
            Tag::H5 => "h5",
            Tag::H6 => "h6",
            Tag::Ul => "ul",
            Tag::Ol => "ol",
            Tag::Li => "li",
            Tag::Blockquote => "blockquote",
            Tag::Table => "table",
            Tag::Thead => "thead",
            Tag::Tbody => "tbody",
            Tag::Tr => "tr",
            Tag::Td => "td",
            Tag::Th => "th",
            Tag::Span => "span",
            Tag::Strong => "strong",
            Tag::Em => "em",
            Tag::Underline => "u",
            Tag::Anchor => "a",
            Tag::Code => "code",
            Tag::Pre => "pre",
            Tag::Br => "br",
            Tag::Hr => "hr",
            Tag::Img => "img",
            Tag::Break => "break",
            Tag::Body => "body",
            Tag::Html => "html",
            Tag::Head => "head",
            Tag::Unknown(s) => s,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Tag::Span | Tag::Strong | Tag::Em | Tag::Underline | Tag::Anchor | Tag::Code | Tag::Br
        )
    }

    /// Elements that have no closing tag.
    fn is_void(&self) -> bool {
        matches!(self, Tag::Img | Tag::Br | Tag::Hr | Tag::Break)
            || matches!(self, Tag::Unknown(s) if matches!(s.as_str(), "meta" | "link" | "input"))
    }

    /// Elements that are always placed whole.
    fn is_atomic(&self) -> bool {
        matches!(self, Tag::Img | Tag::Table | Tag::Hr | Tag::Pre)
    }

    /// Elements whose content never reaches the page.
    fn is_dropped(&self) -> bool {
        matches!(self, Tag::Head)
            || matches!(self, Tag::Unknown(s) if matches!(s.as_str(), "script" | "style" | "title"))
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Tag::parse(&s)
    }
}

impl From<Tag> for String {
    fn from(t: Tag) -> Self {
        t.name().to_string()
    }
}

/// A node in the content tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentNode {
    Text(String),
    Element(ElementNode),
    /// Explicit page-break marker. Consumed by the segmenter.
    Break,
    /// Atomic unit (image, whole table). Keeps its subtree for rendering but is
    /// never split.
    Leaf(ElementNode),
}

/// An element carrying tag, attributes, and children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub tag: Tag,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_children(tag: Tag, children: Vec<ContentNode>) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children,
        }
    }

    /// Same tag and attributes, no children.
    pub fn shallow_clone(&self) -> Self {
        Self {
            tag: self.tag.clone(),
            attributes: self.attributes.clone(),
            children: Vec::new(),
        }
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attributes.get("style").map(|s| s.as_str())
    }

    pub fn src(&self) -> Option<&str> {
        self.attributes.get("src").map(|s| s.as_str())
    }

    /// First marker number of an ordered list (`start` attribute, default 1).
    pub fn list_start(&self) -> i64 {
        self.attributes
            .get("start")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(1)
    }

    /// Look up a property in the inline `style` attribute.
    pub fn style_property(&self, name: &str) -> Option<&str> {
        self.inline_style()?.split(';').find_map(|decl| {
            let (prop, val) = decl.split_once(':')?;
            (prop.trim().eq_ignore_ascii_case(name)).then(|| val.trim())
        })
    }
}

impl ContentNode {
    pub fn text(s: impl Into<String>) -> Self {
        ContentNode::Text(s.into())
    }

    pub fn element(tag: Tag, children: Vec<ContentNode>) -> Self {
        ContentNode::Element(ElementNode::with_children(tag, children))
    }

    pub fn leaf(tag: Tag, children: Vec<ContentNode>) -> Self {
        ContentNode::Leaf(ElementNode::with_children(tag, children))
    }

    /// The concatenated text of this subtree in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            ContentNode::Text(t) => out.push_str(t),
            ContentNode::Element(e) | ContentNode::Leaf(e) => {
                for child in &e.children {
                    child.collect_text(out);
                }
            }
            ContentNode::Break => {}
        }
    }

    pub fn children(&self) -> &[ContentNode] {
        match self {
            ContentNode::Element(e) | ContentNode::Leaf(e) => &e.children,
            _ => &[],
        }
    }
}

/// The nodes a tree flows as: an element root's children, or the root alone.
pub fn top_level(tree: &ContentNode) -> &[ContentNode] {
    match tree {
        ContentNode::Element(e) => &e.children,
        ContentNode::Break => &[],
        other => std::slice::from_ref(other),
    }
}

/// Concatenated text of a node sequence.
pub fn text_of(nodes: &[ContentNode]) -> String {
    nodes.iter().map(ContentNode::text_content).collect()
}

// ---------------------------------------------------------------------------
// Parser – recursive descent over the HTML subset
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of content nodes.
pub fn parse_html(html: &str) -> Vec<ContentNode> {
    let mut parser = Parser::new(html);
    let mut nodes = parser.parse_nodes();
    // Unbalanced closing tags at the top level end `parse_nodes` early.
    while !parser.eof() {
        parser.skip_closing_tag();
        nodes.extend(parser.parse_nodes());
    }
    nodes
}

/// Parse a full document and return a `<body>` root holding its content.
///
/// `<html>`/`<body>` wrappers are unwrapped; a fragment becomes the body.
pub fn parse_document(html: &str) -> ContentNode {
    let nodes = parse_html(html);
    ContentNode::element(Tag::Body, body_children(&nodes))
}

/// Read a JSON-serialised content tree.
pub fn from_json(json: &str) -> Result<ContentNode> {
    Ok(serde_json::from_str(json)?)
}

pub fn to_json(node: &ContentNode) -> String {
    serde_json::to_string_pretty(node).unwrap_or_default()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_nodes(&mut self) -> Vec<ContentNode> {
        let mut nodes = Vec::new();
        loop {
            self.skip_whitespace_between_tags();
            if self.eof() || self.starts_with("</") {
                break;
            }
            self.parse_node(&mut nodes);
        }
        nodes
    }

    fn parse_node(&mut self, out: &mut Vec<ContentNode>) {
        if self.starts_with("<!--") {
            self.skip_comment();
        } else if self.starts_with("<!") || self.starts_with("<?") {
            // Doctype / processing instruction
            while !self.eof() && !self.starts_with(">") {
                self.advance(1);
            }
            if !self.eof() {
                self.advance(1);
            }
        } else if self.starts_with("<") {
            self.parse_element(out);
        } else {
            out.push(self.parse_text());
        }
    }

    fn parse_text(&mut self) -> ContentNode {
        let start = self.pos;
        while !self.eof() && !self.starts_with("<") {
            self.advance(1);
        }
        ContentNode::Text(decode_entities(&self.input[start..self.pos]))
    }

    fn parse_element(&mut self, out: &mut Vec<ContentNode>) {
        self.advance(1); // '<'
        let tag_name = self.parse_tag_name();
        if tag_name.is_empty() {
            // A stray '<' – keep it as text.
            out.push(ContentNode::text("<"));
            return;
        }
        let tag = Tag::parse(&tag_name);
        let mut elem = ElementNode::new(tag.clone());

        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let before = self.pos;
            let (key, value) = self.parse_attribute();
            if self.pos == before {
                // Unparsable attribute character; skip it.
                self.advance(1);
                continue;
            }
            elem.attributes.insert(key.to_ascii_lowercase(), value);
        }

        let self_closed = self.starts_with("/>");
        if self_closed {
            self.advance(2);
        } else if self.starts_with(">") {
            self.advance(1);
        }

        if !self_closed && !tag.is_void() {
            elem.children = self.parse_nodes();
            if self.starts_with("</") {
                self.skip_closing_tag();
            }
        }

        classify(elem, out);
    }

    fn skip_closing_tag(&mut self) {
        self.advance(2);
        self.parse_tag_name();
        self.skip_whitespace();
        if self.starts_with(">") {
            self.advance(1);
        }
    }

    fn parse_tag_name(&mut self) -> String {
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ':' {
                self.advance(1);
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_tag_name();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.advance(1);
        self.skip_whitespace();
        let value = self.parse_attr_value();
        (key, value)
    }

    fn parse_attr_value(&mut self) -> String {
        for quote in ["\"", "'"] {
            if self.starts_with(quote) {
                self.advance(1);
                let start = self.pos;
                while !self.eof() && !self.starts_with(quote) {
                    self.advance(1);
                }
                let val = decode_entities(&self.input[start..self.pos]);
                if !self.eof() {
                    self.advance(1);
                }
                return val;
            }
        }
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_whitespace() || c == '>' || c == '/' {
                break;
            }
            self.advance(1);
        }
        self.input[start..self.pos].to_string()
    }

    fn skip_whitespace(&mut self) {
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance(1);
        }
    }

    /// Skip whitespace-only runs between tags; keep whitespace that leads
    /// into text.
    fn skip_whitespace_between_tags(&mut self) {
        let saved = self.pos;
        self.skip_whitespace();
        if !self.eof() && !self.starts_with("<") {
            self.pos = saved;
        }
    }

    fn skip_comment(&mut self) {
        self.advance(4);
        while !self.eof() && !self.starts_with("-->") {
            self.advance(1);
        }
        if !self.eof() {
            self.advance(3);
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn advance(&mut self, n: usize) {
        for _ in 0..n {
            if let Some(c) = self.input[self.pos..].chars().next() {
                self.pos += c.len_utf8();
            }
        }
    }
}

/// Turn a parsed element into content nodes: break markers, atomic leaves, or
/// plain elements, with style-driven breaks emitted around them.
fn classify(elem: ElementNode, out: &mut Vec<ContentNode>) {
    if elem.tag.is_dropped() {
        return;
    }

    let is_marker = elem.tag == Tag::Break
        || elem.classes().contains(&"page-break")
        || elem.attributes.contains_key("data-page-break");
    if is_marker {
        out.push(ContentNode::Break);
        // Content inside a marker still belongs to the document.
        out.extend(elem.children);
        return;
    }

    let breaks = |prop: &str| {
        elem.style_property(prop)
            .is_some_and(|v| v.eq_ignore_ascii_case("always") || v.eq_ignore_ascii_case("page"))
    };
    let break_before = breaks("page-break-before") || breaks("break-before");
    let break_after = breaks("page-break-after") || breaks("break-after");
    let avoid_inside = ["page-break-inside", "break-inside"]
        .iter()
        .any(|p| elem.style_property(p).is_some_and(|v| v.eq_ignore_ascii_case("avoid")));

    if break_before {
        out.push(ContentNode::Break);
    }
    if elem.tag.is_atomic() || avoid_inside {
        out.push(ContentNode::Leaf(elem));
    } else {
        out.push(ContentNode::Element(elem));
    }
    if break_after {
        out.push(ContentNode::Break);
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{00A0}")
        .replace("&amp;", "&")
}

/// Find the `<body>` element and return its children, or return all nodes if
/// no `<body>` is present.
pub fn body_children(nodes: &[ContentNode]) -> Vec<ContentNode> {
    for node in nodes {
        if let ContentNode::Element(e) = node {
            if e.tag == Tag::Body {
                return e.children.clone();
            }
            if e.tag == Tag::Html {
                let inner = body_children(&e.children);
                if !inner.is_empty() {
                    return inner;
                }
            }
        }
    }
    nodes.to_vec()
}
