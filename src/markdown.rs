//! Minimal Markdown renderer for chat bubbles.
//!
//! Supports exactly three constructs: `**bold**`, `[label](url)` links, and
//! unordered lists made of consecutive lines that start with `- `. Everything
//! else is literal text. Blank lines are dropped.

use once_cell::sync::Lazy;
use regex::Regex;

/// Bold and link syntax in one alternation, so matches come back already in
/// left-to-right order.
static INLINE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*\*(?P<bold>[^*]+)\*\*|\[(?P<label>[^\]]+)\]\((?P<url>[^)]+)\)")
        .expect("valid regex")
});

/// An inline run inside a line or list item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Bold(String),
    Link { label: String, url: String },
}

/// A block-level node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// One unordered list; each item is its own inline sequence.
    List(Vec<Vec<Inline>>),
    /// A non-blank, non-list line.
    Line(Vec<Inline>),
    /// The whole input, returned when nothing else was produced.
    Text(String),
}

/// Render `text` into block nodes.
pub fn render(text: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut list_items: Vec<Vec<Inline>> = Vec::new();

    for line in text.split('\n') {
        let trimmed = line.trim();
        if let Some(item) = trimmed.strip_prefix("- ") {
            list_items.push(render_inline(item));
            continue;
        }

        if !list_items.is_empty() {
            nodes.push(Node::List(std::mem::take(&mut list_items)));
        }
        if !trimmed.is_empty() {
            nodes.push(Node::Line(render_inline(trimmed)));
        }
    }

    if !list_items.is_empty() {
        nodes.push(Node::List(list_items));
    }

    if nodes.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }
    nodes
}

/// Split one line into literal, bold and link runs.
pub fn render_inline(line: &str) -> Vec<Inline> {
    let mut parts = Vec::new();
    let mut last = 0;

    for caps in INLINE_TOKEN.captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            parts.push(Inline::Text(line[last..whole.start()].to_string()));
        }
        if let Some(bold) = caps.name("bold") {
            parts.push(Inline::Bold(bold.as_str().to_string()));
        } else if let (Some(label), Some(url)) = (caps.name("label"), caps.name("url")) {
            parts.push(Inline::Link {
                label: label.as_str().to_string(),
                url: url.as_str().to_string(),
            });
        }
        last = whole.end();
    }

    if last < line.len() {
        parts.push(Inline::Text(line[last..].to_string()));
    }
    if parts.is_empty() {
        parts.push(Inline::Text(line.to_string()));
    }
    parts
}
