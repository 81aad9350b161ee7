//! Turns a chat message into renderable elements.
//!
//! Plain text goes through the [`markdown`](crate::markdown) renderer;
//! directive blocks become navigation links or related-post lists. The
//! terminal client prints the result with [`to_terminal`].

use crate::directive::{resolve_navigation, scan, DirectiveKind, SegmentKind};
use crate::markdown::{render, Inline, Node};
use crate::models::{Message, PageMeta};

/// A rendered piece of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Markdown(Vec<Node>),
    NavigateLink { path: String, title: String },
    RelatedPosts(Vec<PostLink>),
    /// Visible marker for a directive block that could not be read.
    Error(DirectiveKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostLink {
    pub title: String,
    pub href: String,
}

/// Render a message's text parts against the known pages.
pub fn render_message(message: &Message, pages: &[PageMeta]) -> Vec<Element> {
    render_text(&message.text(), pages)
}

pub fn render_text(text: &str, pages: &[PageMeta]) -> Vec<Element> {
    let mut elements = Vec::new();

    for segment in scan(text) {
        match &segment.kind {
            SegmentKind::Text => elements.push(Element::Markdown(render(segment.raw(text)))),
            SegmentKind::Navigation(directive) => {
                if let Some(page) = resolve_navigation(directive, pages) {
                    elements.push(Element::NavigateLink {
                        path: page.path.clone(),
                        title: page.title.clone(),
                    });
                }
            }
            SegmentKind::RelatedPosts(posts) if !posts.is_empty() => {
                elements.push(Element::RelatedPosts(
                    posts
                        .iter()
                        .map(|post| PostLink {
                            title: post.title.clone(),
                            href: post.href(),
                        })
                        .collect(),
                ));
            }
            SegmentKind::RelatedPosts(_) => {}
            SegmentKind::Malformed(DirectiveKind::Navigation) => {}
            SegmentKind::Malformed(kind) => elements.push(Element::Error(*kind)),
        }
    }

    if elements.is_empty() {
        elements.push(Element::Markdown(render(text)));
    }
    elements
}

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Plain-terminal rendering: ANSI bold, `label <url>` links, bullet lists.
pub fn to_terminal(elements: &[Element], base_url: &str) -> String {
    let mut lines: Vec<String> = Vec::new();

    for element in elements {
        match element {
            Element::Markdown(nodes) => {
                for node in nodes {
                    match node {
                        Node::List(items) => {
                            for item in items {
                                lines.push(format!("  • {}", inline_to_terminal(item)));
                            }
                        }
                        Node::Line(inlines) => lines.push(inline_to_terminal(inlines)),
                        Node::Text(text) => lines.push(text.clone()),
                    }
                }
            }
            Element::NavigateLink { path, title } => {
                lines.push(format!("→ {} ({}{})", title, base_url, path));
            }
            Element::RelatedPosts(links) => {
                lines.push(format!("{}Related posts:{}", BOLD, RESET));
                for link in links {
                    lines.push(format!("  • {} <{}{}>", link.title, base_url, link.href));
                }
            }
            Element::Error(kind) => {
                lines.push(format!("[could not read {} block]", kind.open_marker()));
            }
        }
    }

    lines.join("\n")
}

fn inline_to_terminal(inlines: &[Inline]) -> String {
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(text) => text.clone(),
            Inline::Bold(text) => format!("{}{}{}", BOLD, text, RESET),
            Inline::Link { label, url } => format!("{} <{}>", label, url),
        })
        .collect()
}
