//! Directive block scanner for assistant messages.
//!
//! The assistant may embed tagged JSON blocks in its reply to ask the client
//! for a UI action:
//!
//! ```text
//! Take a look at this one!
//! <NAVIGATION>{"action": "navigate", "path": "/blog/rust-intro"}</NAVIGATION>
//! <RELATED_POSTS>
//!   {"posts": [{"id": "rust-intro", "title": "Intro to Rust"}]}
//! </RELATED_POSTS>
//! ```
//!
//! [`scan`] splits a message into an ordered list of [`Segment`]s whose spans
//! tile the input exactly. Text between blocks is kept verbatim. A block whose
//! payload does not parse becomes [`SegmentKind::Malformed`] instead of an
//! error, so rendering never fails.
//!
//! An open marker with no matching close marker is literal text, and the scan
//! carries on looking for later blocks. While a response streams, a block
//! that is still arriving therefore stays in the trailing text segment until
//! its close marker shows up.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::ops::Range;

use crate::models::PageMeta;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// The recognized block tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Navigation,
    RelatedPosts,
}

impl DirectiveKind {
    const ALL: [DirectiveKind; 2] = [DirectiveKind::Navigation, DirectiveKind::RelatedPosts];

    pub fn open_marker(self) -> &'static str {
        match self {
            DirectiveKind::Navigation => "<NAVIGATION>",
            DirectiveKind::RelatedPosts => "<RELATED_POSTS>",
        }
    }

    pub fn close_marker(self) -> &'static str {
        match self {
            DirectiveKind::Navigation => "</NAVIGATION>",
            DirectiveKind::RelatedPosts => "</RELATED_POSTS>",
        }
    }
}

/// Payload of a `NAVIGATION` block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NavigationDirective {
    pub action: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// One entry of a `RELATED_POSTS` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedPost {
    pub id: String,
    pub title: String,
}

impl RelatedPost {
    /// Site-relative link to the post.
    pub fn href(&self) -> String {
        format!("/blog/{}", self.id)
    }
}

/// Classification of a scanned span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    Text,
    Navigation(NavigationDirective),
    /// Valid entries only; may be empty when the block listed none.
    RelatedPosts(Vec<RelatedPost>),
    /// A closed block whose payload could not be understood.
    Malformed(DirectiveKind),
}

/// A contiguous span of message text and what it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Byte range into the scanned text.
    pub span: Range<usize>,
    pub kind: SegmentKind,
}

impl Segment {
    /// The raw slice of `source` this segment covers.
    pub fn raw<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.clone()]
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, SegmentKind::Text)
    }
}

/// Split `text` into ordered, gap-free segments.
pub fn scan(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    let mut search_from = 0;

    while let Some((open_at, kind)) = next_open_marker(text, search_from) {
        let body_start = open_at + kind.open_marker().len();
        // An open marker with no close is literal text.
        let Some(close_offset) = text[body_start..].find(kind.close_marker()) else {
            search_from = body_start;
            continue;
        };
        let body_end = body_start + close_offset;
        let block_end = body_end + kind.close_marker().len();

        if open_at > cursor {
            segments.push(Segment {
                span: cursor..open_at,
                kind: SegmentKind::Text,
            });
        }
        segments.push(Segment {
            span: open_at..block_end,
            kind: parse_block(kind, &text[body_start..body_end]),
        });
        cursor = block_end;
        search_from = block_end;
    }

    if cursor < text.len() {
        segments.push(Segment {
            span: cursor..text.len(),
            kind: SegmentKind::Text,
        });
    }

    segments
}

/// The directive of the first closed `NAVIGATION` block in `text`.
///
/// Only that block counts: when it is malformed, later ones are ignored.
pub fn first_navigation(text: &str) -> Option<NavigationDirective> {
    scan(text).into_iter().find_map(|seg| match seg.kind {
        SegmentKind::Navigation(nav) => Some(Some(nav)),
        SegmentKind::Malformed(DirectiveKind::Navigation) => Some(None),
        _ => None,
    })?
}

/// Look up the page a navigation directive points at.
pub fn resolve_navigation<'a>(
    directive: &NavigationDirective,
    pages: &'a [PageMeta],
) -> Option<&'a PageMeta> {
    pages.iter().find(|page| page.path == directive.path)
}

fn next_open_marker(text: &str, from: usize) -> Option<(usize, DirectiveKind)> {
    DirectiveKind::ALL
        .iter()
        .filter_map(|kind| {
            text[from..]
                .find(kind.open_marker())
                .map(|offset| (from + offset, *kind))
        })
        .min_by_key(|(at, _)| *at)
}

fn parse_block(kind: DirectiveKind, body: &str) -> SegmentKind {
    let parsed = match kind {
        DirectiveKind::Navigation => parse_navigation(body.trim()).map(SegmentKind::Navigation),
        DirectiveKind::RelatedPosts => {
            let collapsed = WHITESPACE_RUN.replace_all(body.trim(), " ");
            parse_related_posts(&collapsed).map(SegmentKind::RelatedPosts)
        }
    };
    parsed.unwrap_or_else(|| {
        log::debug!("ignoring malformed {} block", kind.open_marker());
        SegmentKind::Malformed(kind)
    })
}

fn parse_navigation(json: &str) -> Option<NavigationDirective> {
    let directive: NavigationDirective = serde_json::from_str(json).ok()?;
    (directive.action == "navigate" && !directive.path.is_empty()).then_some(directive)
}

fn parse_related_posts(json: &str) -> Option<Vec<RelatedPost>> {
    let value: Value = serde_json::from_str(json).ok()?;
    let posts = match value.get("posts").and_then(Value::as_array) {
        Some(posts) => posts,
        None => return Some(Vec::new()),
    };
    Some(
        posts
            .iter()
            .filter_map(|post| {
                let id = scalar_string(post.get("id")?)?;
                let title = scalar_string(post.get("title")?)?;
                Some(RelatedPost { id, title })
            })
            .collect(),
    )
}

fn scalar_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}
