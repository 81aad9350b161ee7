//! Core data models shared by the chat and sync flows.
//!
//! Chat messages use the same JSON shape the browser widget persists, so a
//! transcript written by one client can be replayed by another.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One part of a message. Only text parts exist today; the tag keeps the
/// wire format open for other part kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessagePart {
    Text { text: String },
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl Message {
    /// Create a message with a fresh UUID and a single text part.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Concatenation of all text parts, in part order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                MessagePart::Text { text } => text.as_str(),
            })
            .collect()
    }

    /// Append streamed text to the last text part, creating one if needed.
    pub fn push_text(&mut self, delta: &str) {
        match self.parts.last_mut() {
            Some(MessagePart::Text { text }) => text.push_str(delta),
            None => self.parts.push(MessagePart::Text {
                text: delta.to_string(),
            }),
        }
    }
}

/// Kind of site page, used to validate navigation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
    Home,
    Blog,
    Project,
    About,
}

/// A navigable page on the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub path: String,
    pub title: String,
    #[serde(rename = "type")]
    pub page_type: PageType,
}

impl PageMeta {
    pub fn new(path: impl Into<String>, title: impl Into<String>, page_type: PageType) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            page_type,
        }
    }
}

/// A published blog post, read from the content directory.
#[derive(Debug, Clone, PartialEq)]
pub struct BlogPost {
    /// Path relative to the blog directory, without extension.
    pub slug: String,
    pub title: String,
    pub summary: Option<String>,
    pub date: Option<String>,
    pub tags: Vec<String>,
    pub draft: bool,
    pub sort: Option<i64>,
}
