//! One-time navigation trigger.
//!
//! When the latest assistant reply carries a valid `NAVIGATION` directive
//! for a known page, the client moves there exactly once. The tracker
//! remembers the last message it handled so replays, re-renders and later
//! turns never fire the same message again.

use crate::directive::{first_navigation, resolve_navigation};
use crate::models::{Message, PageMeta, Role};

/// Receives navigation targets.
pub trait Navigator {
    fn navigate(&mut self, page: &PageMeta);
}

#[derive(Debug, Default, Clone)]
pub struct NavigationTracker {
    last_handled: Option<String>,
}

impl NavigationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the last assistant message already evaluated.
    pub fn last_handled(&self) -> Option<&str> {
        self.last_handled.as_deref()
    }

    /// Evaluate the latest assistant message of a settled transcript.
    ///
    /// With no page list loaded this is a no-op: the message is not marked,
    /// so it is evaluated normally once pages arrive.
    pub fn observe(&mut self, messages: &[Message], pages: &[PageMeta]) -> Option<PageMeta> {
        if pages.is_empty() {
            return None;
        }
        let latest = messages.iter().rev().find(|m| m.role == Role::Assistant)?;
        if self.last_handled.as_deref() == Some(latest.id.as_str()) {
            return None;
        }
        self.last_handled = Some(latest.id.clone());

        let directive = first_navigation(&latest.text())?;
        let target = resolve_navigation(&directive, pages);
        if target.is_none() {
            log::debug!("navigation to unknown path {} ignored", directive.path);
        }
        target.cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageType;

    fn pages() -> Vec<PageMeta> {
        vec![
            PageMeta::new("/", "Home", PageType::Home),
            PageMeta::new("/blog/rust", "Rust notes", PageType::Blog),
        ]
    }

    fn nav_reply(path: &str) -> Message {
        Message::assistant(format!(
            "Here you go <NAVIGATION>{{\"action\":\"navigate\",\"path\":\"{}\"}}</NAVIGATION>",
            path
        ))
    }

    #[test]
    fn fires_once_per_message() {
        let mut tracker = NavigationTracker::new();
        let messages = vec![Message::user("show rust"), nav_reply("/blog/rust")];

        let target = tracker.observe(&messages, &pages());
        assert_eq!(target.map(|p| p.title), Some("Rust notes".to_string()));
        assert!(tracker.observe(&messages, &pages()).is_none());
    }

    #[test]
    fn unknown_path_never_fires() {
        let mut tracker = NavigationTracker::new();
        let messages = vec![nav_reply("/made-up")];
        assert!(tracker.observe(&messages, &pages()).is_none());
        assert_eq!(tracker.last_handled(), Some(messages[0].id.as_str()));
        assert!(tracker.observe(&messages, &pages()).is_none());
    }

    #[test]
    fn waits_for_page_list() {
        let mut tracker = NavigationTracker::new();
        let messages = vec![nav_reply("/")];
        assert!(tracker.observe(&messages, &[]).is_none());
        assert!(tracker.last_handled().is_none());
        assert!(tracker.observe(&messages, &pages()).is_some());
    }

    #[test]
    fn only_latest_assistant_message_counts() {
        let mut tracker = NavigationTracker::new();
        let mut messages = vec![nav_reply("/")];
        tracker.observe(&messages, &pages());

        messages.push(Message::user("thanks"));
        messages.push(Message::assistant("no directive here"));
        assert!(tracker.observe(&messages, &pages()).is_none());
        assert_eq!(tracker.last_handled(), Some(messages[2].id.as_str()));
    }

    #[test]
    fn malformed_directive_is_ignored() {
        let mut tracker = NavigationTracker::new();
        let messages = vec![Message::assistant("<NAVIGATION>{oops}</NAVIGATION>")];
        assert!(tracker.observe(&messages, &pages()).is_none());
    }
}
