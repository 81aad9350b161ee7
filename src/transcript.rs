//! Chat transcript persistence and replay.
//!
//! The transcript is saved as one JSON snapshot under a string key, replaced
//! in full after every change. Storage is injected through
//! [`TranscriptStore`]: [`FileStore`] for the terminal client and
//! [`MemoryStore`] for tests.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::Message;

/// Default storage key for the chat transcript.
pub const DEFAULT_TRANSCRIPT_KEY: &str = "chu-chat-messages";

/// String-keyed snapshot storage.
pub trait TranscriptStore: Send + Sync {
    /// Read the stored value for `key`, `None` if nothing was saved.
    fn load(&self, key: &str) -> Result<Option<String>>;
    /// Replace the stored value for `key`.
    fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// Stores each key as `<dir>/<key>.json`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TranscriptStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
        Ok(Some(content))
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state dir: {}", self.dir.display()))?;
        let path = self.path_for(key);
        std::fs::write(&path, value)
            .with_context(|| format!("Failed to write transcript: {}", path.display()))
    }
}

/// In-process storage, used by tests and short-lived sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value, as if a previous session had saved it.
    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        store
    }
}

impl TranscriptStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("transcript store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("transcript store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A transcript bound to a store.
///
/// Nothing is written until [`hydrate`](Self::hydrate) has run, and nothing
/// is written while the transcript is empty, so an empty session never
/// clobbers a saved one.
pub struct PersistedTranscript<S: TranscriptStore> {
    store: S,
    key: String,
    messages: Vec<Message>,
    hydrated: bool,
}

impl<S: TranscriptStore> PersistedTranscript<S> {
    pub fn new(store: S) -> Self {
        Self::with_key(store, DEFAULT_TRANSCRIPT_KEY)
    }

    pub fn with_key(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            messages: Vec::new(),
            hydrated: false,
        }
    }

    /// Load the saved transcript once. Any failure leaves it empty.
    pub fn hydrate(&mut self) {
        if self.hydrated {
            return;
        }
        self.hydrated = true;

        match self.store.load(&self.key) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Message>>(&raw) {
                Ok(messages) if !messages.is_empty() => {
                    log::debug!("restored {} messages", messages.len());
                    self.messages = messages;
                }
                Ok(_) => {}
                Err(e) => log::warn!("Failed to parse saved messages: {}", e),
            },
            Ok(None) => {}
            Err(e) => log::warn!("Failed to load saved messages: {:#}", e),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Append a message and persist.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.persist();
    }

    /// Append streamed text to the message with `id` and persist.
    ///
    /// Returns `false` if no such message exists.
    pub fn append_text(&mut self, id: &str, delta: &str) -> bool {
        let Some(message) = self.messages.iter_mut().rev().find(|m| m.id == id) else {
            return false;
        };
        message.push_text(delta);
        self.persist();
        true
    }

    /// Swap in a whole transcript, as a load from elsewhere would.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.persist();
    }

    fn persist(&self) {
        if !self.hydrated || self.messages.is_empty() {
            return;
        }
        let snapshot = match serde_json::to_string(&self.messages) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Failed to serialize transcript: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.save(&self.key, &snapshot) {
            log::warn!("Failed to save transcript: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn saved(store: &MemoryStore) -> Option<Vec<Message>> {
        store
            .load(DEFAULT_TRANSCRIPT_KEY)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    #[test]
    fn hydrate_without_saved_state_is_empty() {
        let mut t = PersistedTranscript::new(MemoryStore::new());
        t.hydrate();
        assert!(t.messages().is_empty());
    }

    #[test]
    fn hydrate_replaces_wholesale() {
        let stored = vec![Message::user("hi"), Message::assistant("hello")];
        let store = MemoryStore::with_entry(
            DEFAULT_TRANSCRIPT_KEY,
            &serde_json::to_string(&stored).unwrap(),
        );
        let mut t = PersistedTranscript::new(store);
        t.hydrate();
        assert_eq!(t.messages(), stored.as_slice());
    }

    #[test]
    fn corrupt_snapshot_is_ignored() {
        let store = MemoryStore::with_entry(DEFAULT_TRANSCRIPT_KEY, "{not json");
        let mut t = PersistedTranscript::new(store);
        t.hydrate();
        assert!(t.messages().is_empty());
    }

    #[test]
    fn nothing_saved_before_hydrate() {
        let mut t = PersistedTranscript::new(MemoryStore::new());
        t.push(Message::user("early"));
        assert!(saved(&t.store).is_none());
    }

    #[test]
    fn every_change_is_saved_in_full() {
        let mut t = PersistedTranscript::new(MemoryStore::new());
        t.hydrate();
        t.push(Message::user("question"));
        let reply = Message {
            id: "r1".to_string(),
            role: Role::Assistant,
            parts: vec![],
        };
        t.push(reply);
        assert!(t.append_text("r1", "par"));
        assert!(t.append_text("r1", "tial"));

        let snapshot = saved(&t.store).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].text(), "partial");
    }

    #[test]
    fn append_to_unknown_message_is_rejected() {
        let mut t = PersistedTranscript::new(MemoryStore::new());
        t.hydrate();
        assert!(!t.append_text("missing", "x"));
    }

    #[test]
    fn file_store_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("state"));
        assert!(store.load("k").unwrap().is_none());
        store.save("k", "[]").unwrap();
        assert_eq!(store.load("k").unwrap().as_deref(), Some("[]"));
        assert!(tmp.path().join("state").join("k.json").exists());
    }
}
