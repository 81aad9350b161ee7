//! Chat session: transcript, streaming, and the navigation trigger.
//!
//! A [`ChatSession`] owns the persisted transcript exclusively. Submissions
//! are strictly sequential: [`ChatSession::submit`] takes `&mut self` and
//! resolves only after the reply has finished streaming, so a second
//! submission cannot start while one is in flight.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::llm::TextStream;
use crate::models::{Message, PageMeta};
use crate::navigation::NavigationTracker;
use crate::transcript::{PersistedTranscript, TranscriptStore};

/// How the client reaches the chat backend.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Fetch the list of navigable pages.
    async fn page_meta(&self) -> Result<Vec<PageMeta>>;

    /// Send the whole conversation and stream the reply.
    async fn send(&self, messages: &[Message]) -> Result<TextStream>;
}

/// Result of one completed turn.
#[derive(Debug, Clone)]
pub struct Turn {
    pub reply: Message,
    /// Page to move to, at most once per reply.
    pub navigate_to: Option<PageMeta>,
}

pub struct ChatSession<T: ChatTransport, S: TranscriptStore> {
    transport: T,
    transcript: PersistedTranscript<S>,
    pages: Vec<PageMeta>,
    tracker: NavigationTracker,
}

impl<T: ChatTransport, S: TranscriptStore> ChatSession<T, S> {
    pub fn new(transport: T, transcript: PersistedTranscript<S>) -> Self {
        Self {
            transport,
            transcript,
            pages: Vec::new(),
            tracker: NavigationTracker::new(),
        }
    }

    /// Restore the saved transcript and load the page list.
    ///
    /// Neither failure is fatal: the transcript starts empty and navigation
    /// stays disabled until pages are loaded.
    pub async fn start(&mut self) {
        self.transcript.hydrate();
        self.refresh_pages().await;
        // A restored reply was already acted on in a previous session.
        if !self.pages.is_empty() {
            self.tracker.observe(self.transcript.messages(), &self.pages);
        }
    }

    pub async fn refresh_pages(&mut self) {
        match self.transport.page_meta().await {
            Ok(pages) => self.pages = pages,
            Err(e) => log::warn!("Failed to load page list: {:#}", e),
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn pages(&self) -> &[PageMeta] {
        &self.pages
    }

    /// Send `text` and stream the reply into the transcript.
    ///
    /// `on_delta` sees each chunk as it arrives. Returns `Ok(None)` for blank
    /// input. A stream error keeps the partial reply in the transcript.
    pub async fn submit<F>(&mut self, text: &str, mut on_delta: F) -> Result<Option<Turn>>
    where
        F: FnMut(&str) + Send,
    {
        if text.trim().is_empty() {
            return Ok(None);
        }

        self.transcript.push(Message::user(text));
        let mut stream = self.transport.send(self.transcript.messages()).await?;

        let reply = Message::assistant("");
        let reply_id = reply.id.clone();
        self.transcript.push(reply);

        while let Some(delta) = stream.next().await {
            let delta = delta?;
            on_delta(&delta);
            self.transcript.append_text(&reply_id, &delta);
        }

        let navigate_to = self.tracker.observe(self.transcript.messages(), &self.pages);
        let reply = self
            .transcript
            .messages()
            .iter()
            .rev()
            .find(|m| m.id == reply_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("reply vanished from transcript"))?;

        Ok(Some(Turn { reply, navigate_to }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PageType, Role};
    use crate::transcript::{MemoryStore, DEFAULT_TRANSCRIPT_KEY};
    use std::sync::Mutex;

    struct ScriptedTransport {
        pages: Option<Vec<PageMeta>>,
        replies: Mutex<Vec<Vec<&'static str>>>,
        seen: Mutex<Vec<usize>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Vec<&'static str>>) -> Self {
            Self {
                pages: Some(vec![
                    PageMeta::new("/", "Home", PageType::Home),
                    PageMeta::new("/about", "About", PageType::About),
                ]),
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn page_meta(&self) -> Result<Vec<PageMeta>> {
            self.pages
                .clone()
                .ok_or_else(|| anyhow::anyhow!("page list unavailable"))
        }

        async fn send(&self, messages: &[Message]) -> Result<TextStream> {
            self.seen.lock().unwrap().push(messages.len());
            let chunks = self.replies.lock().unwrap().remove(0);
            let items: Vec<Result<String>> = chunks.into_iter().map(|c| Ok(c.to_string())).collect();
            Ok(futures_util::stream::iter(items).boxed())
        }
    }

    fn session(transport: ScriptedTransport) -> ChatSession<ScriptedTransport, MemoryStore> {
        ChatSession::new(transport, PersistedTranscript::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn streams_reply_into_transcript() {
        let mut s = session(ScriptedTransport::new(vec![vec!["Hel", "lo ", "**there**"]]));
        s.start().await;

        let mut seen = String::new();
        let turn = s.submit("hi", |d| seen.push_str(d)).await.unwrap().unwrap();
        assert_eq!(seen, "Hello **there**");
        assert_eq!(turn.reply.text(), "Hello **there**");
        assert!(turn.navigate_to.is_none());
        assert_eq!(s.messages().len(), 2);
        assert_eq!(s.messages()[0].role, Role::User);
    }

    #[tokio::test]
    async fn navigation_fires_after_stream_completes() {
        let mut s = session(ScriptedTransport::new(vec![vec![
            "Off we go <NAVIGA",
            "TION>{\"action\":\"navigate\",\"path\":\"/about\"}</NAVIGATION>",
        ]]));
        s.start().await;
        let turn = s.submit("who are you", |_| {}).await.unwrap().unwrap();
        assert_eq!(turn.navigate_to.map(|p| p.path), Some("/about".to_string()));
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let mut s = session(ScriptedTransport::new(vec![]));
        s.start().await;
        assert!(s.submit("   ", |_| {}).await.unwrap().is_none());
        assert!(s.messages().is_empty());
    }

    #[tokio::test]
    async fn restored_reply_does_not_navigate_again() {
        let restored = vec![
            Message::user("go"),
            Message::assistant(
                "<NAVIGATION>{\"action\":\"navigate\",\"path\":\"/\"}</NAVIGATION>",
            ),
        ];
        let store = MemoryStore::with_entry(
            DEFAULT_TRANSCRIPT_KEY,
            &serde_json::to_string(&restored).unwrap(),
        );
        let mut s = ChatSession::new(
            ScriptedTransport::new(vec![vec!["plain answer"]]),
            PersistedTranscript::new(store),
        );
        s.start().await;
        assert_eq!(s.messages().len(), 2);

        let turn = s.submit("and now?", |_| {}).await.unwrap().unwrap();
        assert!(turn.navigate_to.is_none());
        assert_eq!(s.messages().len(), 4);
    }

    #[tokio::test]
    async fn whole_conversation_is_sent() {
        let transport = ScriptedTransport::new(vec![vec!["one"], vec!["two"]]);
        let mut s = session(transport);
        s.start().await;
        s.submit("a", |_| {}).await.unwrap();
        s.submit("b", |_| {}).await.unwrap();
        assert_eq!(*s.transport.seen.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn missing_pages_disable_navigation() {
        let mut transport = ScriptedTransport::new(vec![vec![
            "<NAVIGATION>{\"action\":\"navigate\",\"path\":\"/\"}</NAVIGATION>",
        ]]);
        transport.pages = None;
        let mut s = session(transport);
        s.start().await;
        assert!(s.pages().is_empty());
        let turn = s.submit("home", |_| {}).await.unwrap().unwrap();
        assert!(turn.navigate_to.is_none());
    }
}
