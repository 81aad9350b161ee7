//! Terminal chat client for `blogctl chat`.
//!
//! Talks to a running `blogctl serve` over HTTP, keeps the transcript in the
//! client state directory, and prints navigation targets as links.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::io::Write;
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::{ChatSession, ChatTransport};
use crate::config::Config;
use crate::llm::TextStream;
use crate::models::{Message, PageMeta};
use crate::navigation::Navigator;
use crate::transcript::{FileStore, PersistedTranscript};
use crate::view::{render_message, to_terminal};

/// HTTP transport against the chat server.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [Message],
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn page_meta(&self) -> Result<Vec<PageMeta>> {
        let url = format!("{}/api/navigation/page-meta", self.endpoint);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            bail!("GET {} returned {}", url, response.status());
        }
        Ok(response.json().await?)
    }

    async fn send(&self, messages: &[Message]) -> Result<TextStream> {
        let url = format!("{}/api/chat", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&ChatRequest { messages })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("chat request failed ({}): {}", status, body.trim());
        }
        Ok(utf8_text_stream(response.bytes_stream()))
    }
}

/// Decodes UTF-8 text from arbitrary byte chunks.
///
/// An incomplete trailing sequence is held back until the next chunk.
/// Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    /// Flush any dangling partial sequence.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

struct Utf8State<S> {
    inner: Pin<Box<S>>,
    decoder: Utf8Decoder,
    pending: VecDeque<String>,
    done: bool,
}

/// Adapt a plain-text byte stream into text deltas.
pub fn utf8_text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<anyhow::Error> + Send,
{
    let state = Utf8State {
        inner: Box::pin(bytes),
        decoder: Utf8Decoder::default(),
        pending: VecDeque::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(text) = st.pending.pop_front() {
                return Some((Ok(text), st));
            }
            if st.done {
                return None;
            }
            let text = match st.inner.next().await {
                Some(Ok(chunk)) => st.decoder.push(chunk.as_ref()),
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.done = true;
                    st.decoder.finish()
                }
            };
            if !text.is_empty() {
                st.pending.push_back(text);
            }
        }
    })
    .boxed()
}

/// Prints the navigation target; a terminal has nowhere to go.
pub struct TerminalNavigator {
    link_base: String,
}

impl TerminalNavigator {
    pub fn new(link_base: &str) -> Self {
        Self {
            link_base: link_base.to_string(),
        }
    }
}

impl Navigator for TerminalNavigator {
    fn navigate(&mut self, page: &PageMeta) {
        println!("⇒ Opening {} ({}{})", page.title, self.link_base, page.path);
    }
}

/// `blogctl chat`: interactive session against the configured endpoint.
pub async fn run_chat(config: &Config) -> Result<()> {
    let client = &config.client;
    std::fs::create_dir_all(&client.state_dir)?;
    let transcript = PersistedTranscript::with_key(
        FileStore::new(client.state_dir.clone()),
        &client.transcript_key,
    );
    let mut session = ChatSession::new(HttpTransport::new(&client.endpoint), transcript);
    let mut navigator = TerminalNavigator::new(client.link_base());

    session.start().await;
    if session.pages().is_empty() {
        eprintln!(
            "Warning: could not load pages from {}; navigation is disabled",
            client.endpoint
        );
    }

    for message in session.messages() {
        print_message(message, session.pages(), client.link_base());
    }

    eprintln!("Type a message and press Enter. Ctrl-D to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let result = session
            .submit(&line, |delta| echo_delta(&mut std::io::stdout(), delta))
            .await;

        match result {
            Ok(Some(turn)) => {
                println!();
                // Re-render once settled so directives show as links.
                print_message(&turn.reply, session.pages(), client.link_base());
                if let Some(page) = &turn.navigate_to {
                    navigator.navigate(page);
                }
            }
            Ok(None) => {}
            Err(e) => {
                println!();
                eprintln!("Error: {:#}", e);
            }
        }
    }

    Ok(())
}

fn print_message(message: &Message, pages: &[PageMeta], link_base: &str) {
    let elements = render_message(message, pages);
    let label = match message.role {
        crate::models::Role::User => "you",
        crate::models::Role::Assistant => "chu",
    };
    println!("[{}]\n{}", label, to_terminal(&elements, link_base));
}

/// Print a streamed delta immediately. Write errors are logged, not fatal.
fn echo_delta(out: &mut impl Write, delta: &str) {
    if let Err(e) = out.write_all(delta.as_bytes()).and_then(|_| out.flush()) {
        log::debug!("failed to echo streamed text: {}", e);
    }
}
