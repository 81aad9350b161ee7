//! Streaming chat-completion client.
//!
//! [`ChatModel`] is the seam the HTTP server talks to. [`OpenAiChatModel`]
//! calls `POST /v1/chat/completions` with `stream: true` and turns the
//! server-sent event stream into plain text deltas.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use crate::config::ChatConfig;
use crate::models::{Message, Role};

/// A stream of assistant text deltas.
pub type TextStream = BoxStream<'static, Result<String>>;

/// A language model that streams a reply to a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Start a completion. Errors before the first byte are returned here;
    /// errors mid-stream arrive as stream items.
    async fn stream(&self, system: &str, messages: &[Message]) -> Result<TextStream>;
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<WireMessage<'a>>,
}

pub struct OpenAiChatModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl OpenAiChatModel {
    pub fn new(config: &ChatConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, system: &str, messages: &[Message]) -> Result<TextStream> {
        let mut wire = vec![WireMessage {
            role: "system",
            content: system.to_string(),
        }];
        wire.extend(messages.iter().map(|m| WireMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m.text(),
        }));

        let body = CompletionRequest {
            model: &self.model,
            stream: true,
            messages: wire,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        Ok(sse_text_stream(response.bytes_stream()))
    }
}

/// A decoded server-sent event of interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

/// Incremental decoder for the completions event stream.
///
/// Bytes are buffered until a full line arrives, so multi-byte characters
/// split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(event) = decode_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Decode whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

fn decode_line(line: &str) -> Option<SseEvent> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    let json: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("skipping undecodable event: {}", e);
            return None;
        }
    };
    let content = json
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())?;
    Some(SseEvent::Delta(content.to_string()))
}

struct SseState<S> {
    inner: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    done: bool,
}

/// Adapt a raw byte stream of completion events into text deltas.
pub fn sse_text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<anyhow::Error> + Send,
{
    let state = SseState {
        inner: Box::pin(bytes),
        decoder: SseDecoder::new(),
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
            let (events, ended) = match st.inner.next().await {
                Some(Ok(chunk)) => (st.decoder.push(chunk.as_ref()), false),
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e.into()), st));
                }
                None => (st.decoder.finish(), true),
            };
            for event in events {
                match event {
                    SseEvent::Delta(text) if !st.done => st.pending.push_back(text),
                    SseEvent::Delta(_) => {}
                    SseEvent::Done => st.done = true,
                }
            }
            st.done |= ended;
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    #[test]
    fn decodes_deltas_and_done() {
        let mut dec = SseDecoder::new();
        let raw = format!("{}{}data: [DONE]\n\n", event("Hel"), event("lo"));
        assert_eq!(
            dec.push(raw.as_bytes()),
            vec![
                SseEvent::Delta("Hel".to_string()),
                SseEvent::Delta("lo".to_string()),
                SseEvent::Done
            ]
        );
    }

    #[test]
    fn handles_split_multibyte_characters() {
        let mut dec = SseDecoder::new();
        let raw = event("ちゅう");
        let bytes = raw.as_bytes();
        let mid = raw.find("ち").unwrap() + 1;
        assert!(dec.push(&bytes[..mid]).is_empty());
        assert_eq!(
            dec.push(&bytes[mid..]),
            vec![SseEvent::Delta("ちゅう".to_string())]
        );
    }

    #[test]
    fn ignores_role_only_and_comment_lines() {
        let mut dec = SseDecoder::new();
        let raw = ": keep-alive\n\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n";
        assert!(dec.push(raw.as_bytes()).is_empty());
    }

    #[tokio::test]
    async fn stream_yields_text_until_done() {
        let raw = format!("{}{}data: [DONE]\n\n{}", event("a"), event("b"), event("ignored"));
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = raw
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(c.to_vec()))
            .collect();
        let texts: Vec<String> = sse_text_stream(futures_util::stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(texts, vec!["a".to_string(), "b".to_string()]);
    }
}
