use super::{ChatModel, FragmentStream, FRAGMENT_BUFFER};
use crate::config::RankerConfig;
use crate::error::{RankerError, Result};
use async_trait::async_trait;
use faultrank_protocol::{ChatTurn, SessionKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    stream: bool,
    user: String,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Streaming adapter for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiChatModel {
    pub fn from_config(config: &RankerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| RankerError::invalid_config(format!("HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.trim().to_string(),
            temperature: config.temperature,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn submit(&self, session: &SessionKey, turns: Vec<ChatTurn>) -> Result<FragmentStream> {
        let body = ChatRequest {
            model: &self.model,
            messages: turns
                .iter()
                .map(|turn| WireMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                })
                .collect(),
            temperature: self.temperature,
            stream: true,
            user: session.to_string(),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = self.api_key.as_deref().map(str::trim) {
            if !key.is_empty() {
                request = request.bearer_auth(key);
            }
        }

        let mut response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RankerError::transport(format!("API error {status}: {text}")));
        }

        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            loop {
                let (items, done) = match response.chunk().await {
                    Ok(Some(bytes)) => decode_batch(decoder.push(&bytes), false),
                    Ok(None) => decode_batch(decoder.finish(), true),
                    Err(err) => {
                        let _ = tx.send(Err(err.into())).await;
                        return;
                    }
                };
                for item in items {
                    if tx.send(item).await.is_err() {
                        return;
                    }
                }
                if done {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

/// Fragments for one batch of events, and whether the stream is over.
///
/// A body that ends without `[DONE]` was cut off, so it is reported as a
/// transport failure rather than a complete reply.
fn decode_batch(events: Vec<SseEvent>, body_ended: bool) -> (Vec<Result<String>>, bool) {
    let mut items = Vec::new();
    for event in events {
        let payload = match event {
            SseEvent::Done => return (items, true),
            SseEvent::Data(payload) => payload,
        };
        match decode_delta(&payload) {
            Ok(Some(fragment)) => items.push(Ok(fragment)),
            Ok(None) => {}
            Err(err) => {
                items.push(Err(err));
                return (items, true);
            }
        }
    }
    if body_ended {
        items.push(Err(RankerError::transport("stream ended before [DONE]")));
        return (items, true);
    }
    (items, false)
}

fn decode_delta(payload: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|err| RankerError::transport(format!("malformed stream event: {err}")))?;
    if let Some(error) = chunk.error {
        return Err(RankerError::transport(format!("model error: {error}")));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence, so
/// only complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        let events: Vec<SseEvent> = self.decode_line(&line).into_iter().collect();
        self.finished = true;
        events
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);
        let payload = line.strip_prefix("data:")?.trim_start();
        if payload == "[DONE]" {
            self.finished = true;
            return Some(SseEvent::Done);
        }
        if payload.is_empty() {
            return None;
        }
        Some(SseEvent::Data(payload.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decoder_handles_split_lines_and_done() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(
            decoder.push(b":1}\n\n: keep-alive\ndata: [DONE]\n"),
            vec![SseEvent::Data("{\"a\":1}".into()), SseEvent::Done]
        );
        assert!(decoder.is_finished());
    }

    #[test]
    fn decoder_keeps_multibyte_sequences_intact() {
        let mut decoder = SseDecoder::default();
        let line = "data: héllo\n".as_bytes();
        let split = line.iter().position(|b| *b >= 0x80).unwrap() + 1;
        assert!(decoder.push(&line[..split]).is_empty());
        assert_eq!(
            decoder.push(&line[split..]),
            vec![SseEvent::Data("héllo".into())]
        );
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Data("tail".into())]);
    }

    #[test]
    fn delta_content_is_extracted() {
        let payload = r#"{"choices":[{"index":0,"delta":{"content":"Rank"}}]}"#;
        assert_eq!(decode_delta(payload).unwrap(), Some("Rank".to_string()));

        let role_only = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(decode_delta(role_only).unwrap(), None);

        let error = r#"{"error":{"message":"rate limited"}}"#;
        assert!(matches!(decode_delta(error), Err(RankerError::Transport(_))));
    }

    #[test]
    fn body_ending_without_done_is_a_transport_failure() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Ran\"}}]}\n");
        let (items, done) = decode_batch(events, false);
        assert!(!done);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_deref().ok(), Some("Ran"));

        let (items, done) = decode_batch(decoder.finish(), true);
        assert!(done);
        assert!(matches!(
            items.as_slice(),
            [Err(RankerError::Transport(msg))] if msg.contains("[DONE]")
        ));
    }

    #[test]
    fn done_ends_the_stream_cleanly() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\ndata: [DONE]\n",
        );
        let (items, done) = decode_batch(events, false);
        assert!(done);
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());

        let (items, done) = decode_batch(Vec::new(), false);
        assert!(!done);
        assert!(items.is_empty());
    }

    #[test]
    fn endpoint_joins_api_base() {
        let config = RankerConfig {
            api_base: "http://localhost:8080/v1/".into(),
            ..RankerConfig::default()
        };
        let model = OpenAiChatModel::from_config(&config).unwrap();
        assert_eq!(model.endpoint(), "http://localhost:8080/v1/chat/completions");
    }
}
