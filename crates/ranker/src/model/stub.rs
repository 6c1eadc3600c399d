use super::{ChatModel, FragmentStream, FRAGMENT_BUFFER};
use crate::error::{RankerError, Result};
use async_trait::async_trait;
use faultrank_protocol::{to_json_pretty, ChatRole, ChatTurn, RankRecord, SessionKey};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

static METHOD_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Method ID:\n(\d+)").expect("valid method id regex"));

/// Offline model that ranks the method ids it finds in the prompt, in the
/// order they appear.
///
/// Opening turns rank five methods, continuations ten, matching what the
/// prompts ask for.
#[derive(Debug, Default)]
pub struct StubChatModel;

impl StubChatModel {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn reply_for(session: &SessionKey, turns: &[ChatTurn]) -> Result<String> {
        let prompt = turns
            .iter()
            .rev()
            .find(|turn| turn.role == ChatRole::User)
            .map_or("", |turn| turn.content.as_str());
        let top_n = if turns.len() > 1 { 10 } else { 5 };

        let mut ids: Vec<i64> = Vec::new();
        for caps in METHOD_ID_RE.captures_iter(prompt) {
            let Ok(id) = caps[1].parse::<i64>() else {
                continue;
            };
            if !ids.contains(&id) {
                ids.push(id);
            }
            if ids.len() == top_n {
                break;
            }
        }

        let records: Vec<RankRecord> = ids
            .into_iter()
            .zip(1..)
            .map(|(method_id, rank)| RankRecord { method_id, rank })
            .collect();
        let block = to_json_pretty(&records).map_err(|err| RankerError::Other(err.to_string()))?;
        Ok(format!(
            "Ranking for {session}:\n\n```json\n{}\n```\n",
            String::from_utf8_lossy(&block)
        ))
    }
}

#[async_trait]
impl ChatModel for StubChatModel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn submit(&self, session: &SessionKey, turns: Vec<ChatTurn>) -> Result<FragmentStream> {
        let reply = Self::reply_for(session, &turns)?;
        Ok(spawn_fragments(
            reply.split_inclusive('\n').map(str::to_string).collect(),
            None,
        ))
    }
}

/// One scripted model turn.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Whole reply as a single fragment
    Text(String),
    /// Reply delivered fragment by fragment
    Fragments(Vec<String>),
    /// Call is refused before streaming starts
    Fail(String),
    /// Some fragments arrive, then the stream breaks
    FailAfter(Vec<String>, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub session: SessionKey,
    pub turns: Vec<ChatTurn>,
}

/// Model that replays a fixed script and records every call it receives.
///
/// Calls beyond the end of the script fail with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedChatModel {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, session: &SessionKey, turns: Vec<ChatTurn>) -> Result<FragmentStream> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                session: session.clone(),
                turns,
            });
        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match next {
            None => Err(RankerError::transport("script exhausted")),
            Some(ScriptedReply::Fail(message)) => Err(RankerError::transport(message)),
            Some(ScriptedReply::Text(text)) => Ok(spawn_fragments(vec![text], None)),
            Some(ScriptedReply::Fragments(fragments)) => Ok(spawn_fragments(fragments, None)),
            Some(ScriptedReply::FailAfter(fragments, message)) => {
                Ok(spawn_fragments(fragments, Some(message)))
            }
        }
    }
}

fn spawn_fragments(fragments: Vec<String>, failure: Option<String>) -> FragmentStream {
    let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
    tokio::spawn(async move {
        for fragment in fragments {
            if tx.send(Ok(fragment)).await.is_err() {
                return;
            }
        }
        if let Some(message) = failure {
            let _ = tx.send(Err(RankerError::transport(message))).await;
        }
    });
    rx
}
