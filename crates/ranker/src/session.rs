use faultrank_protocol::{ChatTurn, SessionKey};
use std::collections::HashMap;

/// Turns kept after every exchange: the latest prompt and its reply.
pub const HISTORY_WINDOW: usize = 2;

/// Bounded conversational history of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionHistory {
    turns: Vec<ChatTurn>,
}

impl SessionHistory {
    #[must_use]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn push_exchange(&mut self, user: &str, reply: &str) {
        self.turns.push(ChatTurn::user(user));
        self.turns.push(ChatTurn::assistant(reply));
        if self.turns.len() > HISTORY_WINDOW {
            let excess = self.turns.len() - HISTORY_WINDOW;
            self.turns.drain(..excess);
        }
    }
}

/// Sessions owned by one worker, keyed by (project, bug, test).
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionKey, SessionHistory>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, key: &SessionKey) -> &SessionHistory {
        self.sessions.entry(key.clone()).or_default()
    }

    pub fn record_exchange(&mut self, key: &SessionKey, user: &str, reply: &str) {
        self.sessions
            .entry(key.clone())
            .or_default()
            .push_exchange(user, reply);
    }

    pub fn close(&mut self, key: &SessionKey) -> Option<SessionHistory> {
        self.sessions.remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
