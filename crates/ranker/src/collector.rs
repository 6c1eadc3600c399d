use crate::error::Result;
use crate::model::ChatModel;
use crate::session::SessionRegistry;
use faultrank_protocol::{ChatTurn, SessionKey};
use std::sync::Arc;

/// Callback invoked with every fragment as it arrives.
pub type FragmentObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Runs one model turn and accumulates its streamed reply.
#[derive(Clone)]
pub struct ResponseCollector {
    model: Arc<dyn ChatModel>,
    observer: Option<FragmentObserver>,
}

impl ResponseCollector {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: FragmentObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Send history plus `prompt`, drain the stream, and record the exchange.
    ///
    /// History is only updated once the stream has ended cleanly; a failed
    /// turn leaves the session as it was.
    pub async fn run_turn(
        &self,
        registry: &mut SessionRegistry,
        key: &SessionKey,
        prompt: &str,
    ) -> Result<String> {
        let mut turns = registry.get_or_create(key).turns().to_vec();
        turns.push(ChatTurn::user(prompt));

        let mut stream = self.model.submit(key, turns).await?;
        let mut reply = String::new();
        while let Some(fragment) = stream.recv().await {
            let fragment = fragment?;
            if let Some(observer) = &self.observer {
                observer(&fragment);
            }
            reply.push_str(&fragment);
        }

        log::debug!("{key}: received {} bytes from {}", reply.len(), self.model.name());
        registry.record_exchange(key, prompt, &reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScriptedChatModel, ScriptedReply};
    use crate::session::HISTORY_WINDOW;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[tokio::test]
    async fn fragments_are_joined_in_order_and_history_is_trimmed() {
        let model = Arc::new(ScriptedChatModel::new([
            ScriptedReply::Fragments(vec!["one ".into(), "two".into()]),
            ScriptedReply::Text("three".into()),
        ]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let collector = ResponseCollector::new(model.clone()).with_observer(Arc::new(
            move |fragment: &str| sink.lock().unwrap().push(fragment.to_string()),
        ));
        let mut registry = SessionRegistry::new();
        let key = SessionKey::new("Lang", "1", 0);

        let first = collector.run_turn(&mut registry, &key, "p0").await.unwrap();
        assert_eq!(first, "one two");
        let second = collector.run_turn(&mut registry, &key, "p1").await.unwrap();
        assert_eq!(second, "three");

        assert_eq!(*seen.lock().unwrap(), vec!["one ", "two", "three"]);
        let history = registry.get_or_create(&key);
        assert_eq!(history.len(), HISTORY_WINDOW);
        assert_eq!(history.turns()[0].content, "p1");

        // The second call saw the first exchange followed by its own prompt.
        let calls = model.calls();
        let contents: Vec<&str> = calls[1].turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["p0", "one two", "p1"]);
    }

    #[tokio::test]
    async fn failed_turn_leaves_history_untouched() {
        let model = Arc::new(ScriptedChatModel::new([
            ScriptedReply::Text("ok".into()),
            ScriptedReply::FailAfter(vec!["half".into()], "reset".into()),
        ]));
        let collector = ResponseCollector::new(model);
        let mut registry = SessionRegistry::new();
        let key = SessionKey::new("Lang", "1", 0);

        collector.run_turn(&mut registry, &key, "p0").await.unwrap();
        let before = registry.get_or_create(&key).clone();
        assert!(collector.run_turn(&mut registry, &key, "p1").await.is_err());
        assert_eq!(registry.get_or_create(&key), &before);
    }
}
