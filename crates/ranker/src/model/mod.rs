//! Model port: the only place a ranking run talks to a language model.

mod openai;
mod stub;

pub use openai::{OpenAiChatModel, SseDecoder, SseEvent};
pub use stub::{RecordedCall, ScriptedChatModel, ScriptedReply, StubChatModel};

use crate::config::{ModelMode, RankerConfig};
use crate::error::Result;
use async_trait::async_trait;
use faultrank_protocol::{ChatTurn, SessionKey};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the channel carrying reply fragments.
pub const FRAGMENT_BUFFER: usize = 64;

/// Reply fragments in emission order; the channel closes at end of stream.
pub type FragmentStream = mpsc::Receiver<Result<String>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    /// Start one turn. `turns` is the retained history followed by the new
    /// prompt.
    async fn submit(&self, session: &SessionKey, turns: Vec<ChatTurn>) -> Result<FragmentStream>;
}

/// Build the adapter selected by `config.mode`.
pub fn build_model(config: &RankerConfig) -> Result<Arc<dyn ChatModel>> {
    match config.mode {
        ModelMode::OpenAi => Ok(Arc::new(OpenAiChatModel::from_config(config)?)),
        ModelMode::Stub => Ok(Arc::new(StubChatModel::new())),
    }
}
