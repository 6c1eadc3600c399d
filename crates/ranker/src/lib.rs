//! # Faultrank Ranker
//!
//! Chunked conversational ranking of suspicious methods.
//!
//! For every failing test of a bug, the evidence chunks are fed to a chat
//! model one turn at a time. Each turn sees only the previous exchange, so
//! the model refines its earlier ranking without the context growing past
//! one chunk plus one reply.
//!
//! ```text
//! ChunkSequencer ──> PromptBuilder ──> BudgetGuard
//!                                          │
//!                       SessionRegistry <──┤
//!                                          ▼
//!                               ResponseCollector (ChatModel stream)
//!                                          │
//!                                          ▼
//!                         extract_answer ──> artifacts (per chunk, final,
//!                                                       combined)
//! ```
//!
//! Budget and transport failures end the current test only; they are logged
//! with the session identity and the run moves on to the next test.

mod artifact;
mod budget;
mod collector;
mod config;
mod errlog;
mod error;
mod extract;
mod model;
mod pipeline;
mod prompt;
mod session;
mod stats;

pub use artifact::{
    append_artifact, read_artifact, read_combined, write_artifact, OutputLayout,
};
pub use budget::{BudgetGuard, DEFAULT_INPUT_CEILING};
pub use collector::{FragmentObserver, ResponseCollector};
pub use config::{
    ModelMode, RankerConfig, DEFAULT_API_BASE, DEFAULT_MODEL, ENV_API_BASE, ENV_API_KEY,
    ENV_INPUT_CEILING, ENV_MODEL, ENV_MODEL_MODE,
};
pub use errlog::{format_entry, ErrorLog};
pub use error::{RankerError, Result};
pub use extract::{
    collapse_doubled_braces, extract_answer, quote_bare_keys, BlockOutcome, Extraction,
    NormalizationPass, NORMALIZATION_PASSES,
};
pub use model::{
    build_model, ChatModel, FragmentStream, OpenAiChatModel, RecordedCall, ScriptedChatModel,
    ScriptedReply, SseDecoder, SseEvent, StubChatModel, FRAGMENT_BUFFER,
};
pub use pipeline::{BugTarget, Ranker};
pub use prompt::{ChunkFraming, PromptBuilder, RenderedPrompt, OUTPUT_FORMAT};
pub use session::{SessionHistory, SessionRegistry, HISTORY_WINDOW};
pub use stats::RunStats;
