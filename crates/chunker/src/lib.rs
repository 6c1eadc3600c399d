//! # Faultrank Chunker
//!
//! Evidence chunks for conversational fault localization.
//!
//! A failing test's coverage table is usually too large for one prompt, so it
//! is split into chunks that each repeat the test header and carry a slice of
//! the covered methods. This crate produces those chunks, rediscovers them on
//! disk in conversation order, and renders them into prompt text.
//!
//! ```text
//! test_<t>.json (full coverage)
//!     │
//!     ├──> ChunkSplitter (token-bounded)
//!     │      └─> test_<t>_0.json, test_<t>_1.json, ...
//!     │
//!     └──> ChunkSequencer
//!            └─> ChunkPlan: tests ascending, chunks ascending
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use faultrank_chunker::{load_chunk, render_evidence, ChunkSequencer};
//!
//! let plan = ChunkSequencer::new("data/RankedDataSplitChat/5/Lang/ochiai/1").scan()?;
//! for test in &plan {
//!     for chunk in &test.chunks {
//!         let evidence = load_chunk(&chunk.path)?;
//!         println!("{}", render_evidence(&evidence));
//!     }
//! }
//! # Ok::<(), faultrank_chunker::ChunkerError>(())
//! ```

mod counter;
mod error;
mod render;
mod sequencer;
mod splitter;

pub use counter::{TokenCounter, TokenEncoding};
pub use error::{ChunkerError, Result};
pub use render::{render_evidence, render_header, render_method};
pub use sequencer::{
    chunk_file_name, load_chunk, parse_chunk_file_name, ChunkPlan, ChunkRef, ChunkSequencer,
    TestChunks,
};
pub use splitter::{test_id_from_path, ChunkSplitter, SplitterConfig};
