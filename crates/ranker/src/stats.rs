use serde::{Deserialize, Serialize};

/// Summary of a ranking run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Bugs whose chunk directory was scanned
    pub bugs: usize,

    /// Tests whose every chunk was attempted
    pub tests_completed: usize,

    /// Tests abandoned after a budget or transport failure
    pub tests_aborted: usize,

    /// Model turns that produced an artifact
    pub chunks_processed: usize,

    /// Chunks that could not be loaded
    pub chunks_skipped: usize,

    /// Rank records extracted across all turns
    pub records_extracted: usize,

    /// Fenced blocks that could not be parsed
    pub blocks_rejected: usize,

    /// Time taken in milliseconds
    pub time_ms: u64,

    /// One line per failure
    pub errors: Vec<String>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_turn(&mut self, records: usize, rejected_blocks: usize) {
        self.chunks_processed += 1;
        self.records_extracted += records;
        self.blocks_rejected += rejected_blocks;
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    /// Fold a worker's stats into this one.
    pub fn merge(&mut self, other: Self) {
        self.bugs += other.bugs;
        self.tests_completed += other.tests_completed;
        self.tests_aborted += other.tests_aborted;
        self.chunks_processed += other.chunks_processed;
        self.chunks_skipped += other.chunks_skipped;
        self.records_extracted += other.records_extracted;
        self.blocks_rejected += other.blocks_rejected;
        self.errors.extend(other.errors);
    }
}
