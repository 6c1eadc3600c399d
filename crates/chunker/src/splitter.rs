use crate::counter::{TokenCounter, TokenEncoding};
use crate::error::{ChunkerError, Result};
use crate::render::{render_header, render_method};
use crate::sequencer::{chunk_file_name, parse_chunk_file_name};
use faultrank_protocol::{to_json_pretty, EvidenceChunk};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for splitting per-test coverage into chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Token ceiling for one rendered chunk (soft: an oversized single method
    /// still gets its own chunk)
    pub max_chunk_tokens: usize,

    /// Encoding used to measure chunks
    pub encoding: TokenEncoding,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 30_000,
            encoding: TokenEncoding::Cl100k,
        }
    }
}

impl SplitterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_tokens == 0 {
            return Err(ChunkerError::invalid_config("max_chunk_tokens must be > 0"));
        }
        Ok(())
    }
}

/// Splits one test's coverage table into ordered evidence chunks.
///
/// Every chunk repeats the test header; covered methods are packed greedily
/// in their original order.
pub struct ChunkSplitter {
    config: SplitterConfig,
    counter: TokenCounter,
}

impl ChunkSplitter {
    pub fn new(config: SplitterConfig) -> Result<Self> {
        config.validate()?;
        let counter = TokenCounter::new(config.encoding);
        Ok(Self { config, counter })
    }

    pub fn split(&self, coverage: &EvidenceChunk) -> Vec<EvidenceChunk> {
        let header_tokens = self.counter.count_or_approximate(&render_header(coverage));
        let empty = || EvidenceChunk {
            covered_methods: Vec::new(),
            ..coverage.clone()
        };

        let mut chunks = Vec::new();
        let mut current = empty();
        let mut used = header_tokens;

        for method in &coverage.covered_methods {
            let cost = self.counter.count_or_approximate(&render_method(method));
            if !current.covered_methods.is_empty() && used + cost > self.config.max_chunk_tokens {
                chunks.push(std::mem::replace(&mut current, empty()));
                used = header_tokens;
            }
            if header_tokens + cost > self.config.max_chunk_tokens {
                log::warn!(
                    "Method {} alone needs {} tokens (limit {})",
                    method.method_signature,
                    header_tokens + cost,
                    self.config.max_chunk_tokens
                );
            }
            current.covered_methods.push(method.clone());
            used += cost;
        }

        if !current.covered_methods.is_empty() || chunks.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    /// Split `input` (a `test_<id>.json` coverage file) into
    /// `out_dir/test_<id>_<i>.json`. Returns the written paths.
    pub fn split_file(&self, input: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let test_id = test_id_from_path(input).ok_or_else(|| {
            ChunkerError::invalid_config(format!(
                "cannot derive test id from {}",
                input.display()
            ))
        })?;
        let bytes = std::fs::read(input)?;
        let coverage: EvidenceChunk = serde_json::from_slice(&bytes)?;

        std::fs::create_dir_all(out_dir)?;
        let removed = remove_stale_chunks(out_dir, test_id)?;
        if removed > 0 {
            log::debug!("Removed {removed} previous chunk(s) of test {test_id}");
        }
        let mut written = Vec::new();
        for (index, chunk) in self.split(&coverage).iter().enumerate() {
            let index = u32::try_from(index)
                .map_err(|_| ChunkerError::invalid_config("too many chunks for one test"))?;
            let path = out_dir.join(chunk_file_name(test_id, index));
            let data = to_json_pretty(chunk)
                .map_err(|err| ChunkerError::invalid_config(err.to_string()))?;
            std::fs::write(&path, data)?;
            written.push(path);
        }
        log::debug!("Split {} into {} chunk(s)", input.display(), written.len());
        Ok(written)
    }
}

/// Delete every `test_<test_id>_<i>.json` directly under `dir`.
fn remove_stale_chunks(dir: &Path, test_id: u32) -> Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if matches!(parse_chunk_file_name(name), Some((id, _)) if id == test_id) {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// `test_<id>.json` → `id`
#[must_use]
pub fn test_id_from_path(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit('_').next()?.parse().ok()
}
