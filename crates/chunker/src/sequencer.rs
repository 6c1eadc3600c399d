use crate::error::{ChunkerError, Result};
use faultrank_protocol::EvidenceChunk;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A chunk file discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRef {
    pub chunk_index: u32,
    pub path: PathBuf,
}

impl ChunkRef {
    /// Chunk 0 opens the conversation; every later chunk continues it.
    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.chunk_index == 0
    }
}

/// All chunks of one test, ascending by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestChunks {
    pub test_id: u32,
    pub chunks: Vec<ChunkRef>,
}

impl TestChunks {
    #[must_use]
    pub fn last_index(&self) -> Option<u32> {
        self.chunks.last().map(|chunk| chunk.chunk_index)
    }
}

/// Result of one scan: tests ascending by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkPlan {
    pub tests: Vec<TestChunks>,
}

impl ChunkPlan {
    pub fn iter(&self) -> std::slice::Iter<'_, TestChunks> {
        self.tests.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    #[must_use]
    pub fn total_chunks(&self) -> usize {
        self.tests.iter().map(|test| test.chunks.len()).sum()
    }
}

impl IntoIterator for ChunkPlan {
    type Item = TestChunks;
    type IntoIter = std::vec::IntoIter<TestChunks>;

    fn into_iter(self) -> Self::IntoIter {
        self.tests.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChunkPlan {
    type Item = &'a TestChunks;
    type IntoIter = std::slice::Iter<'a, TestChunks>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Discovers the split chunk files of one (project, bug) directory.
pub struct ChunkSequencer {
    root: PathBuf,
}

impl ChunkSequencer {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the directory and group chunk files by test.
    ///
    /// Scanning is side-effect free, so calling it again yields the same plan
    /// while the directory is unchanged.
    pub fn scan(&self) -> Result<ChunkPlan> {
        if !self.root.is_dir() {
            return Err(ChunkerError::InvalidPath(self.root.clone()));
        }

        let mut grouped: BTreeMap<u32, Vec<ChunkRef>> = BTreeMap::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Failed to read entry under {}: {err}", self.root.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            let Some((test_id, chunk_index)) = parse_chunk_file_name(name) else {
                log::debug!("Skipping non-chunk file {}", entry.path().display());
                continue;
            };
            grouped.entry(test_id).or_default().push(ChunkRef {
                chunk_index,
                path: entry.path().to_path_buf(),
            });
        }

        let tests = grouped
            .into_iter()
            .map(|(test_id, mut chunks)| {
                chunks.sort_by(|a, b| {
                    a.chunk_index
                        .cmp(&b.chunk_index)
                        .then_with(|| a.path.cmp(&b.path))
                });
                TestChunks { test_id, chunks }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Discovered {} test(s) with {} chunk(s) under {}",
            tests.len(),
            tests.iter().map(|t| t.chunks.len()).sum::<usize>(),
            self.root.display()
        );
        Ok(ChunkPlan { tests })
    }
}

/// Parse `<prefix>_<test_id>_<chunk_index>.json`.
#[must_use]
pub fn parse_chunk_file_name(name: &str) -> Option<(u32, u32)> {
    let stem = name.strip_suffix(".json")?;
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 3 {
        return None;
    }
    let test_id = parse_digits(parts[parts.len() - 2])?;
    let chunk_index = parse_digits(parts[parts.len() - 1])?;
    Some((test_id, chunk_index))
}

fn parse_digits(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Canonical file name of a chunk.
#[must_use]
pub fn chunk_file_name(test_id: u32, chunk_index: u32) -> String {
    format!("test_{test_id}_{chunk_index}.json")
}

/// Read one evidence chunk.
pub fn load_chunk(path: &Path) -> Result<EvidenceChunk> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ChunkerError::MissingCoverageArtifact(path.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };
    Ok(serde_json::from_slice(&bytes)?)
}
