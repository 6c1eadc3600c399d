use crate::error::{RankerError, Result};
use faultrank_chunker::chunk_file_name;
use faultrank_protocol::{test_file_name, to_json_pretty, CombinedArtifact, TurnArtifact};
use fs2::FileExt;
use std::path::{Path, PathBuf};

/// Where one bug's turn artifacts are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub raw_dir: PathBuf,
    pub final_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(raw_dir: impl Into<PathBuf>, final_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            final_dir: final_dir.into(),
        }
    }

    /// `<raw_dir>/test_<t>_<i>.json`
    #[must_use]
    pub fn chunk_artifact_path(&self, test_id: u32, chunk_index: u32) -> PathBuf {
        self.raw_dir.join(chunk_file_name(test_id, chunk_index))
    }

    /// `<final_dir>/test_<t>.json`
    #[must_use]
    pub fn final_artifact_path(&self, test_id: u32) -> PathBuf {
        self.final_dir.join(test_file_name(test_id))
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    to_json_pretty(value).map_err(|err| RankerError::Other(err.to_string()))
}

/// Overwrite `path` with one artifact (temp file + rename).
pub async fn write_artifact(path: &Path, artifact: &TurnArtifact) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = encode(artifact)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    log::debug!("Saved artifact {}", path.display());
    Ok(())
}

pub async fn read_artifact(path: &Path) -> Result<TurnArtifact> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

struct CombinedLock {
    file: std::fs::File,
}

impl Drop for CombinedLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

async fn acquire_combined_lock(path: &Path) -> Result<CombinedLock> {
    let lock_path = lock_path_for(path);
    tokio::task::spawn_blocking(move || -> Result<CombinedLock> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|err| {
                RankerError::Other(format!("open artifact lock {}: {err}", lock_path.display()))
            })?;
        file.lock_exclusive().map_err(|err| {
            RankerError::Other(format!(
                "acquire artifact lock {}: {err}",
                lock_path.display()
            ))
        })?;
        Ok(CombinedLock { file })
    })
    .await
    .map_err(|err| RankerError::Other(format!("join artifact lock task: {err}")))?
}

/// Read a combined artifact; an absent file is an empty one.
pub async fn read_combined(path: &Path) -> Result<CombinedArtifact> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(CombinedArtifact::default()),
        Err(err) => Err(err.into()),
    }
}

/// Append one artifact to the combined file under an exclusive lock.
///
/// Returns the number of entries after the append. A combined file that
/// cannot be parsed is restarted as an empty list.
pub async fn append_artifact(path: &Path, artifact: &TurnArtifact) -> Result<usize> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let _lock = acquire_combined_lock(path).await?;

    let mut combined = match read_combined(path).await {
        Ok(combined) => combined,
        Err(RankerError::SerializationError(err)) => {
            log::warn!(
                "Combined artifact {} is unreadable ({err}); starting a new list",
                path.display()
            );
            CombinedArtifact::default()
        }
        Err(err) => return Err(err),
    };
    combined.combined_outputs.push(artifact.clone());

    let bytes = encode(&combined)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    log::debug!(
        "Appended artifact to {} ({} entries)",
        path.display(),
        combined.combined_outputs.len()
    );
    Ok(combined.combined_outputs.len())
}
