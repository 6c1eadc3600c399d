use crate::error::Result;
use faultrank_protocol::SessionKey;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

/// Append-only log of aborted tests.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, key: &SessionKey, message: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let line = format_entry(unix_ms(), key, message);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// `<unix_ms> project=<p> bug=<b> test=<t> - <message>\n`
#[must_use]
pub fn format_entry(unix_ms: u64, key: &SessionKey, message: &str) -> String {
    let message = message.replace('\n', " ");
    format!(
        "{unix_ms} project={} bug={} test={} - {message}\n",
        key.project, key.bug_id, key.test_id
    )
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
