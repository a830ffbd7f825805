//! Display capture persistence.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Where display captures go.
#[async_trait]
pub trait ScreenshotSink: Send + Sync {
    /// Store `png` under identifier `id`, returning where it landed.
    async fn persist(&self, id: &str, png: &[u8]) -> Result<PathBuf>;
}

/// Writes captures as `<folder>/<id>.png`, creating the folder on first use.
#[derive(Debug, Clone)]
pub struct FsScreenshotSink {
    folder: PathBuf,
}

impl FsScreenshotSink {
    /// Store captures under `folder`.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }
}

#[async_trait]
impl ScreenshotSink for FsScreenshotSink {
    async fn persist(&self, id: &str, png: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.folder)
            .await
            .with_context(|| format!("cannot create {}", self.folder.display()))?;
        let path = self.folder.join(format!("{id}.png"));
        tokio::fs::write(&path, png)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
        debug!(path = %path.display(), bytes = png.len(), "Screenshot saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_creates_folder_and_names_file_after_id() {
        let dir = tempdir().unwrap();
        let sink = FsScreenshotSink::new(dir.path().join("captures"));

        let path = sink.persist("200_0", b"\x89PNG").await.unwrap();
        assert_eq!(path, dir.path().join("captures").join("200_0.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG");
    }

    #[tokio::test]
    async fn test_overwrites_previous_capture() {
        let dir = tempdir().unwrap();
        let sink = FsScreenshotSink::new(dir.path());
        sink.persist("500_1", b"old").await.unwrap();
        let path = sink.persist("500_1", b"new").await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"new");
    }
}
