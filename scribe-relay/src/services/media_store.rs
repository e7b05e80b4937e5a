//! Media acquisition: download, container normalisation, cleanup
//!
//! The relay treats media handling as a capability: fetch a recording
//! into a scratch directory, normalise the container when the downstream
//! transcription service needs it, and release everything afterwards.
//! Cleanup is best-effort and logged; a leftover scratch file must never
//! fail the processing that produced it.

use async_trait::async_trait;
use futures::StreamExt;
use scribe_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Containers the transcription service accepts as-is
const READY_EXTENSIONS: &[&str] = &["m4a", "mp3", "wav", "flac", "ogg", "mp4"];

/// Media acquisition capability
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Download a recording into the scratch area
    async fn fetch(&self, url: &str, token: Option<&str>) -> Result<PathBuf>;

    /// Normalise the container for downstream consumption
    async fn convert(&self, path: &Path) -> Result<PathBuf>;

    /// Release acquired artifacts, best-effort
    async fn cleanup(&self, paths: &[PathBuf]);
}

/// Scratch-directory media store backed by HTTP download
pub struct LocalMediaStore {
    http_client: reqwest::Client,
    scratch_dir: PathBuf,
}

impl LocalMediaStore {
    pub fn new(scratch_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&scratch_dir)?;

        let http_client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client creation failed: {}", e)))?;

        Ok(Self {
            http_client,
            scratch_dir,
        })
    }

    /// Scratch path for one download, keeping the source extension
    fn scratch_path(&self, url: &str) -> PathBuf {
        let extension = url
            .split('?')
            .next()
            .and_then(|path| path.rsplit('.').next())
            .filter(|ext| ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin");

        self.scratch_dir
            .join(format!("{}.{}", Uuid::new_v4(), extension))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn fetch(&self, url: &str, token: Option<&str>) -> Result<PathBuf> {
        let mut request = self.http_client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Internal(format!(
                "Media download returned {}",
                status
            )));
        }

        let path = self.scratch_path(url);
        match write_body(response, &path).await {
            Ok(bytes) => {
                tracing::info!(path = %path.display(), bytes, "Recording downloaded");
                Ok(path)
            }
            Err(e) => {
                // A partial download is useless; drop it before reporting
                let _ = tokio::fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    async fn convert(&self, path: &Path) -> Result<PathBuf> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if READY_EXTENSIONS.contains(&extension.as_str()) {
            return Ok(path.to_path_buf());
        }

        // Unknown containers go through unchanged; the transcription
        // service rejects what it cannot read and the fallback chain
        // handles that as a strategy failure
        tracing::warn!(
            path = %path.display(),
            extension = %extension,
            "Unrecognised media container, passing through unconverted"
        );
        Ok(path.to_path_buf())
    }

    async fn cleanup(&self, paths: &[PathBuf]) {
        for path in paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Scratch file removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Scratch cleanup failed")
                }
            }
        }
    }
}

/// Stream the response body into `path`, returning the byte count
async fn write_body(response: reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut bytes: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        bytes += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_path_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path().to_path_buf()).unwrap();

        let path = store.scratch_path("https://cdn.example.com/rec/abc123.m4a?token=xyz");
        assert_eq!(path.extension().unwrap(), "m4a");
        assert!(path.starts_with(dir.path()));
    }

    #[test]
    fn test_scratch_path_defaults_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path().to_path_buf()).unwrap();

        let path = store.scratch_path("https://cdn.example.com/rec/abc123");
        assert_eq!(path.extension().unwrap(), "bin");
    }

    #[tokio::test]
    async fn test_convert_passes_ready_containers() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path().to_path_buf()).unwrap();

        let input = dir.path().join("session.m4a");
        let output = store.convert(&input).await.unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn test_cleanup_is_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path().to_path_buf()).unwrap();

        let existing = dir.path().join("a.m4a");
        std::fs::write(&existing, b"x").unwrap();
        let missing = dir.path().join("b.m4a");

        // Missing files do not fail the pass
        store.cleanup(&[existing.clone(), missing]).await;
        assert!(!existing.exists());
    }
}
