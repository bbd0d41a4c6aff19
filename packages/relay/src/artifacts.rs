//! Scratch downloads for the item pipeline.
//!
//! Each downloaded asset lives in a named temp file that is removed when its
//! `ScratchFile` is dropped, so every exit path of a pipeline (success, abort,
//! panic unwinding) cleans up after itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{RelayError, Result};
use crate::traits::ArtifactFetcher;

/// A local file removed on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: TempPath,
    len: u64,
}

impl ScratchFile {
    /// Wrap an existing temp path.
    pub fn new(path: TempPath, len: u64) -> Self {
        Self { path, len }
    }

    /// Create an empty scratch file in `dir` (the system temp dir when `None`).
    pub fn create(dir: Option<&Path>, prefix: &str, extension: &str) -> Result<(std::fs::File, TempPath)> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(extension);
        let named = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(named.into_parts())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<Path> for ScratchFile {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

/// Downloads assets over HTTP into scratch files.
pub struct HttpArtifactFetcher {
    client: reqwest::Client,
    scratch_dir: Option<PathBuf>,
    timeout: Duration,
}

impl HttpArtifactFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            scratch_dir: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Put scratch files in `dir` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(&self, url: &str, prefix: &str, extension: &str) -> Result<ScratchFile> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RelayError::Network(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = %status, "Asset download rejected");
            return Err(RelayError::Network(
                format!("GET {} returned {}", url, status).into(),
            ));
        }

        let (file, path) = ScratchFile::create(self.scratch_dir.as_deref(), prefix, extension)?;
        let mut file = tokio::fs::File::from_std(file);

        // `path` is dropped (and the file removed) if anything below fails.
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RelayError::Network(Box::new(e)))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(url, bytes = written, path = %path.display(), "Asset downloaded");
        Ok(ScratchFile::new(path, written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let (mut file, path) = ScratchFile::create(Some(dir.path()), "thumb-", ".jpg").unwrap();
        file.write_all(b"jpeg bytes").unwrap();

        let scratch = ScratchFile::new(path, 10);
        let location = scratch.path().to_path_buf();
        assert!(location.exists());
        assert!(location.file_name().unwrap().to_str().unwrap().starts_with("thumb-"));
        assert_eq!(location.extension().unwrap(), "jpg");
        assert_eq!(scratch.len(), 10);

        drop(scratch);
        assert!(!location.exists());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_is_network_error() {
        let fetcher = HttpArtifactFetcher::new(reqwest::Client::new())
            .with_timeout(Duration::from_secs(2));

        let err = fetcher
            .fetch("http://127.0.0.1:9/nothing.jpg", "image-", ".jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Network(_)));
    }
}
