use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::traits::{FileStat, FileStore};
use crate::config::{DEFAULT_DOWNLOAD_MAX_RETRIES, DOWNLOAD_RETRY_BACKOFF_MS};

/// Where a source URI points.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceLocation {
    Remote(String),
    Bundled(PathBuf),
    Local(PathBuf),
}

/// `tokio::fs` backed file store that can pull assets from HTTP, the app bundle
/// or another local path.
pub struct LocalFileStore {
    client: Client,
    bundle_root: Option<PathBuf>,
    max_retries: u32,
}

impl LocalFileStore {
    pub fn new(bundle_root: Option<PathBuf>) -> Self {
        Self {
            client: Client::new(),
            bundle_root,
            max_retries: DEFAULT_DOWNLOAD_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn resolve(&self, source_uri: &str) -> Result<SourceLocation> {
        if source_uri.starts_with("http://") || source_uri.starts_with("https://") {
            return Ok(SourceLocation::Remote(source_uri.to_string()));
        }
        if let Some(rel) = source_uri.strip_prefix("bundle://") {
            let root = self
                .bundle_root
                .as_ref()
                .ok_or_else(|| anyhow!("no bundle root configured for {}", source_uri))?;
            let rel = Path::new(rel);
            if rel.is_absolute() || rel.components().any(|c| c.as_os_str() == "..") {
                return Err(anyhow!("bundle path escapes bundle root: {}", source_uri));
            }
            return Ok(SourceLocation::Bundled(root.join(rel)));
        }
        let path = source_uri.strip_prefix("file://").unwrap_or(source_uri);
        Ok(SourceLocation::Local(PathBuf::from(path)))
    }

    /// Stream the response body into `staged`, chunk by chunk.
    async fn fetch_remote(&self, url: &str, staged: &Path) -> Result<u64> {
        let mut resp = self.client.get(url).send().await?;

        let status = resp.status();
        debug!("asset fetch status={} url={}", status.as_u16(), url);
        if !status.is_success() {
            warn!("asset fetch failed status={} url={}", status.as_u16(), url);
            return Err(anyhow!("download failed: HTTP {}", status.as_u16()));
        }

        let mut file = tokio::fs::File::create(staged)
            .await
            .with_context(|| format!("create {}", staged.display()))?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("write {}", staged.display()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .with_context(|| format!("flush {}", staged.display()))?;
        Ok(written)
    }

    async fn fetch_once(&self, location: &SourceLocation, staged: &Path) -> Result<u64> {
        match location {
            SourceLocation::Remote(url) => self.fetch_remote(url, staged).await,
            SourceLocation::Bundled(path) | SourceLocation::Local(path) => {
                tokio::fs::copy(path, staged)
                    .await
                    .with_context(|| format!("copy {}", path.display()))
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        source_uri: &str,
        location: &SourceLocation,
        staged: &Path,
    ) -> Result<u64> {
        let mut attempt = 0u32;
        loop {
            match self.fetch_once(location, staged).await {
                Ok(written) => return Ok(written),
                Err(e) if attempt < self.max_retries => {
                    warn!(
                        "fetch {} failed (attempt {}): {}",
                        source_uri, attempt, e
                    );
                    tokio::time::sleep(Duration::from_millis(
                        DOWNLOAD_RETRY_BACKOFF_MS * (attempt as u64 + 1),
                    ))
                    .await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        "fetch {} failed after {} retries: {}",
                        source_uri, self.max_retries, e
                    );
                    return Err(e);
                }
            }
        }
    }
}

/// `<destination>.part`, next to the destination so the rename stays on one filesystem.
fn staging_path(destination: &Path) -> PathBuf {
    let mut staged = destination.as_os_str().to_owned();
    staged.push(".part");
    PathBuf::from(staged)
}

async fn discard_staged(staged: &Path) {
    if let Err(e) = tokio::fs::remove_file(staged).await {
        if e.kind() != ErrorKind::NotFound {
            debug!("leaving {} behind: {}", staged.display(), e);
        }
    }
}

impl Default for LocalFileStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn ensure_directory(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("create {}", path.display()))
    }

    async fn download(&self, source_uri: &str, destination: &Path) -> Result<()> {
        let location = self.resolve(source_uri)?;
        let staged = staging_path(destination);

        let written = match self.fetch_with_retry(source_uri, &location, &staged).await {
            Ok(written) => written,
            Err(e) => {
                discard_staged(&staged).await;
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&staged, destination).await {
            discard_staged(&staged).await;
            return Err(e).with_context(|| format!("rename into {}", destination.display()));
        }

        debug!(
            "downloaded {} -> {} ({} bytes)",
            source_uri,
            destination.display(),
            written
        );
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(FileStat {
                exists: true,
                size_bytes: meta.len(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(FileStat::default()),
            Err(e) => Err(e).with_context(|| format!("stat {}", path.display())),
        }
    }

    async fn delete_recursive(&self, path: &Path) -> Result<()> {
        let meta = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("stat {}", path.display())),
        };
        let result = if meta.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("delete {}", path.display())),
        }
    }
}
