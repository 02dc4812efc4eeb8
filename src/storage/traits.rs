use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

/// Result of a `stat` call. A missing file reports `exists = false`, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    pub exists: bool,
    pub size_bytes: u64,
}

/// Opaque string-keyed durable storage. Values are JSON documents.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a key that does not exist succeeds.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Byte-addressed on-device file storage.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Create `path` and any missing parents.
    async fn ensure_directory(&self, path: &Path) -> Result<()>;
    /// Fetch `source_uri` into `destination`. On failure the previous content of
    /// `destination`, if any, must be left untouched.
    async fn download(&self, source_uri: &str, destination: &Path) -> Result<()>;
    async fn stat(&self, path: &Path) -> Result<FileStat>;
    /// Remove a file or directory tree; a missing path is not an error.
    async fn delete_recursive(&self, path: &Path) -> Result<()>;
}
