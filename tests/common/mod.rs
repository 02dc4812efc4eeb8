// Shared test doubles for the storage seams.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use ar_offline_engine::storage::traits::{FileStat, FileStore, KeyValueStore};

/// In-memory file store. Sources are registered by URI with a byte size.
#[derive(Default)]
pub struct FakeFileStore {
    sources: Mutex<HashMap<String, u64>>,
    failing: Mutex<HashSet<String>>,
    files: Mutex<HashMap<PathBuf, u64>>,
    downloads: AtomicUsize,
    download_delay: Mutex<Option<Duration>>,
    fail_directories: AtomicBool,
}

impl FakeFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&self, uri: &str, size: u64) {
        self.sources.lock().insert(uri.to_string(), size);
    }

    pub fn set_failing(&self, uri: &str, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(uri.to_string());
        } else {
            set.remove(uri);
        }
    }

    pub fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.lock() = Some(delay);
    }

    pub fn fail_directories(&self) {
        self.fail_directories.store(true, Ordering::SeqCst);
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn file_exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    pub fn remove_file(&self, path: &Path) {
        self.files.lock().remove(path);
    }
}

#[async_trait]
impl FileStore for FakeFileStore {
    async fn ensure_directory(&self, path: &Path) -> Result<()> {
        if self.fail_directories.load(Ordering::SeqCst) {
            return Err(anyhow!("read-only filesystem: {}", path.display()));
        }
        Ok(())
    }

    async fn download(&self, source_uri: &str, destination: &Path) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.download_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(source_uri) {
            return Err(anyhow!("network unreachable: {}", source_uri));
        }
        let size = self
            .sources
            .lock()
            .get(source_uri)
            .copied()
            .ok_or_else(|| anyhow!("404: {}", source_uri))?;
        self.files.lock().insert(destination.to_path_buf(), size);
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        Ok(match self.files.lock().get(path) {
            Some(size) => FileStat {
                exists: true,
                size_bytes: *size,
            },
            None => FileStat::default(),
        })
    }

    async fn delete_recursive(&self, path: &Path) -> Result<()> {
        self.files.lock().retain(|p, _| !p.starts_with(path));
        Ok(())
    }
}

/// Key-value store whose reads or writes can be switched off.
#[derive(Default)]
pub struct FlakyKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
    reject_reads: AtomicBool,
    reject_writes: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_reads(&self, reject: bool) {
        self.reject_reads.store(reject, Ordering::SeqCst);
    }

    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn put_raw(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl KeyValueStore for FlakyKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.reject_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("storage busy"));
        }
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("storage full"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("storage full"));
        }
        self.entries.lock().remove(key);
        Ok(())
    }
}
