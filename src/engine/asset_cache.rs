// Offline asset cache — keeps the required asset set on-device and refreshes stale copies.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{OfflineConfig, RequiredAsset, ASSET_CACHE_KEY};
use crate::error::{EngineError, Result};
use crate::storage::traits::{FileStore, KeyValueStore};

/// One entry of the cache index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedAssetRecord {
    pub logical_name: String,
    pub local_path: PathBuf,
    pub cached_at_epoch_ms: i64,
    pub size_bytes: u64,
}

/// Logical name -> record. Persisted as a single JSON object under [`ASSET_CACHE_KEY`].
pub type CacheIndex = BTreeMap<String, CachedAssetRecord>;

struct CacheState {
    index: CacheIndex,
    /// Whether `index` reflects storage. Until then the persisted blob is read on initialize.
    loaded: bool,
}

/// Clears the in-flight flag and wakes waiters however the run ends.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
    done: &'a Notify,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.done.notify_waiters();
    }
}

pub struct AssetCacheManager {
    files: Arc<dyn FileStore>,
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    cache_dir: PathBuf,
    ttl_ms: i64,
    required: Vec<RequiredAsset>,
    state: RwLock<CacheState>,
    initializing: AtomicBool,
    init_done: Notify,
}

impl AssetCacheManager {
    pub fn new(
        config: &OfflineConfig,
        files: Arc<dyn FileStore>,
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let ttl_ms = i64::try_from(config.asset_ttl().as_millis())
            .map_err(|_| EngineError::Config("asset_ttl_secs is too large".into()))?;

        Ok(Self {
            files,
            kv,
            clock,
            cache_dir: config.cache_dir.clone(),
            ttl_ms,
            required: config.required_assets.clone(),
            state: RwLock::new(CacheState {
                index: CacheIndex::new(),
                loaded: false,
            }),
            initializing: AtomicBool::new(false),
            init_done: Notify::new(),
        })
    }

    /// Make every required asset available locally, refreshing entries older than the TTL.
    ///
    /// A failed refresh of an asset that already has a cached copy keeps serving
    /// that copy. An asset with no copy at all fails the whole call, after the
    /// remaining assets have been processed.
    ///
    /// If a run is already in flight this call issues no downloads: it waits for
    /// that run and succeeds iff every required asset ended up cached.
    pub async fn initialize(&self) -> Result<()> {
        let notified = self.init_done.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a run finishing in between still wakes us.
        notified.as_mut().enable();

        if self
            .initializing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("asset cache initialization already in flight, waiting");
            notified.await;
            return self.ensure_required_present();
        }

        let _guard = InFlightGuard {
            flag: &self.initializing,
            done: &self.init_done,
        };
        self.run_initialize().await
    }

    async fn run_initialize(&self) -> Result<()> {
        self.files
            .ensure_directory(&self.cache_dir)
            .await
            .map_err(|e| {
                EngineError::init(format!(
                    "cannot create cache directory {}: {}",
                    self.cache_dir.display(),
                    e
                ))
            })?;

        let needs_load = !self.state.read().loaded;
        if needs_load {
            let index = self.load_index().await?;
            debug!("loaded cache index with {} entries", index.len());
            let mut state = self.state.write();
            state.index = index;
            state.loaded = true;
        }

        let mut unavailable: Vec<EngineError> = Vec::new();
        for asset in &self.required {
            if let Err(e) = self.ensure_asset(asset).await {
                unavailable.push(e);
            }
        }

        if unavailable.is_empty() {
            info!(
                "offline cache ready: {} assets, {} bytes",
                self.required.len(),
                self.get_cache_size()
            );
            return Ok(());
        }

        let names = unavailable
            .iter()
            .map(std::string::ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(EngineError::Initialization {
            reason: format!("required assets unavailable: {}", names),
            source: Some(Box::new(unavailable.swap_remove(0))),
        })
    }

    async fn load_index(&self) -> Result<CacheIndex> {
        let raw = self
            .kv
            .get(ASSET_CACHE_KEY)
            .await
            .map_err(|e| EngineError::init(format!("cannot read cache index: {}", e)))?;
        match raw {
            None => Ok(CacheIndex::new()),
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| EngineError::init(format!("corrupt cache index: {}", e))),
        }
    }

    async fn ensure_asset(&self, asset: &RequiredAsset) -> Result<()> {
        let name = asset.logical_name.as_str();
        let cached = self.state.read().index.get(name).cloned();
        let cached = match cached {
            Some(record) => self.verify_on_disk(record).await,
            None => None,
        };

        if let Some(record) = &cached {
            let age_ms = self.clock.now_epoch_ms() - record.cached_at_epoch_ms;
            if age_ms <= self.ttl_ms {
                debug!("asset {} fresh (age {}ms)", name, age_ms);
                return Ok(());
            }
            debug!("asset {} stale (age {}ms), refreshing", name, age_ms);
        }

        let target = self.cache_dir.join(name);
        match self.fetch(asset, &target).await {
            Ok(record) => {
                info!(
                    "cached asset {} ({} bytes) at {}",
                    name,
                    record.size_bytes,
                    record.local_path.display()
                );
                self.state.write().index.insert(name.to_string(), record);
                self.persist_index().await;
                Ok(())
            }
            Err(e) => match cached {
                Some(record) => {
                    warn!(
                        "serving stale asset {} cached at {}: refresh failed: {}",
                        name, record.cached_at_epoch_ms, e
                    );
                    Ok(())
                }
                None => {
                    warn!("error caching asset {}: {}", name, e);
                    Err(EngineError::AssetUnavailable(name.to_string()))
                }
            },
        }
    }

    /// Drop a record whose file has disappeared so it is fetched again.
    async fn verify_on_disk(&self, record: CachedAssetRecord) -> Option<CachedAssetRecord> {
        match self.files.stat(&record.local_path).await {
            Ok(stat) if stat.exists => Some(record),
            Ok(_) => {
                warn!(
                    "cached asset {} missing at {}, discarding record",
                    record.logical_name,
                    record.local_path.display()
                );
                self.state.write().index.remove(&record.logical_name);
                None
            }
            Err(e) => {
                debug!("stat {} failed: {}", record.local_path.display(), e);
                Some(record)
            }
        }
    }

    async fn fetch(&self, asset: &RequiredAsset, target: &Path) -> anyhow::Result<CachedAssetRecord> {
        self.files.download(&asset.source_uri, target).await?;
        let stat = self.files.stat(target).await?;
        if !stat.exists {
            anyhow::bail!("download reported success but {} is missing", target.display());
        }
        Ok(CachedAssetRecord {
            logical_name: asset.logical_name.clone(),
            local_path: target.to_path_buf(),
            cached_at_epoch_ms: self.clock.now_epoch_ms(),
            size_bytes: stat.size_bytes,
        })
    }

    /// Rewrite the whole index. A failed write is logged; memory stays authoritative.
    async fn persist_index(&self) {
        let serialized = {
            let state = self.state.read();
            serde_json::to_string(&state.index)
        };
        let result = match serialized {
            Ok(json) => self.kv.set(ASSET_CACHE_KEY, &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            let err = EngineError::PersistenceWrite {
                key: ASSET_CACHE_KEY.to_string(),
                reason: e.to_string(),
            };
            warn!("{}", err);
        }
    }

    fn ensure_required_present(&self) -> Result<()> {
        let state = self.state.read();
        let missing: Vec<&str> = self
            .required
            .iter()
            .map(|a| a.logical_name.as_str())
            .filter(|name| !state.index.contains_key(*name))
            .collect();
        match missing.first() {
            None => Ok(()),
            Some(first) => Err(EngineError::Initialization {
                reason: format!("required assets unavailable: {}", missing.join(", ")),
                source: Some(Box::new(EngineError::AssetUnavailable(first.to_string()))),
            }),
        }
    }

    /// Local path of a cached asset.
    pub fn get_asset_path(&self, logical_name: &str) -> Result<PathBuf> {
        self.state
            .read()
            .index
            .get(logical_name)
            .map(|record| record.local_path.clone())
            .ok_or_else(|| EngineError::AssetUnavailable(logical_name.to_string()))
    }

    /// Delete every cached file and the persisted index, then re-run initialization.
    ///
    /// Waits for an in-flight [`Self::initialize`] to finish first, and holds the
    /// in-flight slot itself while clearing and re-caching. An `initialize` that
    /// arrives meanwhile waits for this run instead of starting its own.
    pub async fn clear_cache(&self) -> Result<()> {
        let _guard = self.claim_run().await;

        self.files
            .delete_recursive(&self.cache_dir)
            .await
            .map_err(|e| {
                EngineError::init(format!(
                    "cannot delete cache directory {}: {}",
                    self.cache_dir.display(),
                    e
                ))
            })?;

        if let Err(e) = self.kv.remove(ASSET_CACHE_KEY).await {
            warn!("failed to remove persisted cache index: {}", e);
        }

        {
            let mut state = self.state.write();
            state.index.clear();
            // The emptied in-memory index is authoritative even if the remove above failed.
            state.loaded = true;
        }
        info!("offline cache cleared");

        self.run_initialize().await
    }

    /// Take the in-flight slot, waiting out any run that holds it.
    async fn claim_run(&self) -> InFlightGuard<'_> {
        loop {
            let notified = self.init_done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self
                .initializing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return InFlightGuard {
                    flag: &self.initializing,
                    done: &self.init_done,
                };
            }
            debug!("asset cache run in flight, waiting before clearing");
            notified.await;
        }
    }

    /// Sum of recorded sizes. Does not touch the filesystem.
    pub fn get_cache_size(&self) -> u64 {
        self.state
            .read()
            .index
            .values()
            .map(|record| record.size_bytes)
            .sum()
    }

    pub fn is_cached(&self, logical_name: &str) -> bool {
        self.state.read().index.contains_key(logical_name)
    }

    pub fn cached_assets(&self) -> Vec<CachedAssetRecord> {
        self.state.read().index.values().cloned().collect()
    }

    pub fn required_assets(&self) -> &[RequiredAsset] {
        &self.required
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}
