use std::sync::Arc;

use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::OfflineConfig;
use crate::engine::asset_cache::AssetCacheManager;
use crate::engine::perf::PerformanceMonitor;
use crate::engine::progress::ProgressStore;
use crate::error::Result;
use crate::storage::fs_store::LocalFileStore;
use crate::storage::kv::FileKeyValueStore;
use crate::storage::traits::{FileStore, KeyValueStore};

/// The three offline services, built once at startup and shared by reference.
///
/// The services never call each other; this type only ties their lifetimes together.
#[derive(Clone)]
pub struct OfflineServices {
    pub assets: Arc<AssetCacheManager>,
    pub progress: Arc<ProgressStore>,
    pub perf: Arc<PerformanceMonitor>,
    pub clock: Arc<dyn Clock>,
}

impl OfflineServices {
    /// Build services on the local filesystem described by `config`.
    ///
    /// Does not touch the asset cache yet; call `assets.initialize()` for that.
    pub fn open(config: &OfflineConfig) -> Result<Self> {
        let files = Arc::new(
            LocalFileStore::new(config.bundle_root.clone())
                .with_max_retries(config.download_max_retries),
        );
        let kv = Arc::new(FileKeyValueStore::new(config.storage_dir.clone()));
        Self::with_collaborators(config, files, kv, Arc::new(SystemClock))
    }

    pub fn with_collaborators(
        config: &OfflineConfig,
        files: Arc<dyn FileStore>,
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let assets = AssetCacheManager::new(config, files, kv.clone(), clock.clone())?;
        let progress = ProgressStore::new(kv, clock.clone());
        let perf = PerformanceMonitor::with_clock(config.thresholds, clock.clone());

        info!(
            "offline services ready: cache_dir={} required_assets={}",
            config.cache_dir.display(),
            config.required_assets.len()
        );

        Ok(Self {
            assets: Arc::new(assets),
            progress: Arc::new(progress),
            perf: Arc::new(perf),
            clock,
        })
    }
}
