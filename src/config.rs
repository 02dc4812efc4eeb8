use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::{EngineError, Result};

/// Storage key holding the serialized asset cache index.
pub const ASSET_CACHE_KEY: &str = "offline_assets_cache";

/// Storage key holding the serialized construction progress collection.
pub const PROGRESS_KEY: &str = "construction_progress";

/// Maximum age of a cached asset before a refresh is attempted (7 days).
pub const DEFAULT_ASSET_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Number of extra download attempts after the first failure.
pub const DEFAULT_DOWNLOAD_MAX_RETRIES: u32 = 2;

/// Base delay between download attempts; multiplied by the attempt number.
pub const DOWNLOAD_RETRY_BACKOFF_MS: u64 = 500;

/// Log filter used when neither `RUST_LOG` nor [`OfflineConfig::log_filter`] is set.
pub const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,reqwest=warn";

/// An asset that must always be available on-device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequiredAsset {
    /// Stable cache index key; also used as the file name inside the cache directory.
    pub logical_name: String,
    /// `http(s)://`, `bundle://` or `file://` URI (a bare path is treated as a file).
    pub source_uri: String,
}

impl RequiredAsset {
    pub fn new(logical_name: impl Into<String>, source_uri: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            source_uri: source_uri.into(),
        }
    }
}

/// Per-category duration thresholds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricThresholds {
    pub model_loading_ms: u64,
    pub ar_initialization_ms: u64,
    pub rendering_ms: u64,
}

impl Default for MetricThresholds {
    fn default() -> Self {
        Self {
            model_loading_ms: 3000,
            ar_initialization_ms: 2000,
            rendering_ms: 16, // one frame at 60 fps
        }
    }
}

/// Top-level configuration for the offline services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Directory holding downloaded assets. Owned exclusively by the asset cache.
    pub cache_dir: PathBuf,
    /// Directory backing the persisted key-value store.
    pub storage_dir: PathBuf,
    /// Root that `bundle://` URIs resolve against.
    pub bundle_root: Option<PathBuf>,
    pub asset_ttl_secs: u64,
    pub download_max_retries: u32,
    pub thresholds: MetricThresholds,
    /// Ordered set of assets the cache must keep available.
    pub required_assets: Vec<RequiredAsset>,
    /// `EnvFilter` directives for [`crate::api::init_tracing`]. `RUST_LOG` still wins.
    pub log_filter: Option<String>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("offline_assets"),
            storage_dir: PathBuf::from("offline_storage"),
            bundle_root: None,
            asset_ttl_secs: DEFAULT_ASSET_TTL_SECS,
            download_max_retries: DEFAULT_DOWNLOAD_MAX_RETRIES,
            thresholds: MetricThresholds::default(),
            required_assets: Vec::new(),
            log_filter: None,
        }
    }
}

impl OfflineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| EngineError::Config(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn asset_ttl(&self) -> Duration {
        Duration::from_secs(self.asset_ttl_secs)
    }

    /// Directives for the tracing subscriber when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    pub fn validate(&self) -> Result<()> {
        if self.asset_ttl_secs == 0 {
            return Err(EngineError::Config("asset_ttl_secs must be > 0".into()));
        }
        if let Some(filter) = &self.log_filter {
            EnvFilter::try_new(filter).map_err(|e| {
                EngineError::Config(format!("invalid log_filter {:?}: {}", filter, e))
            })?;
        }
        let mut seen = HashSet::new();
        for asset in &self.required_assets {
            validate_logical_name(&asset.logical_name)?;
            if asset.source_uri.trim().is_empty() {
                return Err(EngineError::Config(format!(
                    "asset {} has an empty source uri",
                    asset.logical_name
                )));
            }
            if !seen.insert(asset.logical_name.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate required asset {}",
                    asset.logical_name
                )));
            }
        }
        Ok(())
    }
}

/// Logical names double as file names, so they must be a single plain path component.
pub(crate) fn validate_logical_name(name: &str) -> Result<()> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.ends_with(".part");
    if plain {
        Ok(())
    } else {
        Err(EngineError::Config(format!(
            "logical asset name {:?} is not a plain file name",
            name
        )))
    }
}
