use std::sync::Once;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::OfflineConfig;

static INIT_TRACING: Once = Once::new();

/// Install the global fmt subscriber. Only the first call has any effect.
///
/// `RUST_LOG` overrides the filter; otherwise `config.log_filter` applies, falling
/// back to [`crate::config::DEFAULT_LOG_FILTER`].
pub fn init_tracing(config: &OfflineConfig) {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config.log_filter()))
            .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_FILTER));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();

        info!(
            "offline engine tracing initialized: cache_dir={} storage_dir={}",
            config.cache_dir.display(),
            config.storage_dir.display()
        );
    });
}
