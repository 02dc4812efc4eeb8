// Offline services — asset cache, progress tracking, performance instrumentation, reporting.

pub mod asset_cache;
pub mod export;
pub mod perf;
pub mod progress;
pub mod validation;
