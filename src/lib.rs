// Offline persistence and caching core for the AR house viewer.

pub mod api;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod storage;

pub use error::{EngineError, Result};
