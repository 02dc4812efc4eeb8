use thiserror::Error;

/// Failures surfaced by the offline services.
///
/// Stale-serve after a failed refresh and ending an unknown metric are not
/// represented here: both are absorbed and only logged.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Cache directory or index could not be prepared, or a required asset has
    /// neither a fresh download nor any prior cached copy.
    #[error("offline cache initialization failed: {reason}")]
    Initialization {
        reason: String,
        #[source]
        source: Option<Box<EngineError>>,
    },

    /// The named asset was never successfully cached.
    #[error("asset {0} not found in offline cache")]
    AssetUnavailable(String),

    /// A write to the key-value store failed. In-memory state is still authoritative.
    #[error("failed to persist {key}: {reason}")]
    PersistenceWrite { key: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn init(reason: impl Into<String>) -> Self {
        EngineError::Initialization {
            reason: reason.into(),
            source: None,
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, EngineError>;
