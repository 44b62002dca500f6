use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Top-level error for store and embedding operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid or unsupported configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Backend unreachable or connection setup failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The named collection does not exist.
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    /// A distance-metric name outside the supported vocabulary.
    #[error("unsupported distance metric '{metric}' for backend '{backend}'")]
    UnsupportedMetric {
        metric: String,
        backend: &'static str,
    },

    /// Backend-reported failure without a more specific wrapper.
    #[error("backend error: {0}")]
    Backend(String),

    /// JSON parsing / serialization errors.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Embedded store errors (wrapped).
    #[error("lancedb error: {0}")]
    Lance(#[from] lancedb::Error),

    /// Qdrant client errors (wrapped).
    #[error("qdrant error: {0}")]
    Qdrant(#[from] qdrant_client::QdrantError),
}
