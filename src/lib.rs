pub mod config;
pub mod db;
pub mod embed;
pub mod error;
pub mod schema;
pub mod search;
pub mod store;
pub mod types;

pub use config::{
    get_embedding_provider, get_store_backend, EmbeddingConfig, EmbeddingProviderKind,
    StoreBackend, StoreConfig,
};
pub use embed::{create_embedding, create_embeddings, embedding_dimension, EmbeddingResult};
pub use error::{Result, StoreError};
pub use search::{federated_search, merge_ranked};
pub use store::{normalize_metric, VectorStore};
pub use types::{
    DistanceMetric, FilterCondition, MatchClause, PointId, SearchFilter, SearchResult, VectorPoint,
};
