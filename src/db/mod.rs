pub mod chroma;
pub mod lance;
pub mod qdrant;

use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use crate::types::{SearchFilter, SearchResult, VectorPoint};

/// The six operations every backend adapter implements.
///
/// Callers normally go through [`crate::store::VectorStore`], which
/// normalizes distance-metric names and point ids before delegating here.
/// Nothing backend-specific crosses this boundary in either direction.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Probe backend reachability. Never fails; unreachable backends report
    /// `false` and log the cause.
    async fn health_check(&self) -> bool;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Create a collection for vectors of `vector_size` compared with
    /// `metric`, already spelled the way this backend spells it. A no-op if
    /// the collection exists.
    async fn create_collection(&self, name: &str, vector_size: usize, metric: &str) -> Result<()>;

    /// Insert points, replacing any stored point with the same id.
    async fn upsert_points(&self, name: &str, points: Vec<VectorPoint>) -> Result<()>;

    /// Similarity search. Searching a collection that does not exist returns
    /// an empty list, not an error.
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>>;

    /// Delete a collection. Returns `false` (not an error) when absent.
    async fn delete_collection(&self, name: &str) -> Result<bool>;
}

/// Instantiate the adapter selected by `config`.
///
/// Construction is cheap; the embedded backend shares its connection handle
/// process-wide regardless of how many adapter values exist.
pub fn create_backend(config: &StoreConfig) -> Result<Arc<dyn VectorBackend>> {
    config.validate()?;
    info!("Creating vector backend of type: {:?}", config.backend);
    match config.backend {
        StoreBackend::Lance => Ok(Arc::new(lance::LanceVectorStore::new(&config.db_path))),
        StoreBackend::Chroma => Ok(Arc::new(chroma::ChromaVectorStore::new(
            &config.chroma_url,
            config.chroma_tenant.as_deref(),
            config.chroma_database.as_deref(),
            config.api_key.as_deref(),
            config.user.as_deref(),
            config.pass.as_deref(),
        ))),
        StoreBackend::Qdrant => Ok(Arc::new(qdrant::QdrantVectorStore::new(
            &config.qdrant_url,
            config.api_key.as_deref(),
        )?)),
    }
}
