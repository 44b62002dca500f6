//! Embedding generation over a local in-process model and a remote HTTP
//! model.
//!
//! The provider is a pure function of the configuration and is re-resolved
//! on every call. Failures never propagate: a failed text degrades to a
//! zero vector of the configured width plus an error annotation, so an
//! indexing loop over many documents continues past a bad one.

pub mod local;
pub mod remote;

use log::warn;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::Result;

/// Result of embedding one text.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The embedding, or a same-width zero vector when `error` is set.
    pub embedding: Vec<f32>,
    pub error: Option<String>,
}

impl EmbeddingResult {
    pub fn ok(embedding: Vec<f32>) -> Self {
        Self {
            embedding,
            error: None,
        }
    }

    pub fn failed(dimension: usize, error: impl Into<String>) -> Self {
        Self {
            embedding: vec![0.0; dimension],
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Embed a single text with the configured provider.
pub async fn create_embedding(config: &EmbeddingConfig, text: &str) -> EmbeddingResult {
    match dispatch(config, text).await {
        Ok(embedding) => EmbeddingResult::ok(embedding),
        Err(e) => {
            warn!("Embedding failed, substituting zero vector: {}", e);
            EmbeddingResult::failed(embedding_dimension(config), e.to_string())
        }
    }
}

/// Embed many texts sequentially, one provider call per text. No batching:
/// each text fails or succeeds on its own.
pub async fn create_embeddings(config: &EmbeddingConfig, texts: &[String]) -> Vec<EmbeddingResult> {
    let mut results = Vec::with_capacity(texts.len());
    for text in texts {
        results.push(create_embedding(config, text).await);
    }
    results
}

/// The vector width the active provider produces.
///
/// The local provider consults the known-model table and falls back to the
/// configured dimension; the remote provider is configuration-driven only.
pub fn embedding_dimension(config: &EmbeddingConfig) -> usize {
    match config.provider {
        EmbeddingProviderKind::Local => {
            local::model_dimension(&config.model).unwrap_or(config.dimension)
        }
        EmbeddingProviderKind::Remote => config.dimension,
    }
}

async fn dispatch(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    match config.provider {
        EmbeddingProviderKind::Local => local::embed(config, text).await,
        EmbeddingProviderKind::Remote => remote::embed(config, text).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_is_zero_vector_of_requested_width() {
        let result = EmbeddingResult::failed(384, "model exploded");
        assert_eq!(result.embedding.len(), 384);
        assert!(result.embedding.iter().all(|v| *v == 0.0));
        assert!(!result.is_ok());
    }

    #[test]
    fn dimension_prefers_known_model_for_local() {
        let config = EmbeddingConfig::for_local("all-minilm-l6-v2", 1024);
        assert_eq!(embedding_dimension(&config), 384);
    }

    #[test]
    fn dimension_falls_back_to_config_for_unknown_model() {
        let config = EmbeddingConfig::for_local("bge-large-en-v1.5", 1024);
        assert_eq!(embedding_dimension(&config), 1024);
    }

    #[test]
    fn dimension_is_config_driven_for_remote() {
        let config = EmbeddingConfig::for_remote("http://localhost:11434", "all-minilm-l6-v2", 768);
        assert_eq!(embedding_dimension(&config), 768);
    }

    #[tokio::test]
    async fn unknown_local_model_degrades_to_zero_vector() {
        let config = EmbeddingConfig::for_local("no-such-model", 16);
        let result = create_embedding(&config, "hello").await;
        assert_eq!(result.embedding.len(), 16);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn unreachable_remote_service_degrades_to_zero_vector() {
        let config = EmbeddingConfig::for_remote("http://127.0.0.1:9", "nomic-embed-text", 24);
        let result = create_embedding(&config, "hello").await;
        assert_eq!(result.embedding.len(), 24);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn batch_is_per_text_independent() {
        let config = EmbeddingConfig::for_remote("http://127.0.0.1:9", "nomic-embed-text", 8);
        let texts = vec!["a".to_string(), "b".to_string()];
        let results = create_embeddings(&config, &texts).await;
        assert_eq!(results.len(), 2);
        for result in results {
            assert_eq!(result.embedding.len(), 8);
            assert!(result.error.is_some());
        }
    }
}
