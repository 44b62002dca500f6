//! Federated similarity search across multiple logical collections.
//!
//! Callers get a single ranked list regardless of which physical collection
//! stored a logically-equivalent document, at the cost of one scan per
//! collection. Final ordering is determined solely by score, so the
//! per-collection searches could run concurrently without changing results;
//! they run sequentially here.

use log::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::embed;
use crate::error::Result;
use crate::store::VectorStore;
use crate::types::{SearchFilter, SearchResult};

/// Search several collections with one query embedding and merge the hits
/// into a single ranked list of at most `limit` results.
///
/// The query is embedded exactly once. Collections that do not exist are
/// skipped without error; the same filter and per-collection limit apply to
/// every remaining target.
pub async fn federated_search(
    store: &VectorStore,
    embedding: &EmbeddingConfig,
    query: &str,
    collections: &[&str],
    filter: Option<&SearchFilter>,
    limit: usize,
) -> Result<Vec<SearchResult>> {
    let embedded = embed::create_embedding(embedding, query).await;
    if let Some(error) = &embedded.error {
        warn!("Query embedding degraded to zero vector: {}", error);
    }

    let mut merged = Vec::new();
    for collection in collections {
        if !store.collection_exists(collection).await? {
            debug!("Skipping absent collection '{}'", collection);
            continue;
        }
        let hits = store
            .search(collection, &embedded.embedding, limit, filter)
            .await?;
        debug!("Collection '{}' returned {} hits", collection, hits.len());
        merged.extend(hits);
    }

    Ok(merge_ranked(merged, limit))
}

/// Sort by score descending and truncate. The sort is stable, so equal
/// scores keep their arrival order.
pub fn merge_ranked(mut results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn hit(score: f32, marker: &str) -> SearchResult {
        let mut payload = Map::new();
        payload.insert("content".to_string(), json!(marker));
        SearchResult { score, payload }
    }

    #[test]
    fn higher_scores_rank_first_across_collections() {
        let merged = merge_ranked(vec![hit(0.9, "a"), hit(0.95, "b")], 10);
        assert_eq!(merged[0].payload["content"], json!("b"));
        assert_eq!(merged[1].payload["content"], json!("a"));
    }

    #[test]
    fn merged_list_is_truncated_to_limit() {
        let merged = merge_ranked(vec![hit(0.3, "a"), hit(0.9, "b"), hit(0.5, "c")], 2);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].payload["content"], json!("b"));
        assert_eq!(merged[1].payload["content"], json!("c"));
    }

    #[test]
    fn equal_scores_keep_arrival_order() {
        let merged = merge_ranked(vec![hit(0.5, "first"), hit(0.5, "second")], 10);
        assert_eq!(merged[0].payload["content"], json!("first"));
        assert_eq!(merged[1].payload["content"], json!("second"));
    }
}
