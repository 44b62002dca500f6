//! End-to-end lifecycle tests against the embedded file-based backend.
//!
//! These run against real LanceDB tables in temporary directories. They are
//! serialized because the embedded backend shares one process-wide
//! connection handle keyed by data path.

use serde_json::{json, Map, Value};
use serial_test::serial;
use tempfile::TempDir;
use vector_loom::{
    federated_search, EmbeddingConfig, SearchFilter, StoreConfig, VectorPoint, VectorStore,
};

fn store_in(dir: &TempDir) -> VectorStore {
    VectorStore::new(StoreConfig::for_lance(dir.path().to_str().unwrap()))
}

fn chunk_payload(file_path: &str, language: &str, content: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("file_path".to_string(), json!(file_path));
    payload.insert("language".to_string(), json!(language));
    payload.insert("content".to_string(), json!(content));
    payload
}

fn sample_points() -> Vec<VectorPoint> {
    vec![
        VectorPoint::new(
            "chunk-a",
            vec![1.0, 0.0, 0.0, 0.0],
            chunk_payload("src/a.rs", "rust", "fn alpha() {}"),
        ),
        VectorPoint::new(
            "chunk-b",
            vec![0.0, 1.0, 0.0, 0.0],
            chunk_payload("src/b.py", "python", "def beta(): pass"),
        ),
        VectorPoint::new(
            "chunk-c",
            vec![0.0, 0.0, 1.0, 0.0],
            chunk_payload("src/c.rs", "rust", "fn gamma() {}"),
        ),
    ]
}

#[tokio::test]
#[serial]
async fn create_exists_delete_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    assert!(!store.collection_exists("code_chunks").await.unwrap());

    store.create_collection("code_chunks", 4, "cosine").await.unwrap();
    assert!(store.collection_exists("code_chunks").await.unwrap());

    // Creating again is a no-op.
    store.create_collection("code_chunks", 4, "cosine").await.unwrap();

    assert!(store.delete_collection("code_chunks").await.unwrap());
    assert!(!store.collection_exists("code_chunks").await.unwrap());
}

#[tokio::test]
#[serial]
async fn deleting_missing_collection_is_benign() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    assert!(!store.delete_collection("never_created").await.unwrap());
}

#[tokio::test]
#[serial]
async fn searching_missing_collection_returns_empty() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    let results = store
        .search("never_created", &[0.1, 0.2, 0.3, 0.4], 5, None)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
#[serial]
async fn exact_vector_search_ranks_stored_point_first() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    store.create_collection("code_chunks", 4, "cosine").await.unwrap();
    store.upsert_points("code_chunks", sample_points()).await.unwrap();

    let results = store
        .search("code_chunks", &[0.0, 1.0, 0.0, 0.0], 3, None)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].payload["content"], json!("def beta(): pass"));
    for other in &results[1..] {
        assert!(other.score <= results[0].score);
    }
}

#[tokio::test]
#[serial]
async fn payload_round_trip_carries_schema_defaults() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    store.create_collection("code_chunks", 4, "cosine").await.unwrap();
    let mut sparse = Map::new();
    sparse.insert("file_path".to_string(), json!("src/sparse.rs"));
    store
        .upsert_points(
            "code_chunks",
            vec![VectorPoint::new("sparse-1", vec![0.5, 0.5, 0.0, 0.0], sparse)],
        )
        .await
        .unwrap();

    let results = store
        .search("code_chunks", &[0.5, 0.5, 0.0, 0.0], 1, None)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);

    let payload = &results[0].payload;
    assert_eq!(payload["file_path"], json!("src/sparse.rs"));
    // Every declared field comes back, unset ones at their defaults.
    assert_eq!(payload["language"], json!(""));
    assert_eq!(payload["symbol"], json!(""));
    assert_eq!(payload["content"], json!(""));
    assert_eq!(payload["start_line"], json!(0));
    assert_eq!(payload["end_line"], json!(0));
}

#[tokio::test]
#[serial]
async fn schema_sentinel_never_appears_in_results() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    store.create_collection("code_chunks", 4, "cosine").await.unwrap();
    store.upsert_points("code_chunks", sample_points()).await.unwrap();

    // Limit far above the stored count: only real points come back.
    let results = store
        .search("code_chunks", &[0.0, 0.0, 0.0, 1.0], 10, None)
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
}

#[tokio::test]
#[serial]
async fn mismatched_query_vector_is_repaired() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    store.create_collection("code_chunks", 4, "cosine").await.unwrap();
    store.upsert_points("code_chunks", sample_points()).await.unwrap();

    // Too long: truncated to the table width.
    let results = store
        .search("code_chunks", &[1.0, 0.0, 0.0, 0.0, 9.0, 9.0], 3, None)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].payload["content"], json!("fn alpha() {}"));

    // Too short: zero-padded.
    let results = store.search("code_chunks", &[0.0, 1.0], 3, None).await.unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].payload["content"], json!("def beta(): pass"));
}

#[tokio::test]
#[serial]
async fn filtered_search_restricts_results() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    store.create_collection("code_chunks", 4, "cosine").await.unwrap();
    store.upsert_points("code_chunks", sample_points()).await.unwrap();

    let filter = SearchFilter::from_criteria(vec![(
        "language".to_string(),
        vec![json!("rust")],
    )]);
    let results = store
        .search("code_chunks", &[1.0, 0.0, 0.0, 0.0], 10, Some(&filter))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    for result in &results {
        assert_eq!(result.payload["language"], json!("rust"));
    }
}

#[tokio::test]
#[serial]
async fn federated_search_skips_absent_collections() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    // L2 keeps distances finite for the degraded zero-vector query below.
    store.create_collection("documentation", 4, "l2").await.unwrap();
    let mut payload = Map::new();
    payload.insert("title".to_string(), json!("Overview"));
    payload.insert("content".to_string(), json!("The system overview."));
    store
        .upsert_points(
            "documentation",
            vec![VectorPoint::new("doc-1", vec![0.1, 0.1, 0.1, 0.1], payload)],
        )
        .await
        .unwrap();

    // Unreachable embedding service: the query degrades to a zero vector
    // instead of failing the whole federated call.
    let embedding = EmbeddingConfig::for_remote("http://127.0.0.1:9", "nomic-embed-text", 4);
    let results = federated_search(
        &store,
        &embedding,
        "overview",
        &["documentation", "merged_documentation"],
        None,
        5,
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].payload["title"], json!("Overview"));
}
