use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, error, info, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;

use super::VectorBackend;
use crate::error::{Result, StoreError};
use crate::schema::SCHEMA_SENTINEL_ID;
use crate::types::{FilterCondition, MatchClause, SearchFilter, SearchResult, VectorPoint};

#[derive(Debug, Deserialize)]
struct ChromaCollection {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListCollectionsResponse {
    collections: Vec<ChromaCollection>,
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    metadata: Value,
    get_or_create: bool,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    ids: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    metadatas: Vec<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct QueryEmbeddingsRequest<'a> {
    #[serde(rename = "queryEmbeddings")]
    query_embeddings: &'a [&'a [f32]],
    #[serde(rename = "nResults")]
    n_results: usize,
    include: Vec<String>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    where_clause: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct QueryEmbeddingsResponse {
    ids: Option<Vec<Vec<String>>>,
    distances: Option<Vec<Vec<f32>>>,
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    error: Option<String>,
}

/// Simple client-server backend (Chroma over HTTP). Stateless apart from the
/// HTTP client and a name → collection-id cache; schemas are dynamic, so the
/// registry is not consulted here.
pub struct ChromaVectorStore {
    client: Client,
    collection_id_cache: RwLock<HashMap<String, String>>,
    host: String,
    tenant: Option<String>,
    database: Option<String>,
    api_key: Option<String>,
    user: Option<String>,
    pass: Option<String>,
}

impl ChromaVectorStore {
    pub fn new(
        host: &str,
        tenant: Option<&str>,
        database: Option<&str>,
        api_key: Option<&str>,
        user: Option<&str>,
        pass: Option<&str>,
    ) -> Self {
        info!("Initializing Chroma client for host: {}", host);
        Self {
            client: Client::new(),
            collection_id_cache: RwLock::new(HashMap::new()),
            host: host.trim_end_matches('/').to_string(),
            tenant: tenant.map(String::from),
            database: database.map(String::from),
            api_key: api_key.map(String::from),
            user: user.map(String::from),
            pass: pass.map(String::from),
        }
    }

    fn get_base_url(&self) -> String {
        format!("{}/api/v1", self.host)
    }

    fn build_request<T: Serialize>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&T>,
    ) -> reqwest::RequestBuilder {
        let mut request_builder = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");

        if let Some(tenant) = &self.tenant {
            request_builder = request_builder.header("X-Chroma-Tenant", tenant);
        }
        if let Some(database) = &self.database {
            request_builder = request_builder.header("X-Chroma-Database", database);
        }

        let auth_header_value = if let (Some(user), Some(pass)) = (&self.user, &self.pass) {
            if !user.is_empty() && !pass.is_empty() {
                let credentials = format!("{}:{}", user, pass);
                Some(format!("Basic {}", STANDARD.encode(credentials)))
            } else {
                warn!("Chroma Basic Auth user or pass provided but empty.");
                None
            }
        } else if let Some(secret) = &self.api_key {
            if !secret.is_empty() {
                Some(format!("Bearer {}", secret))
            } else {
                warn!("Chroma Bearer token (API key) provided but empty.");
                None
            }
        } else {
            None
        };
        if let Some(auth) = auth_header_value {
            request_builder = request_builder.header(AUTHORIZATION, auth);
        }

        if let Some(b) = body {
            request_builder = request_builder.header(CONTENT_TYPE, "application/json").json(b);
        }

        request_builder
    }

    async fn list_collections(&self) -> Result<Vec<ChromaCollection>> {
        let list_url = format!("{}/collections", self.get_base_url());
        let request = self.build_request(reqwest::Method::GET, &list_url, None::<&String>);

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("Failed to list Chroma collections (Status: {}): {}", status, text);
            return Err(StoreError::Backend(format!(
                "Failed to list Chroma collections: {}",
                text
            )));
        }

        let parsed: ListCollectionsResponse = serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse list collections response: {}. Text: {}", e, text);
            StoreError::Backend(format!("Failed to parse list collections response: {}", e))
        })?;
        Ok(parsed.collections)
    }

    /// Resolve a collection name to its backend id, `None` when absent.
    async fn lookup_collection_id(&self, collection_name: &str) -> Result<Option<String>> {
        if let Ok(cache) = self.collection_id_cache.read() {
            if let Some(id) = cache.get(collection_name) {
                debug!("Cache hit for collection ID: {}", collection_name);
                return Ok(Some(id.clone()));
            }
        }
        debug!("Cache miss for collection ID: {}", collection_name);

        let collections = self.list_collections().await?;
        let mut found = None;
        if let Ok(mut cache) = self.collection_id_cache.write() {
            for collection in collections {
                if collection.name == collection_name {
                    found = Some(collection.id.clone());
                }
                cache.insert(collection.name, collection.id);
            }
        }
        Ok(found)
    }

    fn cache_collection(&self, name: &str, id: &str) {
        if let Ok(mut cache) = self.collection_id_cache.write() {
            cache.insert(name.to_string(), id.to_string());
        }
    }

    fn uncache_collection(&self, name: &str) {
        if let Ok(mut cache) = self.collection_id_cache.write() {
            cache.remove(name);
        }
    }
}

#[async_trait]
impl VectorBackend for ChromaVectorStore {
    async fn health_check(&self) -> bool {
        let url = format!("{}/heartbeat", self.get_base_url());
        let request = self.build_request(reqwest::Method::GET, &url, None::<&String>);
        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Chroma heartbeat returned status {}", response.status());
                false
            }
            Err(e) => {
                warn!("Chroma heartbeat failed: {}", e);
                false
            }
        }
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.lookup_collection_id(name).await?.is_some())
    }

    async fn create_collection(&self, name: &str, _vector_size: usize, metric: &str) -> Result<()> {
        let create_url = format!("{}/collections", self.get_base_url());
        let request_body = CreateCollectionRequest {
            name,
            metadata: serde_json::json!({ "hnsw:space": metric }),
            get_or_create: true,
        };

        let request = self.build_request(reqwest::Method::POST, &create_url, Some(&request_body));
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("Failed to create Chroma collection '{}' (Status: {}): {}", name, status, text);
            return Err(StoreError::Backend(format!(
                "Failed to create Chroma collection: {}",
                text
            )));
        }

        let created: ChromaCollection = serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse create collection response: {}. Text: {}", e, text);
            StoreError::Backend(format!("Failed to parse create collection response: {}", e))
        })?;
        self.cache_collection(name, &created.id);
        info!("Chroma collection '{}' ready ({})", name, metric);
        Ok(())
    }

    async fn upsert_points(&self, name: &str, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let collection_id = self
            .lookup_collection_id(name)
            .await?
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        let upsert_url = format!("{}/collections/{}/upsert", self.get_base_url(), collection_id);

        let count = points.len();
        let mut request_body = UpsertRequest {
            ids: Vec::with_capacity(count),
            embeddings: Vec::with_capacity(count),
            metadatas: Vec::with_capacity(count),
        };
        for point in points {
            request_body.ids.push(point.id.to_string());
            request_body.embeddings.push(point.vector);
            request_body.metadatas.push(point.payload);
        }

        let request = self.build_request(reqwest::Method::POST, &upsert_url, Some(&request_body));
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Chroma upsert into '{}' failed (Status: {}): {}", name, status, text);
            return Err(StoreError::Backend(format!("Chroma upsert failed: {}", text)));
        }
        debug!("Upserted {} points into Chroma collection '{}'", count, name);
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        let Some(collection_id) = self.lookup_collection_id(name).await? else {
            debug!("Chroma collection '{}' absent, returning empty results", name);
            return Ok(Vec::new());
        };
        let query_url = format!("{}/collections/{}/query", self.get_base_url(), collection_id);

        let request_body = QueryEmbeddingsRequest {
            query_embeddings: &[vector],
            n_results: limit,
            include: vec!["metadatas".to_string(), "distances".to_string()],
            where_clause: filter.and_then(filter_to_where),
        };
        debug!("Chroma query request to {}: {:?}", query_url, request_body);

        let request = self.build_request(reqwest::Method::POST, &query_url, Some(&request_body));
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("Chroma query failed (Status: {}): {}", status, text);
            return Err(StoreError::Backend(format!("Chroma query failed: {}", text)));
        }

        let query_response: QueryEmbeddingsResponse = serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse Chroma query response: {}. Text: {}", e, text);
            StoreError::Backend(format!("Failed to parse Chroma query response: {}", e))
        })?;

        if let Some(err_msg) = query_response.error {
            error!("Chroma query returned error: {}", err_msg);
            return Err(StoreError::Backend(format!("Chroma query error: {}", err_msg)));
        }

        let results = parse_query_response(query_response);
        debug!("Parsed {} results from Chroma search.", results.len());
        Ok(results)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let delete_url = format!("{}/collections/{}", self.get_base_url(), name);
        let request = self.build_request(reqwest::Method::DELETE, &delete_url, None::<&String>);
        let response = request.send().await?;
        let status = response.status();

        self.uncache_collection(name);

        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("Chroma collection '{}' absent, nothing to delete", name);
            return Ok(false);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Failed to delete Chroma collection '{}' (Status: {}): {}", name, status, text);
            return Err(StoreError::Backend(format!(
                "Failed to delete Chroma collection: {}",
                text
            )));
        }
        info!("Deleted Chroma collection '{}'", name);
        Ok(true)
    }
}

fn condition_to_where(condition: &FilterCondition) -> Value {
    let mut clause = Map::new();
    match &condition.clause {
        MatchClause::Any(values) => {
            clause.insert(
                condition.key.clone(),
                serde_json::json!({ "$in": values }),
            );
        }
        MatchClause::Text(value) => {
            clause.insert(condition.key.clone(), value.clone());
        }
    }
    Value::Object(clause)
}

/// Native where-clause: one condition stands alone, several are conjoined
/// with `$and`.
fn filter_to_where(filter: &SearchFilter) -> Option<Value> {
    match filter.must.len() {
        0 => None,
        1 => Some(condition_to_where(&filter.must[0])),
        _ => Some(serde_json::json!({
            "$and": filter.must.iter().map(condition_to_where).collect::<Vec<_>>()
        })),
    }
}

fn score_from_distance(distance: Option<f32>) -> f32 {
    1.0 - distance.unwrap_or(0.0)
}

fn parse_query_response(response: QueryEmbeddingsResponse) -> Vec<SearchResult> {
    let mut results = Vec::new();
    let (Some(ids_batch), Some(metadatas_batch)) = (response.ids, response.metadatas) else {
        warn!("Chroma query response missing expected fields (ids, metadatas).");
        return results;
    };
    let (Some(ids), Some(metadatas)) = (ids_batch.first(), metadatas_batch.first()) else {
        warn!("Chroma query response structure unexpected (missing inner batch).");
        return results;
    };
    let distances = response
        .distances
        .as_ref()
        .and_then(|batch| batch.first());

    for (index, id) in ids.iter().enumerate() {
        if id == SCHEMA_SENTINEL_ID {
            continue;
        }
        let payload = metadatas
            .get(index)
            .and_then(|m| m.clone())
            .and_then(|m| match m {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default();
        let distance = distances.and_then(|d| d.get(index).copied());
        results.push(SearchResult {
            score: score_from_distance(distance),
            payload,
        });
    }
    results
}
