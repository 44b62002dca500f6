use async_trait::async_trait;
use log::{debug, error, info, warn};
use qdrant_client::qdrant::{
    value::Kind as QdrantValueKind, Condition, CreateCollectionBuilder, Distance, Filter,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use std::collections::HashMap;

use super::VectorBackend;
use crate::error::{Result, StoreError};
use crate::types::{
    FilterCondition, MatchClause, PointId, SearchFilter, SearchResult, VectorPoint,
};

/// Production client-server backend (Qdrant over gRPC). Stateless beyond the
/// client handle; payloads are opaque JSON blobs, so the registry is not
/// consulted here. Point ids must be integers or UUID strings — the façade
/// guarantees that before delegation.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    pub fn new(host: &str, api_key: Option<&str>) -> Result<Self> {
        let mut client_builder = Qdrant::from_url(host);

        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            client_builder.set_api_key(key);
            info!("Configuring Qdrant client with API key.");
        } else if api_key.is_some() {
            warn!("Qdrant API key provided but is empty.");
        }

        let client = client_builder.build()?;
        info!("Qdrant client connected to {}", host);

        Ok(Self { client })
    }
}

#[async_trait]
impl VectorBackend for QdrantVectorStore {
    async fn health_check(&self) -> bool {
        match self.client.health_check().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Qdrant health check failed: {}", e);
                false
            }
        }
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.client.collection_exists(name).await?)
    }

    async fn create_collection(&self, name: &str, vector_size: usize, metric: &str) -> Result<()> {
        let distance = parse_distance(metric)?;
        if self.client.collection_exists(name).await? {
            debug!("Qdrant collection '{}' already exists", name);
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(vector_size as u64, distance)),
            )
            .await
            .map_err(|e| {
                error!("Failed to create Qdrant collection '{}': {}", name, e);
                StoreError::from(e)
            })?;
        info!("Created Qdrant collection '{}' ({} dims, {})", name, vector_size, metric);
        Ok(())
    }

    async fn upsert_points(&self, name: &str, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();
        let qdrant_points = points
            .into_iter()
            .map(point_to_struct)
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, qdrant_points))
            .await
            .map_err(|e| {
                error!("Qdrant upsert into '{}' failed: {}", name, e);
                StoreError::from(e)
            })?;
        debug!("Upserted {} points into Qdrant collection '{}'", count, name);
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        if !self.client.collection_exists(name).await? {
            debug!("Qdrant collection '{}' absent, returning empty results", name);
            return Ok(Vec::new());
        }

        let mut builder =
            SearchPointsBuilder::new(name, vector.to_vec(), limit as u64).with_payload(true);
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            builder = builder.filter(filter_to_qdrant(filter));
        }

        let response = self.client.search_points(builder).await.map_err(|e| {
            error!("Qdrant search in '{}' failed: {}", name, e);
            StoreError::from(e)
        })?;
        debug!("Qdrant search returned {} results for '{}'", response.result.len(), name);

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let payload = point
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, convert_qdrant_value_to_json(v)))
                    .collect::<serde_json::Map<String, Value>>();
                SearchResult {
                    score: point.score,
                    payload,
                }
            })
            .collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        if !self.client.collection_exists(name).await? {
            debug!("Qdrant collection '{}' absent, nothing to delete", name);
            return Ok(false);
        }
        let response = self.client.delete_collection(name).await.map_err(|e| {
            error!("Failed to delete Qdrant collection '{}': {}", name, e);
            StoreError::from(e)
        })?;
        info!("Deleted Qdrant collection '{}'", name);
        Ok(response.result)
    }
}

fn parse_distance(metric: &str) -> Result<Distance> {
    match metric {
        "Cosine" => Ok(Distance::Cosine),
        "Euclid" => Ok(Distance::Euclid),
        "Dot" => Ok(Distance::Dot),
        other => Err(StoreError::UnsupportedMetric {
            metric: other.to_string(),
            backend: "qdrant",
        }),
    }
}

fn point_to_struct(point: VectorPoint) -> Result<PointStruct> {
    let payload: HashMap<String, QdrantValue> =
        serde_json::from_value(Value::Object(point.payload))?;
    // No dimension check here: mismatches surface as backend errors. Only
    // the embedded backend repairs query vectors.
    Ok(match point.id {
        PointId::Integer(n) => PointStruct::new(n, point.vector, payload),
        PointId::String(s) => PointStruct::new(s, point.vector, payload),
    })
}

fn condition_to_qdrant(condition: &FilterCondition) -> Condition {
    match &condition.clause {
        MatchClause::Any(values) => {
            let keywords: Vec<String> = values.iter().map(scalar_to_keyword).collect();
            Condition::matches(condition.key.clone(), keywords)
        }
        MatchClause::Text(value) => match value {
            Value::Bool(b) => Condition::matches(condition.key.clone(), *b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Condition::matches(condition.key.clone(), i),
                None => Condition::matches(condition.key.clone(), n.to_string()),
            },
            Value::String(s) => Condition::matches(condition.key.clone(), s.clone()),
            other => Condition::matches(condition.key.clone(), other.to_string()),
        },
    }
}

fn filter_to_qdrant(filter: &SearchFilter) -> Filter {
    Filter {
        must: filter.must.iter().map(condition_to_qdrant).collect(),
        ..Default::default()
    }
}

fn scalar_to_keyword(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn convert_qdrant_value_to_json(value: QdrantValue) -> Value {
    match value.kind {
        Some(QdrantValueKind::NullValue(_)) => Value::Null,
        Some(QdrantValueKind::BoolValue(b)) => Value::Bool(b),
        Some(QdrantValueKind::IntegerValue(i)) => Value::Number(i.into()),
        Some(QdrantValueKind::DoubleValue(d)) => {
            serde_json::Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null)
        }
        Some(QdrantValueKind::StringValue(s)) => Value::String(s),
        Some(QdrantValueKind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(convert_qdrant_value_to_json).collect())
        }
        Some(QdrantValueKind::StructValue(obj)) => {
            let map = obj
                .fields
                .into_iter()
                .map(|(key, val)| (key, convert_qdrant_value_to_json(val)))
                .collect();
            Value::Object(map)
        }
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_valid_url() {
        assert!(QdrantVectorStore::new("http://localhost:6334", None).is_ok());
    }

    #[test]
    fn new_invalid_url() {
        assert!(QdrantVectorStore::new("not a valid url", None).is_err());
    }

    #[test]
    fn distance_names_are_capitalized_native() {
        assert!(parse_distance("Cosine").is_ok());
        assert!(parse_distance("Euclid").is_ok());
        assert!(parse_distance("Dot").is_ok());
        assert!(parse_distance("cosine").is_err());
        assert!(parse_distance("l2").is_err());
    }

    #[test]
    fn filter_conversion_keeps_condition_count() {
        let filter = SearchFilter::from_criteria(vec![
            ("language".to_string(), vec![json!("rust"), json!("go")]),
            ("file_path".to_string(), vec![json!("src/lib.rs")]),
        ]);
        let converted = filter_to_qdrant(&filter);
        assert_eq!(converted.must.len(), 2);
        assert!(converted.must_not.is_empty());
    }

    #[test]
    fn point_conversion_accepts_integer_and_uuid_ids() {
        let mut payload = serde_json::Map::new();
        payload.insert("language".to_string(), json!("rust"));

        let numeric = VectorPoint::new(42u64, vec![0.1, 0.2], payload.clone());
        assert!(point_to_struct(numeric).is_ok());

        let uuid = VectorPoint::new(
            "550e8400-e29b-41d4-a716-446655440000",
            vec![0.1, 0.2],
            payload,
        );
        assert!(point_to_struct(uuid).is_ok());
    }

    #[test]
    fn qdrant_values_convert_to_json() {
        let value = QdrantValue {
            kind: Some(QdrantValueKind::StringValue("rust".to_string())),
        };
        assert_eq!(convert_qdrant_value_to_json(value), json!("rust"));

        let value = QdrantValue {
            kind: Some(QdrantValueKind::IntegerValue(7)),
        };
        assert_eq!(convert_qdrant_value_to_json(value), json!(7));
    }
}
