//! Backend-neutral vector store façade.
//!
//! Mirrors the adapter contract, but resolves the active adapter from the
//! configuration on every call, normalizes distance-metric names into the
//! active backend's vocabulary, and coerces point ids into the production
//! backend's id domain. Filters pass through untouched; each adapter owns
//! its own filter translation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use rand::Rng;

use crate::config::{StoreBackend, StoreConfig};
use crate::db::{create_backend, VectorBackend};
use crate::error::{Result, StoreError};
use crate::types::{DistanceMetric, PointId, SearchFilter, SearchResult, VectorPoint};

/// Façade over the configured backend.
///
/// Construction is cheap and nothing is cached across calls, so a caller
/// that rebuilds its [`StoreConfig`] between calls switches backends without
/// restarting the process.
pub struct VectorStore {
    config: StoreConfig,
}

impl VectorStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Read configuration from the process environment. Boundary use only;
    /// library callers should thread an explicit [`StoreConfig`] instead.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(StoreConfig::from_env()?))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn backend(&self) -> Result<Arc<dyn VectorBackend>> {
        create_backend(&self.config)
    }

    pub async fn health_check(&self) -> bool {
        match self.backend() {
            Ok(backend) => backend.health_check().await,
            Err(e) => {
                warn!("Cannot resolve vector backend: {}", e);
                false
            }
        }
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.backend()?.collection_exists(name).await
    }

    /// Create a collection. `metric` accepts the backend-neutral vocabulary
    /// (`cosine`, `l2`, `euclid`, `ip`, `dot`, case-insensitive), which also
    /// covers every backend's native spelling.
    pub async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
        metric: &str,
    ) -> Result<()> {
        let native = normalize_metric(self.config.backend, metric)?;
        self.backend()?
            .create_collection(name, vector_size, &native)
            .await
    }

    /// Create a collection with the configured default metric.
    pub async fn create_collection_default(&self, name: &str, vector_size: usize) -> Result<()> {
        let metric = self.config.distance_metric.clone();
        self.create_collection(name, vector_size, &metric).await
    }

    pub async fn upsert_points(&self, name: &str, points: Vec<VectorPoint>) -> Result<()> {
        let points = points
            .into_iter()
            .map(|p| self.normalize_point(p))
            .collect();
        self.backend()?.upsert_points(name, points).await
    }

    pub async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        self.backend()?.search(name, vector, limit, filter).await
    }

    pub async fn delete_collection(&self, name: &str) -> Result<bool> {
        self.backend()?.delete_collection(name).await
    }

    /// Generic pass-through, except for the production backend whose point
    /// ids must be integers or UUIDs.
    fn normalize_point(&self, mut point: VectorPoint) -> VectorPoint {
        if self.config.backend == StoreBackend::Qdrant {
            point.id = normalize_qdrant_id(point.id);
        }
        point
    }
}

pub(crate) fn backend_label(backend: StoreBackend) -> &'static str {
    match backend {
        StoreBackend::Lance => "lancedb",
        StoreBackend::Chroma => "chroma",
        StoreBackend::Qdrant => "qdrant",
    }
}

/// Normalize a backend-neutral (or already-native) distance-metric name into
/// `backend`'s spelling.
///
/// Total over {cosine, l2, euclid, ip, dot} and idempotent: a name already
/// native to `backend` maps to itself, and nothing outside the vocabulary
/// silently defaults to another metric.
pub fn normalize_metric(backend: StoreBackend, name: &str) -> Result<String> {
    let metric = DistanceMetric::parse(name).ok_or_else(|| StoreError::UnsupportedMetric {
        metric: name.to_string(),
        backend: backend_label(backend),
    })?;
    let native = match backend {
        StoreBackend::Lance => metric.lance_name(),
        StoreBackend::Chroma => metric.chroma_name(),
        StoreBackend::Qdrant => metric.qdrant_name(),
    };
    Ok(native.to_string())
}

fn normalize_qdrant_id(id: PointId) -> PointId {
    match id {
        PointId::Integer(n) => PointId::Integer(n),
        PointId::String(s) => {
            // Numeric-like strings coerce to integers; UUIDs pass through.
            if let Ok(n) = s.parse::<u64>() {
                return PointId::Integer(n);
            }
            if uuid::Uuid::parse_str(&s).is_ok() {
                return PointId::String(s);
            }
            let generated = generate_numeric_id();
            debug!("Point id '{}' is not Qdrant-compatible, substituting {}", s, generated);
            PointId::Integer(generated)
        }
    }
}

/// Monotonic-ish fresh id: current time in milliseconds plus a small random
/// offset to keep ids generated within the same millisecond apart.
fn generate_numeric_id() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    millis * 1000 + u64::from(rand::rng().random_range(0..1000u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEUTRAL_NAMES: [&str; 5] = ["cosine", "l2", "euclid", "ip", "dot"];

    #[test]
    fn normalization_is_total_per_backend() {
        for name in NEUTRAL_NAMES {
            assert!(normalize_metric(StoreBackend::Lance, name).is_ok());
            assert!(normalize_metric(StoreBackend::Chroma, name).is_ok());
            assert!(normalize_metric(StoreBackend::Qdrant, name).is_ok());
        }
    }

    #[test]
    fn normalization_is_idempotent_on_native_names() {
        for backend in [StoreBackend::Lance, StoreBackend::Chroma, StoreBackend::Qdrant] {
            for name in NEUTRAL_NAMES {
                let native = normalize_metric(backend, name).unwrap();
                assert_eq!(normalize_metric(backend, &native).unwrap(), native);
            }
        }
    }

    #[test]
    fn normalization_maps_to_documented_spellings() {
        assert_eq!(normalize_metric(StoreBackend::Lance, "euclid").unwrap(), "l2");
        assert_eq!(normalize_metric(StoreBackend::Lance, "ip").unwrap(), "dot");
        assert_eq!(normalize_metric(StoreBackend::Chroma, "dot").unwrap(), "ip");
        assert_eq!(normalize_metric(StoreBackend::Chroma, "euclid").unwrap(), "l2");
        assert_eq!(normalize_metric(StoreBackend::Qdrant, "cosine").unwrap(), "Cosine");
        assert_eq!(normalize_metric(StoreBackend::Qdrant, "l2").unwrap(), "Euclid");
        assert_eq!(normalize_metric(StoreBackend::Qdrant, "ip").unwrap(), "Dot");
    }

    #[test]
    fn normalization_rejects_unknown_names() {
        for backend in [StoreBackend::Lance, StoreBackend::Chroma, StoreBackend::Qdrant] {
            assert!(normalize_metric(backend, "manhattan").is_err());
        }
    }

    #[test]
    fn qdrant_ids_coerce_numeric_like_strings() {
        assert_eq!(
            normalize_qdrant_id(PointId::from("123")),
            PointId::Integer(123)
        );
    }

    #[test]
    fn qdrant_ids_pass_through_integers_and_uuids() {
        assert_eq!(
            normalize_qdrant_id(PointId::Integer(7)),
            PointId::Integer(7)
        );
        let uuid = "550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(
            normalize_qdrant_id(PointId::from(uuid)),
            PointId::String(uuid.to_string())
        );
    }

    #[test]
    fn qdrant_ids_substitute_incompatible_strings() {
        match normalize_qdrant_id(PointId::from("chunk-1")) {
            PointId::Integer(n) => assert!(n > 0),
            other => panic!("Expected generated integer id, got {:?}", other),
        }
    }
}
