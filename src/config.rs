use std::env;

use crate::error::{Result, StoreError};

/// Active vector store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Embedded file-based store (LanceDB).
    Lance,
    /// Simple client-server store (Chroma over HTTP).
    Chroma,
    /// Production client-server store (Qdrant over gRPC).
    Qdrant,
}

pub fn get_store_backend(type_str: &str) -> Result<StoreBackend> {
    match type_str.to_lowercase().as_str() {
        "lance" | "lancedb" => Ok(StoreBackend::Lance),
        "chroma" | "chromadb" => Ok(StoreBackend::Chroma),
        "qdrant" => Ok(StoreBackend::Qdrant),
        other => Err(StoreError::Config(format!(
            "Unsupported vector store backend: {}",
            other
        ))),
    }
}

/// Connection settings for the vector store.
///
/// Threaded into every call as an explicit value; [`StoreConfig::from_env`]
/// is the only place the process environment is consulted, so callers that
/// rebuild the config between calls observe configuration changes on the
/// next call.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Data directory for the embedded backend.
    pub db_path: String,
    /// HTTP endpoint of the simple backend.
    pub chroma_url: String,
    pub chroma_tenant: Option<String>,
    pub chroma_database: Option<String>,
    /// gRPC endpoint of the production backend.
    pub qdrant_url: String,
    pub api_key: Option<String>,
    pub user: Option<String>,
    pub pass: Option<String>,
    /// Backend-neutral default distance-metric name.
    pub distance_metric: String,
}

impl StoreConfig {
    /// Defaults for an embedded store rooted at `db_path`.
    pub fn for_lance(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::defaults(StoreBackend::Lance)
        }
    }

    /// Defaults for a simple client-server store at `url`.
    pub fn for_chroma(url: impl Into<String>) -> Self {
        Self {
            chroma_url: url.into(),
            ..Self::defaults(StoreBackend::Chroma)
        }
    }

    /// Defaults for a production client-server store at `url`.
    pub fn for_qdrant(url: impl Into<String>) -> Self {
        Self {
            qdrant_url: url.into(),
            ..Self::defaults(StoreBackend::Qdrant)
        }
    }

    fn defaults(backend: StoreBackend) -> Self {
        Self {
            backend,
            db_path: "./data/lancedb".to_string(),
            chroma_url: "http://localhost:8000".to_string(),
            chroma_tenant: None,
            chroma_database: None,
            qdrant_url: "http://localhost:6334".to_string(),
            api_key: None,
            user: None,
            pass: None,
            distance_metric: "cosine".to_string(),
        }
    }

    /// Read the store configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let backend = get_store_backend(&env_or("VECTOR_STORE_BACKEND", "lancedb"))?;
        Ok(Self {
            backend,
            db_path: env_or("VECTOR_DB_PATH", "./data/lancedb"),
            chroma_url: env_or("CHROMA_URL", "http://localhost:8000"),
            chroma_tenant: env_opt("CHROMA_TENANT"),
            chroma_database: env_opt("CHROMA_DATABASE"),
            qdrant_url: env_or("QDRANT_URL", "http://localhost:6334"),
            api_key: env_opt("VECTOR_STORE_API_KEY"),
            user: env_opt("VECTOR_STORE_USER"),
            pass: env_opt("VECTOR_STORE_PASS"),
            distance_metric: env_or("VECTOR_DISTANCE_METRIC", "cosine"),
        })
    }

    /// Check that the fields the active backend needs are present.
    pub fn validate(&self) -> Result<()> {
        let missing = match self.backend {
            StoreBackend::Lance => self.db_path.trim().is_empty().then_some("db_path"),
            StoreBackend::Chroma => self.chroma_url.trim().is_empty().then_some("chroma_url"),
            StoreBackend::Qdrant => self.qdrant_url.trim().is_empty().then_some("qdrant_url"),
        };
        match missing {
            Some(field) => Err(StoreError::Config(format!("{} is empty", field))),
            None => Ok(()),
        }
    }
}

/// Which embedding provider serves a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    /// In-process model (fastembed pipeline).
    Local,
    /// HTTP service speaking the Ollama embed API.
    Remote,
}

pub fn get_embedding_provider(type_str: &str) -> Result<EmbeddingProviderKind> {
    match type_str.to_lowercase().as_str() {
        "local" => Ok(EmbeddingProviderKind::Local),
        "remote" | "ollama" => Ok(EmbeddingProviderKind::Remote),
        other => Err(StoreError::Config(format!(
            "Unsupported embedding provider: {}",
            other
        ))),
    }
}

/// Settings for embedding generation, resolved on every call.
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    /// Fallback vector width when the model is not in the known-model table,
    /// and the only width source for the remote provider.
    pub dimension: usize,
    /// Endpoint of the remote embedding service.
    pub service_url: String,
    /// Model file cache directory for the local provider.
    pub cache_dir: Option<String>,
}

impl EmbeddingConfig {
    pub fn for_local(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            provider: EmbeddingProviderKind::Local,
            model: model.into(),
            dimension,
            service_url: "http://localhost:11434".to_string(),
            cache_dir: None,
        }
    }

    pub fn for_remote(url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            provider: EmbeddingProviderKind::Remote,
            model: model.into(),
            dimension,
            service_url: url.into(),
            cache_dir: None,
        }
    }

    /// Read the embedding configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let provider = get_embedding_provider(&env_or("EMBEDDING_PROVIDER", "local"))?;
        let dimension_raw = env_or("EMBEDDING_DIMENSION", "384");
        let dimension = dimension_raw.parse::<usize>().map_err(|_| {
            StoreError::Config(format!("Invalid EMBEDDING_DIMENSION: {}", dimension_raw))
        })?;
        Ok(Self {
            provider,
            model: env_or("EMBEDDING_MODEL", "all-minilm-l6-v2"),
            dimension,
            service_url: env_or("EMBEDDING_SERVICE_URL", "http://localhost:11434"),
            cache_dir: env_opt("EMBEDDING_CACHE_DIR"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
