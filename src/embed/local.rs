//! Local in-process embedding via fastembed.
//!
//! The inference pipeline is constructed lazily and cached process-wide, so
//! the model-load cost is paid once and shared by subsequent calls. A model
//! change in configuration replaces the cached pipeline on the next call.
//!
//! `fastembed::TextEmbedding` is not `Sync`, so the pipeline lives behind
//! `Arc<Mutex<…>>` and inference runs in `spawn_blocking`.

use std::sync::{Arc, Mutex, OnceLock};

use log::info;

use crate::config::EmbeddingConfig;
use crate::error::{Result, StoreError};

/// Output width for models with a known fixed width. Everything else falls
/// back to the configured dimension.
pub fn model_dimension(model: &str) -> Option<usize> {
    match model {
        "all-minilm-l6-v2" | "AllMiniLML6V2" => Some(384),
        _ => None,
    }
}

fn resolve_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" | "AllMiniLML6V2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" | "BGESmallENV15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "BGEBaseENV15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" | "BGELargeENV15" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        other => Err(StoreError::Config(format!(
            "Unknown embedding model: '{}'. Supported: all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5",
            other
        ))),
    }
}

type SharedPipeline = Arc<Mutex<fastembed::TextEmbedding>>;

static PIPELINE: OnceLock<Mutex<Option<(String, SharedPipeline)>>> = OnceLock::new();

fn pipeline_slot() -> &'static Mutex<Option<(String, SharedPipeline)>> {
    PIPELINE.get_or_init(|| Mutex::new(None))
}

/// Get or build the cached pipeline for the configured model.
async fn pipeline(config: &EmbeddingConfig) -> Result<SharedPipeline> {
    {
        let slot = pipeline_slot()
            .lock()
            .map_err(|e| StoreError::Backend(format!("Pipeline cache poisoned: {}", e)))?;
        if let Some((cached_model, cached)) = slot.as_ref() {
            if cached_model == &config.model {
                return Ok(cached.clone());
            }
        }
    }

    // Model load is slow; build outside the cache lock.
    let model_enum = resolve_model(&config.model)?;
    let model_name = config.model.clone();
    let cache_dir = config.cache_dir.clone();
    info!("Loading embedding model '{}'", model_name);

    let built = tokio::task::spawn_blocking(move || {
        let mut init = fastembed::InitOptions::new(model_enum);
        if let Some(dir) = cache_dir {
            init = init.with_cache_dir(std::path::PathBuf::from(dir));
        }
        fastembed::TextEmbedding::try_new(init)
    })
    .await
    .map_err(|e| StoreError::Backend(format!("Embedding init task failed: {}", e)))?
    .map_err(|e| StoreError::Backend(format!("Failed to initialize embedding model: {}", e)))?;

    let shared = Arc::new(Mutex::new(built));
    let mut slot = pipeline_slot()
        .lock()
        .map_err(|e| StoreError::Backend(format!("Pipeline cache poisoned: {}", e)))?;
    *slot = Some((model_name, shared.clone()));
    Ok(shared)
}

pub async fn embed(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    let pipeline = pipeline(config).await?;
    let text = text.to_string();

    tokio::task::spawn_blocking(move || {
        let mut model = pipeline
            .lock()
            .map_err(|e| StoreError::Backend(format!("Pipeline mutex poisoned: {}", e)))?;
        let results = model
            .embed(vec![text], None)
            .map_err(|e| StoreError::Backend(format!("Embedding failed: {}", e)))?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("No embedding returned".to_string()))
    })
    .await
    .map_err(|e| StoreError::Backend(format!("Embedding task failed: {}", e)))?
}
