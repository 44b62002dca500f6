//! Remote embedding over HTTP (Ollama-compatible `/api/embed`).
//!
//! One request per input text; the embedding dimension comes from
//! configuration and is never introspected from the response.

use std::sync::OnceLock;

use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{Result, StoreError};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Option<Vec<f32>>,
    embeddings: Option<Vec<Vec<f32>>>,
}

fn http_client() -> &'static Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT.get_or_init(Client::new)
}

pub async fn embed(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    let url = format!("{}/api/embed", config.service_url.trim_end_matches('/'));
    let body = EmbedRequest {
        model: &config.model,
        input: text,
    };
    debug!("Requesting embedding from {}", url);

    let parsed: EmbedResponse = http_client()
        .post(&url)
        .json(&body)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    if let Some(embedding) = parsed.embedding {
        return Ok(embedding);
    }
    if let Some(first) = parsed.embeddings.and_then(|vs| vs.into_iter().next()) {
        return Ok(first);
    }
    Err(StoreError::Backend(
        "Embedding service response contained no embedding".to_string(),
    ))
}
