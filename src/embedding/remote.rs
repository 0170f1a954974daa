//! HTTP embedding gateways: OpenAI and Ollama.
//!
//! Both make a single request per call and classify the outcome into a
//! [`GatewayError`]; retrying is the caller's job.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::{EmbeddingGateway, GatewayError};
use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Map a non-success HTTP status to a gateway error.
///
/// - 429 → rate limited
/// - 5xx → transient failure
/// - other 4xx → rejected
fn classify_status(provider: &str, status: reqwest::StatusCode, body: String) -> GatewayError {
    let msg = format!("{} API error {}: {}", provider, status, body);
    if status.as_u16() == 429 {
        GatewayError::RateLimited(msg)
    } else if status.is_server_error() {
        GatewayError::Failed(msg)
    } else {
        GatewayError::Rejected(msg)
    }
}

fn build_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

// ============ OpenAI Gateway ============

/// Embedding gateway backed by the OpenAI embeddings API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIGateway {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAIGateway {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| anyhow!("OPENAI_API_KEY not set"))?;

        Ok(Self {
            client: build_client(config)?,
            api_key,
            model,
            dims,
        })
    }
}

#[async_trait]
impl EmbeddingGateway for OpenAIGateway {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, batch: &[String]) -> std::result::Result<Vec<Vec<f32>>, GatewayError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": batch,
            "dimensions": self.dims,
        });

        let response = self
            .client
            .post(OPENAI_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Failed(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status("OpenAI", status, text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Failed(format!("Invalid OpenAI response: {}", e)))?;
        parse_openai_response(&json).map_err(|e| GatewayError::Failed(e.to_string()))
    }
}

/// Parse the OpenAI embeddings response.
///
/// Entries carry an `index` field; vectors are returned sorted by it so the
/// output lines up with the request's input order.
pub(crate) fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);

        indexed.push((index, to_f32_vec(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Gateway ============

/// Embedding gateway using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`).
pub struct OllamaGateway {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
}

impl OllamaGateway {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        Ok(Self {
            client: build_client(config)?,
            model,
            dims,
            url,
        })
    }
}

#[async_trait]
impl EmbeddingGateway for OllamaGateway {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, batch: &[String]) -> std::result::Result<Vec<Vec<f32>>, GatewayError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": batch,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                GatewayError::Failed(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status("Ollama", status, text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Failed(format!("Invalid Ollama response: {}", e)))?;
        parse_ollama_response(&json).map_err(|e| GatewayError::Failed(e.to_string()))
    }
}

pub(crate) fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|item| {
            item.as_array()
                .map(|arr| to_f32_vec(arr))
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}
