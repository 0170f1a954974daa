//! Embedding gateway abstraction, retry policy, and provider selection.
//!
//! The engine only depends on the [`EmbeddingGateway`] contract: a batch of
//! at most [`MAX_BATCH_SIZE`](crate::config::MAX_BATCH_SIZE) texts in, the
//! same number of vectors out, in input order. Concrete gateways:
//!
//! - **[`OpenAIGateway`]**: `POST /v1/embeddings`
//! - **[`OllamaGateway`]**: `POST /api/embed` on a local Ollama
//! - **[`HashGateway`]**: offline, deterministic feature hashing
//! - **[`DisabledGateway`]**: always rejects
//!
//! # Retry Strategy
//!
//! Gateways report one attempt's outcome; [`embed_with_retry`] owns the loop:
//! - [`GatewayError::RateLimited`] and [`GatewayError::Failed`] → retry
//! - [`GatewayError::Rejected`] → fail immediately
//! - Backoff: `base`, `2×base`, `4×base`, … capped at `32×base`

mod hash;
mod remote;

pub use hash::HashGateway;
pub use remote::{OllamaGateway, OpenAIGateway};

use anyhow::bail;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingConfig, MAX_BATCH_SIZE};
use crate::error::{Error, Result};

/// Outcome of a single failed gateway call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// The provider throttled us (HTTP 429). Retryable.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Transient failure: server error or network problem. Retryable.
    #[error("{0}")]
    Failed(String),
    /// The request itself is wrong (bad key, bad model). Not retryable.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GatewayError::Rejected(_))
    }
}

/// Converts text to fixed-length vectors.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed one batch. Implementations make exactly one attempt.
    async fn embed(&self, batch: &[String]) -> std::result::Result<Vec<Vec<f32>>, GatewayError>;
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_ms),
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(5);
        self.base_delay * (1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EmbeddingConfig::default())
    }
}

/// Embed one batch, retrying transient failures with exponential backoff.
///
/// The response is checked to contain one vector per input text. The final
/// error after exhausted retries is mapped to [`Error::RateLimited`] or
/// [`Error::Gateway`].
pub async fn embed_with_retry(
    gateway: &dyn EmbeddingGateway,
    texts: &[String],
    policy: RetryPolicy,
) -> Result<Vec<Vec<f32>>> {
    if texts.len() > MAX_BATCH_SIZE {
        return Err(Error::InvalidInput(format!(
            "embedding batch of {} exceeds the maximum of {}",
            texts.len(),
            MAX_BATCH_SIZE
        )));
    }
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying embedding batch"
            );
            tokio::time::sleep(delay).await;
        }

        match gateway.embed(texts).await {
            Ok(vectors) => {
                if vectors.len() != texts.len() {
                    return Err(Error::Gateway(format!(
                        "gateway returned {} vectors for {} texts",
                        vectors.len(),
                        texts.len()
                    )));
                }
                return Ok(vectors);
            }
            Err(e) if e.is_retryable() => {
                tracing::debug!(error = %e, "embedding attempt failed");
                last_err = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(last_err
        .map(Error::from)
        .unwrap_or_else(|| Error::Gateway("Embedding failed after retries".to_string())))
}

/// Embed a single query text.
pub async fn embed_query(
    gateway: &dyn EmbeddingGateway,
    text: &str,
    policy: RetryPolicy,
) -> Result<Vec<f32>> {
    embed_with_retry(gateway, &[text.to_string()], policy)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Gateway("Empty embedding response".to_string()))
}

// ============ Disabled Gateway ============

/// A gateway that rejects every request.
///
/// Used when `embedding.provider = "disabled"`; keyword search still works.
pub struct DisabledGateway;

#[async_trait]
impl EmbeddingGateway for DisabledGateway {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _batch: &[String]) -> std::result::Result<Vec<Vec<f32>>, GatewayError> {
        Err(GatewayError::Rejected(
            "Embedding provider is disabled. Set [embedding] provider in config.".to_string(),
        ))
    }
}

/// Create the appropriate [`EmbeddingGateway`] based on configuration.
///
/// | Config Value | Gateway |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledGateway`] |
/// | `"openai"` | [`OpenAIGateway`] |
/// | `"ollama"` | [`OllamaGateway`] |
/// | `"hash"` | [`HashGateway`] |
pub fn create_gateway(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingGateway>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGateway)),
        "openai" => Ok(Arc::new(OpenAIGateway::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGateway::new(config)?)),
        "hash" => Ok(Arc::new(HashGateway::new(config.dimension()))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
