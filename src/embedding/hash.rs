//! Offline embedding via feature hashing.
//!
//! Each lowercase token is hashed with SHA-256 into one of `dims` buckets
//! with a ±1 sign, then the vector is L2-normalized. Texts sharing words get
//! positive cosine similarity. Deterministic across runs and machines, which
//! makes it the provider of choice for tests and air-gapped setups.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{EmbeddingGateway, GatewayError};
use crate::lexical::tokenize;

pub struct HashGateway {
    dims: usize,
}

impl HashGateway {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    /// Embed a single text. Returns the zero vector for text without tokens.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        if self.dims == 0 {
            return v;
        }

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingGateway for HashGateway {
    fn model_name(&self) -> &str {
        "feature-hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, batch: &[String]) -> std::result::Result<Vec<Vec<f32>>, GatewayError> {
        Ok(batch.iter().map(|t| self.embed_text(t)).collect())
    }
}
