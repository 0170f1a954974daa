//! Shared engine state passed explicitly to every component.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_gateway, EmbeddingGateway, RetryPolicy};
use crate::extract::{FileExtractor, TextExtractor};
use crate::locks::DocLocks;
use crate::migrate;
use crate::vector_store::VectorStore;

/// Everything the indexer, search engine and concept algebra need.
///
/// Cheap to clone; all members are shared handles.
#[derive(Clone)]
pub struct Context {
    pub pool: SqlitePool,
    pub vectors: Arc<VectorStore>,
    pub gateway: Arc<dyn EmbeddingGateway>,
    pub extractor: Arc<dyn TextExtractor>,
    pub retry: RetryPolicy,
    pub locks: Arc<DocLocks>,
    pub config: Arc<Config>,
}

impl Context {
    /// Connect, migrate, and build the configured gateway.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate(&pool).await?;
        let gateway = create_gateway(&config.embedding)?;
        Ok(Self::new(pool, gateway, config.clone()))
    }

    /// Assemble a context from parts, e.g. with a test gateway.
    pub fn new(pool: SqlitePool, gateway: Arc<dyn EmbeddingGateway>, config: Config) -> Self {
        let dims = config.embedding.dimension();
        Self {
            vectors: Arc::new(VectorStore::new(pool.clone(), dims)),
            pool,
            gateway,
            extractor: Arc::new(FileExtractor),
            retry: RetryPolicy::from_config(&config.embedding),
            locks: Arc::new(DocLocks::new()),
            config: Arc::new(config),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Whether documents get vectors on ingest.
    pub fn embeddings_enabled(&self) -> bool {
        self.config.embedding.is_enabled()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
