//! Durable document and concept vectors.
//!
//! Document vectors live in `embeddings` (one row per document, replaced on
//! re-ingest). Concept vectors live in `concept_vectors` and are mirrored in
//! an in-memory cache, loaded on first access and kept current by every
//! concept write that goes through this store.
//!
//! Vectors are stored exactly as the gateway returned them; callers
//! normalize at use.

use futures::stream::{BoxStream, StreamExt};
use sqlx::{Executor, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::ConceptInfo;
use crate::vector::{blob_to_vec, vec_to_blob};

type ConceptCache = HashMap<String, Arc<Vec<f32>>>;

pub struct VectorStore {
    pool: SqlitePool,
    dims: usize,
    concepts: RwLock<Option<ConceptCache>>,
}

impl VectorStore {
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self {
            pool,
            dims,
            concepts: RwLock::new(None),
        }
    }

    /// The dimension every stored vector must have.
    pub fn dims(&self) -> usize {
        self.dims
    }

    fn check_dims(&self, v: &[f32]) -> Result<()> {
        if v.len() != self.dims {
            return Err(Error::DimensionMismatch {
                expected: self.dims,
                actual: v.len(),
            });
        }
        Ok(())
    }

    fn decode(&self, blob: &[u8]) -> Result<Vec<f32>> {
        if blob.len() != self.dims * 4 {
            return Err(Error::DimensionMismatch {
                expected: self.dims,
                actual: blob.len() / 4,
            });
        }
        Ok(blob_to_vec(blob))
    }

    // ============ Document vectors ============

    /// Insert or replace a document's vector inside the caller's transaction.
    pub async fn put_document(
        &self,
        conn: &mut SqliteConnection,
        document_id: &str,
        v: &[f32],
    ) -> Result<()> {
        self.check_dims(v)?;
        sqlx::query(
            r#"
            INSERT INTO embeddings (document_id, dims, embedding)
            VALUES (?, ?, ?)
            ON CONFLICT(document_id) DO UPDATE SET
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
        )
        .bind(document_id)
        .bind(v.len() as i64)
        .bind(vec_to_blob(v))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Vec<f32>> {
        let blob: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT embedding FROM embeddings WHERE document_id = ?")
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await?;

        match blob {
            Some(blob) => self.decode(&blob),
            None => Err(Error::NotFound(format!("embedding for {}", document_id))),
        }
    }

    pub async fn delete_document(
        &self,
        conn: &mut SqliteConnection,
        document_id: &str,
    ) -> Result<()> {
        sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Lazily stream every `(document_id, vector)` pair read through
    /// `executor`.
    pub fn documents<'a, E>(&'a self, executor: E) -> BoxStream<'a, Result<(String, Vec<f32>)>>
    where
        E: Executor<'a, Database = Sqlite> + 'a,
    {
        sqlx::query("SELECT document_id, embedding FROM embeddings")
            .fetch(executor)
            .map(move |row| {
                let row = row?;
                let id: String = row.get("document_id");
                let blob: Vec<u8> = row.get("embedding");
                Ok((id, self.decode(&blob)?))
            })
            .boxed()
    }

    /// Vectors for exactly the given ids. Ids without a vector are absent
    /// from the map.
    pub async fn documents_for(
        &self,
        conn: &mut SqliteConnection,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<f32>>> {
        let mut out = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT document_id, embedding FROM embeddings WHERE document_id IN ({})",
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            for row in query.fetch_all(&mut *conn).await? {
                let blob: Vec<u8> = row.get("embedding");
                out.insert(row.get("document_id"), self.decode(&blob)?);
            }
        }
        Ok(out)
    }

    pub async fn document_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?)
    }

    // ============ Concept vectors ============

    async fn load_concepts(&self) -> Result<ConceptCache> {
        let rows = sqlx::query("SELECT name, embedding FROM concept_vectors")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                (row.get("name"), Arc::new(blob_to_vec(&blob)))
            })
            .collect())
    }

    /// Run `f` against the loaded cache, loading it first if needed.
    async fn with_cache<T>(&self, f: impl FnOnce(&ConceptCache) -> T) -> Result<T> {
        {
            let guard = self.concepts.read().await;
            if let Some(cache) = guard.as_ref() {
                return Ok(f(cache));
            }
        }

        let mut guard = self.concepts.write().await;
        if guard.is_none() {
            *guard = Some(self.load_concepts().await?);
            tracing::debug!("concept cache loaded");
        }
        Ok(f(guard.as_ref().map_or(&HashMap::new(), |c| c)))
    }

    /// Upsert a concept. Last write wins.
    pub async fn put_concept(&self, name: &str, v: &[f32], source_text: &str) -> Result<()> {
        self.check_dims(v)?;

        // Writers hold the cache lock across the DB write so cache and table
        // never disagree.
        let mut guard = self.concepts.write().await;
        sqlx::query(
            r#"
            INSERT INTO concept_vectors (name, dims, embedding, source_text, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                dims = excluded.dims,
                embedding = excluded.embedding,
                source_text = excluded.source_text,
                created_at = excluded.created_at
            "#,
        )
        .bind(name)
        .bind(v.len() as i64)
        .bind(vec_to_blob(v))
        .bind(source_text)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        if let Some(cache) = guard.as_mut() {
            cache.insert(name.to_string(), Arc::new(v.to_vec()));
        }
        Ok(())
    }

    pub async fn get_concept(&self, name: &str) -> Result<Arc<Vec<f32>>> {
        let found = self.with_cache(|cache| cache.get(name).cloned()).await?;
        let v = found.ok_or_else(|| Error::NotFound(format!("concept {}", name)))?;
        self.check_dims(&v)?;
        Ok(v)
    }

    /// Delete a concept; [`Error::NotFound`] if it does not exist.
    pub async fn delete_concept(&self, name: &str) -> Result<()> {
        let mut guard = self.concepts.write().await;
        let result = sqlx::query("DELETE FROM concept_vectors WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        if let Some(cache) = guard.as_mut() {
            cache.remove(name);
        }
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("concept {}", name)));
        }
        Ok(())
    }

    pub async fn list_concepts(&self) -> Result<Vec<ConceptInfo>> {
        let rows = sqlx::query(
            "SELECT name, source_text, created_at FROM concept_vectors ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ConceptInfo {
                name: row.get("name"),
                source_text: row.get("source_text"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    pub async fn concept_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM concept_vectors")
            .fetch_one(&self.pool)
            .await?)
    }
}
