//! Core data models.
//!
//! These are the plain values that cross the boundary to the presentation
//! layer (CLI output, JSON). None of them hold database handles.

use serde::Serialize;

use crate::error::ErrorKind;

/// A document stored in the content store.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub title: String,
    pub content: String,
    pub word_count: i64,
    pub fingerprint: String,
    pub created_at: i64,
    pub modified_at: i64,
}

/// Document row without its content, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub path: String,
    pub title: String,
    pub word_count: i64,
    pub created_at: i64,
    pub modified_at: i64,
}

/// A stored concept vector, without the vector itself.
#[derive(Debug, Clone, Serialize)]
pub struct ConceptInfo {
    pub name: String,
    pub source_text: String,
    pub created_at: i64,
}

/// The raw signals a result was ranked on.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RankInputs {
    /// BM25 score (higher is better) when the result came through the
    /// lexical index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25: Option<f64>,
    /// Cosine similarity to the query vector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document_id: String,
    pub title: String,
    pub path: String,
    pub snippet: String,
    pub score: f64,
    pub word_count: i64,
    pub modified_at: i64,
    pub rank_inputs: RankInputs,
}

/// One step of a search pipeline and the size of the set it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceStage {
    pub name: String,
    pub count: usize,
}

/// What a search did, for observability.
#[derive(Debug, Clone, Serialize)]
pub struct SearchTrace {
    pub mode: String,
    pub stages: Vec<TraceStage>,
    pub elapsed_ms: f64,
}

impl SearchTrace {
    /// Count recorded for the named stage, if that stage ran.
    pub fn stage(&self, name: &str) -> Option<usize> {
        self.stages.iter().find(|s| s.name == name).map(|s| s.count)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub trace: SearchTrace,
}

/// A file that could not be indexed during a sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub path: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Candidate files discovered under the root.
    pub total: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub errors: Vec<SyncFailure>,
    /// True when the run was stopped before visiting every file.
    pub cancelled: bool,
}

impl SyncReport {
    /// Files visited so far (successful or not).
    pub fn processed(&self) -> usize {
        self.added + self.updated + self.unchanged + self.errors.len()
    }
}

/// Result of a dry-run sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub candidates: usize,
    pub total_bytes: u64,
    pub estimated_tokens: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub document_count: i64,
    pub embedding_count: i64,
    pub concept_count: i64,
    pub last_sync: Option<i64>,
    pub database_size_bytes: u64,
}
