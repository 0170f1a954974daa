//! Keyword, semantic, hybrid and concept search.
//!
//! | Mode | Pipeline |
//! |------|----------|
//! | keyword | lexical BM25 → hydrate |
//! | semantic | embed query → cosine scan of all vectors → top-k → hydrate |
//! | hybrid | lexical top 100 → embed query → lexical top 100 again → cosine over those candidates → top-k → hydrate |
//! | concept | mix/debias concepts → cosine scan → top-k → hydrate |
//!
//! Hybrid never widens beyond the lexical candidates: if BM25 finds nothing,
//! the result is empty and the gateway is not called.
//!
//! Everything after the embed call reads from one SQLite read transaction,
//! so results never mix rows from before and after a concurrent sync commit.
//!
//! Every call returns a [`SearchTrace`] whose stage counts are the sizes of
//! the sets actually produced.

use futures::TryStreamExt;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;

use crate::concepts::{ConceptAlgebra, ConceptMix};
use crate::config::MAX_RESULT_LIMIT;
use crate::content_store;
use crate::context::Context;
use crate::embedding::embed_query;
use crate::error::{Error, Result};
use crate::lexical;
use crate::models::{RankInputs, SearchResponse, SearchResult, SearchTrace, TraceStage};
use crate::vector::{cosine_similarity, rank_by_score};

/// Lexical candidates considered by hybrid search.
pub const HYBRID_CANDIDATES: usize = 100;

/// Characters of context on each side of a matched term.
const SNIPPET_CONTEXT_CHARS: usize = 150;

/// Snippet length when no query term is found.
const SNIPPET_DEFAULT_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SearchMode {
    Keyword,
    Semantic,
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keyword" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(Error::InvalidInput(format!(
                "Unknown search mode: {}. Use keyword, semantic, or hybrid.",
                other
            ))),
        }
    }
}

/// Clamp a requested result count to `1..=100`.
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_RESULT_LIMIT)
}

/// Collects trace stages and the elapsed time for one search.
struct Tracer {
    mode: &'static str,
    stages: Vec<TraceStage>,
    started: Instant,
}

impl Tracer {
    fn new(mode: &'static str) -> Self {
        Self {
            mode,
            stages: Vec::new(),
            started: Instant::now(),
        }
    }

    fn stage(&mut self, name: &str, count: usize) {
        self.stages.push(TraceStage {
            name: name.to_string(),
            count,
        });
    }

    fn finish(self, results: Vec<SearchResult>) -> SearchResponse {
        let trace = SearchTrace {
            mode: self.mode.to_string(),
            stages: self.stages,
            elapsed_ms: self.started.elapsed().as_secs_f64() * 1000.0,
        };
        tracing::debug!(
            mode = %trace.mode,
            results = results.len(),
            elapsed_ms = trace.elapsed_ms,
            "search finished"
        );
        SearchResponse { results, trace }
    }
}

/// A scored id on its way to becoming a [`SearchResult`].
struct Scored {
    id: String,
    score: f64,
    inputs: RankInputs,
}

#[derive(Clone)]
pub struct SearchEngine {
    ctx: Context,
}

impl SearchEngine {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub async fn search(
        &self,
        query: &str,
        mode: SearchMode,
        limit: usize,
    ) -> Result<SearchResponse> {
        match mode {
            SearchMode::Keyword => self.keyword(query, limit).await,
            SearchMode::Semantic => self.semantic(query, limit).await,
            SearchMode::Hybrid => self.hybrid(query, limit).await,
        }
    }

    /// BM25 ranking over titles and content.
    pub async fn keyword(&self, query: &str, limit: usize) -> Result<SearchResponse> {
        let limit = clamp_limit(limit);
        let mut tracer = Tracer::new("keyword");

        let mut tx = self.ctx.pool.begin().await?;
        let hits = lexical::query(&mut *tx, query, limit).await?;
        tracer.stage("lexical", hits.len());

        let scored = hits
            .into_iter()
            .map(|(id, bm25)| Scored {
                id,
                score: bm25,
                inputs: RankInputs {
                    bm25: Some(bm25),
                    semantic: None,
                },
            })
            .collect();

        let results = hydrate(&mut tx, scored, Some(query)).await?;
        tracer.stage("hydrate", results.len());
        tx.commit().await?;
        Ok(tracer.finish(results))
    }

    /// Cosine similarity between the query embedding and every document.
    pub async fn semantic(&self, query: &str, limit: usize) -> Result<SearchResponse> {
        let limit = clamp_limit(limit);
        let mut tracer = Tracer::new("semantic");

        if query.trim().is_empty() {
            tracer.stage("embed_query", 0);
            return Ok(tracer.finish(Vec::new()));
        }

        let qv = embed_query(self.ctx.gateway.as_ref(), query, self.ctx.retry).await?;
        tracer.stage("embed_query", 1);

        let results = self.scan_and_hydrate(&qv, limit, None, &mut tracer).await?;
        Ok(tracer.finish(results))
    }

    /// Lexical candidates re-ranked by semantic similarity.
    ///
    /// The first lexical pass only decides whether the gateway is called.
    /// Candidates, their vectors and their rows are then read again from
    /// one snapshot taken after the query is embedded, so a sync that
    /// commits in between is either wholly visible or not at all.
    pub async fn hybrid(&self, query: &str, limit: usize) -> Result<SearchResponse> {
        let limit = clamp_limit(limit);
        let mut tracer = Tracer::new("hybrid");

        let first_pass = lexical::query(&self.ctx.pool, query, HYBRID_CANDIDATES).await?;
        tracer.stage("lexical", first_pass.len());
        if first_pass.is_empty() {
            return Ok(tracer.finish(Vec::new()));
        }

        let qv = embed_query(self.ctx.gateway.as_ref(), query, self.ctx.retry).await?;
        tracer.stage("embed_query", 1);

        let mut tx = self.ctx.pool.begin().await?;
        let candidates = lexical::query(&mut *tx, query, HYBRID_CANDIDATES).await?;
        tracer.stage("candidates", candidates.len());
        if candidates.is_empty() {
            tx.commit().await?;
            return Ok(tracer.finish(Vec::new()));
        }

        let ids: Vec<String> = candidates.iter().map(|(id, _)| id.clone()).collect();
        let vectors = self.ctx.vectors.documents_for(&mut tx, &ids).await?;
        tracer.stage("candidate_vectors", vectors.len());

        let bm25: HashMap<String, f64> = candidates.into_iter().collect();
        let similarities: Vec<(String, f32)> = vectors
            .iter()
            .map(|(id, v)| (id.clone(), cosine_similarity(&qv, v)))
            .collect();
        let ranked = rank_by_score(similarities, limit);
        tracer.stage("rerank", ranked.len());

        let scored = ranked
            .into_iter()
            .map(|(id, sim)| Scored {
                score: sim as f64,
                inputs: RankInputs {
                    bm25: bm25.get(&id).copied(),
                    semantic: Some(sim),
                },
                id,
            })
            .collect();

        let results = hydrate(&mut tx, scored, Some(query)).await?;
        tracer.stage("hydrate", results.len());
        tx.commit().await?;
        Ok(tracer.finish(results))
    }

    /// Top `limit` document ids by cosine similarity to `vector`, ties by
    /// id ascending.
    ///
    /// A linear scan over every stored vector.
    pub async fn vector_search(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(String, f32)>> {
        let mut conn = self.ctx.pool.acquire().await?;
        let (ranked, _) = self.scan(&mut conn, vector, limit).await?;
        Ok(ranked)
    }

    /// Rank documents against a weighted mix of stored concepts.
    pub async fn concept_search(
        &self,
        mix: &ConceptMix,
        limit: usize,
    ) -> Result<SearchResponse> {
        let limit = clamp_limit(limit);
        let mut tracer = Tracer::new("concept_mix");

        let qv = ConceptAlgebra::new(self.ctx.clone()).mix(mix).await?;
        tracer.stage("concepts", mix.len());

        let results = self.scan_and_hydrate(&qv, limit, None, &mut tracer).await?;
        Ok(tracer.finish(results))
    }

    /// Rank documents against `main` with the `remove` direction taken out.
    pub async fn debias_search(
        &self,
        main: &str,
        remove: &str,
        limit: usize,
    ) -> Result<SearchResponse> {
        let limit = clamp_limit(limit);
        let mut tracer = Tracer::new("debias");

        let qv = ConceptAlgebra::new(self.ctx.clone())
            .debias(main, remove)
            .await?;
        tracer.stage("concepts", 2);

        let results = self.scan_and_hydrate(&qv, limit, None, &mut tracer).await?;
        Ok(tracer.finish(results))
    }

    /// Cosine against every stored vector. Returns the top `limit` and the
    /// number of vectors scanned.
    async fn scan(
        &self,
        conn: &mut SqliteConnection,
        vector: &[f32],
        limit: usize,
    ) -> Result<(Vec<(String, f32)>, usize)> {
        let expected = self.ctx.vectors.dims();
        if vector.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<(String, f32)> = Vec::new();
        let mut stream = self.ctx.vectors.documents(&mut *conn);
        while let Some((id, v)) = stream.try_next().await? {
            scored.push((id, cosine_similarity(vector, &v)));
        }
        let scanned = scored.len();
        Ok((rank_by_score(scored, limit), scanned))
    }

    /// Scan and hydrate inside one read transaction. `vector` must already
    /// be computed so no snapshot is held across a gateway call.
    async fn scan_and_hydrate(
        &self,
        vector: &[f32],
        limit: usize,
        query: Option<&str>,
        tracer: &mut Tracer,
    ) -> Result<Vec<SearchResult>> {
        let mut tx = self.ctx.pool.begin().await?;
        let (ranked, scanned) = self.scan(&mut tx, vector, limit).await?;
        tracer.stage("vector_scan", scanned);
        tracer.stage("top_k", ranked.len());

        let scored = ranked
            .into_iter()
            .map(|(id, sim)| Scored {
                id,
                score: sim as f64,
                inputs: RankInputs {
                    bm25: None,
                    semantic: Some(sim),
                },
            })
            .collect();

        let results = hydrate(&mut tx, scored, query).await?;
        tracer.stage("hydrate", results.len());
        tx.commit().await?;
        Ok(results)
    }
}

/// Attach document rows, keeping order. Ids with no row in this snapshot
/// are dropped.
async fn hydrate(
    conn: &mut SqliteConnection,
    scored: Vec<Scored>,
    query: Option<&str>,
) -> Result<Vec<SearchResult>> {
    let ids: Vec<String> = scored.iter().map(|s| s.id.clone()).collect();
    let mut docs = content_store::get_many(conn, &ids).await?;
    let terms = query.map(lexical::tokenize).unwrap_or_default();

    Ok(scored
        .into_iter()
        .filter_map(|s| {
            let doc = docs.remove(&s.id)?;
            Some(SearchResult {
                snippet: snippet(&doc.content, &terms),
                document_id: doc.id,
                title: doc.title,
                path: doc.path,
                score: s.score,
                word_count: doc.word_count,
                modified_at: doc.modified_at,
                rank_inputs: s.inputs,
            })
        })
        .collect())
}

/// Up to 150 characters either side of the first query term, or the first
/// 300 characters when no term occurs. Elisions are marked with `...`.
///
/// Terms are expected lowercase, as [`lexical::tokenize`] produces them.
pub fn snippet(content: &str, terms: &[String]) -> String {
    let content = content.trim();
    let total = content.chars().count();

    let first_hit = terms
        .iter()
        .filter_map(|t| find_lowercase(content, t))
        .min();

    let (start, end) = match first_hit {
        Some(byte_pos) => {
            let at = content[..byte_pos].chars().count();
            (
                at.saturating_sub(SNIPPET_CONTEXT_CHARS),
                (at + SNIPPET_CONTEXT_CHARS).min(total),
            )
        }
        None => (0, SNIPPET_DEFAULT_CHARS.min(total)),
    };

    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.extend(content.chars().skip(start).take(end - start));
    if end < total {
        out.push_str("...");
    }
    out
}

/// Byte offset of the first place where `haystack`, lowercased char by
/// char, starts with the lowercase `needle`.
fn find_lowercase(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.char_indices().map(|(i, _)| i).find(|&i| {
        let mut rest = haystack[i..].chars().flat_map(char::to_lowercase);
        needle.chars().all(|n| rest.next() == Some(n))
    })
}

/// CLI entry point for `search`.
pub async fn run_search(
    ctx: &Context,
    query: &str,
    mode: SearchMode,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    if matches!(mode, SearchMode::Semantic | SearchMode::Hybrid) && !ctx.embeddings_enabled() {
        anyhow::bail!(
            "Mode '{}' requires embeddings. Set [embedding] provider in config.",
            mode.as_str()
        );
    }

    let limit = limit.unwrap_or(ctx.config.retrieval.default_limit);
    let response = SearchEngine::new(ctx.clone())
        .search(query, mode, limit)
        .await?;
    print_response(&response, json)
}

/// Print search results, human-readable or as JSON.
pub fn print_response(response: &SearchResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    if response.results.is_empty() {
        println!("No results.");
    }

    for (i, result) in response.results.iter().enumerate() {
        let date = chrono::DateTime::from_timestamp(result.modified_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        println!("{}. [{:.3}] {}", i + 1, result.score, result.title);
        println!("    path: {}", result.path);
        println!("    modified: {}", date);
        println!(
            "    excerpt: \"{}\"",
            result.snippet.replace('\n', " ").trim()
        );
        println!("    id: {}", result.document_id);
        println!();
    }

    let stages: Vec<String> = response
        .trace
        .stages
        .iter()
        .map(|s| format!("{}={}", s.name, s.count))
        .collect();
    eprintln!(
        "trace: {} [{}] {:.1} ms",
        response.trace.mode,
        stages.join(" "),
        response.trace.elapsed_ms
    );
    Ok(())
}
