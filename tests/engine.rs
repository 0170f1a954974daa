//! End-to-end tests of the library: sync, search and concept algebra against
//! a real SQLite database in a temp directory, with an in-process gateway.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::TempDir;

use concept_search::concepts::{ConceptAlgebra, ConceptMix};
use concept_search::config::Config;
use concept_search::content_store;
use concept_search::context::Context;
use concept_search::db;
use concept_search::embedding::{EmbeddingGateway, GatewayError, HashGateway, RetryPolicy};
use concept_search::error::{Error, ErrorKind};
use concept_search::get::list_documents;
use concept_search::indexer::{remove_document, Indexer};
use concept_search::lexical;
use concept_search::migrate::migrate;
use concept_search::progress::{ChannelProgress, SyncProgressEvent};
use concept_search::search::SearchEngine;
use concept_search::stats::collect_stats;
use concept_search::vector::{dot, l2_norm, normalize};

const DIMS: usize = 64;

/// Feature-hashing gateway that counts calls and can be told to fail.
struct TestGateway {
    inner: HashGateway,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl TestGateway {
    fn new(output_dims: usize) -> Self {
        Self {
            inner: HashGateway::new(output_dims),
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
        }
    }

    fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingGateway for TestGateway {
    fn model_name(&self) -> &str {
        "test"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(GatewayError::RateLimited("slow down".to_string()));
        }
        Ok(batch.iter().map(|t| self.inner.embed_text(t)).collect())
    }
}

/// Gateway that, on its first call after being armed, rewrites a file and
/// syncs it before answering. Lets a test land a commit inside a search.
struct RewritingGateway {
    inner: HashGateway,
    ctx: OnceLock<Context>,
    root: PathBuf,
    target: PathBuf,
    replacement: &'static str,
    armed: AtomicBool,
}

#[async_trait]
impl EmbeddingGateway for RewritingGateway {
    fn model_name(&self) -> &str {
        "rewriting"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            fs::write(&self.target, self.replacement).unwrap();
            let ctx = self.ctx.get().unwrap().clone();
            let report = Indexer::new(ctx)
                .sync(&self.root, &AtomicBool::new(false))
                .await
                .unwrap();
            assert_eq!(report.updated, 1);
        }
        Ok(batch.iter().map(|t| self.inner.embed_text(t)).collect())
    }
}

struct Env {
    _tmp: TempDir,
    docs: PathBuf,
    ctx: Context,
    gateway: Arc<TestGateway>,
}

fn test_config(tmp: &Path, docs: &Path, batch_size: usize) -> Config {
    let mut config = Config::minimal(tmp.join("data/search.sqlite"));
    config.index.root = docs.to_path_buf();
    config.embedding.provider = "hash".to_string();
    config.embedding.dims = Some(DIMS);
    config.embedding.batch_size = batch_size;
    config
}

async fn setup_with(output_dims: usize, batch_size: usize) -> Env {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();

    let config = test_config(tmp.path(), &docs, batch_size);
    let pool = db::connect(&config).await.unwrap();
    migrate(&pool).await.unwrap();

    let gateway = Arc::new(TestGateway::new(output_dims));
    let ctx = Context::new(pool, gateway.clone(), config).with_retry(RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
    });

    Env {
        _tmp: tmp,
        docs,
        ctx,
        gateway,
    }
}

async fn setup() -> Env {
    setup_with(DIMS, 100).await
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

async fn sync(env: &Env) -> concept_search::models::SyncReport {
    Indexer::new(env.ctx.clone())
        .sync(&env.docs, &AtomicBool::new(false))
        .await
        .unwrap()
}

async fn doc_id_for(env: &Env, name: &str) -> String {
    let path = env.docs.canonicalize().unwrap().join(name);
    content_store::get_by_path(&env.ctx.pool, &path.to_string_lossy())
        .await
        .unwrap()
        .unwrap()
        .id
}

// ============ Indexer ============

#[tokio::test]
async fn add_update_remove_scenario() {
    let env = setup().await;
    write(&env.docs, "a.txt", "alpha apples orchard");
    write(&env.docs, "b.txt", "beta bananas plantation");

    let report = sync(&env).await;
    assert_eq!(report.total, 2);
    assert_eq!(report.added, 2);
    assert!(report.errors.is_empty());

    let a_id = doc_id_for(&env, "a.txt").await;

    write(&env.docs, "a.txt", "alpha apricots orchard");
    let report = sync(&env).await;
    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.added, 0);
    assert_eq!(doc_id_for(&env, "a.txt").await, a_id, "id survives re-ingest");

    fs::remove_file(env.docs.join("b.txt")).unwrap();
    let report = sync(&env).await;
    assert_eq!(report.removed, 1);
    assert_eq!(report.unchanged, 1);

    assert_eq!(content_store::count(&env.ctx.pool).await.unwrap(), 1);
    assert_eq!(env.ctx.vectors.document_count().await.unwrap(), 1);
    assert!(lexical::query(&env.ctx.pool, "bananas", 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn second_sync_is_a_no_op() {
    let env = setup().await;
    write(&env.docs, "one.md", "# One\nfirst document");
    write(&env.docs, "two.md", "# Two\nsecond document");

    sync(&env).await;
    let before = ranking(&env).await;
    let calls = env.gateway.calls();

    let report = sync(&env).await;
    assert_eq!(report.unchanged, 2);
    assert_eq!(report.added + report.updated + report.removed, 0);
    assert_eq!(env.gateway.calls(), calls, "no embedding for unchanged files");
    assert_eq!(ranking(&env).await, before);
}

/// Keyword and semantic (id, score) lists for a fixed query.
async fn ranking(env: &Env) -> (Vec<(String, f64)>, Vec<(String, f64)>) {
    let engine = SearchEngine::new(env.ctx.clone());
    let scores = |r: concept_search::models::SearchResponse| {
        r.results
            .into_iter()
            .map(|r| (r.document_id, r.score))
            .collect::<Vec<_>>()
    };
    let keyword = engine.keyword("document", 10).await.unwrap();
    let semantic = engine.semantic("first document", 10).await.unwrap();
    assert_eq!(keyword.results.len(), 2);
    assert_eq!(semantic.results.len(), 2);
    (scores(keyword), scores(semantic))
}

#[tokio::test]
async fn sync_status_failure_keeps_the_report() {
    let env = setup().await;
    write(&env.docs, "a.txt", "alpha");
    write(&env.docs, "b.txt", "beta");
    sqlx::query("DROP TABLE sync_status")
        .execute(&env.ctx.pool)
        .await
        .unwrap();

    let report = Indexer::new(env.ctx.clone())
        .sync(&env.docs, &AtomicBool::new(false))
        .await
        .unwrap();
    assert_eq!(report.added, 2);
    assert!(report.errors.is_empty());
    assert_eq!(content_store::count(&env.ctx.pool).await.unwrap(), 2);
}

#[tokio::test]
async fn update_replaces_all_three_stores() {
    let env = setup().await;
    write(&env.docs, "note.txt", "original walrus content");
    sync(&env).await;
    let id = doc_id_for(&env, "note.txt").await;

    let new_content = "replacement narwhal content";
    write(&env.docs, "note.txt", new_content);
    sync(&env).await;

    let doc = content_store::get(&env.ctx.pool, &id).await.unwrap();
    assert_eq!(doc.content, new_content);
    assert_eq!(doc.word_count, 3);
    assert_eq!(doc.title, new_content);

    let stored = env.ctx.vectors.get_document(&id).await.unwrap();
    assert_eq!(stored, HashGateway::new(DIMS).embed_text(new_content));

    assert!(lexical::query(&env.ctx.pool, "walrus", 10)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        lexical::query(&env.ctx.pool, "narwhal", 10).await.unwrap()[0].0,
        id
    );
}

#[tokio::test]
async fn batches_respect_batch_size() {
    let env = setup_with(DIMS, 2).await;
    for i in 0..5 {
        write(&env.docs, &format!("f{}.txt", i), &format!("file number {}", i));
    }
    let report = sync(&env).await;
    assert_eq!(report.added, 5);
    assert_eq!(env.gateway.calls(), 3);
}

#[tokio::test]
async fn rate_limited_batch_is_retried() {
    let env = setup().await;
    write(&env.docs, "a.txt", "alpha");
    write(&env.docs, "b.txt", "beta");
    env.gateway.fail_next(2);

    let report = sync(&env).await;
    assert_eq!(report.added, 2);
    assert!(report.errors.is_empty());
    assert_eq!(env.gateway.calls(), 3);
}

#[tokio::test]
async fn exhausted_retries_fail_the_whole_batch() {
    let env = setup().await;
    write(&env.docs, "a.txt", "alpha");
    write(&env.docs, "b.txt", "beta");
    env.gateway.fail_next(100);

    let report = sync(&env).await;
    assert_eq!(report.added, 0);
    assert_eq!(report.errors.len(), 2);
    assert!(report
        .errors
        .iter()
        .all(|e| e.kind == ErrorKind::RateLimited));
    assert_eq!(content_store::count(&env.ctx.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn wrong_vector_length_fails_only_that_document() {
    let env = setup_with(DIMS / 2, 100).await;
    write(&env.docs, "a.txt", "alpha");

    let report = sync(&env).await;
    assert_eq!(report.added, 0);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::DimensionMismatch);
    assert_eq!(content_store::count(&env.ctx.pool).await.unwrap(), 0);
    assert!(lexical::query(&env.ctx.pool, "alpha", 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn extraction_failure_is_reported_and_not_removed() {
    let env = setup().await;
    write(&env.docs, "good.txt", "readable text");
    write(&env.docs, "broken.pdf", "this is not a pdf");

    let report = sync(&env).await;
    assert_eq!(report.added, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::Extraction);
    assert!(report.errors[0].path.ends_with("broken.pdf"));

    let report = sync(&env).await;
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.removed, 0);
}

#[tokio::test]
async fn cancelled_sync_skips_removal() {
    let env = setup().await;
    write(&env.docs, "a.txt", "alpha");
    write(&env.docs, "b.txt", "beta");
    sync(&env).await;
    fs::remove_file(env.docs.join("b.txt")).unwrap();

    let report = Indexer::new(env.ctx.clone())
        .sync(&env.docs, &AtomicBool::new(true))
        .await
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(report.processed(), 0);
    assert_eq!(report.removed, 0);
    assert_eq!(content_store::count(&env.ctx.pool).await.unwrap(), 2);
}

#[tokio::test]
async fn spawned_sync_reports_progress() {
    let env = setup().await;
    write(&env.docs, "a.txt", "alpha");

    let (sink, mut rx) = ChannelProgress::new();
    let handle = Indexer::new(env.ctx.clone())
        .with_reporter(Arc::new(sink))
        .spawn(env.docs.clone());
    let report = handle.join().await.unwrap();
    assert_eq!(report.added, 1);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(
        events.first(),
        Some(SyncProgressEvent::Discovering { .. })
    ));
    assert!(matches!(
        events.last(),
        Some(SyncProgressEvent::Finished {
            added: 1,
            cancelled: false,
            ..
        })
    ));
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let env = setup().await;
    write(&env.docs, "a.txt", "12345678");
    write(&env.docs, "b.md", "1234");

    let plan = Indexer::new(env.ctx.clone()).plan(&env.docs).await.unwrap();
    assert_eq!(plan.candidates, 2);
    assert_eq!(plan.total_bytes, 12);
    assert_eq!(plan.estimated_tokens, 3);
    assert_eq!(content_store::count(&env.ctx.pool).await.unwrap(), 0);
    assert_eq!(env.gateway.calls(), 0);
}

// ============ Search ============

async fn corpus(env: &Env) {
    write(
        &env.docs,
        "rust.md",
        "# Rust\nOwnership and borrowing make memory safety possible without a garbage collector.",
    );
    write(
        &env.docs,
        "python.md",
        "# Python\nDynamic typing and a garbage collector make quick scripts easy.",
    );
    write(
        &env.docs,
        "sqlite.txt",
        "SQLite stores the whole database in a single file. The zephyr index is fast.",
    );
    sync(env).await;
}

#[tokio::test]
async fn unique_term_ranks_its_document_first() {
    let env = setup().await;
    corpus(&env).await;

    let response = SearchEngine::new(env.ctx.clone())
        .keyword("zephyr", 10)
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
    assert!(response.results[0].path.ends_with("sqlite.txt"));
    assert!(response.results[0].snippet.contains("zephyr"));
    assert_eq!(response.trace.mode, "keyword");
    assert_eq!(response.trace.stage("lexical"), Some(1));
}

#[tokio::test]
async fn keyword_ties_break_by_id_and_punctuation_is_safe() {
    let env = setup().await;
    corpus(&env).await;

    let engine = SearchEngine::new(env.ctx.clone());
    let response = engine.keyword("garbage \"collector\" AND (", 10).await.unwrap();
    assert_eq!(response.results.len(), 2);
    let scores: Vec<f64> = response.results.iter().map(|r| r.score).collect();
    assert!(scores[0] >= scores[1]);

    let again = engine.keyword("garbage \"collector\" AND (", 10).await.unwrap();
    let ids = |r: &concept_search::models::SearchResponse| {
        r.results
            .iter()
            .map(|x| x.document_id.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&response), ids(&again));
}

#[tokio::test]
async fn hybrid_without_keyword_hits_skips_the_gateway() {
    let env = setup().await;
    corpus(&env).await;
    let calls = env.gateway.calls();

    let response = SearchEngine::new(env.ctx.clone())
        .hybrid("quantum chromodynamics", 10)
        .await
        .unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.trace.stage("lexical"), Some(0));
    assert_eq!(response.trace.stage("embed_query"), None);
    assert_eq!(env.gateway.calls(), calls);
}

#[tokio::test]
async fn hybrid_results_are_a_subset_of_keyword_candidates() {
    let env = setup().await;
    corpus(&env).await;
    let engine = SearchEngine::new(env.ctx.clone());

    let keyword = engine.keyword("garbage collector memory", 100).await.unwrap();
    let hybrid = engine.hybrid("garbage collector memory", 10).await.unwrap();

    assert!(!hybrid.results.is_empty());
    for result in &hybrid.results {
        assert!(keyword
            .results
            .iter()
            .any(|k| k.document_id == result.document_id));
        assert!(result.rank_inputs.bm25.is_some());
        assert!(result.rank_inputs.semantic.is_some());
    }
    let sims: Vec<f64> = hybrid.results.iter().map(|r| r.score).collect();
    assert!(sims.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(hybrid.trace.stage("lexical"), Some(keyword.results.len()));
}

#[tokio::test]
async fn hybrid_considers_candidates_beyond_the_result_limit() {
    let env = setup().await;
    let decoy_words = [
        "river stone cloud maple tiger lemon piano rocket garden silver window forest candle marble",
        "rocket garden silver window forest candle marble violet harbor meadow falcon copper saddle lantern",
        "violet harbor meadow falcon copper saddle lantern orchid pepper glacier river stone cloud maple",
    ];
    for (i, words) in decoy_words.iter().enumerate() {
        write(&env.docs, &format!("decoy{}.txt", i), &format!("pie apple {}", words));
    }
    write(&env.docs, "target.txt", "apple apple apple apple");
    let fillers = [
        "banana grape kiwi",
        "kiwi mango cherry",
        "cherry plum melon",
        "melon peach lime",
        "lime fig papaya",
        "papaya guava banana",
    ];
    for (i, words) in fillers.iter().enumerate() {
        write(&env.docs, &format!("filler{}.txt", i), &format!("apple {}", words));
    }
    sync(&env).await;
    let target = doc_id_for(&env, "target.txt").await;

    let engine = SearchEngine::new(env.ctx.clone());
    let keyword = engine.keyword("apple pie", 2).await.unwrap();
    assert!(keyword.results.iter().all(|r| r.document_id != target));

    let hybrid = engine.hybrid("apple pie", 2).await.unwrap();
    assert_eq!(hybrid.trace.stage("lexical"), Some(10));
    assert_eq!(hybrid.results.len(), 2);
    assert_eq!(hybrid.results[0].document_id, target);
}

#[tokio::test]
async fn hybrid_candidates_are_capped_at_one_hundred() {
    let env = setup().await;
    for i in 0..105 {
        write(&env.docs, &format!("w{:03}.txt", i), &format!("common w{}", i));
    }
    let report = sync(&env).await;
    assert_eq!(report.added, 105);

    let engine = SearchEngine::new(env.ctx.clone());
    let hybrid = engine.hybrid("common", 10).await.unwrap();
    assert_eq!(hybrid.trace.stage("lexical"), Some(100));
    assert_eq!(hybrid.trace.stage("candidates"), Some(100));
    assert_eq!(hybrid.results.len(), 10);

    let keyword = engine.keyword("common", 100).await.unwrap();
    assert_eq!(keyword.results.len(), 100);
    for result in &hybrid.results {
        assert!(keyword
            .results
            .iter()
            .any(|k| k.document_id == result.document_id));
    }
}

#[tokio::test]
async fn hybrid_reads_one_snapshot_when_a_sync_lands_mid_query() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    write(&docs, "note.txt", "original walrus content");
    write(&docs, "colony.txt", "walrus colony on the ice");

    let config = test_config(tmp.path(), &docs, 100);
    let pool = db::connect(&config).await.unwrap();
    migrate(&pool).await.unwrap();
    let gateway = Arc::new(RewritingGateway {
        inner: HashGateway::new(DIMS),
        ctx: OnceLock::new(),
        root: docs.clone(),
        target: docs.join("note.txt"),
        replacement: "replacement narwhal content",
        armed: AtomicBool::new(false),
    });
    let ctx = Context::new(pool, gateway.clone(), config);
    assert!(gateway.ctx.set(ctx.clone()).is_ok());
    Indexer::new(ctx.clone())
        .sync(&docs, &AtomicBool::new(false))
        .await
        .unwrap();

    gateway.armed.store(true, Ordering::SeqCst);
    let engine = SearchEngine::new(ctx.clone());
    let hybrid = engine.hybrid("walrus", 10).await.unwrap();
    assert!(!gateway.armed.load(Ordering::SeqCst));

    assert_eq!(hybrid.trace.stage("lexical"), Some(2));
    assert_eq!(hybrid.trace.stage("candidates"), Some(1));
    assert_eq!(hybrid.results.len(), 1);
    assert!(hybrid.results[0].path.ends_with("colony.txt"));
    for result in &hybrid.results {
        assert!(result.snippet.contains("walrus"), "{}", result.snippet);
    }

    let keyword = engine.keyword("walrus", 100).await.unwrap();
    for result in &hybrid.results {
        assert!(keyword
            .results
            .iter()
            .any(|k| k.document_id == result.document_id));
    }
    let note = docs.canonicalize().unwrap().join("note.txt");
    let doc = content_store::get_by_path(&ctx.pool, &note.to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.content, "replacement narwhal content");
}

#[tokio::test]
async fn semantic_finds_identical_text_first() {
    let env = setup().await;
    corpus(&env).await;

    let query = "SQLite stores the whole database in a single file. The zephyr index is fast.";
    let response = SearchEngine::new(env.ctx.clone())
        .semantic(query, 2)
        .await
        .unwrap();
    assert_eq!(response.results.len(), 2);
    assert!(response.results[0].path.ends_with("sqlite.txt"));
    assert!((response.results[0].score - 1.0).abs() < 1e-5);
    assert_eq!(response.trace.stage("vector_scan"), Some(3));
    assert_eq!(response.trace.stage("top_k"), Some(2));

    for result in &response.results {
        assert!(result.score >= -1.0 && result.score <= 1.0);
    }
}

#[tokio::test]
async fn limit_is_clamped() {
    let env = setup().await;
    corpus(&env).await;

    let response = SearchEngine::new(env.ctx.clone())
        .keyword("garbage", 0)
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
}

// ============ Concepts ============

#[tokio::test]
async fn concept_mix_is_unit_norm_and_linear() {
    let env = setup().await;
    let algebra = ConceptAlgebra::new(env.ctx.clone());
    algebra
        .store_concept("safety", "careful secure protected guarded")
        .await
        .unwrap();
    algebra
        .store_concept("hype", "amazing revolutionary incredible disruptive")
        .await
        .unwrap();

    let mix: ConceptMix = "safety:1.0,hype:-0.5".parse().unwrap();
    let v = algebra.mix(&mix).await.unwrap();
    assert!((l2_norm(&v) - 1.0).abs() < 1e-5);

    let scaled = algebra
        .mix(&"safety:3.0".parse().unwrap())
        .await
        .unwrap();
    let raw = env.ctx.vectors.get_concept("safety").await.unwrap();
    let expected = normalize(&raw).unwrap();
    for (x, y) in scaled.iter().zip(expected.iter()) {
        assert!((x - y).abs() < 1e-6);
    }
}

#[tokio::test]
async fn debias_removes_the_concept_direction() {
    let env = setup().await;
    let algebra = ConceptAlgebra::new(env.ctx.clone());
    algebra
        .store_concept("tech", "software hardware computers networks")
        .await
        .unwrap();
    algebra
        .store_concept("money", "price cost computers budget")
        .await
        .unwrap();

    let v = algebra.debias("tech", "money").await.unwrap();
    let money = normalize(&env.ctx.vectors.get_concept("money").await.unwrap()).unwrap();
    assert!(dot(&v, &money).abs() < 1e-5);
    assert!((l2_norm(&v) - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn unknown_concept_is_reported_by_name() {
    let env = setup().await;
    let algebra = ConceptAlgebra::new(env.ctx.clone());
    algebra.store_concept("safety", "careful").await.unwrap();

    let err = algebra
        .mix(&"safety:1,missing:1".parse().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownConcept(ref name) if name == "missing"));

    let err = algebra.debias("safety", "nope").await.unwrap_err();
    assert!(matches!(err, Error::UnknownConcept(_)));
}

#[tokio::test]
async fn concept_overwrite_and_delete() {
    let env = setup().await;
    let algebra = ConceptAlgebra::new(env.ctx.clone());
    algebra.store_concept("c", "first text").await.unwrap();
    algebra.store_concept("c", "second text").await.unwrap();

    let listed = algebra.list_concepts().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].source_text, "second text");

    algebra.delete_concept("c").await.unwrap();
    assert!(matches!(
        algebra.delete_concept("c").await.unwrap_err(),
        Error::NotFound(_)
    ));
    assert!(matches!(
        algebra.store_concept("  ", "text").await.unwrap_err(),
        Error::InvalidInput(_)
    ));
}

#[tokio::test]
async fn concept_search_ranks_documents() {
    let env = setup().await;
    corpus(&env).await;
    let algebra = ConceptAlgebra::new(env.ctx.clone());
    algebra
        .store_concept("db", "SQLite stores the whole database in a single file")
        .await
        .unwrap();
    algebra.store_concept("py", "Python dynamic typing").await.unwrap();

    let engine = SearchEngine::new(env.ctx.clone());
    let response = engine
        .concept_search(&"db:1.0".parse().unwrap(), 3)
        .await
        .unwrap();
    assert_eq!(response.results.len(), 3);
    assert!(response.results[0].path.ends_with("sqlite.txt"));
    assert_eq!(response.trace.stage("concepts"), Some(1));

    let debiased = engine.debias_search("db", "py", 3).await.unwrap();
    assert_eq!(debiased.trace.mode, "debias");
    assert_eq!(debiased.results.len(), 3);
}

// ============ Administration ============

#[tokio::test]
async fn remove_document_clears_every_store() {
    let env = setup().await;
    corpus(&env).await;
    let id = doc_id_for(&env, "rust.md").await;

    remove_document(&env.ctx, &id).await.unwrap();
    assert!(matches!(
        content_store::get(&env.ctx.pool, &id).await.unwrap_err(),
        Error::NotFound(_)
    ));
    assert!(matches!(
        env.ctx.vectors.get_document(&id).await.unwrap_err(),
        Error::NotFound(_)
    ));
    assert!(lexical::query(&env.ctx.pool, "ownership", 10)
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        remove_document(&env.ctx, &id).await.unwrap_err(),
        Error::NotFound(_)
    ));
}

#[tokio::test]
async fn listing_paginates_and_filters() {
    let env = setup().await;
    corpus(&env).await;

    let page = list_documents(&env.ctx, 1, 2, None).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.documents.len(), 2);
    assert_eq!(page.total_pages, 2);

    let page2 = list_documents(&env.ctx, 2, 2, None).await.unwrap();
    assert_eq!(page2.documents.len(), 1);

    let filtered = list_documents(&env.ctx, 1, 20, Some("garbage")).await.unwrap();
    assert_eq!(filtered.total, 2);
}

#[tokio::test]
async fn stats_reflect_the_index() {
    let env = setup().await;
    corpus(&env).await;
    ConceptAlgebra::new(env.ctx.clone())
        .store_concept("c", "text")
        .await
        .unwrap();

    let stats = collect_stats(&env.ctx).await.unwrap();
    assert_eq!(stats.document_count, 3);
    assert_eq!(stats.embedding_count, 3);
    assert_eq!(stats.concept_count, 1);
    assert!(stats.last_sync.is_some());
    assert!(stats.database_size_bytes > 0);
}
