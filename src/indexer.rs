//! Change-aware ingestion of a source folder.
//!
//! # Pipeline
//!
//! ```text
//! discover ─▶ classify (fingerprint) ─▶ extract ─▶ embed (batched, retried) ─▶ commit
//!                                                                   │
//!                               removal pass (skipped on cancel) ◀──┘
//! ```
//!
//! Each document is committed in one transaction covering its row, its
//! vector and its FTS entry, while holding that document's lock. A failure
//! anywhere for one file lands in [`SyncReport::errors`] and the run moves
//! on. There is no global lock: between commits the corpus is consistent
//! and searchable.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::content_store::{self, StoredFingerprint};
use crate::context::Context;
use crate::discover::{discover, resolve_root, Candidate};
use crate::embedding::embed_with_retry;
use crate::error::{Error, Result};
use crate::lexical;
use crate::models::{Document, SyncFailure, SyncPlan, SyncReport};
use crate::progress::{NoProgress, ProgressMode, SyncProgressEvent, SyncProgressReporter};

/// Maximum title length in characters.
const MAX_TITLE_CHARS: usize = 200;

/// A file that changed and is waiting for its embedding.
struct PendingDocument {
    id: String,
    is_new: bool,
    path: String,
    title: String,
    content: String,
    fingerprint: String,
}

pub struct Indexer {
    ctx: Context,
    reporter: Arc<dyn SyncProgressReporter>,
}

impl Indexer {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            reporter: Arc::new(NoProgress),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn SyncProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Candidate files under `root`, sorted by path.
    pub async fn discover(&self, root: &Path) -> Result<Vec<Candidate>> {
        let root = resolve_root(root)?;
        let config = self.ctx.config.index.clone();
        tokio::task::spawn_blocking(move || discover(&root, &config))
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }

    /// Dry run: what a sync would look at, without reading or writing.
    ///
    /// Tokens are estimated as bytes / 4.
    pub async fn plan(&self, root: &Path) -> Result<SyncPlan> {
        let candidates = self.discover(root).await?;
        let total_bytes: u64 = candidates.iter().map(|c| c.size).sum();
        Ok(SyncPlan {
            candidates: candidates.len(),
            total_bytes,
            estimated_tokens: total_bytes / 4,
        })
    }

    /// Bring the stores in line with the files under `root`.
    ///
    /// `cancel` is checked before each file. On cancellation the report has
    /// `cancelled = true`, queued but uncommitted files are left for the next
    /// run, and the removal pass is skipped.
    pub async fn sync(&self, root: &Path, cancel: &AtomicBool) -> Result<SyncReport> {
        let root = resolve_root(root)?;
        let root_display = root.display().to_string();
        self.reporter.report(SyncProgressEvent::Discovering {
            root: root_display.clone(),
        });

        let candidates = self.discover(&root).await?;
        let stored = content_store::fingerprints_under(&self.ctx.pool, &root).await?;

        let mut report = SyncReport {
            total: candidates.len(),
            ..SyncReport::default()
        };
        tracing::info!(root = %root_display, candidates = candidates.len(), "sync started");

        let batch_size = self.ctx.config.embedding.batch_size;
        let mut pending: Vec<PendingDocument> = Vec::with_capacity(batch_size);
        let mut seen: HashSet<String> = HashSet::with_capacity(candidates.len());

        for (i, candidate) in candidates.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                report.cancelled = true;
                break;
            }

            let path = candidate.path.to_string_lossy().into_owned();
            self.reporter.report(SyncProgressEvent::Processing {
                n: i as u64 + 1,
                total: report.total as u64,
                path: path.clone(),
            });
            seen.insert(path.clone());

            let outcome = self
                .classify(&candidate.path, &path, stored.get(&path))
                .await;
            match outcome {
                Ok(Some(doc)) => {
                    pending.push(doc);
                    if pending.len() >= batch_size {
                        self.flush(&mut pending, &mut report).await;
                    }
                }
                Ok(None) => report.unchanged += 1,
                Err(e) => self.record_failure(&mut report, path, &e),
            }
        }

        if !report.cancelled {
            self.flush(&mut pending, &mut report).await;

            let gone: Vec<(String, String)> = stored
                .iter()
                .filter(|(path, _)| !seen.contains(*path))
                .map(|(path, s)| (path.clone(), s.id.clone()))
                .collect();
            for (path, id) in gone {
                match remove_document(&self.ctx, &id).await {
                    Ok(()) | Err(Error::NotFound(_)) => report.removed += 1,
                    Err(e) => self.record_failure(&mut report, path, &e),
                }
            }
            if report.removed > 0 {
                self.reporter.report(SyncProgressEvent::Removed {
                    count: report.removed as u64,
                });
            }

            if let Err(e) =
                content_store::record_sync(&self.ctx.pool, &root, report.processed()).await
            {
                tracing::warn!(error = %e, "failed to record sync status");
            }
        }

        tracing::info!(
            added = report.added,
            updated = report.updated,
            unchanged = report.unchanged,
            removed = report.removed,
            errors = report.errors.len(),
            cancelled = report.cancelled,
            "sync finished"
        );
        self.reporter.report(SyncProgressEvent::Finished {
            added: report.added as u64,
            updated: report.updated as u64,
            unchanged: report.unchanged as u64,
            removed: report.removed as u64,
            errors: report.errors.len() as u64,
            cancelled: report.cancelled,
        });

        Ok(report)
    }

    /// Run [`sync`](Self::sync) on a background task.
    pub fn spawn(self, root: PathBuf) -> SyncHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let task = tokio::spawn(async move { self.sync(&root, &flag).await });
        SyncHandle { cancel, task }
    }

    /// Read, fingerprint and (if changed) extract one file.
    ///
    /// `Ok(None)` means unchanged.
    async fn classify(
        &self,
        fs_path: &Path,
        path: &str,
        stored: Option<&StoredFingerprint>,
    ) -> Result<Option<PendingDocument>> {
        let bytes = tokio::fs::read(fs_path).await?;
        let fingerprint = fingerprint(&bytes);

        if stored.is_some_and(|s| s.fingerprint == fingerprint) {
            return Ok(None);
        }

        let extractor = self.ctx.extractor.clone();
        let owned_path = fs_path.to_path_buf();
        let content = tokio::task::spawn_blocking(move || {
            extractor.extract_bytes(&owned_path, &bytes)
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))??;

        let (id, is_new) = match stored {
            Some(s) => (s.id.clone(), false),
            None => (uuid::Uuid::new_v4().to_string(), true),
        };

        Ok(Some(PendingDocument {
            id,
            is_new,
            path: path.to_string(),
            title: derive_title(&content, fs_path),
            content,
            fingerprint,
        }))
    }

    /// Embed and commit everything queued. Always leaves `pending` empty.
    async fn flush(&self, pending: &mut Vec<PendingDocument>, report: &mut SyncReport) {
        if pending.is_empty() {
            return;
        }
        let batch: Vec<PendingDocument> = std::mem::take(pending);

        let vectors: Vec<Option<Vec<f32>>> = if self.ctx.embeddings_enabled() {
            self.reporter.report(SyncProgressEvent::Embedding {
                size: batch.len() as u64,
            });
            let max_chars = self.ctx.config.embedding.max_input_chars;
            let texts: Vec<String> = batch
                .iter()
                .map(|d| d.content.chars().take(max_chars).collect())
                .collect();

            match embed_with_retry(self.ctx.gateway.as_ref(), &texts, self.ctx.retry).await {
                Ok(vectors) => vectors.into_iter().map(Some).collect(),
                Err(e) => {
                    tracing::warn!(size = batch.len(), error = %e, "embedding batch failed");
                    for doc in batch {
                        self.record_failure(report, doc.path, &e);
                    }
                    return;
                }
            }
        } else {
            vec![None; batch.len()]
        };

        for (doc, vector) in batch.into_iter().zip(vectors) {
            match commit_document(&self.ctx, &doc, vector.as_deref()).await {
                Ok(()) if doc.is_new => report.added += 1,
                Ok(()) => report.updated += 1,
                Err(e) => self.record_failure(report, doc.path, &e),
            }
        }
    }

    fn record_failure(&self, report: &mut SyncReport, path: String, err: &Error) {
        tracing::warn!(path = %path, error = %err, "failed to index file");
        let failure = SyncFailure {
            path,
            kind: err.kind(),
            message: err.to_string(),
        };
        self.reporter.report(SyncProgressEvent::FileFailed {
            path: failure.path.clone(),
            kind: failure.kind,
            message: failure.message.clone(),
        });
        report.errors.push(failure);
    }
}

/// Write a document to all three stores in one transaction.
///
/// With `vector = None` (embeddings disabled) any old vector is dropped so a
/// stale embedding never outlives the content it was computed from.
async fn commit_document(
    ctx: &Context,
    doc: &PendingDocument,
    vector: Option<&[f32]>,
) -> Result<()> {
    let _guard = ctx.locks.acquire(&doc.id).await;
    let now = chrono::Utc::now().timestamp();

    let mut tx = ctx.pool.begin().await?;

    content_store::upsert(
        &mut *tx,
        &Document {
            id: doc.id.clone(),
            path: doc.path.clone(),
            title: doc.title.clone(),
            content: doc.content.clone(),
            word_count: word_count(&doc.content),
            fingerprint: doc.fingerprint.clone(),
            created_at: now,
            modified_at: now,
        },
    )
    .await?;

    match vector {
        Some(v) => ctx.vectors.put_document(&mut *tx, &doc.id, v).await?,
        None => ctx.vectors.delete_document(&mut *tx, &doc.id).await?,
    }

    lexical::index(&mut *tx, &doc.id, &doc.title, &doc.content).await?;

    tx.commit().await?;
    tracing::debug!(id = %doc.id, path = %doc.path, "committed document");
    Ok(())
}

/// Delete a document from all three stores in one transaction.
///
/// [`Error::NotFound`] when no such document exists.
pub async fn remove_document(ctx: &Context, id: &str) -> Result<()> {
    let _guard = ctx.locks.acquire(id).await;

    let mut tx = ctx.pool.begin().await?;
    lexical::remove(&mut *tx, id).await?;
    ctx.vectors.delete_document(&mut *tx, id).await?;
    let existed = content_store::delete(&mut *tx, id).await?;
    if !existed {
        return Err(Error::NotFound(format!("document {}", id)));
    }
    tx.commit().await?;

    tracing::debug!(id = %id, "removed document");
    Ok(())
}

/// Handle to a sync running on a background task.
pub struct SyncHandle {
    cancel: Arc<AtomicBool>,
    task: JoinHandle<Result<SyncReport>>,
}

impl SyncHandle {
    /// Ask the sync to stop before its next file.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// The shared flag [`cancel`](Self::cancel) sets, usable after
    /// [`join`](Self::join) has taken the handle.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the sync to finish.
    pub async fn join(self) -> Result<SyncReport> {
        self.task.await.map_err(|e| Error::Task(e.to_string()))?
    }
}

/// CLI entry point for `sync`.
///
/// Ctrl-C cancels the run cooperatively; what was committed stays.
pub async fn run_sync(
    ctx: &Context,
    root: Option<&Path>,
    dry_run: bool,
    progress: ProgressMode,
    json: bool,
) -> anyhow::Result<()> {
    let root = root
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.config.index.root.clone());
    let indexer = Indexer::new(ctx.clone()).with_reporter(Arc::from(progress.reporter()));

    if dry_run {
        let plan = indexer.plan(&root).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            println!("sync {} (dry-run)", root.display());
            println!("  files found: {}", plan.candidates);
            println!("  total bytes: {}", plan.total_bytes);
            println!("  estimated tokens: {}", plan.estimated_tokens);
        }
        return Ok(());
    }

    let handle = indexer.spawn(root.clone());
    let cancel = handle.cancel_flag();
    let join = handle.join();
    tokio::pin!(join);

    let report = tokio::select! {
        report = &mut join => report?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupt received, stopping after the current file");
            cancel.store(true, Ordering::SeqCst);
            join.await?
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("sync {}", root.display());
    println!("  files: {}", report.total);
    println!("  added: {}", report.added);
    println!("  updated: {}", report.updated);
    println!("  unchanged: {}", report.unchanged);
    println!("  removed: {}", report.removed);
    println!("  errors: {}", report.errors.len());
    for failure in &report.errors {
        println!("    {}: {}", failure.path, failure.message);
    }
    if report.cancelled {
        println!("cancelled");
    } else {
        println!("ok");
    }
    Ok(())
}

/// SHA-256 of the raw file bytes, lowercase hex.
pub fn fingerprint(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// First non-empty line with Markdown heading markers stripped, at most
/// 200 characters. Falls back to the file stem.
pub fn derive_title(content: &str, path: &Path) -> String {
    let first = content
        .lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .find(|l| !l.is_empty());

    match first {
        Some(line) => line.chars().take(MAX_TITLE_CHARS).collect(),
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

pub fn word_count(content: &str) -> i64 {
    content.split_whitespace().count() as i64
}
