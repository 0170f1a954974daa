//! The `documents` table: durable document rows and change-detection data.
//!
//! Reads take the pool. Writes take a `&mut SqliteConnection` so the caller
//! can put them in the same transaction as the embedding and FTS writes.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::lexical;
use crate::models::{Document, DocumentSummary};

const DOCUMENT_COLUMNS: &str =
    "id, path, title, content, word_count, fingerprint, created_at, modified_at";

fn row_to_document(row: &SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        path: row.get("path"),
        title: row.get("title"),
        content: row.get("content"),
        word_count: row.get("word_count"),
        fingerprint: row.get("fingerprint"),
        created_at: row.get("created_at"),
        modified_at: row.get("modified_at"),
    }
}

/// What the indexer needs to classify a file without loading its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFingerprint {
    pub id: String,
    pub fingerprint: String,
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<Document> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM documents WHERE id = ?",
        DOCUMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| row_to_document(&r))
        .ok_or_else(|| Error::NotFound(format!("document {}", id)))
}

pub async fn get_by_path(pool: &SqlitePool, path: &str) -> Result<Option<Document>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM documents WHERE path = ?",
        DOCUMENT_COLUMNS
    ))
    .bind(path)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| row_to_document(&r)))
}

/// Fetch several documents at once, keyed by id. Missing ids are skipped.
///
/// Takes a connection so search can hydrate inside its read snapshot.
pub async fn get_many(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<HashMap<String, Document>> {
    let mut out = HashMap::with_capacity(ids.len());
    // Stay well under SQLite's bound-parameter limit.
    for chunk in ids.chunks(500) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM documents WHERE id IN ({})",
            DOCUMENT_COLUMNS, placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in chunk {
            query = query.bind(id);
        }
        for row in query.fetch_all(&mut *conn).await? {
            let doc = row_to_document(&row);
            out.insert(doc.id.clone(), doc);
        }
    }
    Ok(out)
}

/// Stored `(id, fingerprint)` for every document whose path lies under `root`,
/// keyed by path.
pub async fn fingerprints_under(
    pool: &SqlitePool,
    root: &Path,
) -> Result<HashMap<String, StoredFingerprint>> {
    let rows = sqlx::query("SELECT id, path, fingerprint FROM documents")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let path: String = row.get("path");
            if !Path::new(&path).starts_with(root) {
                return None;
            }
            Some((
                path,
                StoredFingerprint {
                    id: row.get("id"),
                    fingerprint: row.get("fingerprint"),
                },
            ))
        })
        .collect())
}

/// One page of documents, newest first, with the total matching count.
///
/// `filter` is run through the lexical index; a filter with no searchable
/// terms is ignored.
pub async fn list(
    pool: &SqlitePool,
    page: usize,
    per_page: usize,
    filter: Option<&str>,
) -> Result<(Vec<DocumentSummary>, i64)> {
    let page = page.max(1);
    let per_page = per_page.clamp(1, 100);
    let offset = ((page - 1) * per_page) as i64;

    let match_expr = filter.and_then(lexical::match_expression);
    let where_clause = if match_expr.is_some() {
        "WHERE id IN (SELECT document_id FROM documents_fts WHERE documents_fts MATCH ?)"
    } else {
        ""
    };

    let count_sql = format!("SELECT COUNT(*) FROM documents {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(expr) = &match_expr {
        count_query = count_query.bind(expr);
    }
    let total = count_query.fetch_one(pool).await?;

    let list_sql = format!(
        "SELECT id, path, title, word_count, created_at, modified_at FROM documents {} \
         ORDER BY modified_at DESC, id ASC LIMIT ? OFFSET ?",
        where_clause
    );
    let mut list_query = sqlx::query(&list_sql);
    if let Some(expr) = &match_expr {
        list_query = list_query.bind(expr);
    }
    let rows = list_query
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let docs = rows
        .iter()
        .map(|row| DocumentSummary {
            id: row.get("id"),
            path: row.get("path"),
            title: row.get("title"),
            word_count: row.get("word_count"),
            created_at: row.get("created_at"),
            modified_at: row.get("modified_at"),
        })
        .collect();

    Ok((docs, total))
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?)
}

/// Insert or update a document row. `created_at` is kept on update.
pub async fn upsert(conn: &mut SqliteConnection, doc: &Document) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (id, path, title, content, word_count, fingerprint, created_at, modified_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            path = excluded.path,
            title = excluded.title,
            content = excluded.content,
            word_count = excluded.word_count,
            fingerprint = excluded.fingerprint,
            modified_at = excluded.modified_at
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.path)
    .bind(&doc.title)
    .bind(&doc.content)
    .bind(doc.word_count)
    .bind(&doc.fingerprint)
    .bind(doc.created_at)
    .bind(doc.modified_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Delete a document row. Returns whether a row existed.
pub async fn delete(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============ Sync Status ============

/// Record a completed sync.
pub async fn record_sync(pool: &SqlitePool, root: &Path, files_processed: usize) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_status (id, root, last_sync, files_processed)
        VALUES (1, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            root = excluded.root,
            last_sync = excluded.last_sync,
            files_processed = excluded.files_processed
        "#,
    )
    .bind(root.display().to_string())
    .bind(chrono::Utc::now().timestamp())
    .bind(files_processed as i64)
    .execute(pool)
    .await?;
    Ok(())
}

/// Unix time of the last completed sync, if any.
pub async fn last_sync(pool: &SqlitePool) -> Result<Option<i64>> {
    Ok(
        sqlx::query_scalar("SELECT last_sync FROM sync_status WHERE id = 1")
            .fetch_optional(pool)
            .await?,
    )
}
