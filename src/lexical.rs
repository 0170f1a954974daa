//! Lexical index over document titles and content (SQLite FTS5, BM25).
//!
//! User query text never reaches FTS5 verbatim. It is split into
//! alphanumeric tokens, each token is quoted, and the tokens are OR-ed:
//!
//! ```text
//! "rust's borrow-checker!"  →  "rust" OR "s" OR "borrow" OR "checker"
//! ```
//!
//! Scores are `-bm25()`, so higher is better.

use sqlx::{Executor, Row, Sqlite, SqliteConnection};

use crate::error::Result;
use crate::vector::rank_by_score;

/// Lowercased alphanumeric tokens of `text`, in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Build a safe FTS5 MATCH expression. `None` when the text has no tokens.
pub fn match_expression(text: &str) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    let terms: Vec<String> = tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Replace the FTS entry for a document.
pub async fn index(
    conn: &mut SqliteConnection,
    document_id: &str,
    title: &str,
    content: &str,
) -> Result<()> {
    remove(conn, document_id).await?;
    sqlx::query("INSERT INTO documents_fts (document_id, title, content) VALUES (?, ?, ?)")
        .bind(document_id)
        .bind(title)
        .bind(content)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn remove(conn: &mut SqliteConnection, document_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// BM25-ranked document ids for `text`, best first, ties by id ascending.
///
/// Runs on any executor: the pool, or a transaction when the caller needs
/// this read to share a snapshot with others.
pub async fn query<'e, E>(executor: E, text: &str, limit: usize) -> Result<Vec<(String, f64)>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let Some(expr) = match_expression(text) else {
        return Ok(Vec::new());
    };
    if limit == 0 {
        return Ok(Vec::new());
    }

    let rows = sqlx::query(
        r#"
        SELECT document_id, -bm25(documents_fts) AS score
        FROM documents_fts
        WHERE documents_fts MATCH ?
        ORDER BY score DESC, document_id ASC
        LIMIT ?
        "#,
    )
    .bind(&expr)
    .bind(limit as i64)
    .fetch_all(executor)
    .await?;

    let hits = rows
        .iter()
        .map(|row| (row.get::<String, _>("document_id"), row.get::<f64, _>("score")))
        .collect();

    // SQLite already ordered these; re-rank so float ties break exactly on id.
    Ok(rank_by_score(hits, limit))
}
