//! Document retrieval and administration.
//!
//! Backs `csearch get`, `csearch docs list` and `csearch docs rm`. Each
//! command prints a human-readable view, or JSON with `--json`.

use anyhow::Result;
use serde::Serialize;

use crate::content_store;
use crate::context::Context;
use crate::indexer::remove_document;
use crate::models::{Document, DocumentSummary};

/// One page of the document listing.
#[derive(Debug, Serialize)]
pub struct DocumentPage {
    pub documents: Vec<DocumentSummary>,
    pub total: i64,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: i64,
}

pub async fn get_document(ctx: &Context, id: &str) -> crate::error::Result<Document> {
    content_store::get(&ctx.pool, id).await
}

pub async fn list_documents(
    ctx: &Context,
    page: usize,
    per_page: usize,
    filter: Option<&str>,
) -> crate::error::Result<DocumentPage> {
    let page = page.max(1);
    let per_page = per_page.clamp(1, 100);
    let (documents, total) = content_store::list(&ctx.pool, page, per_page, filter).await?;
    let total_pages = (total + per_page as i64 - 1) / per_page as i64;
    Ok(DocumentPage {
        documents,
        total,
        page,
        per_page,
        total_pages,
    })
}

/// CLI entry point for `get`.
pub async fn run_get(ctx: &Context, id: &str, json: bool) -> Result<()> {
    let doc = get_document(ctx, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("--- Document ---");
    println!("id:          {}", doc.id);
    println!("title:       {}", doc.title);
    println!("path:        {}", doc.path);
    println!("words:       {}", doc.word_count);
    println!("fingerprint: {}", doc.fingerprint);
    println!("created_at:  {}", format_ts_iso(doc.created_at));
    println!("modified_at: {}", format_ts_iso(doc.modified_at));
    println!();
    println!("--- Content ---");
    println!("{}", doc.content);

    Ok(())
}

/// CLI entry point for `docs list`.
pub async fn run_list(
    ctx: &Context,
    page: usize,
    per_page: usize,
    filter: Option<&str>,
    json: bool,
) -> Result<()> {
    let listing = list_documents(ctx, page, per_page, filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if listing.documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!(
        "{:<36}  {:>7}  {:<20}  TITLE",
        "ID", "WORDS", "MODIFIED"
    );
    for doc in &listing.documents {
        println!(
            "{:<36}  {:>7}  {:<20}  {}",
            doc.id,
            doc.word_count,
            format_ts_iso(doc.modified_at),
            doc.title
        );
    }
    println!();
    println!(
        "page {} of {} ({} documents)",
        listing.page, listing.total_pages, listing.total
    );
    Ok(())
}

/// CLI entry point for `docs rm`.
pub async fn run_delete(ctx: &Context, id: &str) -> Result<()> {
    remove_document(ctx, id).await?;
    println!("Deleted document {}", id);
    Ok(())
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
