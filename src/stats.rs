//! Index statistics.
//!
//! A quick summary of what's indexed: document, embedding and concept
//! counts, when the last sync finished, and how big the database is. Used by
//! `csearch stats` to confirm that syncs are doing what they should.

use anyhow::Result;
use std::path::Path;

use crate::content_store;
use crate::context::Context;
use crate::get::format_ts_iso;
use crate::models::Stats;

pub async fn collect_stats(ctx: &Context) -> crate::error::Result<Stats> {
    Ok(Stats {
        document_count: content_store::count(&ctx.pool).await?,
        embedding_count: ctx.vectors.document_count().await?,
        concept_count: ctx.vectors.concept_count().await?,
        last_sync: content_store::last_sync(&ctx.pool).await?,
        database_size_bytes: database_size(&ctx.config.db.path),
    })
}

/// Size of the database file plus its write-ahead log.
fn database_size(path: &Path) -> u64 {
    let main = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let mut wal = path.as_os_str().to_owned();
    wal.push("-wal");
    let wal = std::fs::metadata(Path::new(&wal))
        .map(|m| m.len())
        .unwrap_or(0);
    main + wal
}

/// CLI entry point for `stats`.
pub async fn run_stats(ctx: &Context, json: bool) -> Result<()> {
    let stats = collect_stats(ctx).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let sync_display = match stats.last_sync {
        Some(ts) => format_ts_relative(ts),
        None => "never".to_string(),
    };

    println!("Index Stats");
    println!("===========");
    println!();
    println!("  Database:    {}", ctx.config.db.path.display());
    println!("  Size:        {}", format_bytes(stats.database_size_bytes));
    println!("  Last sync:   {}", sync_display);
    println!();
    println!("  Documents:   {}", stats.document_count);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.embedding_count,
        stats.document_count,
        if stats.document_count > 0 {
            (stats.embedding_count * 100) / stats.document_count
        } else {
            0
        }
    );
    println!("  Concepts:    {}", stats.concept_count);
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn recent_timestamps_are_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
    }

    #[test]
    fn missing_database_has_zero_size() {
        assert_eq!(database_size(Path::new("/nonexistent/dir/x.sqlite")), 0);
    }
}
