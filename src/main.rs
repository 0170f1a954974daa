//! # concept-search CLI (`csearch`)
//!
//! ## Usage
//!
//! ```bash
//! csearch --config ./config/csearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `csearch init` | Create the SQLite database and run schema migrations |
//! | `csearch sync` | Index the configured folder (added/updated/unchanged/removed) |
//! | `csearch search "<query>"` | Keyword, semantic or hybrid search |
//! | `csearch concept add <name> <text>` | Store a named concept vector |
//! | `csearch concept mix "a:1,b:-0.5"` | Search with a weighted concept mix |
//! | `csearch concept debias <main> <remove>` | Search with one concept projected out |
//! | `csearch get <id>` | Print a full document |
//! | `csearch docs list` / `docs rm <id>` | Document administration |
//! | `csearch stats` | Index statistics |
//!
//! Logs go to stderr through `tracing`; set `RUST_LOG` to change the level.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use concept_search::config;
use concept_search::context::Context;
use concept_search::progress::ProgressMode;
use concept_search::search::SearchMode;
use concept_search::{concept_cmd, get, indexer, migrate, search, stats};

/// Change-aware document indexing with keyword, semantic, hybrid and
/// concept-vector search.
#[derive(Parser)]
#[command(name = "csearch", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/csearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it again is safe.
    Init,

    /// Index the source folder.
    ///
    /// New files are added, changed files re-indexed, and documents whose
    /// file disappeared are removed. Ctrl-C stops after the current file.
    Sync {
        /// Folder to index. Defaults to `[index].root` from the config.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Count candidate files and estimate tokens without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search indexed documents.
    Search {
        query: String,

        /// `semantic` and `hybrid` require an embedding provider.
        #[arg(long, value_enum, default_value = "keyword")]
        mode: SearchMode,

        /// Maximum number of results (1-100).
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Manage concept vectors and search with them.
    Concept {
        #[command(subcommand)]
        action: ConceptAction,
    },

    /// Print a document by id.
    Get {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Document administration.
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Show index statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConceptAction {
    /// Embed a description and store it under a name (overwrites).
    Add { name: String, text: String },

    List {
        #[arg(long)]
        json: bool,
    },

    /// Delete a concept.
    Rm { name: String },

    /// Search with a weighted mix, e.g. `safety:1.0,hype:-0.5`.
    Mix {
        mix: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Search with `main` after removing the `remove` direction.
    Debias {
        main: String,
        remove: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DocsAction {
    /// List documents, newest first.
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        per_page: usize,

        /// Only documents matching these words.
        #[arg(long)]
        filter: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Delete a document from every store.
    Rm { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let ctx = Context::open(&cfg).await?;

    let outcome = match cli.command {
        Commands::Init => Ok(()),
        Commands::Sync {
            root,
            dry_run,
            progress,
            json,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            indexer::run_sync(&ctx, root.as_deref(), dry_run, progress, json).await
        }
        Commands::Search {
            query,
            mode,
            limit,
            json,
        } => search::run_search(&ctx, &query, mode, limit, json).await,
        Commands::Concept { action } => match action {
            ConceptAction::Add { name, text } => concept_cmd::run_add(&ctx, &name, &text).await,
            ConceptAction::List { json } => concept_cmd::run_list(&ctx, json).await,
            ConceptAction::Rm { name } => concept_cmd::run_delete(&ctx, &name).await,
            ConceptAction::Mix { mix, limit, json } => {
                concept_cmd::run_mix(&ctx, &mix, limit, json).await
            }
            ConceptAction::Debias {
                main,
                remove,
                limit,
                json,
            } => concept_cmd::run_debias(&ctx, &main, &remove, limit, json).await,
        },
        Commands::Get { id, json } => get::run_get(&ctx, &id, json).await,
        Commands::Docs { action } => match action {
            DocsAction::List {
                page,
                per_page,
                filter,
                json,
            } => get::run_list(&ctx, page, per_page, filter.as_deref(), json).await,
            DocsAction::Rm { id } => get::run_delete(&ctx, &id).await,
        },
        Commands::Stats { json } => stats::run_stats(&ctx, json).await,
    };

    ctx.close().await;
    outcome
}
