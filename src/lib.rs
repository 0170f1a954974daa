//! # concept-search
//!
//! Change-aware document indexing with keyword, semantic, hybrid and
//! concept-vector search over a local folder.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────────────────────┐
//! │  Folder  │──▶│  Indexer  │──▶│ SQLite: documents            │
//! │ txt/md/  │   │ extract + │   │         embeddings           │
//! │ pdf/docx │   │ embed     │   │         documents_fts (BM25) │
//! └──────────┘   └───────────┘   │         concept_vectors      │
//!                                └──────────────┬───────────────┘
//!                                               │
//!                          ┌────────────────────┤
//!                          ▼                    ▼
//!                   ┌──────────────┐    ┌────────────────┐
//!                   │ SearchEngine │    │ ConceptAlgebra │
//!                   └──────────────┘    └────────────────┘
//! ```
//!
//! Every component takes an explicit [`Context`](context::Context).
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] / [`migrate`] | SQLite pool and schema |
//! | [`content_store`] | Document rows and change detection |
//! | [`vector_store`] | Document and concept vectors, concept cache |
//! | [`lexical`] | FTS5 index and BM25 queries |
//! | [`embedding`] | Embedding gateways and retry policy |
//! | [`extract`] | Text extraction from txt, md, pdf, docx |
//! | [`discover`] | Candidate file discovery |
//! | [`indexer`] | Sync: classify, embed, commit, remove |
//! | [`search`] | Keyword, semantic, hybrid and concept search |
//! | [`concepts`] | Concept mixes and debiasing |
//! | [`progress`] | Sync progress events and sinks |
//! | [`stats`] / [`get`] | Statistics and document administration |

pub mod concept_cmd;
pub mod concepts;
pub mod config;
pub mod content_store;
pub mod context;
pub mod db;
pub mod discover;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod get;
pub mod indexer;
pub mod lexical;
pub mod locks;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod search;
pub mod stats;
pub mod vector;
pub mod vector_store;

pub use error::{Error, Result};
