//! Error taxonomy for the indexing and ranking engine.
//!
//! Library operations return [`Result`] with an [`Error`]. The CLI and other
//! glue code wrap these in `anyhow` for context; the variants themselves stay
//! matchable so callers can tell caller mistakes (unknown concept, zero
//! vector) apart from infrastructure failures (database, gateway).

use serde::Serialize;

use crate::embedding::GatewayError;
use crate::extract::ExtractError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file could not be turned into text (unsupported, corrupt or empty).
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    /// The embedding gateway asked us to slow down and retries ran out.
    #[error("embedding gateway rate limited: {0}")]
    RateLimited(String),

    /// The embedding gateway failed and retries ran out.
    #[error("embedding gateway error: {0}")]
    Gateway(String),

    /// A vector did not have the configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("unknown concept: {0}")]
    UnknownConcept(String),

    /// A vector had (numerically) zero length and cannot be normalized.
    #[error("vector has zero length and cannot be normalized")]
    ZeroVector,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A background task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),
}

impl From<GatewayError> for Error {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::RateLimited(msg) => Error::RateLimited(msg),
            GatewayError::Failed(msg) | GatewayError::Rejected(msg) => Error::Gateway(msg),
        }
    }
}

/// Coarse classification of a per-file sync failure, reported in
/// [`SyncReport::errors`](crate::models::SyncReport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Extraction,
    RateLimited,
    Gateway,
    DimensionMismatch,
    Io,
    Database,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Extraction(_) => ErrorKind::Extraction,
            Error::RateLimited(_) => ErrorKind::RateLimited,
            Error::Gateway(_) => ErrorKind::Gateway,
            Error::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Error::Io(_) => ErrorKind::Io,
            Error::Database(_) => ErrorKind::Database,
            Error::UnknownConcept(_)
            | Error::ZeroVector
            | Error::NotFound(_)
            | Error::InvalidInput(_)
            | Error::Task(_) => ErrorKind::Other,
        }
    }
}
