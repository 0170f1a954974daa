//! Sync progress reporting.
//!
//! The indexer emits a stream of [`SyncProgressEvent`]s to a
//! [`SyncProgressReporter`]. Sinks:
//!
//! - [`StderrProgress`]: human lines on stderr
//! - [`JsonProgress`]: one JSON object per line on stderr
//! - [`ChannelProgress`]: forwards events to a tokio channel
//! - [`NoProgress`]: discards everything
//!
//! Terminal sinks write to **stderr** so stdout remains parseable for scripts.

use serde::Serialize;
use std::io::Write;
use tokio::sync::mpsc;

use crate::error::ErrorKind;

/// A single progress event for sync.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SyncProgressEvent {
    /// Walking the source root. Total unknown.
    Discovering { root: String },
    /// `n` of `total` candidate files classified.
    Processing { n: u64, total: u64, path: String },
    /// A batch of `size` documents is being embedded.
    Embedding { size: u64 },
    /// A file could not be indexed; the sync continues.
    FileFailed {
        path: String,
        kind: ErrorKind,
        message: String,
    },
    /// Stored documents no longer present under the root were deleted.
    Removed { count: u64 },
    /// The run is over.
    Finished {
        added: u64,
        updated: u64,
        unchanged: u64,
        removed: u64,
        errors: u64,
        cancelled: bool,
    },
}

/// Receives progress events. Called from the indexer task; must not block.
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync  processing  1,234 / 5,000 files".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Discovering { root } => {
                format!("sync {}  discovering...\n", root)
            }
            SyncProgressEvent::Processing { n, total, .. } => format!(
                "sync  processing  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
            SyncProgressEvent::Embedding { size } => {
                format!("sync  embedding batch of {}\n", format_number(*size))
            }
            SyncProgressEvent::FileFailed { path, message, .. } => {
                format!("sync  failed  {}: {}\n", path, message)
            }
            SyncProgressEvent::Removed { count } => {
                format!("sync  removed  {} documents\n", format_number(*count))
            }
            SyncProgressEvent::Finished {
                added,
                updated,
                unchanged,
                removed,
                errors,
                cancelled,
            } => format!(
                "sync  {}  +{} ~{} ={} -{} !{}\n",
                if *cancelled { "cancelled" } else { "done" },
                added,
                updated,
                unchanged,
                removed,
                errors
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let mut obj = match serde_json::to_value(&event) {
            Ok(v) => v,
            Err(_) => return,
        };
        if let Some(map) = obj.as_object_mut() {
            map.insert("event".to_string(), serde_json::json!("progress"));
        }
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// Forwards events to an unbounded channel, for embedding the indexer in a
/// larger application. Events are dropped once the receiver is gone.
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<SyncProgressEvent>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SyncProgressReporter for ChannelProgress {
    fn report(&self, event: SyncProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
