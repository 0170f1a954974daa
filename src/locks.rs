//! Per-document exclusive locks.
//!
//! Writers (sync commits, removals, admin deletes) take the lock for a
//! document id before opening their transaction, so two writers never
//! interleave on the same document. Readers never lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
pub struct DocLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn acquire(&self, id: &str) -> DocGuard<'_> {
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            map.entry(id.to_string()).or_default().clone()
        };
        let guard = slot.lock_owned().await;
        DocGuard {
            locks: self,
            id: id.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of ids with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, id: &str) {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        // Only the map holds the slot once no guard or waiter references it.
        if let Some(slot) = map.get(id) {
            if Arc::strong_count(slot) == 1 {
                map.remove(id);
            }
        }
    }
}

/// Held while a writer owns a document id. Releases on drop.
pub struct DocGuard<'a> {
    locks: &'a DocLocks,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DocGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.id);
    }
}
