//! Per-call exclusive lock registry
//!
//! Serializes all mutations for a single `call_id`: the engine acquires the
//! call's lock before its read-modify-write transaction and holds it until
//! after commit and event publication, so per-call updates are linearizable
//! and events leave the bus in linearization order. Callers for different
//! call ids never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Registry of per-call async mutexes, keyed by `call_id`
///
/// Entries are created on first use. The registry itself is advisory
/// runtime state; authoritative call state lives in the store.
#[derive(Clone, Default)]
pub struct CallLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl CallLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lock for `call_id`, waiting behind any holder
    /// of the same id. The guard releases on drop.
    pub async fn acquire(&self, call_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().unwrap();
            map.entry(call_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    /// Number of call ids with a registered lock (diagnostics)
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
