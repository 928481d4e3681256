//! Per-source read exclusivity.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-source locks.
///
/// A read of a source holds that source's lock for the whole adapter call, so
/// reads of the same source never overlap, not even across schedules sharing
/// the registry. Cloning the registry shares the locks.
#[derive(Debug, Clone, Default)]
pub struct SourceLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a lock exists for every source.
    pub fn ensure<I, S>(&self, source_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for source_id in source_ids {
            self.lock_for(source_id.as_ref());
        }
    }

    fn lock_for(&self, source_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(source_id) {
            return lock.clone();
        }
        self.locks
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to a source.
    pub async fn acquire(&self, source_id: &str) -> OwnedMutexGuard<()> {
        self.lock_for(source_id).lock_owned().await
    }

    /// Check whether a read of the source is currently in progress.
    pub fn is_locked(&self, source_id: &str) -> bool {
        self.locks
            .get(source_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.locks.contains_key(source_id)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
