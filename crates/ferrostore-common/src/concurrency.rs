//! Process-local keyed mutex registry (§5): serializes read-modify-write
//! critical sections for a given (bucket,key) or upload id without holding a
//! database transaction open across the whole operation.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyedMutexRegistry {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedMutexRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating it on first use. The returned
    /// guard holds a clone of the `Arc`, so the registry entry can be
    /// dropped concurrently without invalidating an in-flight guard.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serializes_same_key() {
        let registry = KeyedMutexRegistry::new();
        let _guard1 = registry.lock("bucket/key").await;
        // A second lock on a different key must not block.
        let guard2 = registry.lock("bucket/other").await;
        drop(guard2);
    }
}
