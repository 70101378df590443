//! Interface to the replicated datastore.
//!
//! The CRDT replication engine is an external collaborator; the gateway
//! consumes its key/value API plus a watch stream of update and delete
//! events. `MemStore` is a last-write-wins in-memory stand-in used by tests
//! and single-node runs.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// An event observed on the replicated store.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Updated { key: String, value: Bytes },
    Deleted { key: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend: {0}")]
    Backend(String),
}

/// Replicated key/value store with watch semantics.
///
/// Keys are hierarchical paths; the gateway uses the leaf `/<peer-id>`.
#[async_trait]
pub trait ReplicatedStore: Send + Sync {
    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;
    async fn has(&self, key: &str) -> Result<bool, StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Subscribe to the update/delete event stream.
    fn watch(&self) -> broadcast::Receiver<StoreEvent>;
}

/// In-memory last-write-wins store.
pub struct MemStore {
    entries: Arc<Mutex<HashMap<String, Bytes>>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplicatedStore for MemStore {
    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.clone());
        let _ = self.events.send(StoreEvent::Updated {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.lock().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let removed = self.entries.lock().await.remove(key);
        if removed.is_some() {
            let _ = self.events.send(StoreEvent::Deleted {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_has_delete() {
        let store = MemStore::new();
        store.put("/p1", Bytes::from_static(b"v1")).await.unwrap();
        assert!(store.has("/p1").await.unwrap());
        assert_eq!(store.get("/p1").await.unwrap().unwrap(), Bytes::from_static(b"v1"));

        store.delete("/p1").await.unwrap();
        assert!(!store.has("/p1").await.unwrap());
        assert!(store.get("/p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn watch_sees_updates_and_deletes() {
        let store = MemStore::new();
        let mut rx = store.watch();

        store.put("/p1", Bytes::from_static(b"v1")).await.unwrap();
        store.delete("/p1").await.unwrap();

        match rx.recv().await.unwrap() {
            StoreEvent::Updated { key, value } => {
                assert_eq!(key, "/p1");
                assert_eq!(value, Bytes::from_static(b"v1"));
            }
            other => panic!("expected update, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            StoreEvent::Deleted { key } => assert_eq!(key, "/p1"),
            other => panic!("expected delete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn delete_of_absent_key_emits_nothing() {
        let store = MemStore::new();
        let mut rx = store.watch();
        store.delete("/missing").await.unwrap();
        store.put("/p1", Bytes::from_static(b"v")).await.unwrap();
        // First observed event is the put, not a spurious delete.
        match rx.recv().await.unwrap() {
            StoreEvent::Updated { key, .. } => assert_eq!(key, "/p1"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
