//! Reaps replicated-store entries for peers that have been gone long enough.
//!
//! The manager never mutates the peer table itself: deleting the store key
//! makes the replication layer emit a delete event, which removes the entry
//! through the normal hook path on every node.

use crate::store::ReplicatedStore;
use crate::table::PeerTable;
use crate::peer::unix_now;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TombstoneError {
    #[error("retention must be at least one second, got {0:?}")]
    RetentionTooShort(Duration),
}

pub struct TombstoneManager {
    store: Arc<dyn ReplicatedStore>,
    table: PeerTable,
    retention: Duration,
}

impl TombstoneManager {
    /// Bind the manager to a store and retention window.
    ///
    /// `last_seen` is whole Unix seconds, so sub-second retention would
    /// reap peers the moment they leave.
    pub fn new(
        store: Arc<dyn ReplicatedStore>,
        table: PeerTable,
        retention: Duration,
    ) -> Result<Self, TombstoneError> {
        if retention < Duration::from_secs(1) {
            return Err(TombstoneError::RetentionTooShort(retention));
        }
        Ok(Self {
            store,
            table,
            retention,
        })
    }

    /// Delete store entries for peers marked `Left` longer than the
    /// retention window. Returns how many were reaped; per-key failures are
    /// logged and do not abort the sweep.
    pub async fn cleanup_left_peers(&self) -> usize {
        let candidates = self.collect_candidates().await;

        // The table mutex is released here; deletes are pure store I/O.
        let mut removed = 0;
        for id in candidates {
            let key = format!("/{id}");
            match self.store.delete(&key).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::error!(peer = %id, error = %e, "failed to delete left peer"),
            }
        }
        removed
    }

    async fn collect_candidates(&self) -> Vec<String> {
        let cutoff = unix_now() - self.retention.as_secs() as i64;
        self.table.collect_expired_left(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{Peer, PeerStatus};
    use crate::store::{MemStore, StoreError, StoreEvent};
    use crate::watch;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::broadcast;

    fn left_peer(id: &str, last_seen: i64) -> Vec<u8> {
        serde_json::to_vec(&Peer {
            id: id.to_string(),
            status: PeerStatus::Left,
            connected: false,
            last_seen,
            ..Default::default()
        })
        .unwrap()
    }

    fn active_peer(id: &str) -> Vec<u8> {
        serde_json::to_vec(&Peer {
            id: id.to_string(),
            status: PeerStatus::Connected,
            connected: true,
            last_seen: unix_now(),
            ..Default::default()
        })
        .unwrap()
    }

    async fn seed(store: &dyn ReplicatedStore, table: &PeerTable, id: &str, payload: Vec<u8>) {
        store
            .put(&format!("/{id}"), Bytes::from(payload.clone()))
            .await
            .unwrap();
        table.apply_update(id, &payload).await;
    }

    #[tokio::test]
    async fn sweep_reaps_only_expired_left_peers() {
        let store = Arc::new(MemStore::new());
        let table = PeerTable::new();
        let manager = TombstoneManager::new(
            store.clone(),
            table.clone(),
            Duration::from_secs(2),
        )
        .unwrap();

        let now = unix_now();
        seed(&*store, &table, "active-peer", active_peer("active-peer")).await;
        seed(&*store, &table, "recent-left", left_peer("recent-left", now - 1)).await;
        seed(&*store, &table, "old-left", left_peer("old-left", now - 5)).await;

        let removed = manager.cleanup_left_peers().await;
        assert_eq!(removed, 1);

        assert!(store.has("/active-peer").await.unwrap());
        assert!(store.has("/recent-left").await.unwrap());
        assert!(!store.has("/old-left").await.unwrap());
    }

    #[tokio::test]
    async fn sweep_removal_propagates_to_table_via_watch() {
        let store: Arc<MemStore> = Arc::new(MemStore::new());
        let table = PeerTable::new();
        let _bridge = watch::spawn(store.clone(), table.clone());
        let manager =
            TombstoneManager::new(store.clone(), table.clone(), Duration::from_secs(2)).unwrap();

        seed(&*store, &table, "old-left", left_peer("old-left", unix_now() - 5)).await;
        seed(&*store, &table, "active", active_peer("active")).await;

        assert_eq!(manager.cleanup_left_peers().await, 1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(table.get("old-left").await.is_none());
        assert!(table.get("active").await.is_some());
    }

    #[tokio::test]
    async fn rejoin_before_sweep_is_not_collected() {
        let store = Arc::new(MemStore::new());
        let table = PeerTable::new();
        let manager =
            TombstoneManager::new(store.clone(), table.clone(), Duration::from_secs(2)).unwrap();

        seed(&*store, &table, "rejoiner", left_peer("rejoiner", unix_now() - 5)).await;
        assert_eq!(manager.collect_candidates().await.len(), 1);

        // Rejoin lands before the sweep runs; the tombstone is overwritten.
        seed(&*store, &table, "rejoiner", active_peer("rejoiner")).await;
        assert!(manager.collect_candidates().await.is_empty());

        assert_eq!(manager.cleanup_left_peers().await, 0);
        assert!(store.has("/rejoiner").await.unwrap());
        assert_eq!(
            table.get("rejoiner").await.unwrap().status,
            PeerStatus::Connected
        );
    }

    #[tokio::test]
    async fn rejoin_after_cleanup_starts_fresh() {
        let store: Arc<MemStore> = Arc::new(MemStore::new());
        let table = PeerTable::new();
        let _bridge = watch::spawn(store.clone(), table.clone());
        let manager =
            TombstoneManager::new(store.clone(), table.clone(), Duration::from_secs(1)).unwrap();

        seed(&*store, &table, "phoenix", left_peer("phoenix", unix_now() - 5)).await;
        assert_eq!(manager.cleanup_left_peers().await, 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(table.get("phoenix").await.is_none());

        // Same id joins again with fresh data.
        store
            .put("/phoenix", Bytes::from(active_peer("phoenix")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let peer = table.get("phoenix").await.expect("rejoined peer visible");
        assert_eq!(peer.status, PeerStatus::Connected);
        assert_eq!(manager.cleanup_left_peers().await, 0);
    }

    #[tokio::test]
    async fn sub_second_retention_is_rejected() {
        let store = Arc::new(MemStore::new());
        let err = TombstoneManager::new(store, PeerTable::new(), Duration::from_millis(200));
        assert!(err.is_err());
    }

    /// Store whose deletes always fail; the sweep must log and continue.
    struct BrokenStore(MemStore);

    #[async_trait]
    impl ReplicatedStore for BrokenStore {
        async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
            self.0.put(key, value).await
        }
        async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
            self.0.get(key).await
        }
        async fn has(&self, key: &str) -> Result<bool, StoreError> {
            self.0.has(key).await
        }
        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk on fire".into()))
        }
        fn watch(&self) -> broadcast::Receiver<StoreEvent> {
            self.0.watch()
        }
    }

    #[tokio::test]
    async fn failed_deletes_are_not_counted() {
        let store = Arc::new(BrokenStore(MemStore::new()));
        let table = PeerTable::new();
        let manager =
            TombstoneManager::new(store.clone(), table.clone(), Duration::from_secs(1)).unwrap();

        seed(&*store, &table, "doomed", left_peer("doomed", unix_now() - 10)).await;
        assert_eq!(manager.cleanup_left_peers().await, 0);
        // The tombstone stays for the next sweep to retry.
        assert!(table.get("doomed").await.is_some());
    }
}
