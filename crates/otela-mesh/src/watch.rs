//! Bridge from the replicated store's watch stream to the peer-table hooks.

use crate::store::{ReplicatedStore, StoreEvent};
use crate::table::PeerTable;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Spawn the watch bridge: every store event becomes a table hook call.
///
/// Concurrent store events are applied one at a time, in arrival order;
/// the table mutex makes the sequence observable as a total order.
pub fn spawn(store: Arc<dyn ReplicatedStore>, table: PeerTable) -> JoinHandle<()> {
    let mut rx = store.watch();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(StoreEvent::Updated { key, value }) => {
                    table.apply_update(&key, &value).await;
                }
                Ok(StoreEvent::Deleted { key }) => {
                    table.apply_delete(&key).await;
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "store watch lagged; peer table may be stale");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{Peer, PeerStatus, unix_now};
    use crate::store::MemStore;
    use bytes::Bytes;
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn store_put_reaches_table() {
        let store: Arc<dyn ReplicatedStore> = Arc::new(MemStore::new());
        let table = PeerTable::new();
        let _bridge = spawn(store.clone(), table.clone());

        let peer = Peer {
            id: "p1".into(),
            status: PeerStatus::Connected,
            connected: true,
            last_seen: unix_now(),
            ..Default::default()
        };
        store
            .put("/p1", Bytes::from(serde_json::to_vec(&peer).unwrap()))
            .await
            .unwrap();
        settle().await;

        assert_eq!(table.get("p1").await.unwrap().status, PeerStatus::Connected);
    }

    #[tokio::test]
    async fn store_delete_reaches_table() {
        let store: Arc<dyn ReplicatedStore> = Arc::new(MemStore::new());
        let table = PeerTable::new();
        let _bridge = spawn(store.clone(), table.clone());

        let peer = Peer {
            id: "p1".into(),
            ..Default::default()
        };
        store
            .put("/p1", Bytes::from(serde_json::to_vec(&peer).unwrap()))
            .await
            .unwrap();
        store.delete("/p1").await.unwrap();
        settle().await;

        assert!(table.get("p1").await.is_none());
    }
}
