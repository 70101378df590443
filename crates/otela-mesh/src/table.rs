//! In-memory peer table, mutated only through the replication hooks.
//!
//! All mutations are serialised through a single mutex so external observers
//! see one total order of update/delete events. Sweep candidate collection
//! takes the same mutex and releases it before any store I/O.

use crate::peer::{Peer, PeerStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Handle to the shared peer table. Cheap to clone.
#[derive(Clone, Default)]
pub struct PeerTable {
    entries: Arc<Mutex<HashMap<String, Peer>>>,
}

/// Normalise a raw store key or peer id to the table key `/<id>`.
fn table_key(raw: &str) -> String {
    let id = raw.trim_start_matches('/');
    format!("/{id}")
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update hook: decode `payload` as a peer record and insert or replace
    /// the entry. Malformed payloads are logged and dropped; the hook never
    /// fails the caller.
    ///
    /// A record with status `Left` is still written — with `connected`
    /// forced to false — so the tombstone survives until retention elapses.
    pub async fn apply_update(&self, key: &str, payload: &[u8]) {
        let mut peer: Peer = match serde_json::from_slice(payload) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(key, error = %e, "dropping undecodable peer record");
                return;
            }
        };
        if peer.status == PeerStatus::Left {
            peer.connected = false;
        }
        if peer.id.is_empty() {
            peer.id = key.trim_start_matches('/').to_string();
        }

        let table_key = table_key(key);
        let mut entries = self.entries.lock().await;
        entries.insert(table_key, peer);
    }

    /// Delete hook: remove the entry, if present.
    pub async fn apply_delete(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        if entries.remove(&table_key(key)).is_some() {
            tracing::debug!(key, "peer removed from table");
        }
    }

    /// Look up a single peer by raw id or table key.
    pub async fn get(&self, peer_id: &str) -> Option<Peer> {
        self.entries.lock().await.get(&table_key(peer_id)).cloned()
    }

    /// Point-in-time snapshot of all records.
    pub async fn snapshot(&self) -> Vec<Peer> {
        self.entries.lock().await.values().cloned().collect()
    }

    /// Raw ids of every known peer.
    pub async fn peer_ids(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .keys()
            .map(|k| k.trim_start_matches('/').to_string())
            .collect()
    }

    /// Number of peers currently marked connected.
    pub async fn connected_count(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|p| p.connected)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Raw ids of peers with status `Left` whose `last_seen` is strictly
    /// older than `cutoff`. Holds the table mutex only for the scan.
    pub(crate) async fn collect_expired_left(&self, cutoff: i64) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|(_, p)| p.status == PeerStatus::Left && p.last_seen < cutoff)
            .map(|(k, _)| k.trim_start_matches('/').to_string())
            .collect()
    }
}
