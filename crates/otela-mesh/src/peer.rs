//! Peer records as replicated across the mesh.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle status of a peer, as written into the replicated store.
///
/// `Left` is a tombstone: the record stays in the table so that the
/// replicated delete can propagate safely before storage is reclaimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeerStatus {
    #[default]
    Connecting,
    Connected,
    Left,
}

impl PeerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerStatus::Connecting => "CONNECTING",
            PeerStatus::Connected => "CONNECTED",
            PeerStatus::Left => "LEFT",
        }
    }
}

/// A service advertised by a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAd {
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    /// Identity tags: `key=value`, `key=*`, or `all`.
    #[serde(default)]
    pub identity_group: Vec<String>,
}

/// A known participant in the mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    /// Opaque P2P host identity.
    pub id: String,
    /// Reachable network address (host only).
    #[serde(default)]
    pub public_address: String,
    #[serde(default)]
    pub status: PeerStatus,
    /// Derived from recent reachability probes.
    #[serde(default)]
    pub connected: bool,
    /// Unix seconds of the last observed transition.
    #[serde(default)]
    pub last_seen: i64,
    #[serde(default)]
    pub services: Vec<ServiceAd>,
}

impl Peer {
    /// Whether this peer advertises a global service under `name`.
    pub fn advertises(&self, name: &str) -> bool {
        self.services.iter().any(|s| s.name == name)
    }
}

/// Current wall clock in whole Unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
