//! Service lookup — local registrations and remote providers.

use crate::peer::{PeerStatus, ServiceAd};
use crate::table::PeerTable;
use dashmap::DashMap;
use std::sync::Arc;

/// A locally registered service, reachable over plain TCP.
#[derive(Debug, Clone)]
pub struct LocalService {
    pub host: String,
    pub port: u16,
}

/// A remote peer advertising one or more global services.
#[derive(Debug, Clone)]
pub struct Provider {
    pub id: String,
    pub services: Vec<ServiceAd>,
}

/// Resolves service names against local registrations and the peer table.
#[derive(Clone)]
pub struct ServiceResolver {
    table: PeerTable,
    local: Arc<DashMap<String, LocalService>>,
}

impl ServiceResolver {
    pub fn new(table: PeerTable) -> Self {
        Self {
            table,
            local: Arc::new(DashMap::new()),
        }
    }

    /// Register a service running on this node.
    pub fn register_local(&self, name: impl Into<String>, host: impl Into<String>, port: u16) {
        let name = name.into();
        tracing::info!(service = %name, port, "local service registered");
        self.local.insert(
            name,
            LocalService {
                host: host.into(),
                port,
            },
        );
    }

    /// Look up a locally registered service.
    pub fn local(&self, name: &str) -> Option<LocalService> {
        self.local.get(name).map(|s| s.clone())
    }

    /// All peers (excluding tombstones) advertising `name`.
    pub async fn providers(&self, name: &str) -> Vec<Provider> {
        self.table
            .snapshot()
            .await
            .into_iter()
            .filter(|p| p.status != PeerStatus::Left && p.advertises(name))
            .map(|p| Provider {
                id: p.id,
                services: p.services,
            })
            .collect()
    }
}
