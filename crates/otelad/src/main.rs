//! otelad — Otela mesh gateway daemon.

use anyhow::{Context, Result};
use bytes::Bytes;
use otela_api::ApiState;
use otela_core::{EventSink, OtelaConfig};
use otela_mesh::{
    MemStore, Peer, PeerStatus, PeerTable, ReplicatedStore, ServiceAd, ServiceResolver,
    TombstoneManager, unix_now, watch,
};
use otela_proxy::{P2pDialer, ProviderSelector, TransportRegistry};
use std::sync::Arc;
use std::time::Duration;

mod p2p;

#[tokio::main]
async fn main() -> Result<()> {
    let config = OtelaConfig::load().context("failed to load config")?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let host = p2p::start(&config.p2p)?;
    let local_id = host.peer_id.to_base58();
    tracing::info!(peer_id = %local_id, "p2p host ready");

    // The replication engine is pluggable; the in-memory store keeps a
    // single-node gateway fully functional.
    let store: Arc<dyn ReplicatedStore> = Arc::new(MemStore::new());
    let table = PeerTable::new();
    let bridge = watch::spawn(store.clone(), table.clone());

    let resolver = ServiceResolver::new(table.clone());
    for svc in &config.local_services {
        resolver.register_local(&svc.name, &svc.host, svc.port);
    }

    announce_self(&*store, &config, &local_id, PeerStatus::Connected).await;

    let transports = Arc::new(TransportRegistry::new(Some(P2pDialer::new(
        host.control.clone(),
    ))));
    let events = EventSink::spawn();

    let state = ApiState {
        table: table.clone(),
        resolver,
        transports,
        events,
        selector: ProviderSelector::new(),
        local_id: local_id.clone(),
        bootstraps: config.p2p.bootstrap_peers.clone(),
    };
    let router = otela_api::router(state);

    otela_proxy::serve_incoming(host.control.clone(), router.clone())
        .map_err(|e| anyhow::anyhow!("p2p ingress registration: {e}"))?;

    let manager = TombstoneManager::new(
        store.clone(),
        table.clone(),
        Duration::from_secs(config.crdt.tombstone_retention_secs),
    )
    .context("tombstone manager")?;
    let sweep_interval = Duration::from_secs(config.crdt.sweep_interval_secs.max(1));
    let sweep_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let removed = manager.cleanup_left_peers().await;
            if removed > 0 {
                tracing::info!(removed, "tombstone sweep reclaimed peers");
            }
        }
    });

    let api_task = tokio::spawn(otela_api::serve(router, config.api.port));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            announce_self(&*store, &config, &local_id, PeerStatus::Left).await;
        }
        r = bridge => tracing::error!("store watch bridge exited: {:?}", r),
        r = sweep_task => tracing::error!("tombstone sweeper exited: {:?}", r),
        r = api_task => tracing::error!("api server exited: {:?}", r),
    }

    Ok(())
}

/// Write this gateway's own record into the replicated store so the rest
/// of the mesh learns its address and services.
async fn announce_self(
    store: &dyn ReplicatedStore,
    config: &OtelaConfig,
    local_id: &str,
    status: PeerStatus,
) {
    let record = Peer {
        id: local_id.to_string(),
        public_address: config.p2p.public_address.clone(),
        status,
        connected: status == PeerStatus::Connected,
        last_seen: unix_now(),
        services: config
            .local_services
            .iter()
            .map(|s| ServiceAd {
                name: s.name.clone(),
                host: s.host.clone(),
                port: s.port,
                identity_group: s.identity_group.clone(),
            })
            .collect(),
    };
    match serde_json::to_vec(&record) {
        Ok(payload) => {
            if let Err(e) = store.put(&format!("/{local_id}"), Bytes::from(payload)).await {
                tracing::error!(error = %e, "failed to announce self");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to encode self record"),
    }
}
