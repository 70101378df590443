//! Read-only projections of the peer table.

use super::ApiState;
use axum::Json;
use axum::extract::State;
use otela_mesh::Peer;
use serde::Serialize;

#[derive(Serialize)]
pub struct PeerListResponse {
    pub peers: Vec<String>,
}

#[derive(Serialize)]
pub struct PeerStatusResponse {
    pub peers: Vec<Peer>,
}

#[derive(Serialize)]
pub struct ResourceStatsResponse {
    pub peers: Vec<Peer>,
    pub connected_peers: usize,
    pub total_peers_known: usize,
}

/// `GET /peers` — known peer ids.
pub async fn list_peers(State(state): State<ApiState>) -> Json<PeerListResponse> {
    Json(PeerListResponse {
        peers: state.table.peer_ids().await,
    })
}

/// `GET /peers/status` — full peer records, tombstones included.
pub async fn list_peers_status(State(state): State<ApiState>) -> Json<PeerStatusResponse> {
    Json(PeerStatusResponse {
        peers: state.table.snapshot().await,
    })
}

/// `GET /bootstraps` — configured bootstrap addresses.
pub async fn list_bootstraps(State(state): State<ApiState>) -> Json<PeerListResponse> {
    Json(PeerListResponse {
        peers: state.bootstraps.clone(),
    })
}

/// `GET /resources` — peer records plus connectivity counters.
pub async fn resource_stats(State(state): State<ApiState>) -> Json<ResourceStatsResponse> {
    let peers = state.table.snapshot().await;
    let connected_peers = peers.iter().filter(|p| p.connected).count();
    let total_peers_known = peers.len();
    Json(ResourceStatsResponse {
        peers,
        connected_peers,
        total_peers_known,
    })
}
