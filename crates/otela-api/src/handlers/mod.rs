//! HTTP handlers — forwarding shapes and peer-table projections.

pub mod forward;
pub mod peers;

use otela_core::EventSink;
use otela_mesh::{PeerTable, ServiceResolver};
use otela_proxy::{ProviderSelector, TransportRegistry};
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub table: PeerTable,
    pub resolver: ServiceResolver,
    pub transports: Arc<TransportRegistry>,
    pub events: EventSink,
    pub selector: ProviderSelector,
    /// This node's peer id, recorded as the origin of forward events.
    pub local_id: String,
    /// Bootstrap multiaddrs from config, exposed read-only.
    pub bootstraps: Vec<String>,
}

pub use forward::{global_service_forward, peer_forward, service_forward};
pub use peers::{list_bootstraps, list_peers, list_peers_status, resource_stats};
