//! Streaming reverse-proxy engine for the Otela gateway.
//!
//! Three forwarding shapes share one primitive: forward to a named peer over
//! the P2P transport, to a locally registered service over TCP, or — via the
//! identity-group dispatcher — to one of many remote providers chosen by
//! request-payload identity. Transports are pooled and selected per request
//! by content type (gRPC rides h2c, everything else pooled HTTP/1.1).

pub mod dial;
pub mod dispatch;
pub mod forward;
pub mod ingress;
pub mod transport;

pub use dial::{HTTP_PROTOCOL, P2pConnector, P2pDialer};
pub use ingress::serve_incoming;
pub use dispatch::{
    FALLBACK_HEADER, MAX_INSPECT_BYTES, ProviderSelector, TierBuckets, bucket_providers,
    fallback_level, service_path,
};
pub use forward::{COMPUTING_NODE_HEADER, ForwardTarget, forward};
pub use transport::TransportRegistry;
