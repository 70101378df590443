//! Pooled upstream clients, built once at startup and reused for the
//! process lifetime.
//!
//! Four clients cover the transport matrix: {peer, local} × {pooled
//! HTTP/1.1, h2c}. Peer clients dial over the P2P host and exist only when
//! a dialer was supplied; local clients dial plain TCP. h2c is HTTP/2 with
//! prior knowledge over the cleartext connection — no TLS anywhere, the
//! P2P transport supplies the authenticated channel.

use crate::dial::{P2pConnector, P2pDialer};
use axum::body::Body;
use http::Request;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::{Client, Error as ClientError};
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

/// Idle pooled connections are dropped after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// Idle connections kept per upstream authority.
const POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Whether a request should ride the h2c transport.
pub fn wants_h2c(headers: &http::HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/grpc"))
}

/// Which side of the transport matrix a target lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Peer,
    Local,
}

pub struct TransportRegistry {
    peer_http1: Option<Client<P2pConnector, Body>>,
    peer_h2c: Option<Client<P2pConnector, Body>>,
    local_http1: Client<HttpConnector, Body>,
    local_h2c: Client<HttpConnector, Body>,
}

/// A borrowed client from the registry, erased over its connector type.
pub enum UpstreamClient<'a> {
    Peer(&'a Client<P2pConnector, Body>),
    Local(&'a Client<HttpConnector, Body>),
}

impl UpstreamClient<'_> {
    pub async fn request(&self, req: Request<Body>) -> Result<http::Response<Incoming>, ClientError> {
        match self {
            UpstreamClient::Peer(client) => client.request(req).await,
            UpstreamClient::Local(client) => client.request(req).await,
        }
    }
}

impl TransportRegistry {
    /// Build the registry. `dialer` may be absent when no P2P dialing is
    /// needed; peer-targeted forwards then fail with a transport error.
    pub fn new(dialer: Option<P2pDialer>) -> Self {
        let peer_http1 = dialer.clone().map(|d| {
            Client::builder(TokioExecutor::new())
                .pool_idle_timeout(POOL_IDLE_TIMEOUT)
                .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
                .build(P2pConnector::new(d))
        });
        let peer_h2c = dialer.map(|d| {
            Client::builder(TokioExecutor::new())
                .http2_only(true)
                .build(P2pConnector::new(d))
        });

        let mut local_connector = HttpConnector::new();
        local_connector.set_nodelay(true);
        let local_http1 = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build(local_connector.clone());
        let local_h2c = Client::builder(TokioExecutor::new())
            .http2_only(true)
            .build(local_connector);

        Self {
            peer_http1,
            peer_h2c,
            local_http1,
            local_h2c,
        }
    }

    /// Select the client for a target kind and transport preference.
    /// Returns `None` for peer targets when no dialer was configured.
    pub fn select(&self, kind: TargetKind, h2c: bool) -> Option<UpstreamClient<'_>> {
        match (kind, h2c) {
            (TargetKind::Peer, true) => self.peer_h2c.as_ref().map(UpstreamClient::Peer),
            (TargetKind::Peer, false) => self.peer_http1.as_ref().map(UpstreamClient::Peer),
            (TargetKind::Local, true) => Some(UpstreamClient::Local(&self.local_h2c)),
            (TargetKind::Local, false) => Some(UpstreamClient::Local(&self.local_http1)),
        }
    }
}
