//! Receiving end of the forwarding fabric: serve HTTP over inbound P2P
//! streams.
//!
//! Every accepted `/libp2p-http` stream is handed to the auto connection
//! builder, so one protocol id carries both HTTP/1.1 and h2c (gRPC)
//! traffic into the same router that serves the TCP front door.

use crate::dial::HTTP_PROTOCOL;
use futures::StreamExt;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use libp2p_stream::{AlreadyRegistered, Control};
use tokio_util::compat::FuturesAsyncReadCompatExt;

/// Accept inbound HTTP-over-P2P streams and serve `router` on them.
///
/// Spawns the accept loop and returns immediately; the loop ends when the
/// stream control is dropped.
pub fn serve_incoming(mut control: Control, router: axum::Router) -> Result<(), AlreadyRegistered> {
    let mut incoming = control.accept(HTTP_PROTOCOL)?;

    tokio::spawn(async move {
        while let Some((peer, stream)) = incoming.next().await {
            tracing::debug!(peer = %peer, "inbound p2p http stream");
            let service = TowerToHyperService::new(router.clone());
            tokio::spawn(async move {
                let io = TokioIo::new(stream.compat());
                if let Err(e) = auto::Builder::new(TokioExecutor::new())
                    .serve_connection_with_upgrades(io, service)
                    .await
                {
                    tracing::debug!(error = %e, "p2p http connection ended");
                }
            });
        }
        tracing::info!("p2p ingress closed");
    });
    Ok(())
}
