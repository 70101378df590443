//! Dialing peers over the P2P host, exposed as a hyper connector.
//!
//! The connector treats the URI authority as an encoded peer identifier:
//! it decodes the host portion as a `PeerId` and opens a raw protocol
//! stream to that peer. Undecodable identifiers fail fast with a
//! descriptive error before any network activity.

use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use libp2p::{PeerId, Stream, StreamProtocol};
use libp2p_stream::Control;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};

/// Application protocol id for HTTP carried over P2P streams.
pub const HTTP_PROTOCOL: StreamProtocol = StreamProtocol::new("/libp2p-http");

/// Opens `/libp2p-http` streams to peers via the host's stream control.
#[derive(Clone)]
pub struct P2pDialer {
    control: Control,
}

impl P2pDialer {
    pub fn new(control: Control) -> Self {
        Self { control }
    }

    pub async fn dial(&self, peer: PeerId) -> io::Result<Stream> {
        self.control
            .clone()
            .open_stream(peer, HTTP_PROTOCOL)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, e.to_string()))
    }
}

/// hyper connector that dials the URI authority as a peer id.
#[derive(Clone)]
pub struct P2pConnector {
    dialer: P2pDialer,
}

impl P2pConnector {
    pub fn new(dialer: P2pDialer) -> Self {
        Self { dialer }
    }
}

impl tower::Service<http::Uri> for P2pConnector {
    type Response = P2pConn;
    type Error = io::Error;
    type Future = Pin<Box<dyn Future<Output = io::Result<P2pConn>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: http::Uri) -> Self::Future {
        let dialer = self.dialer.clone();
        Box::pin(async move {
            let host = dst
                .host()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "uri has no authority"))?;
            let peer: PeerId = host.parse().map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("failed to decode peer id {host}: {e}"),
                )
            })?;
            let stream = dialer.dial(peer).await?;
            Ok(P2pConn {
                inner: TokioIo::new(stream.compat()),
            })
        })
    }
}

/// A P2P stream adapted to hyper's IO traits.
#[derive(Debug)]
pub struct P2pConn {
    inner: TokioIo<Compat<Stream>>,
}

impl Connection for P2pConn {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl hyper::rt::Read for P2pConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl hyper::rt::Write for P2pConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
