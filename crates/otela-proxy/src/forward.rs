//! The streaming forward primitive shared by all three proxy shapes.
//!
//! The request body is never read here — it streams from the client to the
//! upstream untouched. The response streams back the same way, wrapped in a
//! deadline so a wedged upstream cannot hold a connection forever. SSE
//! responses get anti-buffering headers so intermediaries flush promptly.

use crate::transport::{TargetKind, TransportRegistry, wants_h2c};
use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_TYPE, HOST, HeaderName, HeaderValue};
use http::{Request, StatusCode, Uri, Version};
use hyper::body::Incoming;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Set on dispatcher-originated forwards so callers can see which provider
/// served the request.
pub const COMPUTING_NODE_HEADER: &str = "x-computing-node";

/// Upper bound on a whole forwarded exchange; sized for long-running
/// AI/ML inference responses.
const FORWARD_DEADLINE: Duration = Duration::from_secs(15 * 60);
/// How long we wait for upstream response headers.
const RESPONSE_HEADER_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Hop-by-hop headers that must not be forwarded.
const HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Where a forward is headed.
#[derive(Debug, Clone)]
pub enum ForwardTarget {
    /// A named peer, dialed over the P2P host.
    Peer { id: String },
    /// A plain TCP authority (`host:port`), e.g. a local service.
    Local { authority: String },
}

impl ForwardTarget {
    fn kind(&self) -> TargetKind {
        match self {
            ForwardTarget::Peer { .. } => TargetKind::Peer,
            ForwardTarget::Local { .. } => TargetKind::Local,
        }
    }

    fn authority(&self) -> &str {
        match self {
            ForwardTarget::Peer { id } => id,
            ForwardTarget::Local { authority } => authority,
        }
    }
}

/// Forward `req` to `target` at `path`, streaming both directions.
///
/// `computing_node` is set on the response when the identity-group
/// dispatcher chose the target.
pub async fn forward(
    transports: &TransportRegistry,
    target: &ForwardTarget,
    path: &str,
    mut req: Request<Body>,
    computing_node: Option<&str>,
) -> Response {
    let h2c = wants_h2c(req.headers());

    let Some(client) = transports.select(target.kind(), h2c) else {
        return error_response(
            StatusCode::BAD_GATEWAY,
            "p2p transport not configured on this node",
        );
    };

    let authority = target.authority();
    let uri = match build_uri(authority, path, req.uri().query()) {
        Ok(uri) => uri,
        Err(msg) => return error_response(StatusCode::BAD_GATEWAY, &msg),
    };
    tracing::debug!(%uri, h2c, "forwarding request");

    *req.uri_mut() = uri;
    *req.version_mut() = if h2c { Version::HTTP_2 } else { Version::HTTP_11 };
    strip_hop_headers(req.headers_mut());
    if !h2c {
        // Downstream Host-based routing sees the target, not this gateway.
        match HeaderValue::from_str(authority) {
            Ok(host) => {
                req.headers_mut().insert(HOST, host);
            }
            Err(_) => {
                return error_response(StatusCode::BAD_GATEWAY, "target authority is not a valid host");
            }
        }
    }

    let deadline = tokio::time::Instant::now() + FORWARD_DEADLINE;
    let upstream = match tokio::time::timeout(RESPONSE_HEADER_TIMEOUT, client.request(req)).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => return error_response(StatusCode::BAD_GATEWAY, &e.to_string()),
        Err(_) => {
            return error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "timed out waiting for upstream response headers",
            );
        }
    };

    finalize_response(upstream, deadline, computing_node)
}

/// Plain-text `ERROR: <msg>` body reported to the client on upstream
/// failure.
fn error_response(status: StatusCode, msg: &str) -> Response {
    tracing::warn!(%status, msg, "forward failed");
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(format!("ERROR: {msg}")))
        .expect("static error response")
}

fn build_uri(authority: &str, path: &str, query: Option<&str>) -> Result<Uri, String> {
    let mut uri = format!("http://{authority}{path}");
    if let Some(q) = query {
        uri.push('?');
        uri.push_str(q);
    }
    uri.parse()
        .map_err(|e| format!("invalid target uri {uri}: {e}"))
}

fn strip_hop_headers(headers: &mut http::HeaderMap) {
    for name in HOP_HEADERS {
        headers.remove(*name);
    }
}

/// Apply streaming-aware header rewrites and attach the deadline-bounded
/// body.
fn finalize_response(
    upstream: http::Response<Incoming>,
    deadline: tokio::time::Instant,
    computing_node: Option<&str>,
) -> Response {
    let (mut parts, body) = upstream.into_parts();

    let sse = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"));
    if sse {
        parts
            .headers
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        parts.headers.insert(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        );
    }

    if let Some(node) = computing_node {
        if let Ok(value) = HeaderValue::from_str(node) {
            parts
                .headers
                .insert(HeaderName::from_static(COMPUTING_NODE_HEADER), value);
        }
    }

    Response::from_parts(parts, Body::new(DeadlineBody::new(body, deadline)))
}

/// Streams an upstream body until the forward deadline, then errors the
/// stream instead of hanging the client.
struct DeadlineBody {
    inner: Pin<Box<Incoming>>,
    deadline: Pin<Box<tokio::time::Sleep>>,
}

impl DeadlineBody {
    fn new(inner: Incoming, deadline: tokio::time::Instant) -> Self {
        Self {
            inner: Box::pin(inner),
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
        }
    }
}

impl http_body::Body for DeadlineBody {
    type Data = Bytes;
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        let this = self.as_mut().get_mut();
        if this.deadline.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Some(Err("forward deadline exceeded".into())));
        }
        this.inner
            .as_mut()
            .poll_frame(cx)
            .map(|frame| frame.map(|r| r.map_err(Into::into)))
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_uri_keeps_query_and_path() {
        let uri = build_uri("10.0.0.5:7080", "/v1/chat", Some("stream=true")).unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.5:7080/v1/chat?stream=true");

        // Peer ids are case-sensitive; the authority must survive as written.
        let uri = build_uri("12D3KooWPeer", "/infer", None).unwrap();
        assert_eq!(uri.host(), Some("12D3KooWPeer"));
        assert_eq!(uri.path(), "/infer");
    }

    #[test]
    fn hop_headers_are_stripped() {
        let mut headers = http::HeaderMap::new();
        headers.insert("connection", "keep-alive".parse().unwrap());
        headers.insert("te", "trailers".parse().unwrap());
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        strip_hop_headers(&mut headers);
        assert!(headers.get("connection").is_none());
        assert!(headers.get("te").is_none());
        assert!(headers.get(CONTENT_TYPE).is_some());
    }

    #[tokio::test]
    async fn peer_forward_without_dialer_reports_transport_error() {
        let transports = TransportRegistry::new(None);
        let req = Request::builder()
            .uri("/peers/x/infer")
            .body(Body::empty())
            .unwrap();
        let resp = forward(
            &transports,
            &ForwardTarget::Peer { id: "x".into() },
            "/infer",
            req,
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert!(body.starts_with(b"ERROR: "));
    }
}
