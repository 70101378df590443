//! End-to-end forwards over real libp2p streams between two in-process
//! hosts: one dials, one serves the router over inbound streams.

use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{StatusCode, Version, header};
use axum::response::Response;
use axum::routing::any;
use futures::StreamExt;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{Multiaddr, PeerId, Swarm, noise, tcp, yamux};
use libp2p_stream as stream;
use otela_proxy::{ForwardTarget, P2pDialer, TransportRegistry, forward, serve_incoming};

#[derive(NetworkBehaviour)]
struct TestBehaviour {
    stream: stream::Behaviour,
}

fn host() -> (Swarm<TestBehaviour>, PeerId) {
    let mut swarm = libp2p::SwarmBuilder::with_new_identity()
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            yamux::Config::default,
        )
        .expect("tcp transport")
        .with_behaviour(|_| TestBehaviour {
            stream: stream::Behaviour::new(),
        })
        .expect("behaviour")
        .build();
    let peer_id = *swarm.local_peer_id();
    swarm
        .listen_on("/ip4/127.0.0.1/tcp/0".parse().unwrap())
        .expect("listen");
    (swarm, peer_id)
}

async fn first_listen_addr(swarm: &mut Swarm<TestBehaviour>) -> Multiaddr {
    loop {
        if let SwarmEvent::NewListenAddr { address, .. } = swarm.select_next_some().await {
            return address;
        }
    }
}

/// Upstream router: echoes gRPC requests and reports the protocol version
/// the request arrived with.
fn upstream_router() -> Router {
    Router::new().route(
        "/proxy",
        any(|req: Request| async move {
            let proto = format!("{:?}", req.version());
            let content_type = req
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("text/plain")
                .to_string();
            let body = axum::body::to_bytes(req.into_body(), 1024).await.unwrap();

            let reply = if &body[..] == b"mock-grpc-request" {
                "mock-grpc-response"
            } else {
                "plain-response"
            };
            Response::builder()
                .header(header::CONTENT_TYPE, content_type)
                .header("x-upstream-proto", proto)
                .body(Body::from(reply))
                .unwrap()
        }),
    )
}

/// Wire two hosts together and return a transport registry whose dialer
/// reaches the serving host.
async fn connected_fabric() -> (TransportRegistry, PeerId) {
    let (mut dialer_swarm, _) = host();
    let (mut server_swarm, server_id) = host();

    let server_addr = first_listen_addr(&mut server_swarm).await;

    let server_control = server_swarm.behaviour().stream.new_control();
    serve_incoming(server_control, upstream_router()).expect("register ingress");

    dialer_swarm
        .dial(server_addr.with(Protocol::P2p(server_id)))
        .expect("dial");
    loop {
        if let SwarmEvent::ConnectionEstablished { peer_id, .. } =
            dialer_swarm.select_next_some().await
        {
            assert_eq!(peer_id, server_id);
            break;
        }
    }

    let dial_control = dialer_swarm.behaviour().stream.new_control();
    tokio::spawn(async move {
        loop {
            dialer_swarm.select_next_some().await;
        }
    });
    tokio::spawn(async move {
        loop {
            server_swarm.select_next_some().await;
        }
    });

    let transports = TransportRegistry::new(Some(P2pDialer::new(dial_control)));
    (transports, server_id)
}

#[tokio::test]
async fn grpc_forward_crosses_the_mesh_as_http2() {
    let (transports, server_id) = connected_fabric().await;

    let req = Request::builder()
        .method("POST")
        .uri("/peers/x/proxy")
        .header(header::CONTENT_TYPE, "application/grpc")
        .body(Body::from("mock-grpc-request"))
        .unwrap();

    let resp = forward(
        &transports,
        &ForwardTarget::Peer {
            id: server_id.to_base58(),
        },
        "/proxy",
        req,
        Some(&server_id.to_base58()),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/grpc"
    );
    assert_eq!(
        resp.headers().get("x-upstream-proto").unwrap(),
        format!("{:?}", Version::HTTP_2).as_str()
    );
    assert_eq!(
        resp.headers().get("x-computing-node").unwrap(),
        server_id.to_base58().as_str()
    );
    let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"mock-grpc-response");
}

#[tokio::test]
async fn plain_forward_crosses_the_mesh_as_http1() {
    let (transports, server_id) = connected_fabric().await;

    let req = Request::builder()
        .method("POST")
        .uri("/peers/x/proxy")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"ping":true}"#))
        .unwrap();

    let resp = forward(
        &transports,
        &ForwardTarget::Peer {
            id: server_id.to_base58(),
        },
        "/proxy",
        req,
        None,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("x-upstream-proto").unwrap(),
        format!("{:?}", Version::HTTP_11).as_str()
    );
    let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"plain-response");
}
