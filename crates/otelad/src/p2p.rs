//! libp2p host bootstrap for the daemon.

use anyhow::{Context, Result};
use futures::StreamExt;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{Multiaddr, PeerId, identify, noise, tcp, yamux};
use libp2p_stream as stream;
use otela_core::config::P2pConfig;
use std::time::Duration;

#[derive(NetworkBehaviour)]
struct Behaviour {
    /// Raw protocol streams carrying HTTP between gateways.
    stream: stream::Behaviour,
    /// Identify keeps peer addresses fresh for outbound dials.
    identify: identify::Behaviour,
}

pub struct P2pHost {
    pub peer_id: PeerId,
    pub control: stream::Control,
}

/// Build the libp2p host, start listening, dial bootstrap peers, and spawn
/// the swarm event loop.
pub fn start(config: &P2pConfig) -> Result<P2pHost> {
    let keypair = libp2p::identity::Keypair::generate_ed25519();
    let peer_id = PeerId::from(keypair.public());

    let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            yamux::Config::default,
        )
        .context("tcp transport setup")?
        .with_behaviour(|key| Behaviour {
            stream: stream::Behaviour::new(),
            identify: identify::Behaviour::new(identify::Config::new(
                "/otela/1.0.0".to_string(),
                key.public(),
            )),
        })
        .map_err(|e| anyhow::anyhow!("behaviour setup: {e:?}"))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(300)))
        .build();

    swarm
        .listen_on(
            format!("/ip4/0.0.0.0/tcp/{}", config.listen_port)
                .parse()
                .context("listen multiaddr")?,
        )
        .context("p2p listen")?;

    for addr in &config.bootstrap_peers {
        match addr.parse::<Multiaddr>() {
            Ok(ma) => {
                if let Err(e) = swarm.dial(ma) {
                    tracing::warn!(addr, error = %e, "bootstrap dial failed");
                }
            }
            Err(e) => tracing::warn!(addr, error = %e, "ignoring malformed bootstrap address"),
        }
    }

    let control = swarm.behaviour().stream.new_control();

    tokio::spawn(async move {
        loop {
            match swarm.select_next_some().await {
                SwarmEvent::NewListenAddr { address, .. } => {
                    tracing::info!(%address, "p2p listening");
                }
                SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                    tracing::debug!(peer = %peer_id, "p2p connection established");
                }
                SwarmEvent::Behaviour(BehaviourEvent::Identify(identify::Event::Received {
                    peer_id,
                    info,
                    ..
                })) => {
                    for addr in info.listen_addrs {
                        swarm.add_peer_address(peer_id, addr);
                    }
                }
                _ => {}
            }
        }
    });

    Ok(P2pHost { peer_id, control })
}
