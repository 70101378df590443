//! HTTP front door for the Otela gateway.
//!
//! Mounts the three forwarding shapes plus read-only projections of the
//! peer table. The same router serves both the public TCP listener and
//! inbound HTTP-over-P2P streams.

pub mod handlers;

use axum::Router;
use axum::routing::{any, get};
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/peers", get(handlers::list_peers))
        .route("/peers/status", get(handlers::list_peers_status))
        .route("/bootstraps", get(handlers::list_bootstraps))
        .route("/resources", get(handlers::resource_stats))
        .route("/peers/{peer_id}/{*path}", any(handlers::peer_forward))
        .route("/service/{service}/{*path}", any(handlers::service_forward))
        .route(
            "/global-service/{service}/{*path}",
            any(handlers::global_service_forward),
        )
        // Receiving end of dispatched forwards: providers serve the global
        // service they advertise through their local registration.
        .route("/v1/_service/{service}/{*path}", any(handlers::service_forward))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(router: Router, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "gateway API listening");
    axum::serve(listener, router).await?;
    Ok(())
}
