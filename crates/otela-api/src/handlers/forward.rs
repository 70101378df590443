//! The three forwarding shapes.

use super::ApiState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, Limited};
use otela_core::ForwardEvent;
use otela_proxy::{ForwardTarget, MAX_INSPECT_BYTES, forward};
use serde_json::json;

/// `ANY /peers/{peer_id}/{*path}` — forward to a named peer over the P2P
/// transport. The body streams through untouched.
pub async fn peer_forward(
    State(state): State<ApiState>,
    Path((peer_id, path)): Path<(String, String)>,
    req: Request,
) -> Response {
    let path = format!("/{path}");
    state
        .events
        .emit(ForwardEvent::p2p(&state.local_id, &peer_id, &path));
    tracing::info!(peer = %peer_id, path = %path, "forwarding to peer");

    forward(
        &state.transports,
        &ForwardTarget::Peer { id: peer_id },
        &path,
        req,
        None,
    )
    .await
}

/// `ANY /service/{service}/{*path}` — forward to a locally registered
/// service over plain TCP. 400 when the name is unknown.
pub async fn service_forward(
    State(state): State<ApiState>,
    Path((service, path)): Path<(String, String)>,
    req: Request,
) -> Response {
    let Some(svc) = state.resolver.local(&service) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("service not found: {service}")})),
        )
            .into_response();
    };

    forward(
        &state.transports,
        &ForwardTarget::Local {
            authority: format!("{}:{}", svc.host, svc.port),
        },
        &format!("/{path}"),
        req,
        None,
    )
    .await
}

/// `ANY /global-service/{service}/{*path}` — pick a provider by
/// identity-group match against the JSON body, then forward to it.
///
/// This is the one shape that buffers the request body: identity
/// inspection needs the whole payload. The response side still streams.
pub async fn global_service_forward(
    State(state): State<ApiState>,
    Path((service, path)): Path<(String, String)>,
    req: Request,
) -> Response {
    let (parts, body) = req.into_parts();
    let body_bytes = match Limited::new(body, MAX_INSPECT_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<http_body_util::LengthLimitError>().is_some() => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({"error": "request body exceeds the dispatch inspection limit"})),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    let providers = state.resolver.providers(&service).await;
    let buckets = otela_proxy::bucket_providers(&providers, &service, &body_bytes);
    let level = otela_proxy::fallback_level(&parts.headers);

    let target_peer = match buckets.select(level).and_then(|tier| state.selector.pick(tier)) {
        Some(id) => id.to_string(),
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "No provider found for the requested service."})),
            )
                .into_response();
        }
    };

    let rewritten = otela_proxy::service_path(&service, &format!("/{path}"));
    state.events.emit(ForwardEvent::service(
        &state.local_id,
        &target_peer,
        &rewritten,
        &service,
    ));
    tracing::info!(provider = %target_peer, path = %rewritten, "dispatching global service request");

    let req = Request::from_parts(parts, Body::from(body_bytes));
    forward(
        &state.transports,
        &ForwardTarget::Peer {
            id: target_peer.clone(),
        },
        &rewritten,
        req,
        Some(&target_peer),
    )
    .await
}
