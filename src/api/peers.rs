// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Peer management API endpoints.
//!
//! Peers are addressed by their assigned IPv4 address. All endpoints require
//! authentication.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use qrcode::{render::svg, QrCode};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{CreatePeerRequest, MessageResponse, PeerListResponse, PeerResponse, UpdatePeerRequest},
    provisioning::{PeerStatus, PeerUpdate},
    state::AppState,
    storage::ConnectionLogEntry,
};

/// Smallest rendered QR code edge in pixels.
const QR_MIN_DIMENSION: u32 = 256;

/// Provision a new peer.
///
/// Generates a key pair, assigns the lowest free address and adds the peer
/// to the live interface. If the live add fails nothing is recorded.
#[utoipa::path(
    post,
    path = "/api/v1/peers",
    tag = "Peers",
    security(("bearer_auth" = [])),
    request_body = CreatePeerRequest,
    responses(
        (status = 201, description = "Peer created", body = PeerResponse),
        (status = 400, description = "Invalid name"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "No free address left"),
        (status = 502, description = "WireGuard rejected the peer")
    )
)]
pub async fn create_peer(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreatePeerRequest>,
) -> Result<(StatusCode, Json<PeerResponse>), ApiError> {
    let peer = state.provisioner.create(&request.name).await?;
    tracing::info!(user_id = user.user_id, address = %peer.address, "Peer provisioned");
    Ok((
        StatusCode::CREATED,
        Json(PeerResponse::from(PeerStatus { peer, live: None })),
    ))
}

/// List all peers with live statistics.
///
/// Statistics are best effort: when the interface cannot be read every peer
/// is reported offline.
#[utoipa::path(
    get,
    path = "/api/v1/peers",
    tag = "Peers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All peers", body = PeerListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_peers(
    Auth(_user): Auth,
    State(state): State<AppState>,
) -> Result<Json<PeerListResponse>, ApiError> {
    let peers: Vec<PeerResponse> = state
        .provisioner
        .list()
        .await?
        .into_iter()
        .map(PeerResponse::from)
        .collect();
    let online = peers.iter().filter(|p| p.is_online).count();
    Ok(Json(PeerListResponse {
        total: peers.len(),
        online,
        peers,
    }))
}

/// Rename a peer and/or enable or disable it.
#[utoipa::path(
    patch,
    path = "/api/v1/peers/{address}",
    tag = "Peers",
    security(("bearer_auth" = [])),
    params(("address" = String, Path, description = "Assigned peer address")),
    request_body = UpdatePeerRequest,
    responses(
        (status = 200, description = "Peer updated", body = PeerResponse),
        (status = 400, description = "Invalid address or name"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Peer not found"),
        (status = 502, description = "WireGuard rejected the change")
    )
)]
pub async fn update_peer(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(request): Json<UpdatePeerRequest>,
) -> Result<Json<PeerResponse>, ApiError> {
    let peer = state
        .provisioner
        .update(
            &address,
            PeerUpdate {
                name: request.name,
                enabled: request.enabled,
            },
        )
        .await?;
    Ok(Json(PeerResponse::from(PeerStatus { peer, live: None })))
}

/// Remove a peer from the live interface and the registry.
#[utoipa::path(
    delete,
    path = "/api/v1/peers/{address}",
    tag = "Peers",
    security(("bearer_auth" = [])),
    params(("address" = String, Path, description = "Assigned peer address")),
    responses(
        (status = 200, description = "Peer deleted", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Peer not found"),
        (status = 502, description = "WireGuard removal failed; peer kept")
    )
)]
pub async fn delete_peer(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let peer = state.provisioner.delete(&address).await?;
    tracing::info!(user_id = user.user_id, peer_id = peer.id, "Peer removed");
    Ok(Json(MessageResponse::new("Peer deleted successfully")))
}

/// Download the client profile as a `.conf` attachment.
#[utoipa::path(
    get,
    path = "/api/v1/peers/{address}/config",
    tag = "Peers",
    security(("bearer_auth" = [])),
    params(("address" = String, Path, description = "Assigned peer address")),
    responses(
        (status = 200, description = "WireGuard client profile", body = String, content_type = "text/plain"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Peer not found")
    )
)]
pub async fn get_peer_config(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let config = state.provisioner.export_config(&address)?;
    let disposition = format!(
        "attachment; filename=\"{}.conf\"",
        attachment_name(&config.peer.name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        config.content,
    ))
}

/// The client profile encoded as an SVG QR code.
#[utoipa::path(
    get,
    path = "/api/v1/peers/{address}/qrcode",
    tag = "Peers",
    security(("bearer_auth" = [])),
    params(("address" = String, Path, description = "Assigned peer address")),
    responses(
        (status = 200, description = "QR code of the client profile", body = String, content_type = "image/svg+xml"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Peer not found")
    )
)]
pub async fn get_peer_qrcode(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let config = state.provisioner.export_config(&address)?;
    let image = render_qr_svg(&config.content)?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], image))
}

/// Connection history of a peer, newest first, at most 100 entries.
#[utoipa::path(
    get,
    path = "/api/v1/peers/{address}/logs",
    tag = "Peers",
    security(("bearer_auth" = [])),
    params(("address" = String, Path, description = "Assigned peer address")),
    responses(
        (status = 200, description = "Observed endpoints", body = [ConnectionLogEntry]),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Peer not found")
    )
)]
pub async fn get_peer_logs(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<ConnectionLogEntry>>, ApiError> {
    Ok(Json(state.provisioner.logs(&address)?))
}

fn render_qr_svg(content: &str) -> Result<String, ApiError> {
    let code = QrCode::new(content.as_bytes()).map_err(ApiError::internal)?;
    Ok(code
        .render::<svg::Color<'_>>()
        .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
        .build())
}

/// Peer name reduced to characters that are safe in a header filename.
fn attachment_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(|c| c == '_' || c == '.').is_empty() {
        "peer".to_string()
    } else {
        cleaned
    }
}
