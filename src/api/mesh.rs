// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tailscale mesh endpoints. Best effort: the tool may be missing, stopped
//! or waiting for an interactive login.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::ApiError,
    mesh::{MeshStatus, STATE_RUNNING},
    models::MessageResponse,
    state::AppState,
};

/// Outcome of a connect attempt.
#[derive(Debug, Serialize, ToSchema)]
pub struct MeshConnectResponse {
    pub connected: bool,
    pub backend_state: String,
    /// Login URL to open when authentication is pending; `null` when none
    /// could be determined.
    pub auth_url: Option<String>,
    pub message: String,
}

impl From<MeshStatus> for MeshConnectResponse {
    fn from(status: MeshStatus) -> Self {
        let message = if status.auth_url.is_some() {
            "Please authenticate using the URL"
        } else if status.connected || status.backend_state == STATE_RUNNING {
            "Tailscale connected successfully"
        } else {
            "Tailscale is connecting..."
        };
        Self {
            connected: status.connected,
            backend_state: status.backend_state,
            auth_url: status.auth_url,
            message: message.to_string(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/mesh/status",
    tag = "Mesh",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Mesh status", body = MeshStatus),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "tailscale failed")
    )
)]
pub async fn status(
    Auth(_user): Auth,
    State(state): State<AppState>,
) -> Result<Json<MeshStatus>, ApiError> {
    Ok(Json(state.mesh.status().await?))
}

/// Bring the node up. Returns within a few seconds even if login is pending.
#[utoipa::path(
    post,
    path = "/api/v1/mesh/connect",
    tag = "Mesh",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Connect attempted", body = MeshConnectResponse),
        (status = 400, description = "tailscale is not installed"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn connect(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<MeshConnectResponse>, ApiError> {
    let status = state.mesh.connect().await?;
    tracing::info!(
        user_id = user.user_id,
        backend_state = %status.backend_state,
        "Mesh connect requested"
    );
    Ok(Json(MeshConnectResponse::from(status)))
}

#[utoipa::path(
    post,
    path = "/api/v1/mesh/disconnect",
    tag = "Mesh",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Disconnected", body = MessageResponse),
        (status = 400, description = "tailscale is not installed"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "tailscale down failed")
    )
)]
pub async fn disconnect(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.mesh.disconnect().await?;
    tracing::info!(user_id = user.user_id, "Mesh disconnected");
    Ok(Json(MessageResponse::new("Tailscale disconnected")))
}
