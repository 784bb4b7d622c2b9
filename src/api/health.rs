// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Database read round-trip.
    pub storage: String,
    /// Whether `wg show <iface>` answers.
    pub interface: String,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Raw `wg show` output of the managed interface.
#[derive(Debug, Serialize, ToSchema)]
pub struct InterfaceStatusResponse {
    pub interface: String,
    pub output: String,
}

fn check_result<E: std::fmt::Display>(component: &str, result: Result<(), E>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(component, error = %e, "Readiness check failed");
            "unavailable".to_string()
        }
    }
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
/// Does not check dependencies - use readiness for that.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 only if storage and the live interface are reachable.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is degraded", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let storage = check_result("storage", state.db.health_check());
    let interface = check_result(
        "interface",
        state.provisioner.interface().show_status().await.map(|_| ()),
    );

    let all_ok = storage == "ok" && interface == "ok";
    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            storage,
            interface,
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Current state of the managed WireGuard interface as printed by `wg show`.
#[utoipa::path(
    get,
    path = "/api/v1/interface/status",
    tag = "Health",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Interface status", body = InterfaceStatusResponse),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "wg failed")
    )
)]
pub async fn interface_status(
    Auth(_user): Auth,
    State(state): State<AppState>,
) -> Result<Json<InterfaceStatusResponse>, ApiError> {
    let interface = state.provisioner.interface();
    let output = interface
        .show_status()
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?;
    Ok(Json(InterfaceStatusResponse {
        interface: interface.name().to_string(),
        output,
    }))
}
