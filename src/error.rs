// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::AuthError;
use crate::mesh::MeshError;
use crate::provisioning::ProvisionError;
use crate::storage::StorageError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    /// Logs `detail` and returns a generic 500.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "Internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Validation(msg) => Self::bad_request(msg),
            ProvisionError::NotFound => Self::not_found("Peer not found"),
            e @ (ProvisionError::AddressSpaceExhausted(_) | ProvisionError::Conflict(_)) => {
                Self::conflict(e.to_string())
            }
            e @ (ProvisionError::Interface(_) | ProvisionError::ProvisioningFailed(_)) => {
                tracing::warn!(error = %e, "WireGuard operation failed");
                Self::bad_gateway(e.to_string())
            }
            e @ (ProvisionError::KeyGeneration | ProvisionError::Storage(_)) => Self::internal(e),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => Self::not_found(format!("{what} not found")),
            StorageError::AlreadyExists(what) => Self::conflict(format!("{what} already exists")),
            other => Self::internal(other),
        }
    }
}

impl From<MeshError> for ApiError {
    fn from(err: MeshError) -> Self {
        match err {
            MeshError::NotInstalled => Self::bad_request("Tailscale is not installed"),
            e @ MeshError::Command(_) => Self::bad_gateway(e.to_string()),
            e @ MeshError::Parse(_) => Self::internal(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Internal(detail) => Self::internal(detail),
            other => Self::new(other.status_code(), other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
