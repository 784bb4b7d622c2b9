// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::repository::users::API_CREDENTIAL_RESOURCE;
use crate::storage::StorageError;

/// Authentication error type.
///
/// Invalid and expired bearer values are kept apart internally but render
/// identically, so a caller cannot tell which scheme was tried or why it
/// failed.
#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Wrong username or password
    LoginFailed,
    /// Token or credential did not verify
    InvalidCredential,
    /// Token verified but has expired
    ExpiredCredential,
    /// No refresh cookie on the request
    MissingRefreshToken,
    /// Login rate limit exceeded
    TooManyRequests,
    /// The password derives an API credential another user already holds
    CredentialInUse,
    /// Internal error
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::LoginFailed => "invalid_credentials",
            AuthError::InvalidCredential | AuthError::ExpiredCredential => "invalid_token",
            AuthError::MissingRefreshToken => "missing_refresh_token",
            AuthError::TooManyRequests => "rate_limited",
            AuthError::CredentialInUse => "credential_in_use",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::LoginFailed
            | AuthError::InvalidCredential
            | AuthError::ExpiredCredential
            | AuthError::MissingRefreshToken => StatusCode::UNAUTHORIZED,
            AuthError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AuthError::CredentialInUse => StatusCode::CONFLICT,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization format. Use: Bearer <token>")
            }
            AuthError::LoginFailed => write!(f, "Invalid credentials"),
            AuthError::InvalidCredential | AuthError::ExpiredCredential => {
                write!(f, "Invalid or expired token")
            }
            AuthError::MissingRefreshToken => write!(f, "Refresh token not found"),
            AuthError::TooManyRequests => write!(f, "Too many requests. Please try again later"),
            AuthError::CredentialInUse => write!(f, "Password is not available, choose another"),
            AuthError::Internal(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadyExists(what) if what == API_CREDENTIAL_RESOURCE => {
                AuthError::CredentialInUse
            }
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let AuthError::Internal(msg) = &self {
            tracing::error!(error = %msg, "Authentication backend failure");
        }
        let message = match &self {
            // Storage details stay in the log
            AuthError::Internal(_) => "Internal authentication error".to_string(),
            other => other.to_string(),
        };
        let body = Json(AuthErrorBody {
            error: message,
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
