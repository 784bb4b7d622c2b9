// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access gate middleware for Axum.
//!
//! Applied to the whole protected router subtree with
//! `axum::middleware::from_fn_with_state`. On success the resolved
//! [`AuthenticatedUser`](super::AuthenticatedUser) is stored in the request
//! extensions where the [`Auth`](super::Auth) extractor picks it up.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AuthError;
use crate::state::AppState;

/// Pull the bearer value out of an `Authorization` header.
///
/// The scheme is matched case-insensitively; an empty value is rejected.
pub fn bearer_token(header: &str) -> Result<&str, AuthError> {
    let (scheme, token) = header
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Admit the request if it carries a valid access token or API credential.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = match request.headers().get(AUTHORIZATION) {
        Some(header) => header,
        None => return AuthError::MissingAuthHeader.into_response(),
    };

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(_) => return AuthError::InvalidAuthHeader.into_response(),
    };

    let token = match bearer_token(auth_str) {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };

    match state.tokens.validate_bearer(token) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
