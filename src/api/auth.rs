// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login, refresh and logout endpoints.
//!
//! The refresh token is only ever carried by the `refresh_token` cookie:
//! HTTP-only, SameSite=Strict and scoped to `/api/v1/auth`.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};

use crate::{
    auth::{AuthError, IssuedSession},
    models::{LoginRequest, MessageResponse, TokenResponse},
    state::AppState,
};

pub const REFRESH_COOKIE: &str = "refresh_token";
pub const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";

/// `Set-Cookie` value carrying a refresh token until `expires_at`.
pub fn refresh_cookie(token: &str, expires_at: DateTime<Utc>, secure: bool) -> String {
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    let mut cookie = format!(
        "{REFRESH_COOKIE}={token}; Path={REFRESH_COOKIE_PATH}; Max-Age={max_age}; HttpOnly; SameSite=Strict"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the refresh cookie.
pub fn clear_refresh_cookie(secure: bool) -> String {
    let mut cookie = format!(
        "{REFRESH_COOKIE}=; Path={REFRESH_COOKIE_PATH}; Max-Age=0; HttpOnly; SameSite=Strict"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Value of the refresh cookie, if the request carries a non-empty one.
pub fn read_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == REFRESH_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn session_response(state: &AppState, session: IssuedSession) -> impl IntoResponse {
    let cookie = refresh_cookie(
        &session.refresh_token,
        session.refresh_expires_at,
        state.cookie_secure,
    );
    (
        [(header::SET_COOKIE, cookie)],
        Json(TokenResponse {
            access_token: session.access_token,
            token_type: "Bearer".to_string(),
            expires_in: session.expires_in,
            api_token: session.api_credential,
        }),
    )
}

/// Exchange username and password for an access token.
///
/// Sets the refresh cookie. Limited per source address.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; refresh cookie set", body = TokenResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many login attempts")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let tokens = state.tokens.clone();
    let username = request.username.clone();
    // argon2 verification is CPU bound
    let result = tokio::task::spawn_blocking(move || {
        tokens.login(&request.username, &request.password)
    })
    .await
    .map_err(|e| AuthError::Internal(format!("login task failed: {e}")))?;

    match result {
        Ok(session) => {
            tracing::info!(user_id = session.user_id, "User logged in");
            Ok(session_response(&state, session))
        }
        Err(e) => {
            if matches!(e, AuthError::LoginFailed) {
                tracing::warn!(username = %username, "Failed login attempt");
            }
            Err(e)
        }
    }
}

/// Rotate the refresh cookie and issue a new access token.
///
/// The presented refresh token is invalid afterwards, whatever the outcome.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    responses(
        (status = 200, description = "Tokens rotated; refresh cookie replaced", body = TokenResponse),
        (status = 401, description = "Missing, invalid or expired refresh token")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let token = read_refresh_cookie(&headers).ok_or(AuthError::MissingRefreshToken)?;
    let session = state.tokens.refresh(&token)?;
    Ok(session_response(&state, session))
}

/// Forget the refresh token and clear the cookie.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    if let Some(token) = read_refresh_cookie(&headers) {
        state.tokens.logout(&token)?;
    }
    Ok((
        [(header::SET_COOKIE, clear_refresh_cookie(state.cookie_secure))],
        Json(MessageResponse::new("Logged out successfully")),
    ))
}
