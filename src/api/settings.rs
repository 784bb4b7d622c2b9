// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settings endpoints.
//!
//! Stored settings shadow the `WG_DNS` / `WG_ALLOWED_IPS` defaults when
//! client profiles are rendered.

use axum::{extract::State, Json};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{MessageResponse, SettingsResponse, UpdateSettingsRequest},
    state::AppState,
    storage::repository::settings::{ALLOWED_IPS_KEY, DNS_KEY, LOGGING_ENABLED_KEY},
    storage::SettingsRepository,
};

const MAX_SETTING_LEN: usize = 256;
const MIN_PASSWORD_LEN: usize = 8;

/// Effective client profile defaults and the caller's API credential.
#[utoipa::path(
    get,
    path = "/api/v1/settings",
    tag = "Settings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current settings", body = SettingsResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_settings(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let profile = state.provisioner.server_profile()?;
    let account = state.tokens.user(user.user_id)?;
    Ok(Json(SettingsResponse {
        dns: profile.dns,
        allowed_ips: profile.allowed_ips,
        logging_enabled: state.provisioner.logging_enabled(),
        api_token: account.api_credential,
    }))
}

/// Update any subset of the settings.
///
/// Fields are written one at a time in the order `dns`, `allowed_ips`,
/// `logging_enabled`, `admin_password`; a failed write aborts the request
/// and leaves earlier writes in place. A new password re-derives the API
/// credential and revokes every refresh token of the caller.
#[utoipa::path(
    put,
    path = "/api/v1/settings",
    tag = "Settings",
    security(("bearer_auth" = [])),
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings updated", body = MessageResponse),
        (status = 400, description = "Invalid value"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Password already in use by another user")
    )
)]
pub async fn update_settings(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Some(dns) = &request.dns {
        validate_setting("dns", dns)?;
    }
    if let Some(allowed_ips) = &request.allowed_ips {
        validate_setting("allowed_ips", allowed_ips)?;
    }
    let new_password = request.admin_password.filter(|p| !p.is_empty());
    if let Some(password) = &new_password {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::bad_request(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
    }

    let settings = SettingsRepository::new(&state.db);
    if let Some(dns) = &request.dns {
        settings.set(DNS_KEY, dns.trim())?;
    }
    if let Some(allowed_ips) = &request.allowed_ips {
        settings.set(ALLOWED_IPS_KEY, allowed_ips.trim())?;
    }
    if let Some(enabled) = request.logging_enabled {
        settings.set(LOGGING_ENABLED_KEY, if enabled { "true" } else { "false" })?;
    }
    if let Some(password) = new_password {
        let tokens = state.tokens.clone();
        let user_id = user.user_id;
        tokio::task::spawn_blocking(move || tokens.change_password(user_id, &password))
            .await
            .map_err(ApiError::internal)??;
    }

    tracing::info!(user_id = user.user_id, "Settings updated");
    Ok(Json(MessageResponse::new("Settings updated")))
}

fn validate_setting(field: &str, value: &str) -> Result<(), ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{field} must not be empty")));
    }
    if value.len() > MAX_SETTING_LEN {
        return Err(ApiError::bad_request(format!("{field} is too long")));
    }
    if value.chars().any(char::is_control) {
        return Err(ApiError::bad_request(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}
