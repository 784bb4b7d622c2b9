// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access token claims and the authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Issuer stamped into, and required from, every access token.
pub const TOKEN_ISSUER: &str = "wg-panel";

/// Claims carried by a signed access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the user id
    pub sub: String,
    pub username: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
    pub iss: String,
}

/// How the caller proved its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    AccessToken,
    ApiCredential,
}

/// Authenticated user information attached to each admitted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    pub user_id: u64,
    pub username: String,
    pub method: AuthMethod,
}

impl AuthenticatedUser {
    /// Build from verified access token claims. `None` if the subject is not
    /// a user id.
    pub fn from_claims(claims: &AccessClaims) -> Option<Self> {
        Some(Self {
            user_id: claims.sub.parse().ok()?,
            username: claims.username.clone(),
            method: AuthMethod::AccessToken,
        })
    }
}
