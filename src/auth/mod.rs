// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Dual-token access control for the panel API.
//!
//! ## Auth Flow
//!
//! 1. `POST /auth/login` (rate limited) verifies the argon2 password hash and
//!    returns a short-lived access token plus the API credential; the refresh
//!    token travels only in an HTTP-only, SameSite=Strict cookie
//! 2. Clients send `Authorization: Bearer <token>` where the token is either
//!    the access token or the 43-character API credential
//! 3. `POST /auth/refresh` rotates the refresh cookie and issues a new access
//!    token
//!
//! ## Security
//!
//! - Every non-auth, non-health endpoint sits behind [`middleware::require_auth`]
//! - Invalid and expired bearer values produce one generic response
//! - Refresh tokens are stored as SHA-256 hashes only

pub mod claims;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod password;
pub mod rate_limit;
pub mod tokens;

pub use claims::{AuthMethod, AuthenticatedUser};
pub use error::AuthError;
pub use extractor::Auth;
pub use rate_limit::RateLimiter;
pub use tokens::{IssuedSession, TokenAuthority, TokenSettings};
