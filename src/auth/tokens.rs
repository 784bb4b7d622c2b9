// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Token Authority
//!
//! Issues and validates the three kinds of bearer material:
//!
//! - **Access token**: HS256 JWT, minutes long, stateless
//! - **Refresh token**: 32 random bytes, stored hashed, rotated on use
//! - **API credential**: HMAC-SHA256 of the password under a fixed salt,
//!   deterministic across restarts and installations
//!
//! [`TokenAuthority::validate_bearer`] is the single entry point used by the
//! access gate: signature first, then the API credential lookup for values of
//! exactly [`API_CREDENTIAL_LEN`] characters.

use std::sync::Arc;

use base64ct::{Base64Url, Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};

use super::claims::{AccessClaims, AuthMethod, AuthenticatedUser, TOKEN_ISSUER};
use super::password::{hash_password, verify_password};
use super::AuthError;
use crate::storage::{
    Database, RefreshTokenRepository, RotateOutcome, StorageError, UserRecord, UserRepository,
};

/// Fixed HMAC key for API credential derivation. Changing it invalidates
/// every credential ever handed out.
pub const API_CREDENTIAL_SALT: &str = "wireguard-panel-api-token-salt-v1";

/// Length of an API credential: 32 bytes, base64url without padding.
pub const API_CREDENTIAL_LEN: usize = 43;

const REFRESH_TOKEN_BYTES: usize = 32;

/// Lifetimes and signing secret.
#[derive(Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// Everything a successful login or refresh hands back.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user_id: u64,
    pub access_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Raw refresh token, for the cookie only
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub api_credential: String,
}

/// Derive the API credential for `password`.
pub fn derive_api_credential(password: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, API_CREDENTIAL_SALT.as_bytes());
    let tag = hmac::sign(&key, password.as_bytes());
    Base64UrlUnpadded::encode_string(tag.as_ref())
}

pub struct TokenAuthority {
    db: Arc<Database>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    rng: SystemRandom,
}

impl TokenAuthority {
    pub fn new(db: Arc<Database>, settings: TokenSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        Self {
            db,
            encoding_key: EncodingKey::from_secret(settings.access_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.access_secret.as_bytes()),
            validation,
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
            rng: SystemRandom::new(),
        }
    }

    /// Access token lifetime in seconds.
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn issue_access_token(&self, user_id: u64, username: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            iss: TOKEN_ISSUER.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("failed to sign access token: {e}")))
    }

    /// Verify signature, issuer and expiry of an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredCredential,
                _ => AuthError::InvalidCredential,
            })
    }

    /// A fresh opaque refresh token: 32 random bytes, base64url.
    pub fn issue_refresh_token(&self) -> Result<String, AuthError> {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AuthError::Internal("system random source unavailable".into()))?;
        Ok(Base64Url::encode_string(&bytes))
    }

    /// Create the bootstrap user if it does not exist yet. Returns whether a
    /// user was created.
    pub fn ensure_user(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let users = UserRepository::new(&self.db);
        if users.exists(username)? {
            return Ok(false);
        }
        let hash = hash_password(password)
            .map_err(|e| AuthError::Internal(format!("failed to hash password: {e}")))?;
        match users.create(username, &hash, &derive_api_credential(password)) {
            Ok(_) => Ok(true),
            Err(StorageError::AlreadyExists(_)) if users.exists(username)? => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify a password and open a session.
    ///
    /// Unknown users and wrong passwords fail identically. The stored API
    /// credential is rewritten if it no longer matches the password.
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedSession, AuthError> {
        let users = UserRepository::new(&self.db);
        let user = match users.get_by_username(username) {
            Ok(user) => user,
            Err(StorageError::NotFound(_)) => return Err(AuthError::LoginFailed),
            Err(e) => return Err(e.into()),
        };
        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::LoginFailed);
        }

        let api_credential = derive_api_credential(password);
        if user.api_credential != api_credential {
            tracing::info!(user_id = user.id, "Stored API credential drifted, rewriting");
            users.set_api_credential(user.id, &api_credential)?;
        }

        let (refresh_token, refresh_expires_at) = self.store_new_refresh_token(user.id)?;
        Ok(IssuedSession {
            user_id: user.id,
            access_token: self.issue_access_token(user.id, &user.username)?,
            expires_in: self.access_ttl_secs(),
            refresh_token,
            refresh_expires_at,
            api_credential,
        })
    }

    /// Exchange a refresh token for a new access token and a new refresh
    /// token. The presented token stops working whether or not this succeeds.
    pub fn refresh(&self, refresh_token: &str) -> Result<IssuedSession, AuthError> {
        let now = Utc::now();
        let new_token = self.issue_refresh_token()?;
        let refresh_expires_at = now + self.refresh_ttl;

        let outcome = RefreshTokenRepository::new(&self.db).rotate(
            refresh_token,
            &new_token,
            refresh_expires_at,
            now,
        )?;
        let user_id = match outcome {
            RotateOutcome::Rotated { user_id } => user_id,
            RotateOutcome::Missing => return Err(AuthError::InvalidCredential),
            RotateOutcome::Expired => return Err(AuthError::ExpiredCredential),
        };

        let user = match UserRepository::new(&self.db).get(user_id) {
            Ok(user) => user,
            Err(StorageError::NotFound(_)) => {
                RefreshTokenRepository::new(&self.db).delete(&new_token)?;
                return Err(AuthError::InvalidCredential);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(IssuedSession {
            user_id: user.id,
            access_token: self.issue_access_token(user.id, &user.username)?,
            expires_in: self.access_ttl_secs(),
            refresh_token: new_token,
            refresh_expires_at,
            api_credential: user.api_credential,
        })
    }

    /// Forget a refresh token. Unknown tokens are ignored.
    pub fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        RefreshTokenRepository::new(&self.db).delete(refresh_token)?;
        Ok(())
    }

    /// Replace the password, re-derive the API credential and revoke every
    /// refresh token of the user. Returns the new credential.
    pub fn change_password(&self, user_id: u64, new_password: &str) -> Result<String, AuthError> {
        let hash = hash_password(new_password)
            .map_err(|e| AuthError::Internal(format!("failed to hash password: {e}")))?;
        let credential = derive_api_credential(new_password);
        UserRepository::new(&self.db).update_password(user_id, &hash, &credential)?;
        tracing::info!(user_id, "Password changed, refresh tokens revoked");
        Ok(credential)
    }

    pub fn user(&self, user_id: u64) -> Result<UserRecord, AuthError> {
        Ok(UserRepository::new(&self.db).get(user_id)?)
    }

    /// Single validation entry point for `Authorization: Bearer <value>`.
    ///
    /// Every failure collapses to the same response at the boundary.
    pub fn validate_bearer(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let jwt_error = match self.validate_access_token(token) {
            Ok(claims) => {
                return AuthenticatedUser::from_claims(&claims).ok_or(AuthError::InvalidCredential)
            }
            Err(e) => e,
        };

        if token.len() == API_CREDENTIAL_LEN {
            match UserRepository::new(&self.db).get_by_api_credential(token) {
                Ok(user) => {
                    return Ok(AuthenticatedUser {
                        user_id: user.id,
                        username: user.username,
                        method: AuthMethod::ApiCredential,
                    })
                }
                Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(jwt_error)
    }

    fn store_new_refresh_token(&self, user_id: u64) -> Result<(String, DateTime<Utc>), AuthError> {
        let token = self.issue_refresh_token()?;
        let expires_at = Utc::now() + self.refresh_ttl;
        RefreshTokenRepository::new(&self.db).save(&token, user_id, expires_at)?;
        Ok((token, expires_at))
    }
}
