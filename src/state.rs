// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{RateLimiter, TokenAuthority};
use crate::mesh::MeshClient;
use crate::provisioning::PeerProvisioner;
use crate::storage::Database;

/// Shared handles cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub tokens: Arc<TokenAuthority>,
    pub provisioner: Arc<PeerProvisioner>,
    pub login_limiter: Arc<RateLimiter>,
    pub mesh: MeshClient,
    /// Whether the refresh cookie carries the `Secure` attribute.
    pub cookie_secure: bool,
}

impl AppState {
    pub fn new(
        db: Arc<Database>,
        tokens: TokenAuthority,
        provisioner: PeerProvisioner,
        login_limiter: RateLimiter,
        mesh: MeshClient,
    ) -> Self {
        Self {
            db,
            tokens: Arc::new(tokens),
            provisioner: Arc::new(provisioner),
            login_limiter: Arc::new(login_limiter),
            mesh,
            cookie_secure: true,
        }
    }

    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }
}
