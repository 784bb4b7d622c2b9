// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. All types derive
//! `Serialize` and/or `Deserialize` plus `ToSchema` for automatic JSON
//! handling and OpenAPI documentation.
//!
//! ## Model Categories
//!
//! - **Peers**: provisioning requests and the merged registry/live view
//! - **Auth**: login and token refresh
//! - **Settings**: client profile defaults and the admin password

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::provisioning::PeerStatus;

// =============================================================================
// Peer Models
// =============================================================================

/// Request to provision a new peer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePeerRequest {
    /// Display name, 1 to 64 characters.
    pub name: String,
}

/// Rename and/or enable/disable a peer. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdatePeerRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// A peer as seen by the panel: registry data plus live statistics.
///
/// Private key material is never part of this type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PeerResponse {
    pub id: u64,
    pub name: String,
    pub public_key: String,
    /// Address inside the concentrator subnet.
    pub assigned_ip: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    /// Handshake within the last 180 seconds.
    pub is_online: bool,
    pub latest_handshake: Option<DateTime<Utc>>,
    /// Bytes received from the peer.
    pub transfer_rx: u64,
    /// Bytes sent to the peer.
    pub transfer_tx: u64,
    /// Last observed `ip:port` of the peer.
    pub endpoint: Option<String>,
}

impl From<PeerStatus> for PeerResponse {
    fn from(status: PeerStatus) -> Self {
        let PeerStatus { peer, live } = status;
        let live = live.unwrap_or_default();
        Self {
            id: peer.id,
            name: peer.name,
            public_key: peer.public_key,
            assigned_ip: peer.address.to_string(),
            enabled: peer.enabled,
            created_at: peer.created_at,
            is_online: live.online,
            latest_handshake: live.latest_handshake,
            transfer_rx: live.transfer_rx,
            transfer_tx: live.transfer_tx,
            endpoint: live.endpoint,
        }
    }
}

/// Peer list with totals.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PeerListResponse {
    pub peers: Vec<PeerResponse>,
    pub total: usize,
    pub online: usize,
}

// =============================================================================
// Auth Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Issued on login and refresh. The refresh token travels only in the
/// `refresh_token` cookie.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Deterministic 43-character API credential.
    pub api_token: String,
}

// =============================================================================
// Settings Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SettingsResponse {
    /// DNS server written into client profiles.
    pub dns: String,
    /// AllowedIPs written into client profiles.
    pub allowed_ips: String,
    /// Whether connection history is recorded.
    pub logging_enabled: bool,
    /// Current API credential of the caller.
    pub api_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub dns: Option<String>,
    #[serde(default)]
    pub allowed_ips: Option<String>,
    #[serde(default)]
    pub logging_enabled: Option<bool>,
    /// New password for the calling user. Revokes all of its refresh tokens.
    #[serde(default)]
    pub admin_password: Option<String>,
}

// =============================================================================
// Misc
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PeerRecord;
    use crate::wireguard::LivePeerStats;
    use std::net::Ipv4Addr;

    fn record() -> PeerRecord {
        let now = Utc::now();
        PeerRecord {
            id: 3,
            name: "laptop".into(),
            public_key: "cHVibGljLWtleS1wbGFjZWhvbGRlci0wMDAwMDAwMDA=".into(),
            private_key: "secret".into(),
            address: Ipv4Addr::new(10, 8, 0, 4),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn peer_response_never_contains_private_key() {
        let json = serde_json::to_string(&PeerResponse::from(PeerStatus {
            peer: record(),
            live: None,
        }))
        .unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("private_key"));
    }

    #[test]
    fn missing_live_stats_read_as_offline() {
        let response = PeerResponse::from(PeerStatus {
            peer: record(),
            live: None,
        });
        assert_eq!(response.assigned_ip, "10.8.0.4");
        assert!(!response.is_online);
        assert_eq!(response.transfer_rx, 0);
        assert_eq!(response.endpoint, None);
    }

    #[test]
    fn live_stats_are_merged() {
        let handshake = Utc::now();
        let response = PeerResponse::from(PeerStatus {
            peer: record(),
            live: Some(LivePeerStats {
                endpoint: Some("203.0.113.7:51820".into()),
                latest_handshake: Some(handshake),
                transfer_rx: 1024,
                transfer_tx: 2048,
                online: true,
            }),
        });
        assert!(response.is_online);
        assert_eq!(response.latest_handshake, Some(handshake));
        assert_eq!(response.transfer_tx, 2048);
        assert_eq!(response.endpoint.as_deref(), Some("203.0.113.7:51820"));
    }

    #[test]
    fn update_request_fields_are_optional() {
        let req: UpdatePeerRequest = serde_json::from_str(r#"{"enabled": false}"#).unwrap();
        assert_eq!(req.enabled, Some(false));
        assert!(req.name.is_none());

        let req: UpdateSettingsRequest = serde_json::from_str("{}").unwrap();
        assert!(req.dns.is_none() && req.admin_password.is_none());
    }
}
