// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Peer Provisioning
//!
//! Orchestrates the peer registry and the live interface so that the two
//! never disagree about an enabled peer:
//!
//! - **create**: keys → address → registry row → live add; a failed live add
//!   deletes the row again
//! - **update**: the live add/remove happens first and only when the enabled
//!   flag actually changes; the registry is written only after it succeeded
//! - **delete**: live removal first; if it fails the row is kept
//! - **list**: registry rows merged with a best-effort live snapshot

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::storage::repository::settings::{ALLOWED_IPS_KEY, DNS_KEY, LOGGING_ENABLED_KEY};
use crate::storage::repository::MAX_LOG_ENTRIES;
use crate::storage::{
    ConnectionLogEntry, ConnectionLogRepository, Database, NewPeer, PeerRecord, PeerRepository,
    SettingsRepository, StorageError,
};
use crate::wireguard::keys::parse_ipv4;
use crate::wireguard::{
    generate_client_config, generate_keypair, InterfaceError, LivePeerStats, PeerProfile,
    ServerProfile, Subnet, WgInterface,
};

/// Longest accepted peer label.
pub const MAX_PEER_NAME_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("{0}")]
    Validation(String),

    #[error("Peer not found")]
    NotFound,

    #[error("No free address left in {0}")]
    AddressSpaceExhausted(Subnet),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Interface(InterfaceError),

    #[error("Failed to add peer to WireGuard: {0}")]
    ProvisioningFailed(InterfaceError),

    #[error("Failed to generate key pair")]
    KeyGeneration,

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ProvisionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => Self::NotFound,
            StorageError::AlreadyExists(what) => {
                Self::Conflict(format!("{what} was taken concurrently, retry the request"))
            }
            other => Self::Storage(other),
        }
    }
}

impl From<InterfaceError> for ProvisionError {
    fn from(err: InterfaceError) -> Self {
        if err.is_validation() {
            Self::Validation(err.to_string())
        } else {
            Self::Interface(err)
        }
    }
}

/// Requested changes to a peer. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct PeerUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

/// A registry row with whatever the live interface reported for it.
#[derive(Debug, Clone)]
pub struct PeerStatus {
    pub peer: PeerRecord,
    pub live: Option<LivePeerStats>,
}

/// An exported client profile.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub peer: PeerRecord,
    pub content: String,
}

pub struct PeerProvisioner {
    db: Arc<Database>,
    interface: WgInterface,
    subnet: Subnet,
    defaults: ServerProfile,
}

impl PeerProvisioner {
    pub fn new(
        db: Arc<Database>,
        interface: WgInterface,
        subnet: Subnet,
        defaults: ServerProfile,
    ) -> Self {
        Self {
            db,
            interface,
            subnet,
            defaults,
        }
    }

    pub fn interface(&self) -> &WgInterface {
        &self.interface
    }

    /// Create a peer and bring it up on the live interface.
    pub async fn create(&self, name: &str) -> Result<PeerRecord, ProvisionError> {
        let name = validate_name(name)?;
        let keys = generate_keypair().map_err(|_| ProvisionError::KeyGeneration)?;

        let peers = PeerRepository::new(&self.db);
        let address = peers
            .allocate_next_address(&self.subnet)
            .map_err(|e| match e {
                StorageError::AddressSpaceExhausted => {
                    ProvisionError::AddressSpaceExhausted(self.subnet)
                }
                other => other.into(),
            })?;

        let peer = peers.create(NewPeer {
            name,
            public_key: keys.public_key,
            private_key: keys.private_key,
            address,
        })?;

        let added = self
            .interface
            .add_peer(&peer.public_key, &address.to_string())
            .await;
        if let Err(e) = keep_unreverted(added, peer.id, address) {
            tracing::warn!(address = %address, error = %e, "Live add failed, rolling back peer");
            if let Err(rollback) = peers.delete_by_address(address) {
                tracing::error!(
                    peer_id = peer.id,
                    address = %address,
                    error = %rollback,
                    "Rollback failed; orphaned peer row needs manual cleanup"
                );
            }
            return Err(ProvisionError::ProvisioningFailed(e));
        }

        tracing::info!(peer_id = peer.id, address = %address, "Peer created");
        Ok(peer)
    }

    /// Rename and/or enable/disable the peer assigned `address`.
    pub async fn update(
        &self,
        address: &str,
        update: PeerUpdate,
    ) -> Result<PeerRecord, ProvisionError> {
        let address = parse_address(address)?;
        let name = update.name.as_deref().map(validate_name).transpose()?;

        let peers = PeerRepository::new(&self.db);
        let current = peers.get_by_address(address)?;

        let toggle = update.enabled.filter(|&enabled| enabled != current.enabled);
        let live = match toggle {
            Some(true) => {
                self.interface
                    .add_peer(&current.public_key, &address.to_string())
                    .await
            }
            Some(false) => {
                self.interface
                    .remove_peer(&current.public_key, &address.to_string())
                    .await
            }
            None => Ok(()),
        };
        keep_unreverted(live, current.id, address)?;

        match peers.update(current.id, name.as_deref(), toggle) {
            Ok(peer) => {
                tracing::info!(
                    peer_id = peer.id,
                    address = %address,
                    enabled = peer.enabled,
                    "Peer updated"
                );
                Ok(peer)
            }
            Err(e) => {
                if toggle.is_some() {
                    tracing::error!(
                        peer_id = current.id,
                        address = %address,
                        error = %e,
                        "Live interface changed but registry write failed"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Remove the peer from the live interface, then from the registry.
    pub async fn delete(&self, address: &str) -> Result<PeerRecord, ProvisionError> {
        let address = parse_address(address)?;
        let peers = PeerRepository::new(&self.db);
        let peer = peers.get_by_address(address)?;

        let removed_live = self
            .interface
            .remove_peer(&peer.public_key, &address.to_string())
            .await;
        keep_unreverted(removed_live, peer.id, address)?;
        let removed = peers.delete_by_address(address)?;

        tracing::info!(peer_id = removed.id, address = %address, "Peer deleted");
        Ok(removed)
    }

    /// Every registry row with live statistics when they can be read.
    ///
    /// Records a connection log entry for each online peer with a known
    /// endpoint when logging is enabled.
    pub async fn list(&self) -> Result<Vec<PeerStatus>, ProvisionError> {
        let records = PeerRepository::new(&self.db).list()?;

        let mut live = match self.interface.read_live_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "Live stats unavailable, reporting registry only");
                HashMap::new()
            }
        };

        let logging_enabled = self.logging_enabled();
        let logs = ConnectionLogRepository::new(&self.db);

        let statuses = records
            .into_iter()
            .map(|peer| {
                let stats = live.remove(&peer.public_key);
                if logging_enabled {
                    if let Some(endpoint) = stats
                        .as_ref()
                        .filter(|s| s.online)
                        .and_then(|s| s.endpoint.as_deref())
                    {
                        if let Err(e) = logs.record(peer.id, endpoint) {
                            tracing::warn!(peer_id = peer.id, error = %e, "Failed to record connection");
                        }
                    }
                }
                PeerStatus { peer, live: stats }
            })
            .collect();

        Ok(statuses)
    }

    /// Render the client profile for the peer assigned `address`.
    pub fn export_config(&self, address: &str) -> Result<ClientConfig, ProvisionError> {
        let address = parse_address(address)?;
        let peer = PeerRepository::new(&self.db).get_by_address(address)?;
        let server = self.server_profile()?;

        let content = generate_client_config(
            PeerProfile {
                private_key: &peer.private_key,
                address: peer.address,
            },
            &server,
        );
        Ok(ClientConfig { peer, content })
    }

    /// Connection history of the peer assigned `address`, newest first.
    pub fn logs(&self, address: &str) -> Result<Vec<ConnectionLogEntry>, ProvisionError> {
        let address = parse_address(address)?;
        let peer = PeerRepository::new(&self.db).get_by_address(address)?;
        Ok(ConnectionLogRepository::new(&self.db).list(peer.id, MAX_LOG_ENTRIES)?)
    }

    /// Re-apply every enabled peer to the live interface.
    ///
    /// Used at startup, when the interface may have been recreated without
    /// its peers. Failures are logged per peer and do not stop the sweep.
    pub async fn sync_to_interface(&self) -> Result<usize, ProvisionError> {
        let peers = PeerRepository::new(&self.db).list()?;
        let mut applied = 0;
        for peer in peers.iter().filter(|p| p.enabled) {
            match self
                .interface
                .add_peer(&peer.public_key, &peer.address.to_string())
                .await
            {
                Ok(()) => applied += 1,
                Err(e) => {
                    tracing::warn!(peer_id = peer.id, address = %peer.address, error = %e, "Failed to sync peer")
                }
            }
        }
        Ok(applied)
    }

    /// Server side of client profiles, with stored settings taking priority
    /// over boot-time defaults.
    pub fn server_profile(&self) -> Result<ServerProfile, ProvisionError> {
        let settings = SettingsRepository::new(&self.db);
        Ok(ServerProfile {
            server_public_key: self.defaults.server_public_key.clone(),
            server_endpoint: self.defaults.server_endpoint.clone(),
            dns: settings.get_or(DNS_KEY, &self.defaults.dns)?,
            allowed_ips: settings.get_or(ALLOWED_IPS_KEY, &self.defaults.allowed_ips)?,
        })
    }

    /// Whether connection logging is switched on. Unreadable means off.
    pub fn logging_enabled(&self) -> bool {
        matches!(
            SettingsRepository::new(&self.db).get(LOGGING_ENABLED_KEY),
            Ok(Some(value)) if value == "true"
        )
    }
}

/// A live change that could be neither saved nor reverted is in effect, so
/// the registry has to follow it. Every other failure is passed through.
fn keep_unreverted(
    result: Result<(), InterfaceError>,
    peer_id: u64,
    address: Ipv4Addr,
) -> Result<(), InterfaceError> {
    match result {
        Err(e) if e.live_changed() => {
            tracing::error!(
                peer_id,
                address = %address,
                error = %e,
                "Live interface changed but its config was not saved; run wg-quick save manually"
            );
            Ok(())
        }
        other => other,
    }
}

fn parse_address(address: &str) -> Result<Ipv4Addr, ProvisionError> {
    parse_ipv4(address).ok_or_else(|| ProvisionError::Validation("Invalid IP address format".into()))
}

fn validate_name(name: &str) -> Result<String, ProvisionError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ProvisionError::Validation("Peer name is required".into()));
    }
    if name.chars().count() > MAX_PEER_NAME_LEN {
        return Err(ProvisionError::Validation(format!(
            "Peer name must be at most {MAX_PEER_NAME_LEN} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(ProvisionError::Validation(
            "Peer name must not contain control characters".into(),
        ));
    }
    Ok(name.to_string())
}
