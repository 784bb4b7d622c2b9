// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Live interface executor.
//!
//! The kernel's peer table is process-wide state outside this service. It is
//! only ever touched through the narrow operation set below and never cached
//! beyond a single call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use super::keys::{validate_ipv4, validate_public_key};
use crate::runner::{CommandOutput, CommandRunner};

const WG: &str = "wg";
const WG_QUICK: &str = "wg-quick";

/// A peer is online if its last handshake is younger than this.
///
/// Seven client keepalive intervals, so a few dropped keepalives never flap
/// the status.
pub const ONLINE_WINDOW_SECS: i64 = 180;

#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    #[error("invalid public key format")]
    InvalidPublicKey,

    #[error("invalid IP address format")]
    InvalidAddress,

    #[error("failed to {action}: {diagnostic}")]
    Command {
        action: &'static str,
        diagnostic: String,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The config file could not be written and the live change was undone.
    #[error("{save}; live change reverted")]
    NotPersisted { save: String },

    /// The config file could not be written and undoing the live change
    /// failed too. The live peer set reflects the requested change.
    #[error("{save}; revert failed: {revert}")]
    Unreverted { save: String, revert: String },
}

impl InterfaceError {
    /// Input was rejected before any external call was made.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidPublicKey | Self::InvalidAddress)
    }

    /// The requested live mutation is in effect despite the error.
    pub fn live_changed(&self) -> bool {
        matches!(self, Self::Unreverted { .. })
    }
}

/// One peer line of `wg show <iface> dump`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivePeerStats {
    pub endpoint: Option<String>,
    pub latest_handshake: Option<DateTime<Utc>>,
    pub transfer_rx: u64,
    pub transfer_tx: u64,
    pub online: bool,
}

/// Handle over one named WireGuard interface.
#[derive(Clone)]
pub struct WgInterface {
    name: String,
    runner: Arc<dyn CommandRunner>,
}

impl WgInterface {
    pub fn new(name: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            name: name.into(),
            runner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a peer with a single /32 allowed IP, then persist the interface
    /// configuration.
    pub async fn add_peer(&self, public_key: &str, address: &str) -> Result<(), InterfaceError> {
        if !validate_public_key(public_key) {
            return Err(InterfaceError::InvalidPublicKey);
        }
        if !validate_ipv4(address) {
            return Err(InterfaceError::InvalidAddress);
        }

        let allowed_ips = format!("{address}/32");
        let output = self
            .wg(&[
                "set",
                &self.name,
                "peer",
                public_key,
                "allowed-ips",
                &allowed_ips,
            ])
            .await?;
        check(output, "add peer")?;

        if let Err(save) = self.save_config().await {
            let undo = ["set", self.name.as_str(), "peer", public_key, "remove"];
            return Err(self.revert(save, &undo).await);
        }
        Ok(())
    }

    /// Remove a peer, then persist the interface configuration.
    ///
    /// `address` is only used to restore the peer if the configuration
    /// cannot be saved.
    pub async fn remove_peer(&self, public_key: &str, address: &str) -> Result<(), InterfaceError> {
        if !validate_public_key(public_key) {
            return Err(InterfaceError::InvalidPublicKey);
        }
        if !validate_ipv4(address) {
            return Err(InterfaceError::InvalidAddress);
        }

        let output = self
            .wg(&["set", &self.name, "peer", public_key, "remove"])
            .await?;
        check(output, "remove peer")?;

        if let Err(save) = self.save_config().await {
            let allowed_ips = format!("{address}/32");
            let undo = [
                "set",
                self.name.as_str(),
                "peer",
                public_key,
                "allowed-ips",
                allowed_ips.as_str(),
            ];
            return Err(self.revert(save, &undo).await);
        }
        Ok(())
    }

    /// Undo a live change whose configuration could not be saved, so the
    /// running interface and its config file keep agreeing.
    async fn revert(&self, save: InterfaceError, undo: &[&str]) -> InterfaceError {
        let save = save.to_string();
        let reverted = match self.wg(undo).await {
            Ok(output) => check(output, "revert live change").map(|_| ()),
            Err(e) => Err(e),
        };
        match reverted {
            Ok(()) => {
                tracing::warn!(interface = %self.name, error = %save, "Config not saved, live change reverted");
                InterfaceError::NotPersisted { save }
            }
            Err(e) => InterfaceError::Unreverted {
                save,
                revert: e.to_string(),
            },
        }
    }

    /// Write the running configuration back to the interface's config file.
    pub async fn save_config(&self) -> Result<(), InterfaceError> {
        let output = self
            .runner
            .run(WG_QUICK, &["save", &self.name])
            .await
            .map_err(|source| InterfaceError::Spawn {
                program: WG_QUICK,
                source,
            })?;
        check(output, "save config").map(|_| ())
    }

    /// Snapshot of the live peer table keyed by public key.
    pub async fn read_live_stats(&self) -> Result<HashMap<String, LivePeerStats>, InterfaceError> {
        let output = self.wg(&["show", &self.name, "dump"]).await?;
        let stdout = check(output, "get peer stats")?;
        Ok(parse_dump(&stdout, Utc::now()))
    }

    /// Human-readable `wg show` output.
    pub async fn show_status(&self) -> Result<String, InterfaceError> {
        let output = self.wg(&["show", &self.name]).await?;
        check(output, "get interface status")
    }

    async fn wg(&self, args: &[&str]) -> Result<CommandOutput, InterfaceError> {
        self.runner
            .run(WG, args)
            .await
            .map_err(|source| InterfaceError::Spawn {
                program: WG,
                source,
            })
    }
}

fn check(output: CommandOutput, action: &'static str) -> Result<String, InterfaceError> {
    if output.success {
        Ok(output.stdout)
    } else {
        Err(InterfaceError::Command {
            action,
            diagnostic: output.diagnostic(),
        })
    }
}

/// Parse `wg show <iface> dump`.
///
/// The first line describes the interface itself and is skipped. Peer lines
/// are tab separated:
/// `public-key preshared-key endpoint allowed-ips latest-handshake rx tx keepalive`.
/// Short or blank lines are skipped rather than treated as errors.
pub fn parse_dump(output: &str, now: DateTime<Utc>) -> HashMap<String, LivePeerStats> {
    let mut peers = HashMap::new();

    for line in output.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 8 {
            continue;
        }

        let handshake_secs: i64 = fields[4].parse().unwrap_or(0);
        let latest_handshake = if handshake_secs > 0 {
            Utc.timestamp_opt(handshake_secs, 0).single()
        } else {
            None
        };
        let online = latest_handshake
            .is_some_and(|at| now.signed_duration_since(at).num_seconds() < ONLINE_WINDOW_SECS);

        let endpoint = match fields[2] {
            "" | "(none)" => None,
            other => Some(other.to_string()),
        };

        peers.insert(
            fields[0].to_string(),
            LivePeerStats {
                endpoint,
                latest_handshake,
                transfer_rx: fields[5].parse().unwrap_or(0),
                transfer_tx: fields[6].parse().unwrap_or(0),
                online,
            },
        );
    }

    peers
}

/// `wg` names are limited to 15 characters by the kernel.
pub fn validate_interface_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 15
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'=' | b'+' | b'.' | b'-'))
}
