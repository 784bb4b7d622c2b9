// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Best-effort Tailscale mesh control.
//!
//! Only status, connect and disconnect are supported. The auth URL shown to
//! an operator during first login is looked up in the `tailscale up` output
//! and in the status JSON; when neither has it the URL is reported as
//! unavailable.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::runner::{run_with_timeout, CommandRunner};

const TAILSCALE: &str = "tailscale";

/// Hard deadline for `tailscale up`, which blocks while waiting for login.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub const STATE_NOT_INSTALLED: &str = "not_installed";
pub const STATE_STOPPED: &str = "stopped";
pub const STATE_RUNNING: &str = "Running";
pub const STATE_NEEDS_LOGIN: &str = "NeedsLogin";

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("tailscale is not installed")]
    NotInstalled,

    #[error("tailscale command failed: {0}")]
    Command(String),

    #[error("failed to parse tailscale status: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A node of the tailnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MeshNode {
    pub hostname: String,
    /// First Tailscale address of the node
    pub tailscale_ip: Option<String>,
    pub allowed_ips: Vec<String>,
    pub primary_routes: Vec<String>,
    pub online: bool,
}

/// A subnet route advertised by a tailnet peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MeshRoute {
    pub subnet: String,
    pub peer_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MeshStatus {
    pub installed: bool,
    pub connected: bool,
    /// Tailscale backend state, or `not_installed` / `stopped`
    pub backend_state: String,
    /// Login URL when the node still needs authentication
    pub auth_url: Option<String>,
    #[serde(rename = "self")]
    pub self_node: Option<MeshNode>,
    pub peers: Vec<MeshNode>,
    pub routes: Vec<MeshRoute>,
}

impl MeshStatus {
    fn bare(installed: bool, backend_state: &str) -> Self {
        Self {
            installed,
            connected: false,
            backend_state: backend_state.to_string(),
            auth_url: None,
            self_node: None,
            peers: Vec::new(),
            routes: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawStatus {
    backend_state: String,
    #[serde(rename = "AuthURL")]
    auth_url: Option<String>,
    #[serde(rename = "Self")]
    self_node: Option<RawNode>,
    /// `null` while the node is logged out
    peer: Option<HashMap<String, RawNode>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawNode {
    host_name: String,
    #[serde(rename = "TailscaleIPs")]
    tailscale_ips: Option<Vec<String>>,
    #[serde(rename = "AllowedIPs")]
    allowed_ips: Option<Vec<String>>,
    primary_routes: Option<Vec<String>>,
    online: bool,
}

impl From<RawNode> for MeshNode {
    fn from(raw: RawNode) -> Self {
        Self {
            tailscale_ip: raw.tailscale_ips.and_then(|ips| ips.into_iter().next()),
            hostname: raw.host_name,
            allowed_ips: raw.allowed_ips.unwrap_or_default(),
            primary_routes: raw.primary_routes.unwrap_or_default(),
            online: raw.online,
        }
    }
}

/// Parse `tailscale status --json`.
pub fn parse_status(json: &str) -> Result<MeshStatus, MeshError> {
    let raw: RawStatus = serde_json::from_str(json)?;

    let mut peers: Vec<MeshNode> = raw
        .peer
        .unwrap_or_default()
        .into_values()
        .map(MeshNode::from)
        .collect();
    peers.sort_by(|a, b| a.hostname.cmp(&b.hostname));

    let routes = peers
        .iter()
        .flat_map(|peer| {
            peer.primary_routes.iter().map(|subnet| MeshRoute {
                subnet: subnet.clone(),
                peer_name: peer.hostname.clone(),
            })
        })
        .collect();

    Ok(MeshStatus {
        installed: true,
        connected: raw.backend_state == STATE_RUNNING,
        auth_url: raw.auth_url.filter(|url| url.starts_with("https://")),
        backend_state: raw.backend_state,
        self_node: raw.self_node.map(MeshNode::from),
        peers,
        routes,
    })
}

fn is_stopped_message(diagnostic: &str) -> bool {
    ["not running", "doesn't appear to be running", "is stopped"]
        .iter()
        .any(|needle| diagnostic.contains(needle))
}

/// First `https://` URL in `text`, cut at whitespace or a quote.
pub fn extract_auth_url(text: &str) -> Option<String> {
    let start = text.find("https://")?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
        .unwrap_or(rest.len());
    Some(rest[..end].to_string()).filter(|url| url.len() > "https://".len())
}

#[derive(Clone)]
pub struct MeshClient {
    runner: Arc<dyn CommandRunner>,
}

impl MeshClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn is_installed(&self) -> bool {
        self.runner.is_available(TAILSCALE).await
    }

    pub async fn status(&self) -> Result<MeshStatus, MeshError> {
        if !self.is_installed().await {
            return Ok(MeshStatus::bare(false, STATE_NOT_INSTALLED));
        }

        let output = self
            .runner
            .run(TAILSCALE, &["status", "--json"])
            .await
            .map_err(|e| MeshError::Command(e.to_string()))?;

        if !output.success {
            let diagnostic = output.diagnostic();
            if is_stopped_message(&diagnostic) {
                return Ok(MeshStatus::bare(true, STATE_STOPPED));
            }
            // A logged-out node still prints usable JSON
            if output.stdout.trim_start().starts_with('{') {
                return parse_status(&output.stdout);
            }
            return Err(MeshError::Command(diagnostic));
        }

        parse_status(&output.stdout)
    }

    /// Bring the node up, accepting advertised routes.
    ///
    /// Returns immediately if the node is already running.
    pub async fn connect(&self) -> Result<MeshStatus, MeshError> {
        if !self.is_installed().await {
            return Err(MeshError::NotInstalled);
        }
        if let Ok(current) = self.status().await {
            if current.connected {
                return Ok(current);
            }
        }

        let up = run_with_timeout(
            self.runner.as_ref(),
            TAILSCALE,
            &["up", "--accept-routes", "--reset"],
            CONNECT_TIMEOUT,
        )
        .await;

        let url_from_up = match &up {
            Ok(output) => extract_auth_url(&output.stderr)
                .or_else(|| extract_auth_url(&output.stdout)),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                tracing::debug!("tailscale up still waiting after timeout");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "tailscale up could not be started");
                None
            }
        };

        let mut status = match self.status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Mesh status unavailable after connect");
                MeshStatus::bare(true, STATE_NEEDS_LOGIN)
            }
        };
        if let Some(url) = url_from_up {
            status.auth_url = Some(url);
        }
        Ok(status)
    }

    pub async fn disconnect(&self) -> Result<(), MeshError> {
        if !self.is_installed().await {
            return Err(MeshError::NotInstalled);
        }
        let output = self
            .runner
            .run(TAILSCALE, &["down"])
            .await
            .map_err(|e| MeshError::Command(e.to_string()))?;
        if !output.success {
            return Err(MeshError::Command(output.diagnostic()));
        }
        Ok(())
    }
}
