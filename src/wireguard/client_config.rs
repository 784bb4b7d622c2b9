// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client profile rendering.
//!
//! Pure: the same peer and server settings always render byte-identical
//! text, which the QR export relies on.

use std::fmt::Write as _;
use std::net::Ipv4Addr;

/// Keepalive pushed to every client, in seconds.
pub const PERSISTENT_KEEPALIVE_SECS: u64 = 25;

/// Server-side values that go into every client profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProfile {
    pub server_public_key: String,
    pub server_endpoint: String,
    pub dns: String,
    pub allowed_ips: String,
}

/// Peer-side values of a client profile.
#[derive(Debug, Clone, Copy)]
pub struct PeerProfile<'a> {
    pub private_key: &'a str,
    pub address: Ipv4Addr,
}

/// Render a `wg-quick` compatible client configuration.
pub fn generate_client_config(peer: PeerProfile<'_>, server: &ServerProfile) -> String {
    let mut out = String::with_capacity(320);
    // Writing into a String cannot fail.
    let _ = write!(
        out,
        "[Interface]\n\
         PrivateKey = {private_key}\n\
         Address = {address}/32\n\
         DNS = {dns}\n\
         \n\
         [Peer]\n\
         PublicKey = {server_public_key}\n\
         Endpoint = {server_endpoint}\n\
         AllowedIPs = {allowed_ips}\n\
         PersistentKeepalive = {keepalive}\n",
        private_key = peer.private_key,
        address = peer.address,
        dns = server.dns,
        server_public_key = server.server_public_key,
        server_endpoint = server.server_endpoint,
        allowed_ips = server.allowed_ips,
        keepalive = PERSISTENT_KEEPALIVE_SECS,
    );
    out
}
