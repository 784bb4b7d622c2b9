// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WG Panel - WireGuard Concentrator Control Plane
//!
//! Provisions VPN peers on a live WireGuard interface, keeps the interface
//! and the peer registry in agreement, and gates the API behind short-lived
//! access tokens or a long-lived API credential.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Passwords, access tokens, refresh rotation, login rate limit
//! - `provisioning` - Peer lifecycle against registry and live interface
//! - `wireguard` - Keys, address pool, `wg` tool wrapper, client profiles
//! - `mesh` - Optional Tailscale mesh control
//! - `storage` - Embedded redb database
//! - `maintenance` - Periodic expiry sweep and compaction

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod mesh;
pub mod models;
pub mod provisioning;
pub mod runner;
pub mod state;
pub mod storage;
pub mod wireguard;

#[cfg(test)]
pub(crate) mod testing;
