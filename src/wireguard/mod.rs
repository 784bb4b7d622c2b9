// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WireGuard primitives: key material, client profiles and the live
//! interface executor.

pub mod client_config;
pub mod interface;
pub mod keys;

pub use client_config::{generate_client_config, PeerProfile, ServerProfile};
pub use interface::{InterfaceError, LivePeerStats, WgInterface};
pub use keys::{generate_keypair, Subnet, SubnetError, WgKeyPair};
