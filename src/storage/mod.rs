// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent control-plane state in a single redb file under `DATA_DIR`.
//!
//! ## Ownership
//!
//! - Peer rows, their unique indexes and connection logs belong to the peer
//!   registry ([`PeerRepository`], [`ConnectionLogRepository`])
//! - User and refresh-token rows belong to the token authority
//!   ([`UserRepository`], [`RefreshTokenRepository`])
//! - Settings overrides are shared read-mostly state ([`SettingsRepository`])
//!
//! All of them share one [`Database`] handle and therefore one writer.

pub mod database;
pub mod repository;

pub use database::{Database, StorageError, StorageResult};
pub use repository::{
    ConnectionLogEntry, ConnectionLogRepository, NewPeer, PeerRecord, PeerRepository,
    RefreshTokenRecord, RefreshTokenRepository, RotateOutcome, SettingsRepository, UserRecord,
    UserRepository,
};
