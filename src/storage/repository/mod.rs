// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the redb tables.
//!
//! Each repository borrows the shared [`Database`](super::Database) and
//! exposes the operations for one entity type.

pub mod connection_logs;
pub mod peers;
pub mod refresh_tokens;
pub mod settings;
pub mod users;

pub use connection_logs::{ConnectionLogEntry, ConnectionLogRepository, MAX_LOG_ENTRIES};
pub use peers::{NewPeer, PeerRecord, PeerRepository};
pub use refresh_tokens::{RefreshTokenRecord, RefreshTokenRepository, RotateOutcome};
pub use settings::SettingsRepository;
pub use users::{UserRecord, UserRepository};
