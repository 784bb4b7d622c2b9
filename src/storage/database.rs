// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded control-plane database backed by redb (pure Rust, ACID).
//!
//! redb admits exactly one write transaction at a time, so every registry and
//! credential mutation is serialized through a single logical writer. Races
//! between concurrent writers are rejected by the unique index tables checked
//! inside the write transaction rather than by an explicit lock.
//!
//! ## Table Layout
//!
//! - `peers`: peer id → serialized PeerRecord
//! - `peer_address_index`: assigned IPv4 address → peer id (unique)
//! - `peer_public_key_index`: base64 public key → peer id (unique)
//! - `users`: user id → serialized UserRecord
//! - `username_index`: username → user id (unique)
//! - `api_credential_index`: 43-char API credential → user id
//! - `refresh_tokens`: sha256(token) → serialized RefreshTokenRecord
//! - `settings`: key → value
//! - `connection_logs`: (peer id, log id) → serialized ConnectionLogEntry
//! - `sequences`: sequence name → last issued id

use std::path::Path;
use std::sync::RwLock;

use redb::{ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const PEERS: TableDefinition<u64, &[u8]> = TableDefinition::new("peers");

pub(crate) const PEER_ADDRESS_INDEX: TableDefinition<&str, u64> =
    TableDefinition::new("peer_address_index");

pub(crate) const PEER_PUBLIC_KEY_INDEX: TableDefinition<&str, u64> =
    TableDefinition::new("peer_public_key_index");

pub(crate) const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");

pub(crate) const USERNAME_INDEX: TableDefinition<&str, u64> =
    TableDefinition::new("username_index");

pub(crate) const API_CREDENTIAL_INDEX: TableDefinition<&str, u64> =
    TableDefinition::new("api_credential_index");

pub(crate) const REFRESH_TOKENS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("refresh_tokens");

pub(crate) const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Key: `(peer_id, log_id)`; log ids grow monotonically so a reverse range
/// scan over one peer yields newest-first.
pub(crate) const CONNECTION_LOGS: TableDefinition<(u64, u64), &[u8]> =
    TableDefinition::new("connection_logs");

const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("redb compaction error: {0}")]
    RedbCompaction(#[from] redb::CompactionError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("no free host address left in subnet")]
    AddressSpaceExhausted,

    #[error("database handle lock poisoned")]
    Poisoned,
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Database
// =============================================================================

/// Shared handle over the redb file.
///
/// The inner lock is only taken exclusively by [`Database::compact`]; every
/// other caller takes it shared just long enough to open a transaction.
pub struct Database {
    inner: RwLock<redb::Database>,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PEERS)?;
            let _ = write_txn.open_table(PEER_ADDRESS_INDEX)?;
            let _ = write_txn.open_table(PEER_PUBLIC_KEY_INDEX)?;
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERNAME_INDEX)?;
            let _ = write_txn.open_table(API_CREDENTIAL_INDEX)?;
            let _ = write_txn.open_table(REFRESH_TOKENS)?;
            let _ = write_txn.open_table(SETTINGS)?;
            let _ = write_txn.open_table(CONNECTION_LOGS)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self {
            inner: RwLock::new(db),
        })
    }

    pub(crate) fn begin_read(&self) -> StorageResult<ReadTransaction> {
        let db = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(db.begin_read()?)
    }

    /// Begin a write transaction. Blocks while another writer is active.
    pub(crate) fn begin_write(&self) -> StorageResult<WriteTransaction> {
        let db = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(db.begin_write()?)
    }

    /// Cheap round-trip used by the readiness probe.
    pub fn health_check(&self) -> StorageResult<()> {
        let read_txn = self.begin_read()?;
        let _ = read_txn.open_table(SETTINGS)?;
        Ok(())
    }

    /// Reclaim free pages.
    ///
    /// Returns `Ok(false)` when redb had nothing to do. Fails with a
    /// compaction error if a transaction is still live; callers retry on the
    /// next maintenance sweep.
    pub fn compact(&self) -> StorageResult<bool> {
        let mut db = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        Ok(db.compact()?)
    }
}

/// Issue the next id of the named sequence inside an open write transaction.
///
/// Opens and closes the `sequences` table, so it must be called before the
/// caller opens any table handle it keeps across the call.
pub(crate) fn next_id(txn: &WriteTransaction, sequence: &str) -> StorageResult<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let current = table.get(sequence)?.map(|v| v.value()).unwrap_or(0);
    let next = current + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

#[cfg(test)]
pub(crate) fn temp_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("test.redb")).unwrap();
    (db, dir)
}
