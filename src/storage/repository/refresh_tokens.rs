// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Server-side refresh token records.
//!
//! Raw tokens are never stored; rows are keyed by the SHA-256 of the token.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::storage::database::{Database, REFRESH_TOKENS};
use crate::storage::StorageResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub user_id: u64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of an attempted rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// Old row deleted, new row inserted.
    Rotated { user_id: u64 },
    /// No such token (never issued, already rotated, or revoked).
    Missing,
    /// Token existed but had expired; its row has been deleted.
    Expired,
}

pub struct RefreshTokenRepository<'a> {
    db: &'a Database,
}

impl<'a> RefreshTokenRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Hash a token for storage.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn save(&self, token: &str, user_id: u64, expires_at: DateTime<Utc>) -> StorageResult<()> {
        let record = RefreshTokenRecord {
            user_id,
            expires_at,
            created_at: Utc::now(),
        };
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(REFRESH_TOKENS)?;
            table.insert(
                Self::hash_token(token).as_str(),
                serde_json::to_vec(&record)?.as_slice(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, token: &str) -> StorageResult<Option<RefreshTokenRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REFRESH_TOKENS)?;
        let record = match table.get(Self::hash_token(token).as_str())? {
            Some(bytes) => Some(serde_json::from_slice(bytes.value())?),
            None => None,
        };
        Ok(record)
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, token: &str) -> StorageResult<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(REFRESH_TOKENS)?;
            let removed = table.remove(Self::hash_token(token).as_str())?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Swap `old` for `new` in a single write transaction.
    ///
    /// Two callers presenting the same token are serialized by the single
    /// writer, so exactly one of them sees `Rotated`.
    pub fn rotate(
        &self,
        old: &str,
        new: &str,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<RotateOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(REFRESH_TOKENS)?;
            let removed: Option<RefreshTokenRecord> =
                match table.remove(Self::hash_token(old).as_str())? {
                    Some(bytes) => Some(serde_json::from_slice(bytes.value())?),
                    None => None,
                };

            match removed {
                None => RotateOutcome::Missing,
                Some(record) if record.expires_at <= now => RotateOutcome::Expired,
                Some(record) => {
                    let replacement = RefreshTokenRecord {
                        user_id: record.user_id,
                        expires_at: new_expires_at,
                        created_at: now,
                    };
                    table.insert(
                        Self::hash_token(new).as_str(),
                        serde_json::to_vec(&replacement)?.as_slice(),
                    )?;
                    RotateOutcome::Rotated {
                        user_id: record.user_id,
                    }
                }
            }
        };
        // Missing commits nothing; Expired commits the deletion.
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Delete every expired row. Returns the number removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        let write_txn = self.db.begin_write()?;
        let purged = {
            let mut table = write_txn.open_table(REFRESH_TOKENS)?;
            let mut expired = Vec::new();
            for entry in table.iter()? {
                let (key, bytes) = entry?;
                let record: RefreshTokenRecord = serde_json::from_slice(bytes.value())?;
                if record.expires_at <= now {
                    expired.push(key.value().to_string());
                }
            }
            for key in &expired {
                table.remove(key.as_str())?;
            }
            expired.len()
        };
        write_txn.commit()?;
        Ok(purged)
    }
}
