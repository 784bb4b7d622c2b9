// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Append-only log of endpoints observed for online peers.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{next_id, Database, CONNECTION_LOGS};
use crate::storage::StorageResult;

const LOG_SEQUENCE: &str = "connection_logs";

/// Upper bound on entries returned for one peer.
pub const MAX_LOG_ENTRIES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectionLogEntry {
    pub id: u64,
    pub peer_id: u64,
    /// Remote `ip:port` the peer was seen at
    pub endpoint: String,
    pub connected_at: DateTime<Utc>,
}

pub struct ConnectionLogRepository<'a> {
    db: &'a Database,
}

impl<'a> ConnectionLogRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append `endpoint` unless it equals the last endpoint logged for the
    /// peer. Returns whether a row was written.
    pub fn record(&self, peer_id: u64, endpoint: &str) -> StorageResult<bool> {
        let write_txn = self.db.begin_write()?;
        {
            let last_endpoint = {
                let logs = write_txn.open_table(CONNECTION_LOGS)?;
                let mut range = logs.range((peer_id, 0)..=(peer_id, u64::MAX))?;
                let last = range.next_back().transpose()?;
                let endpoint = match last {
                    Some((_, bytes)) => {
                        let entry: ConnectionLogEntry = serde_json::from_slice(bytes.value())?;
                        Some(entry.endpoint)
                    }
                    None => None,
                };
                endpoint
            };
            if last_endpoint.as_deref() == Some(endpoint) {
                return Ok(false);
            }

            let id = next_id(&write_txn, LOG_SEQUENCE)?;
            let entry = ConnectionLogEntry {
                id,
                peer_id,
                endpoint: endpoint.to_string(),
                connected_at: Utc::now(),
            };
            let mut logs = write_txn.open_table(CONNECTION_LOGS)?;
            logs.insert((peer_id, id), serde_json::to_vec(&entry)?.as_slice())?;
        }
        write_txn.commit()?;

        Ok(true)
    }

    /// Newest entries first, at most `limit`.
    pub fn list(&self, peer_id: u64, limit: usize) -> StorageResult<Vec<ConnectionLogEntry>> {
        let read_txn = self.db.begin_read()?;
        let logs = read_txn.open_table(CONNECTION_LOGS)?;

        let mut entries = Vec::new();
        for entry in logs.range((peer_id, 0)..=(peer_id, u64::MAX))?.rev().take(limit) {
            let (_, bytes) = entry?;
            entries.push(serde_json::from_slice(bytes.value())?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::temp_db;

    #[test]
    fn consecutive_duplicate_endpoint_is_skipped() {
        let (db, _dir) = temp_db();
        let repo = ConnectionLogRepository::new(&db);

        assert!(repo.record(1, "198.51.100.1:4000").unwrap());
        assert!(!repo.record(1, "198.51.100.1:4000").unwrap());
        assert!(repo.record(1, "198.51.100.2:4000").unwrap());
        // Only the last endpoint is compared, not the whole history
        assert!(repo.record(1, "198.51.100.1:4000").unwrap());

        assert_eq!(repo.list(1, MAX_LOG_ENTRIES).unwrap().len(), 3);
    }

    #[test]
    fn list_is_newest_first_and_limited() {
        let (db, _dir) = temp_db();
        let repo = ConnectionLogRepository::new(&db);
        for port in 0..5 {
            repo.record(7, &format!("203.0.113.9:{port}")).unwrap();
        }

        let entries = repo.list(7, 3).unwrap();
        let endpoints: Vec<&str> = entries.iter().map(|e| e.endpoint.as_str()).collect();
        assert_eq!(
            endpoints,
            vec!["203.0.113.9:4", "203.0.113.9:3", "203.0.113.9:2"]
        );
    }

    #[test]
    fn peers_are_isolated() {
        let (db, _dir) = temp_db();
        let repo = ConnectionLogRepository::new(&db);
        repo.record(1, "198.51.100.1:1").unwrap();
        repo.record(2, "198.51.100.1:1").unwrap();

        assert_eq!(repo.list(1, 100).unwrap().len(), 1);
        assert_eq!(repo.list(2, 100).unwrap().len(), 1);
        assert!(repo.list(3, 100).unwrap().is_empty());
    }
}
