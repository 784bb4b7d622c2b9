// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key/value overrides that shadow boot-time defaults.

use redb::ReadableTable;

use crate::storage::database::{Database, SETTINGS};
use crate::storage::StorageResult;

pub const DNS_KEY: &str = "dns";
pub const ALLOWED_IPS_KEY: &str = "allowed_ips";
pub const LOGGING_ENABLED_KEY: &str = "logging_enabled";

pub struct SettingsRepository<'a> {
    db: &'a Database,
}

impl<'a> SettingsRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SETTINGS)?;
        let value = table.get(key)?.map(|v| v.value().to_string());
        Ok(value)
    }

    /// Stored value or `default` when the key was never written.
    pub fn get_or(&self, key: &str, default: &str) -> StorageResult<String> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// Upsert a single key in its own transaction.
    pub fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
