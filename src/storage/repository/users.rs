// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Administrative users and their derived API credential.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use super::refresh_tokens::RefreshTokenRecord;
use crate::storage::database::{
    next_id, Database, API_CREDENTIAL_INDEX, REFRESH_TOKENS, USERNAME_INDEX, USERS,
};
use crate::storage::{StorageError, StorageResult};

const USER_SEQUENCE: &str = "users";

/// Resource name carried by storage errors about the API credential index.
pub const API_CREDENTIAL_RESOURCE: &str = "API credential";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
    /// Always equals the credential derived from the current password
    pub api_credential: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        username: &str,
        password_hash: &str,
        api_credential: &str,
    ) -> StorageResult<UserRecord> {
        let write_txn = self.db.begin_write()?;
        let record = {
            let id = next_id(&write_txn, USER_SEQUENCE)?;
            let mut usernames = write_txn.open_table(USERNAME_INDEX)?;
            if usernames.get(username)?.is_some() {
                return Err(StorageError::AlreadyExists(format!("User {username}")));
            }

            let now = Utc::now();
            let record = UserRecord {
                id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                api_credential: api_credential.to_string(),
                created_at: now,
                updated_at: now,
            };

            let mut users = write_txn.open_table(USERS)?;
            users.insert(id, serde_json::to_vec(&record)?.as_slice())?;
            usernames.insert(username, id)?;
            replace_credential_index(&write_txn, id, "", api_credential)?;
            record
        };
        write_txn.commit()?;

        Ok(record)
    }

    pub fn get(&self, id: u64) -> StorageResult<UserRecord> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        let bytes = users
            .get(id)?
            .ok_or_else(|| StorageError::NotFound(format!("User {id}")))?;
        Ok(serde_json::from_slice(bytes.value())?)
    }

    pub fn get_by_username(&self, username: &str) -> StorageResult<UserRecord> {
        let id = {
            let read_txn = self.db.begin_read()?;
            let index = read_txn.open_table(USERNAME_INDEX)?;
            let id = index
                .get(username)?
                .map(|v| v.value())
                .ok_or_else(|| StorageError::NotFound(format!("User {username}")))?;
            id
        };
        self.get(id)
    }

    /// Resolve an API credential. An empty credential never matches.
    pub fn get_by_api_credential(&self, credential: &str) -> StorageResult<UserRecord> {
        if credential.is_empty() {
            return Err(StorageError::NotFound(API_CREDENTIAL_RESOURCE.to_string()));
        }
        let id = {
            let read_txn = self.db.begin_read()?;
            let index = read_txn.open_table(API_CREDENTIAL_INDEX)?;
            let id = index
                .get(credential)?
                .map(|v| v.value())
                .ok_or_else(|| StorageError::NotFound(API_CREDENTIAL_RESOURCE.to_string()))?;
            id
        };
        self.get(id)
    }

    pub fn exists(&self, username: &str) -> StorageResult<bool> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USERNAME_INDEX)?;
        let exists = index.get(username)?.is_some();
        Ok(exists)
    }

    /// Overwrite the stored API credential, keeping the lookup index in sync.
    pub fn set_api_credential(&self, user_id: u64, credential: &str) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let mut record = load(&users, user_id)?;
            replace_credential_index(&write_txn, user_id, &record.api_credential, credential)?;

            record.api_credential = credential.to_string();
            record.updated_at = Utc::now();
            users.insert(user_id, serde_json::to_vec(&record)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Store a new password hash and its derived credential, and revoke every
    /// refresh token the user holds, all in one transaction.
    pub fn update_password(
        &self,
        user_id: u64,
        password_hash: &str,
        credential: &str,
    ) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let mut record = load(&users, user_id)?;
            replace_credential_index(&write_txn, user_id, &record.api_credential, credential)?;

            record.password_hash = password_hash.to_string();
            record.api_credential = credential.to_string();
            record.updated_at = Utc::now();
            users.insert(user_id, serde_json::to_vec(&record)?.as_slice())?;

            let mut tokens = write_txn.open_table(REFRESH_TOKENS)?;
            let mut revoked = Vec::new();
            for entry in tokens.iter()? {
                let (key, bytes) = entry?;
                let token: RefreshTokenRecord = serde_json::from_slice(bytes.value())?;
                if token.user_id == user_id {
                    revoked.push(key.value().to_string());
                }
            }
            for key in revoked {
                tokens.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

fn load(users: &impl ReadableTable<u64, &'static [u8]>, user_id: u64) -> StorageResult<UserRecord> {
    let bytes = users
        .get(user_id)?
        .ok_or_else(|| StorageError::NotFound(format!("User {user_id}")))?;
    Ok(serde_json::from_slice(bytes.value())?)
}

/// Point the credential index at `user_id` for `new`. The credential is
/// derived from the password alone, so a second user choosing a password
/// already in use would take over the first user's credential; that is
/// rejected instead.
fn replace_credential_index(
    write_txn: &redb::WriteTransaction,
    user_id: u64,
    old: &str,
    new: &str,
) -> StorageResult<()> {
    let mut credentials = write_txn.open_table(API_CREDENTIAL_INDEX)?;
    if !new.is_empty() {
        let taken = credentials.get(new)?.is_some_and(|v| v.value() != user_id);
        if taken {
            return Err(StorageError::AlreadyExists(API_CREDENTIAL_RESOURCE.to_string()));
        }
    }
    if !old.is_empty() {
        let owned_by_user = credentials.get(old)?.is_some_and(|v| v.value() == user_id);
        if owned_by_user {
            credentials.remove(old)?;
        }
    }
    if !new.is_empty() {
        credentials.insert(new, user_id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::temp_db;
    use crate::storage::RefreshTokenRepository;

    const CRED_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const CRED_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn create_and_lookup() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);
        let user = repo.create("admin", "$argon2id$hash", CRED_A).unwrap();

        assert!(repo.exists("admin").unwrap());
        assert!(!repo.exists("root").unwrap());
        assert_eq!(repo.get(user.id).unwrap(), user);
        assert_eq!(repo.get_by_username("admin").unwrap(), user);
        assert_eq!(repo.get_by_api_credential(CRED_A).unwrap(), user);
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);
        repo.create("admin", "h", CRED_A).unwrap();
        assert!(matches!(
            repo.create("admin", "h2", CRED_B),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn empty_credential_never_matches() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);
        repo.create("admin", "h", "").unwrap();
        assert!(matches!(
            repo.get_by_api_credential(""),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn set_api_credential_moves_index() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);
        let user = repo.create("admin", "h", CRED_A).unwrap();

        repo.set_api_credential(user.id, CRED_B).unwrap();
        assert!(repo.get_by_api_credential(CRED_A).is_err());
        assert_eq!(repo.get_by_api_credential(CRED_B).unwrap().id, user.id);
        assert_eq!(repo.get(user.id).unwrap().api_credential, CRED_B);
    }

    #[test]
    fn credential_shared_with_another_user_is_rejected() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);
        let admin = repo.create("admin", "h", CRED_A).unwrap();
        let ops = repo.create("ops", "h", CRED_B).unwrap();

        assert!(matches!(
            repo.create("audit", "h", CRED_A),
            Err(StorageError::AlreadyExists(_))
        ));
        assert!(!repo.exists("audit").unwrap());

        assert!(matches!(
            repo.update_password(ops.id, "new-hash", CRED_A),
            Err(StorageError::AlreadyExists(_))
        ));
        assert_eq!(repo.get_by_api_credential(CRED_A).unwrap().id, admin.id);
        assert_eq!(repo.get_by_api_credential(CRED_B).unwrap().id, ops.id);
        assert_eq!(repo.get(ops.id).unwrap().password_hash, "h");

        repo.update_password(admin.id, "new-hash", CRED_A).unwrap();
        assert_eq!(repo.get_by_api_credential(CRED_A).unwrap().id, admin.id);
    }

    #[test]
    fn password_change_revokes_only_that_users_tokens() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);
        let tokens = RefreshTokenRepository::new(&db);
        let admin = repo.create("admin", "h", CRED_A).unwrap();
        let other = repo.create("ops", "h", "").unwrap();

        let expires = Utc::now() + chrono::Duration::days(7);
        tokens.save("admin-token-1", admin.id, expires).unwrap();
        tokens.save("admin-token-2", admin.id, expires).unwrap();
        tokens.save("ops-token", other.id, expires).unwrap();

        repo.update_password(admin.id, "new-hash", CRED_B).unwrap();

        let updated = repo.get(admin.id).unwrap();
        assert_eq!(updated.password_hash, "new-hash");
        assert_eq!(updated.api_credential, CRED_B);
        assert!(repo.get_by_api_credential(CRED_A).is_err());

        assert!(tokens.get("admin-token-1").unwrap().is_none());
        assert!(tokens.get("admin-token-2").unwrap().is_none());
        assert!(tokens.get("ops-token").unwrap().is_some());
    }
}
