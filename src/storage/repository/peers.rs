// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Peer registry: the authoritative record of peer identity, key material
//! and assigned address.
//!
//! Allocation is optimistic. [`PeerRepository::allocate_next_address`] scans
//! in a read transaction and [`PeerRepository::create`] re-checks both unique
//! indexes inside the single write transaction, so a lost race is rejected
//! with `AlreadyExists` instead of producing a duplicate.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use crate::storage::database::{
    next_id, Database, CONNECTION_LOGS, PEERS, PEER_ADDRESS_INDEX, PEER_PUBLIC_KEY_INDEX,
};
use crate::storage::{StorageError, StorageResult};
use crate::wireguard::Subnet;

const PEER_SEQUENCE: &str = "peers";

/// Stored peer row. The private key never leaves the server except inside a
/// client profile export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: u64,
    pub name: String,
    pub public_key: String,
    pub private_key: String,
    pub address: Ipv4Addr,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for a new registry row.
#[derive(Debug, Clone)]
pub struct NewPeer {
    pub name: String,
    pub public_key: String,
    pub private_key: String,
    pub address: Ipv4Addr,
}

pub struct PeerRepository<'a> {
    db: &'a Database,
}

impl<'a> PeerRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Lowest free host in `.2..=.254` of `subnet`.
    pub fn allocate_next_address(&self, subnet: &Subnet) -> StorageResult<Ipv4Addr> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PEER_ADDRESS_INDEX)?;

        let mut used = HashSet::new();
        for entry in index.iter()? {
            let (address, _) = entry?;
            if let Ok(address) = address.value().parse::<Ipv4Addr>() {
                if subnet.contains(address) {
                    used.insert(address.octets()[3]);
                }
            }
        }

        (Subnet::FIRST_HOST..=Subnet::LAST_HOST)
            .find(|host| !used.contains(host))
            .map(|host| subnet.host(host))
            .ok_or(StorageError::AddressSpaceExhausted)
    }

    /// Insert a new, enabled peer.
    pub fn create(&self, new_peer: NewPeer) -> StorageResult<PeerRecord> {
        let address_key = new_peer.address.to_string();
        let write_txn = self.db.begin_write()?;
        let record = {
            let id = next_id(&write_txn, PEER_SEQUENCE)?;
            let mut address_index = write_txn.open_table(PEER_ADDRESS_INDEX)?;
            let mut key_index = write_txn.open_table(PEER_PUBLIC_KEY_INDEX)?;

            if address_index.get(address_key.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(format!(
                    "Peer address {address_key}"
                )));
            }
            if key_index.get(new_peer.public_key.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists("Peer public key".to_string()));
            }

            let now = Utc::now();
            let record = PeerRecord {
                id,
                name: new_peer.name,
                public_key: new_peer.public_key,
                private_key: new_peer.private_key,
                address: new_peer.address,
                enabled: true,
                created_at: now,
                updated_at: now,
            };

            let mut peers = write_txn.open_table(PEERS)?;
            peers.insert(id, serde_json::to_vec(&record)?.as_slice())?;
            address_index.insert(address_key.as_str(), id)?;
            key_index.insert(record.public_key.as_str(), id)?;
            record
        };
        write_txn.commit()?;

        Ok(record)
    }

    pub fn get(&self, id: u64) -> StorageResult<PeerRecord> {
        let read_txn = self.db.begin_read()?;
        let peers = read_txn.open_table(PEERS)?;
        let bytes = peers
            .get(id)?
            .ok_or_else(|| StorageError::NotFound(format!("Peer {id}")))?;
        Ok(serde_json::from_slice(bytes.value())?)
    }

    pub fn get_by_address(&self, address: Ipv4Addr) -> StorageResult<PeerRecord> {
        let id = {
            let read_txn = self.db.begin_read()?;
            let index = read_txn.open_table(PEER_ADDRESS_INDEX)?;
            let id = index
                .get(address.to_string().as_str())?
                .map(|v| v.value())
                .ok_or_else(|| StorageError::NotFound(format!("Peer {address}")))?;
            id
        };
        self.get(id)
    }

    /// All peers, newest first.
    pub fn list(&self) -> StorageResult<Vec<PeerRecord>> {
        let read_txn = self.db.begin_read()?;
        let peers = read_txn.open_table(PEERS)?;

        let mut records = Vec::new();
        for entry in peers.iter()? {
            let (_, bytes) = entry?;
            records.push(serde_json::from_slice::<PeerRecord>(bytes.value())?);
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    /// Change the name and/or enabled flag. `None` leaves a field untouched.
    pub fn update(
        &self,
        id: u64,
        name: Option<&str>,
        enabled: Option<bool>,
    ) -> StorageResult<PeerRecord> {
        let write_txn = self.db.begin_write()?;
        let record = {
            let mut peers = write_txn.open_table(PEERS)?;
            let mut record: PeerRecord = {
                let bytes = peers
                    .get(id)?
                    .ok_or_else(|| StorageError::NotFound(format!("Peer {id}")))?;
                serde_json::from_slice(bytes.value())?
            };

            if let Some(name) = name {
                record.name = name.to_string();
            }
            if let Some(enabled) = enabled {
                record.enabled = enabled;
            }
            record.updated_at = Utc::now();

            peers.insert(id, serde_json::to_vec(&record)?.as_slice())?;
            record
        };
        write_txn.commit()?;

        Ok(record)
    }

    /// Drop the peer assigned `address` together with its connection log.
    ///
    /// Fails with `NotFound` when no row matched.
    pub fn delete_by_address(&self, address: Ipv4Addr) -> StorageResult<PeerRecord> {
        let address_key = address.to_string();
        let write_txn = self.db.begin_write()?;
        let record = {
            let mut address_index = write_txn.open_table(PEER_ADDRESS_INDEX)?;
            let id = address_index
                .remove(address_key.as_str())?
                .map(|v| v.value())
                .ok_or_else(|| StorageError::NotFound(format!("Peer {address}")))?;

            let mut peers = write_txn.open_table(PEERS)?;
            let record: PeerRecord = {
                let bytes = peers
                    .remove(id)?
                    .ok_or_else(|| StorageError::NotFound(format!("Peer {id}")))?;
                serde_json::from_slice(bytes.value())?
            };

            let mut key_index = write_txn.open_table(PEER_PUBLIC_KEY_INDEX)?;
            key_index.remove(record.public_key.as_str())?;

            let mut logs = write_txn.open_table(CONNECTION_LOGS)?;
            let log_keys: Vec<(u64, u64)> = logs
                .range((id, 0)..=(id, u64::MAX))?
                .map(|entry| entry.map(|(key, _)| key.value()))
                .collect::<Result<_, _>>()?;
            for key in log_keys {
                logs.remove(key)?;
            }

            record
        };
        write_txn.commit()?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::temp_db;
    use crate::storage::ConnectionLogRepository;

    fn subnet() -> Subnet {
        "10.8.0.0/24".parse().unwrap()
    }

    fn new_peer(name: &str, host: u8) -> NewPeer {
        NewPeer {
            name: name.to_string(),
            public_key: format!("pub-{name}"),
            private_key: format!("priv-{name}"),
            address: Ipv4Addr::new(10, 8, 0, host),
        }
    }

    #[test]
    fn allocation_starts_at_two() {
        let (db, _dir) = temp_db();
        let repo = PeerRepository::new(&db);
        assert_eq!(
            repo.allocate_next_address(&subnet()).unwrap(),
            Ipv4Addr::new(10, 8, 0, 2)
        );
    }

    #[test]
    fn allocation_fills_lowest_gap() {
        let (db, _dir) = temp_db();
        let repo = PeerRepository::new(&db);
        for host in [2, 3, 5, 6] {
            repo.create(new_peer(&format!("p{host}"), host)).unwrap();
        }
        assert_eq!(
            repo.allocate_next_address(&subnet()).unwrap(),
            Ipv4Addr::new(10, 8, 0, 4)
        );

        repo.create(new_peer("p4", 4)).unwrap();
        assert_eq!(
            repo.allocate_next_address(&subnet()).unwrap(),
            Ipv4Addr::new(10, 8, 0, 7)
        );
    }

    #[test]
    fn allocation_ignores_addresses_outside_subnet() {
        let (db, _dir) = temp_db();
        let repo = PeerRepository::new(&db);
        let mut outside = new_peer("elsewhere", 2);
        outside.address = Ipv4Addr::new(10, 9, 0, 2);
        repo.create(outside).unwrap();

        assert_eq!(
            repo.allocate_next_address(&subnet()).unwrap(),
            Ipv4Addr::new(10, 8, 0, 2)
        );
    }

    #[test]
    fn allocation_exhausts_after_253_hosts() {
        let (db, _dir) = temp_db();
        let repo = PeerRepository::new(&db);
        for host in Subnet::FIRST_HOST..Subnet::LAST_HOST {
            repo.create(new_peer(&format!("p{host}"), host)).unwrap();
        }
        // Exactly one address left
        assert_eq!(
            repo.allocate_next_address(&subnet()).unwrap(),
            Ipv4Addr::new(10, 8, 0, 254)
        );
        repo.create(new_peer("last", 254)).unwrap();

        assert!(matches!(
            repo.allocate_next_address(&subnet()),
            Err(StorageError::AddressSpaceExhausted)
        ));
    }

    #[test]
    fn duplicate_address_or_key_is_rejected() {
        let (db, _dir) = temp_db();
        let repo = PeerRepository::new(&db);
        repo.create(new_peer("a", 2)).unwrap();

        let mut same_address = new_peer("b", 2);
        same_address.public_key = "pub-other".to_string();
        assert!(matches!(
            repo.create(same_address),
            Err(StorageError::AlreadyExists(_))
        ));

        let mut same_key = new_peer("c", 3);
        same_key.public_key = "pub-a".to_string();
        assert!(matches!(
            repo.create(same_key),
            Err(StorageError::AlreadyExists(_))
        ));

        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn create_get_and_lookup_by_address() {
        let (db, _dir) = temp_db();
        let repo = PeerRepository::new(&db);
        let created = repo.create(new_peer("laptop", 2)).unwrap();
        assert!(created.enabled);

        assert_eq!(repo.get(created.id).unwrap(), created);
        assert_eq!(
            repo.get_by_address(Ipv4Addr::new(10, 8, 0, 2)).unwrap(),
            created
        );
        assert!(matches!(
            repo.get_by_address(Ipv4Addr::new(10, 8, 0, 3)),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn list_is_newest_first() {
        let (db, _dir) = temp_db();
        let repo = PeerRepository::new(&db);
        repo.create(new_peer("first", 2)).unwrap();
        repo.create(new_peer("second", 3)).unwrap();
        repo.create(new_peer("third", 4)).unwrap();

        let names: Vec<String> = repo.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["third", "second", "first"]);
    }

    #[test]
    fn update_changes_only_requested_fields() {
        let (db, _dir) = temp_db();
        let repo = PeerRepository::new(&db);
        let peer = repo.create(new_peer("phone", 2)).unwrap();

        let renamed = repo.update(peer.id, Some("work phone"), None).unwrap();
        assert_eq!(renamed.name, "work phone");
        assert!(renamed.enabled);

        let disabled = repo.update(peer.id, None, Some(false)).unwrap();
        assert_eq!(disabled.name, "work phone");
        assert!(!disabled.enabled);
        assert_eq!(repo.get(peer.id).unwrap(), disabled);

        assert!(matches!(
            repo.update(999, Some("ghost"), None),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn delete_frees_address_and_key_and_logs() {
        let (db, _dir) = temp_db();
        let repo = PeerRepository::new(&db);
        let peer = repo.create(new_peer("tablet", 2)).unwrap();
        ConnectionLogRepository::new(&db)
            .record(peer.id, "198.51.100.1:4000")
            .unwrap();

        let removed = repo.delete_by_address(peer.address).unwrap();
        assert_eq!(removed.id, peer.id);

        assert!(repo.list().unwrap().is_empty());
        assert!(ConnectionLogRepository::new(&db)
            .list(peer.id, 100)
            .unwrap()
            .is_empty());
        assert_eq!(
            repo.allocate_next_address(&subnet()).unwrap(),
            Ipv4Addr::new(10, 8, 0, 2)
        );
        // Public key is free again
        repo.create(new_peer("tablet", 3)).unwrap();
    }

    #[test]
    fn delete_missing_address_is_not_found() {
        let (db, _dir) = temp_db();
        let repo = PeerRepository::new(&db);
        assert!(matches!(
            repo.delete_by_address(Ipv4Addr::new(10, 8, 0, 5)),
            Err(StorageError::NotFound(_))
        ));
    }
}
