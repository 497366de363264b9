//! # VaultDb: Persistent Storage Engine
//!
//! The durable half of the vault, built on sled's embedded key-value store.
//! Everything that must survive a restart flows through this module.
//!
//! ## Tree Layout
//!
//! | Tree         | Key                         | Value                    |
//! |--------------|-----------------------------|--------------------------|
//! | `assets`     | asset address (32B)         | `bincode(AssetConfig)`   |
//! | `holders`    | holder address (32B)        | `bincode(u128)` shares   |
//! | `strategies` | strategy id (32B)           | `bincode(StrategyAdapter)` |
//! | `roles`      | role tag (1B) ‖ address     | empty                    |
//! | `metadata`   | key (UTF-8)                 | `bincode(..)`            |
//!
//! ## Atomicity
//!
//! Writers never touch trees directly. They describe what changed in a
//! [`Changeset`] and hand it to [`VaultDb::commit`], which applies every
//! write across every tree inside one sled transaction and then flushes.
//! Either the whole operation lands on disk or none of it does.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::{Db, Transactional, Tree};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::{TREE_ASSETS, TREE_HOLDERS, TREE_METADATA, TREE_ROLES, TREE_STRATEGIES};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transaction aborted: {0}")]
    Transaction(String),

    #[error("key not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Tables & Changesets
// ---------------------------------------------------------------------------

/// The logical tables of the vault store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Assets,
    Holders,
    Strategies,
    Roles,
    Metadata,
}

impl Table {
    /// The sled tree name backing this table.
    pub fn tree_name(&self) -> &'static str {
        match self {
            Table::Assets => TREE_ASSETS,
            Table::Holders => TREE_HOLDERS,
            Table::Strategies => TREE_STRATEGIES,
            Table::Roles => TREE_ROLES,
            Table::Metadata => TREE_METADATA,
        }
    }
}

/// One pending write. `value == None` deletes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub table: Table,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

/// An ordered batch of writes applied atomically by [`VaultDb::commit`].
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    writes: Vec<Write>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `bincode(value)` under `key`.
    pub fn put<T: Serialize>(&mut self, table: Table, key: &[u8], value: &T) -> DbResult<()> {
        let bytes = encode(value)?;
        self.put_raw(table, key, bytes);
        Ok(())
    }

    /// Queues raw bytes under `key`.
    pub fn put_raw(&mut self, table: Table, key: &[u8], value: Vec<u8>) {
        self.writes.push(Write {
            table,
            key: key.to_vec(),
            value: Some(value),
        });
    }

    /// Queues a deletion of `key`.
    pub fn delete(&mut self, table: Table, key: &[u8]) {
        self.writes.push(Write {
            table,
            key: key.to_vec(),
            value: None,
        });
    }

    /// Queues the writes that turn `before` into `after`: a put for every
    /// new or changed entry and a delete for every vanished key.
    pub fn diff_maps<K, V, F>(
        &mut self,
        table: Table,
        before: &BTreeMap<K, V>,
        after: &BTreeMap<K, V>,
        key_bytes: F,
    ) -> DbResult<()>
    where
        K: Ord,
        V: PartialEq + Serialize,
        F: Fn(&K) -> Vec<u8>,
    {
        for (k, v) in after {
            if before.get(k) != Some(v) {
                self.put(table, &key_bytes(k), v)?;
            }
        }
        for k in before.keys() {
            if !after.contains_key(k) {
                self.delete(table, &key_bytes(k));
            }
        }
        Ok(())
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// VaultDb
// ---------------------------------------------------------------------------

/// Persistent storage engine for one vault.
///
/// Cloning is cheap: sled handles are reference-counted.
#[derive(Debug, Clone)]
pub struct VaultDb {
    db: Db,
    assets: Tree,
    holders: Tree,
    strategies: Tree,
    roles: Tree,
    metadata: Tree,
}

impl VaultDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    ///
    /// Ideal for unit tests: no filesystem side effects, no cleanup needed.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let assets = db.open_tree(TREE_ASSETS)?;
        let holders = db.open_tree(TREE_HOLDERS)?;
        let strategies = db.open_tree(TREE_STRATEGIES)?;
        let roles = db.open_tree(TREE_ROLES)?;
        let metadata = db.open_tree(TREE_METADATA)?;

        Ok(Self {
            db,
            assets,
            holders,
            strategies,
            roles,
            metadata,
        })
    }

    fn tree(&self, table: Table) -> &Tree {
        match table {
            Table::Assets => &self.assets,
            Table::Holders => &self.holders,
            Table::Strategies => &self.strategies,
            Table::Roles => &self.roles,
            Table::Metadata => &self.metadata,
        }
    }

    /// Applies every write in `changeset` atomically and flushes.
    pub fn commit(&self, changeset: &Changeset) -> DbResult<()> {
        if changeset.is_empty() {
            return Ok(());
        }

        let result: Result<(), TransactionError<()>> = (
            &self.assets,
            &self.holders,
            &self.strategies,
            &self.roles,
            &self.metadata,
        )
            .transaction(
                |(assets, holders, strategies, roles, metadata)| -> ConflictableTransactionResult<(), ()> {
                    for write in changeset.writes() {
                        let tree = match write.table {
                            Table::Assets => assets,
                            Table::Holders => holders,
                            Table::Strategies => strategies,
                            Table::Roles => roles,
                            Table::Metadata => metadata,
                        };
                        match &write.value {
                            Some(value) => {
                                tree.insert(write.key.as_slice(), value.as_slice())?;
                            }
                            None => {
                                tree.remove(write.key.as_slice())?;
                            }
                        }
                    }
                    Ok(())
                },
            );

        result.map_err(|e| match e {
            TransactionError::Storage(err) => DbError::Sled(err),
            TransactionError::Abort(()) => DbError::Transaction("changeset aborted".into()),
        })?;

        self.db.flush()?;
        tracing::debug!(writes = changeset.len(), "changeset committed");
        Ok(())
    }

    /// Reads and decodes a single value.
    pub fn get<T: DeserializeOwned>(&self, table: Table, key: &[u8]) -> DbResult<Option<T>> {
        match self.tree(table).get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads a value that must exist.
    pub fn require<T: DeserializeOwned>(&self, table: Table, key: &[u8]) -> DbResult<T> {
        self.get(table, key)?.ok_or_else(|| {
            DbError::NotFound(format!(
                "{}/{}",
                table.tree_name(),
                String::from_utf8_lossy(key)
            ))
        })
    }

    /// Decodes every entry of a table, in key order.
    pub fn scan<T: DeserializeOwned>(&self, table: Table) -> DbResult<Vec<(Vec<u8>, T)>> {
        let mut out = Vec::new();
        for entry in self.tree(table).iter() {
            let (key, value) = entry?;
            out.push((key.to_vec(), decode(&value)?));
        }
        Ok(out)
    }

    /// Every key of a table, in key order.
    pub fn keys(&self, table: Table) -> DbResult<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        for key in self.tree(table).iter().keys() {
            out.push(key?.to_vec());
        }
        Ok(out)
    }

    /// Returns `true` if `key` exists in `table`.
    pub fn contains(&self, table: Table, key: &[u8]) -> DbResult<bool> {
        Ok(self.tree(table).contains_key(key)?)
    }

    /// Number of entries in a table.
    pub fn len(&self, table: Table) -> usize {
        self.tree(table).len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_temporary_database() {
        let db = VaultDb::open_temporary().expect("should create temp db");
        assert_eq!(db.len(Table::Assets), 0);
        assert_eq!(db.len(Table::Holders), 0);
    }

    #[test]
    fn commit_spans_tables() {
        let db = VaultDb::open_temporary().unwrap();
        let mut cs = Changeset::new();
        cs.put(Table::Holders, b"alice", &1_000u128).unwrap();
        cs.put(Table::Metadata, b"ledger", &(1_000u128, 1_000u128)).unwrap();
        cs.put_raw(Table::Roles, &[1, 7], Vec::new());
        db.commit(&cs).unwrap();

        assert_eq!(db.get::<u128>(Table::Holders, b"alice").unwrap(), Some(1_000));
        assert_eq!(
            db.require::<(u128, u128)>(Table::Metadata, b"ledger").unwrap(),
            (1_000, 1_000)
        );
        assert!(db.contains(Table::Roles, &[1, 7]).unwrap());
    }

    #[test]
    fn delete_removes_key() {
        let db = VaultDb::open_temporary().unwrap();
        let mut cs = Changeset::new();
        cs.put(Table::Holders, b"alice", &5u128).unwrap();
        db.commit(&cs).unwrap();

        let mut cs = Changeset::new();
        cs.delete(Table::Holders, b"alice");
        db.commit(&cs).unwrap();
        assert_eq!(db.get::<u128>(Table::Holders, b"alice").unwrap(), None);
    }

    #[test]
    fn missing_required_key_is_not_found() {
        let db = VaultDb::open_temporary().unwrap();
        let err = db.require::<u128>(Table::Metadata, b"ledger").unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn diff_maps_emits_minimal_writes() {
        let before: BTreeMap<u8, u128> = [(1, 10), (2, 20), (3, 30)].into_iter().collect();
        let after: BTreeMap<u8, u128> = [(1, 10), (2, 25), (4, 40)].into_iter().collect();
        let mut cs = Changeset::new();
        cs.diff_maps(Table::Holders, &before, &after, |k| vec![*k]).unwrap();

        let keys: Vec<(Vec<u8>, bool)> = cs
            .writes()
            .iter()
            .map(|w| (w.key.clone(), w.value.is_some()))
            .collect();
        assert_eq!(
            keys,
            vec![(vec![2], true), (vec![4], true), (vec![3], false)]
        );
    }

    #[test]
    fn scan_returns_key_order() {
        let db = VaultDb::open_temporary().unwrap();
        let mut cs = Changeset::new();
        cs.put(Table::Holders, &[2], &2u128).unwrap();
        cs.put(Table::Holders, &[1], &1u128).unwrap();
        db.commit(&cs).unwrap();

        let entries: Vec<(Vec<u8>, u128)> = db.scan(Table::Holders).unwrap();
        assert_eq!(entries, vec![(vec![1], 1), (vec![2], 2)]);
        assert_eq!(db.keys(Table::Holders).unwrap(), vec![vec![1], vec![2]]);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let db = VaultDb::open(dir.path()).unwrap();
            let mut cs = Changeset::new();
            cs.put(Table::Holders, b"alice", &77u128).unwrap();
            db.commit(&cs).unwrap();
        }
        let db = VaultDb::open(dir.path()).unwrap();
        assert_eq!(db.get::<u128>(Table::Holders, b"alice").unwrap(), Some(77));
    }
}
