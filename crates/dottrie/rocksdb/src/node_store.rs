// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! RocksDB-backed content-addressed node store
//!
//! Nodes live in the `nodes` column family keyed by their raw hash
//! bytes. This type performs direct, individually durable writes; for
//! atomic multi-node commits, stage through a
//! [`crate::session::SessionStore`] instead and commit the session.

use crate::{backend_err, missing_cf, open_db, CF_NODES};
use dottrie_core::hash::Hash;
use dottrie_core::store::{NodeStore, StoreResult};
use rocksdb::DB;
use std::path::Path;
use std::sync::Arc;

/// Content-addressed node storage over RocksDB.
#[derive(Clone)]
pub struct RocksDbNodeStore {
    db: Arc<DB>,
}

impl RocksDbNodeStore {
    /// Opens (or creates) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self {
            db: Arc::new(open_db(path.as_ref())?),
        })
    }

    /// Shares an already-open database.
    pub fn from_db(db: Arc<DB>) -> Self {
        Self { db }
    }

    /// The shared database handle.
    pub fn db(&self) -> &Arc<DB> {
        &self.db
    }
}

impl NodeStore for RocksDbNodeStore {
    fn get(&self, hash: &Hash) -> StoreResult<Option<Vec<u8>>> {
        let cf = self.db.cf_handle(CF_NODES).ok_or_else(|| missing_cf(CF_NODES))?;
        self.db.get_cf(cf, hash).map_err(backend_err)
    }

    fn put(&mut self, hash: &Hash, bytes: &[u8]) -> StoreResult<()> {
        let cf = self.db.cf_handle(CF_NODES).ok_or_else(|| missing_cf(CF_NODES))?;
        self.db.put_cf(cf, hash, bytes).map_err(backend_err)
    }

    fn delete(&mut self, hash: &Hash) -> StoreResult<()> {
        let cf = self.db.cf_handle(CF_NODES).ok_or_else(|| missing_cf(CF_NODES))?;
        self.db.delete_cf(cf, hash).map_err(backend_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dottrie_core::hash::{Keccak256, keccak256};
    use dottrie_core::mpt::MerklePatriciaTrie;
    use tempfile::TempDir;

    #[test]
    fn test_basic_operations() {
        let dir = TempDir::new().unwrap();
        let mut store = RocksDbNodeStore::open(dir.path()).unwrap();
        let hash = keccak256(b"node");

        assert_eq!(store.get(&hash).unwrap(), None);
        store.put(&hash, b"bytes").unwrap();
        assert_eq!(store.get(&hash).unwrap(), Some(b"bytes".to_vec()));
        store.delete(&hash).unwrap();
        assert_eq!(store.get(&hash).unwrap(), None);
    }

    #[test]
    fn test_trie_over_rocksdb_store() {
        let dir = TempDir::new().unwrap();
        let store = RocksDbNodeStore::open(dir.path()).unwrap();
        let mut trie = MerklePatriciaTrie::new(store.clone(), Keccak256);

        trie.put(b"key1", b"value1").unwrap();
        trie.put(b"key2", b"value2").unwrap();
        let root = trie.root_hash();

        // Reopening the trie at the recorded root sees the same data.
        let reopened = MerklePatriciaTrie::with_root(store, Keccak256, root);
        assert_eq!(reopened.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(reopened.get(b"key2").unwrap(), Some(b"value2".to_vec()));
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let hash = keccak256(b"persistent");
        {
            let mut store = RocksDbNodeStore::open(dir.path()).unwrap();
            store.put(&hash, b"survives").unwrap();
        }
        let store = RocksDbNodeStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&hash).unwrap(), Some(b"survives".to_vec()));
    }
}
