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

//! Explicit write sessions
//!
//! A [`SessionStore`] stages every mutation of one logical commit into a
//! RocksDB `WriteBatch` plus an in-memory overlay. Reads consult the
//! overlay first, giving read-your-writes semantics without touching the
//! database; [`SessionStore::commit`] flushes the whole batch atomically;
//! dropping the session discards it, leaving prior state untouched.
//!
//! The session is an explicit value handed to every consumer (the trie
//! through its `NodeStore` impl, the roots index, the GC) rather than
//! ambient per-thread state, so independent logical trees stay safe
//! under concurrent callers by construction.

use crate::{backend_err, missing_cf, CF_NODES};
use dottrie_core::hash::Hash;
use dottrie_core::store::{NodeStore, StoreResult};
use rocksdb::{DB, WriteBatch};
use std::collections::HashMap;

/// Batch-staging session over a shared RocksDB handle.
pub struct SessionStore<'db> {
    db: &'db DB,
    batch: WriteBatch,
    /// Overlay of staged writes: `None` marks a staged delete.
    staged: HashMap<(&'static str, Vec<u8>), Option<Vec<u8>>>,
}

impl<'db> SessionStore<'db> {
    pub fn new(db: &'db DB) -> Self {
        Self {
            db,
            batch: WriteBatch::default(),
            staged: HashMap::new(),
        }
    }

    /// Overlay-aware read from a column family.
    pub fn get_cf(&self, cf_name: &'static str, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        if let Some(staged) = self.staged.get(&(cf_name, key.to_vec())) {
            return Ok(staged.clone());
        }
        let cf = self.db.cf_handle(cf_name).ok_or_else(|| missing_cf(cf_name))?;
        self.db.get_cf(cf, key).map_err(backend_err)
    }

    /// Stages a put.
    pub fn put_cf(&mut self, cf_name: &'static str, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let cf = self.db.cf_handle(cf_name).ok_or_else(|| missing_cf(cf_name))?;
        self.batch.put_cf(cf, key, value);
        self.staged.insert((cf_name, key.to_vec()), Some(value.to_vec()));
        Ok(())
    }

    /// Stages a delete.
    pub fn delete_cf(&mut self, cf_name: &'static str, key: &[u8]) -> StoreResult<()> {
        let cf = self.db.cf_handle(cf_name).ok_or_else(|| missing_cf(cf_name))?;
        self.batch.delete_cf(cf, key);
        self.staged.insert((cf_name, key.to_vec()), None);
        Ok(())
    }

    /// Number of staged operations.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Flushes every staged write in one atomic batch.
    pub fn commit(self) -> StoreResult<()> {
        self.db.write(self.batch).map_err(backend_err)
    }
}

impl NodeStore for SessionStore<'_> {
    fn get(&self, hash: &Hash) -> StoreResult<Option<Vec<u8>>> {
        self.get_cf(CF_NODES, hash)
    }

    fn put(&mut self, hash: &Hash, bytes: &[u8]) -> StoreResult<()> {
        self.put_cf(CF_NODES, hash, bytes)
    }

    fn delete(&mut self, hash: &Hash) -> StoreResult<()> {
        self.delete_cf(CF_NODES, hash)
    }
}
