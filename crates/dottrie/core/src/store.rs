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

//! Storage contracts shared by every trie
//!
//! [`NodeStore`] is a content-addressed byte store: nodes are written under
//! the hash of their canonical encoding and never mutated afterwards.
//! [`RootsIndex`] maps a monotonically increasing version number to the
//! root commitment recorded at that version, with a "latest" pointer.
//!
//! Both contracts deliberately distinguish "absent" (`Ok(None)`) from
//! "store unreachable" (`Err`): a missing key is a normal outcome, a
//! backend fault is not. In-memory implementations live here for tests and
//! light embedding; the persistent implementations live in the
//! `dottrie-rocksdb` crate.

use crate::hash::Hash;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Storage-fault error. Backend I/O failures are always surfaced to the
/// caller and never retried by the tries themselves.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The underlying backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The backend returned bytes that cannot be interpreted.
    #[error("corrupted storage entry: {0}")]
    Corrupt(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Content-addressed node storage.
///
/// Keys are the hash of the stored bytes, which makes entries naturally
/// deduplicated and tamper-evident: two equal nodes share one entry, and a
/// node that does not hash to its key is corrupt.
pub trait NodeStore {
    /// Fetches the bytes stored under `hash`, or `None` if absent.
    fn get(&self, hash: &Hash) -> StoreResult<Option<Vec<u8>>>;

    /// Stores `bytes` under `hash`. Re-putting an existing entry is a
    /// no-op by content-addressing.
    fn put(&mut self, hash: &Hash, bytes: &[u8]) -> StoreResult<()>;

    /// Removes the entry under `hash` if present.
    fn delete(&mut self, hash: &Hash) -> StoreResult<()>;
}

impl<S: NodeStore + ?Sized> NodeStore for &mut S {
    fn get(&self, hash: &Hash) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(hash)
    }

    fn put(&mut self, hash: &Hash, bytes: &[u8]) -> StoreResult<()> {
        (**self).put(hash, bytes)
    }

    fn delete(&mut self, hash: &Hash) -> StoreResult<()> {
        (**self).delete(hash)
    }
}

/// Version-to-root-commitment index.
///
/// Entries are immutable once written; only the latest pointer and the
/// max-version marker move.
pub trait RootsIndex {
    /// Records `root` as the commitment for `version` and updates the
    /// latest pointer.
    fn put(&mut self, version: u64, root: &Hash) -> StoreResult<()>;

    /// Root recorded at `version`, or `None`.
    fn get(&self, version: u64) -> StoreResult<Option<Hash>>;

    /// Most recently recorded root, or `None` for an empty index.
    fn latest(&self) -> StoreResult<Option<Hash>>;
}

/// In-memory node store backed by a `HashMap`, for tests and small-scale
/// usage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNodeStore {
    nodes: HashMap<Hash, Vec<u8>>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no nodes are stored.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True if an entry exists under `hash`.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Removes all stored nodes.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

impl NodeStore for InMemoryNodeStore {
    fn get(&self, hash: &Hash) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.nodes.get(hash).cloned())
    }

    fn put(&mut self, hash: &Hash, bytes: &[u8]) -> StoreResult<()> {
        self.nodes.insert(*hash, bytes.to_vec());
        Ok(())
    }

    fn delete(&mut self, hash: &Hash) -> StoreResult<()> {
        self.nodes.remove(hash);
        Ok(())
    }
}

/// In-memory roots index backed by a `BTreeMap`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRootsIndex {
    roots: BTreeMap<u64, Hash>,
}

impl InMemoryRootsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// All roots in the inclusive version range.
    pub fn list_range(&self, from: u64, to: u64) -> Vec<(u64, Hash)> {
        if from > to {
            return Vec::new();
        }
        self.roots.range(from..=to).map(|(v, h)| (*v, *h)).collect()
    }

    /// Highest version recorded so far.
    pub fn last_version(&self) -> Option<u64> {
        self.roots.keys().next_back().copied()
    }

    /// Next free version number (0 for an empty index).
    pub fn next_version(&self) -> u64 {
        self.last_version().map_or(0, |v| v + 1)
    }
}

impl RootsIndex for InMemoryRootsIndex {
    fn put(&mut self, version: u64, root: &Hash) -> StoreResult<()> {
        self.roots.insert(version, *root);
        Ok(())
    }

    fn get(&self, version: u64) -> StoreResult<Option<Hash>> {
        Ok(self.roots.get(&version).copied())
    }

    fn latest(&self) -> StoreResult<Option<Hash>> {
        Ok(self.roots.values().next_back().copied())
    }
}
