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

//! Facade tying trie, roots index, and GC into atomic commits
//!
//! `RocksDbStateTrees` owns the database and runs one logical commit
//! (trie mutations, the root write, and refcount bookkeeping) inside a
//! single write batch. Node writes therefore become durable exactly
//! together with the root that references them; a failed or abandoned
//! commit leaves prior state untouched.
//!
//! Version numbers are allocated monotonically from the roots index. An
//! empty trie is recorded under the all-zero sentinel root.

use crate::gc::{EMPTY_ROOT, GcError, GcReport, MarkSweepGc, RefcountGc, RetentionPolicy};
use crate::namespace::NamespaceOptions;
use crate::node_store::RocksDbNodeStore;
use crate::roots_index::RocksDbRootsIndex;
use crate::session::SessionStore;
use crate::open_db;
use dottrie_core::hash::{Hash, Keccak256};
use dottrie_core::mpt::{MerklePatriciaTrie, MptError, MptResult, SecureTrie};
use dottrie_core::store::{RootsIndex, StoreError};
use rocksdb::DB;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised by the state-trees facade.
#[derive(Debug, Error)]
pub enum StateTreesError {
    #[error(transparent)]
    Trie(#[from] MptError),

    #[error(transparent)]
    Gc(#[from] GcError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Version and root produced by a committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    pub version: u64,
    /// `None` when the trie ended the commit empty.
    pub root: Option<Hash>,
}

/// RocksDB-backed state trees with atomic commit and refcount GC.
pub struct RocksDbStateTrees {
    db: Arc<DB>,
    roots: RocksDbRootsIndex,
    refcount_gc: bool,
}

impl RocksDbStateTrees {
    /// Opens (or creates) a database at `path` with the default
    /// namespace and refcount GC enabled.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateTreesError> {
        Self::open_with(path, NamespaceOptions::defaults(), true)
    }

    /// Opens with an explicit namespace and GC choice. Disable refcount
    /// bookkeeping for single-snapshot deployments relying on mark-sweep.
    pub fn open_with(path: impl AsRef<Path>, namespace: NamespaceOptions, refcount_gc: bool) -> Result<Self, StateTreesError> {
        Ok(Self::from_db(Arc::new(open_db(path.as_ref())?), namespace, refcount_gc))
    }

    /// Builds a facade over a shared database handle, allowing several
    /// namespaced logical trees in one physical store.
    pub fn from_db(db: Arc<DB>, namespace: NamespaceOptions, refcount_gc: bool) -> Self {
        let roots = RocksDbRootsIndex::from_db(db.clone(), namespace);
        Self { db, roots, refcount_gc }
    }

    /// The shared database handle.
    pub fn db(&self) -> &Arc<DB> {
        &self.db
    }

    /// Content-addressed node store sharing this database.
    pub fn node_store(&self) -> RocksDbNodeStore {
        RocksDbNodeStore::from_db(self.db.clone())
    }

    /// Roots index sharing this database and namespace.
    pub fn roots_index(&self) -> RocksDbRootsIndex {
        self.roots.clone()
    }

    /// Refcount collector over this database.
    pub fn refcount_gc(&self) -> RefcountGc {
        RefcountGc::new(self.db.clone())
    }

    /// Mark-sweep collector over this database.
    pub fn mark_sweep_gc(&self) -> MarkSweepGc {
        MarkSweepGc::new(self.db.clone())
    }

    /// Opens a raw write session for callers composing their own batches.
    pub fn begin_session(&self) -> SessionStore<'_> {
        SessionStore::new(&self.db)
    }

    /// Latest committed root; the empty-trie sentinel reads as `None`.
    pub fn latest_root(&self) -> Result<Option<Hash>, StateTreesError> {
        Ok(self.roots.latest()?.filter(|root| *root != EMPTY_ROOT))
    }

    /// Root recorded at `version`; the empty-trie sentinel reads as
    /// `None`; an unrecorded version is also `None`, use
    /// [`RocksDbRootsIndex::get`] to distinguish.
    pub fn root_at(&self, version: u64) -> Result<Option<Hash>, StateTreesError> {
        Ok(self.roots.get(version)?.filter(|root| *root != EMPTY_ROOT))
    }

    /// Runs `ops` against a trie opened at the latest root and commits
    /// the result as the next version: all node writes, the root entry,
    /// and (when enabled) refcount increments land in one write batch.
    pub fn commit<'s, T>(&'s self, ops: impl FnOnce(&mut MerklePatriciaTrie<SessionStore<'s>, Keccak256>) -> MptResult<T>) -> Result<(CommitOutcome, T), StateTreesError> {
        let version = self.roots.last_version()?.map_or(0, |v| v + 1);
        let base_root = self.latest_root()?;

        let session = SessionStore::new(&self.db);
        let mut trie = MerklePatriciaTrie::with_root(session, Keccak256, base_root);
        let out = ops(&mut trie)?;
        let root = trie.root_hash();
        let mut session = trie.into_storage();

        self.finish_commit(&mut session, version, root)?;
        session.commit()?;
        Ok((CommitOutcome { version, root }, out))
    }

    /// Like [`Self::commit`] but with key hashing applied by a
    /// [`SecureTrie`].
    pub fn commit_secure<'s, T>(&'s self, ops: impl FnOnce(&mut SecureTrie<SessionStore<'s>, Keccak256>) -> MptResult<T>) -> Result<(CommitOutcome, T), StateTreesError> {
        let version = self.roots.last_version()?.map_or(0, |v| v + 1);
        let base_root = self.latest_root()?;

        let session = SessionStore::new(&self.db);
        let mut trie = SecureTrie::with_root(session, Keccak256, base_root);
        let out = ops(&mut trie)?;
        let root = trie.root_hash();
        let mut session = trie.into_inner().into_storage();

        self.finish_commit(&mut session, version, root)?;
        session.commit()?;
        Ok((CommitOutcome { version, root }, out))
    }

    /// Retires roots outside the retention policy through the refcount
    /// strategy.
    pub fn collect_garbage(&self, policy: RetentionPolicy) -> Result<GcReport, StateTreesError> {
        Ok(self.refcount_gc().collect(&self.roots, policy)?)
    }

    fn finish_commit(&self, session: &mut SessionStore<'_>, version: u64, root: Option<Hash>) -> Result<(), StateTreesError> {
        let stored_root = root.unwrap_or(EMPTY_ROOT);
        if self.refcount_gc {
            self.refcount_gc().index_root(session, &stored_root)?;
        }
        self.roots.put_in_session(session, version, &stored_root)?;
        debug!(version, root = %hex::encode(stored_root), staged = session.staged_len(), "committing state trees batch");
        Ok(())
    }
}
