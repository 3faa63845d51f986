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

//! Garbage collection for content-addressed trie storage
//!
//! Copy-on-write tries never overwrite nodes, so storage grows until
//! something reclaims nodes no retained root can reach. Two strategies:
//!
//! - [`RefcountGc`]: when a root is recorded, every node reachable from
//!   it gets its reference count incremented inside the same atomic
//!   session; retiring a root decrements along the same traversal and
//!   physically deletes nodes whose count reaches zero. O(reachable set)
//!   work per commit buys O(1)-safe pruning later.
//! - [`MarkSweepGc`]: mark every node reachable from the retained roots,
//!   sweep the rest. Suited to single-snapshot deployments that never
//!   query history.
//!
//! A node reachable from any retained root is never deleted by either
//! strategy.

use crate::roots_index::RocksDbRootsIndex;
use crate::session::SessionStore;
use crate::{backend_err, missing_cf, CF_NODES, CF_REFS};
use byteorder::{BigEndian, ByteOrder};
use dottrie_core::hash::Hash;
use dottrie_core::mpt::MptNode;
use dottrie_core::store::StoreError;
use rocksdb::{DB, IteratorMode, WriteBatch};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised by garbage collection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GcError {
    /// A node referenced by a retained root is missing or undecodable.
    #[error("corrupted node graph: {0}")]
    Corrupt(String),

    /// Underlying storage fault.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which roots survive a collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Never retire anything.
    KeepAll,
    /// Keep only the most recent `n` roots.
    KeepLast(usize),
}

/// Outcome of a collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub roots_retired: usize,
    pub nodes_deleted: usize,
}

/// Root hash sentinel recorded for an empty trie; carries no nodes.
pub const EMPTY_ROOT: Hash = [0u8; 32];

/// Reference-counting garbage collector over the `nodes`/`refs` column
/// families.
#[derive(Clone)]
pub struct RefcountGc {
    db: Arc<DB>,
}

impl RefcountGc {
    pub fn new(db: Arc<DB>) -> Self {
        Self { db }
    }

    /// Opens (or creates) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GcError> {
        Ok(Self {
            db: Arc::new(crate::open_db(path.as_ref())?),
        })
    }

    /// Increments the reference count of every node reachable from
    /// `root`, staging the updates into `session` so they land in the
    /// same atomic batch as the commit recording the root.
    pub fn index_root(&self, session: &mut SessionStore<'_>, root: &Hash) -> Result<usize, GcError> {
        if *root == EMPTY_ROOT {
            return Ok(0);
        }
        let mut visited = HashSet::new();
        let mut stack = vec![*root];
        while let Some(hash) = stack.pop() {
            if !visited.insert(hash) {
                continue;
            }
            let count = read_count(session, &hash)?;
            write_count(session, &hash, count + 1)?;
            stack.extend(self.children_of(session, &hash)?);
        }
        debug!(root = %hex::encode(root), nodes = visited.len(), "indexed root for refcount gc");
        Ok(visited.len())
    }

    /// Decrements the reference count along `root`'s reachable set and
    /// stages deletion of every node whose count reaches zero. Returns
    /// the number of nodes deleted.
    pub fn retire_root(&self, session: &mut SessionStore<'_>, root: &Hash) -> Result<usize, GcError> {
        if *root == EMPTY_ROOT {
            return Ok(0);
        }
        let mut visited = HashSet::new();
        let mut deleted = 0usize;
        let mut stack = vec![*root];
        while let Some(hash) = stack.pop() {
            if !visited.insert(hash) {
                continue;
            }
            // Children must be collected before the node is deleted.
            let children = self.children_of(session, &hash)?;
            let count = read_count(session, &hash)?;
            if count <= 1 {
                session.delete_cf(CF_REFS, &hash)?;
                session.delete_cf(CF_NODES, &hash)?;
                deleted += 1;
            } else {
                write_count(session, &hash, count - 1)?;
            }
            stack.extend(children);
        }
        debug!(root = %hex::encode(root), deleted, "retired root");
        Ok(deleted)
    }

    /// Retires every root outside the retention policy, removing the
    /// retired root entries alongside the reclaimed nodes in one atomic
    /// batch.
    pub fn collect(&self, roots: &RocksDbRootsIndex, policy: RetentionPolicy) -> Result<GcReport, GcError> {
        let RetentionPolicy::KeepLast(keep) = policy else {
            return Ok(GcReport::default());
        };

        let Some(last) = roots.last_version()? else {
            return Ok(GcReport::default());
        };
        let all = roots.list_range(0, last)?;
        if all.len() <= keep {
            return Ok(GcReport::default());
        }

        let retire_count = all.len() - keep;
        let mut session = SessionStore::new(&self.db);
        let mut report = GcReport::default();
        for (version, root) in &all[..retire_count] {
            report.nodes_deleted += self.retire_root(&mut session, root)?;
            roots.delete_in_session(&mut session, *version)?;
            report.roots_retired += 1;
        }
        session.commit()?;
        debug!(roots = report.roots_retired, nodes = report.nodes_deleted, "refcount gc pass complete");
        Ok(report)
    }

    /// Current reference count of a node.
    pub fn ref_count(&self, hash: &Hash) -> Result<u64, GcError> {
        let cf = self.db.cf_handle(CF_REFS).ok_or_else(|| missing_cf(CF_REFS))?;
        match self.db.get_cf(cf, hash).map_err(backend_err)? {
            Some(bytes) if bytes.len() == 8 => Ok(BigEndian::read_u64(&bytes)),
            Some(bytes) => Err(GcError::Corrupt(format!("refcount entry has {} bytes, expected 8", bytes.len()))),
            None => Ok(0),
        }
    }

    fn children_of(&self, session: &SessionStore<'_>, hash: &Hash) -> Result<Vec<Hash>, GcError> {
        let bytes = session.get_cf(CF_NODES, hash)?.ok_or_else(|| GcError::Corrupt(format!("reachable node {} missing", hex::encode(hash))))?;
        child_hashes(&bytes)
    }
}

/// Mark-sweep garbage collector: keeps exactly the nodes reachable from
/// the supplied retained roots.
#[derive(Clone)]
pub struct MarkSweepGc {
    db: Arc<DB>,
}

impl MarkSweepGc {
    pub fn new(db: Arc<DB>) -> Self {
        Self { db }
    }

    /// Deletes every node not reachable from `retained_roots`.
    pub fn sweep(&self, retained_roots: &[Hash]) -> Result<GcReport, GcError> {
        let session = SessionStore::new(&self.db);
        let mut marked = HashSet::new();
        for root in retained_roots {
            if *root == EMPTY_ROOT {
                continue;
            }
            let mut stack = vec![*root];
            while let Some(hash) = stack.pop() {
                if !marked.insert(hash) {
                    continue;
                }
                let bytes = session.get_cf(CF_NODES, &hash)?.ok_or_else(|| GcError::Corrupt(format!("retained node {} missing", hex::encode(hash))))?;
                stack.extend(child_hashes(&bytes)?);
            }
        }

        let cf = self.db.cf_handle(CF_NODES).ok_or_else(|| missing_cf(CF_NODES))?;
        let mut batch = WriteBatch::default();
        let mut deleted = 0usize;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item.map_err(backend_err)?;
            let hash: Hash = key.as_ref().try_into().map_err(|_| GcError::Corrupt(format!("node key has {} bytes, expected 32", key.len())))?;
            if !marked.contains(&hash) {
                batch.delete_cf(cf, &key);
                deleted += 1;
            }
        }
        if deleted > 0 {
            self.db.write(batch).map_err(backend_err)?;
        }
        debug!(marked = marked.len(), deleted, "mark-sweep pass complete");
        Ok(GcReport {
            roots_retired: 0,
            nodes_deleted: deleted,
        })
    }
}

fn read_count(session: &SessionStore<'_>, hash: &Hash) -> Result<u64, GcError> {
    match session.get_cf(CF_REFS, hash)? {
        Some(bytes) if bytes.len() == 8 => Ok(BigEndian::read_u64(&bytes)),
        Some(bytes) => Err(GcError::Corrupt(format!("refcount entry has {} bytes, expected 8", bytes.len()))),
        None => Ok(0),
    }
}

fn write_count(session: &mut SessionStore<'_>, hash: &Hash, count: u64) -> Result<(), GcError> {
    let mut bytes = [0u8; 8];
    BigEndian::write_u64(&mut bytes, count);
    session.put_cf(CF_REFS, hash, &bytes)?;
    Ok(())
}

/// Child hashes referenced by an encoded MPT node.
fn child_hashes(bytes: &[u8]) -> Result<Vec<Hash>, GcError> {
    let node = MptNode::decode(bytes).map_err(|e| GcError::Corrupt(e.to_string()))?;
    Ok(match node {
        MptNode::Leaf { .. } => Vec::new(),
        MptNode::Extension { child, .. } => vec![child],
        MptNode::Branch { children, .. } => children.iter().flatten().copied().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_db;
    use dottrie_core::hash::Keccak256;
    use dottrie_core::mpt::MerklePatriciaTrie;
    use dottrie_core::store::{NodeStore, RootsIndex};
    use tempfile::TempDir;

    /// Builds a trie inside a session and returns its root, leaving the
    /// session staged (not committed).
    fn stage_trie<'db>(session: SessionStore<'db>, pairs: &[(&[u8], &[u8])]) -> (SessionStore<'db>, Hash) {
        let mut trie = MerklePatriciaTrie::new(session, Keccak256);
        for (k, v) in pairs {
            trie.put(k, v).unwrap();
        }
        let root = trie.root_hash().unwrap();
        (trie.into_storage(), root)
    }

    #[test]
    fn test_index_then_retire_reclaims_everything() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(open_db(dir.path()).unwrap());
        let gc = RefcountGc::new(db.clone());

        let (mut session, root) = stage_trie(SessionStore::new(&db), &[(b"key1", b"v1"), (b"key2", b"v2")]);
        let indexed = gc.index_root(&mut session, &root).unwrap();
        assert!(indexed > 0);
        session.commit().unwrap();
        assert!(gc.ref_count(&root).unwrap() >= 1);

        let mut session = SessionStore::new(&db);
        let deleted = gc.retire_root(&mut session, &root).unwrap();
        session.commit().unwrap();
        assert_eq!(deleted, indexed);
        assert_eq!(gc.ref_count(&root).unwrap(), 0);

        let cf = db.cf_handle(CF_NODES).unwrap();
        assert_eq!(db.get_cf(cf, root).unwrap(), None);
    }

    #[test]
    fn test_shared_nodes_survive_one_retirement() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(open_db(dir.path()).unwrap());
        let gc = RefcountGc::new(db.clone());

        // Two roots sharing most of their structure: the second adds one
        // key on top of the first.
        let (mut session, root_a) = stage_trie(SessionStore::new(&db), &[(b"shared-1", b"v"), (b"shared-2", b"v")]);
        gc.index_root(&mut session, &root_a).unwrap();
        session.commit().unwrap();

        let session = SessionStore::new(&db);
        let mut trie = MerklePatriciaTrie::with_root(session, Keccak256, Some(root_a));
        trie.put(b"extra", b"v").unwrap();
        let root_b = trie.root_hash().unwrap();
        let mut session = trie.into_storage();
        gc.index_root(&mut session, &root_b).unwrap();
        session.commit().unwrap();

        // Retire the first root: everything still reachable from the
        // second root must survive.
        let mut session = SessionStore::new(&db);
        gc.retire_root(&mut session, &root_a).unwrap();
        session.commit().unwrap();

        let trie_b = MerklePatriciaTrie::with_root(crate::node_store::RocksDbNodeStore::from_db(db.clone()), Keccak256, Some(root_b));
        assert_eq!(trie_b.get(b"shared-1").unwrap(), Some(b"v".to_vec()));
        assert_eq!(trie_b.get(b"shared-2").unwrap(), Some(b"v".to_vec()));
        assert_eq!(trie_b.get(b"extra").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_collect_honors_retention_policy() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(open_db(dir.path()).unwrap());
        let gc = RefcountGc::new(db.clone());
        let mut roots_index = RocksDbRootsIndex::from_db(db.clone(), crate::namespace::NamespaceOptions::defaults());

        let mut latest_root = None;
        for i in 0u64..5 {
            let session = SessionStore::new(&db);
            let mut trie = MerklePatriciaTrie::with_root(session, Keccak256, latest_root);
            trie.put(format!("key-{i}").as_bytes(), b"value").unwrap();
            let root = trie.root_hash().unwrap();
            let mut session = trie.into_storage();
            gc.index_root(&mut session, &root).unwrap();
            session.commit().unwrap();
            roots_index.put(i, &root).unwrap();
            latest_root = Some(root);
        }

        let report = gc.collect(&roots_index, RetentionPolicy::KeepLast(2)).unwrap();
        assert_eq!(report.roots_retired, 3);
        assert!(report.nodes_deleted > 0);

        // Retired root entries are gone, retained ones remain.
        assert_eq!(roots_index.get(0).unwrap(), None);
        assert_eq!(roots_index.get(2).unwrap(), None);
        assert!(roots_index.get(3).unwrap().is_some());

        // The latest retained root is fully readable.
        let trie = MerklePatriciaTrie::with_root(crate::node_store::RocksDbNodeStore::from_db(db.clone()), Keccak256, latest_root);
        for i in 0u64..5 {
            assert_eq!(trie.get(format!("key-{i}").as_bytes()).unwrap(), Some(b"value".to_vec()));
        }

        // KeepAll never retires.
        let report = gc.collect(&roots_index, RetentionPolicy::KeepAll).unwrap();
        assert_eq!(report, GcReport::default());
    }

    #[test]
    fn test_mark_sweep_keeps_only_reachable() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(open_db(dir.path()).unwrap());

        let (session, root_a) = stage_trie(SessionStore::new(&db), &[(b"keep-1", b"v"), (b"keep-2", b"v")]);
        session.commit().unwrap();
        let (session, _root_b) = stage_trie(SessionStore::new(&db), &[(b"drop-1", b"v"), (b"drop-2", b"v")]);
        session.commit().unwrap();

        let gc = MarkSweepGc::new(db.clone());
        let report = gc.sweep(&[root_a]).unwrap();
        assert!(report.nodes_deleted > 0);

        let store = crate::node_store::RocksDbNodeStore::from_db(db.clone());
        let kept = MerklePatriciaTrie::with_root(store.clone(), Keccak256, Some(root_a));
        assert_eq!(kept.get(b"keep-1").unwrap(), Some(b"v".to_vec()));
        assert_eq!(kept.get(b"keep-2").unwrap(), Some(b"v".to_vec()));

        // Sweeping again deletes nothing further.
        assert_eq!(gc.sweep(&[root_a]).unwrap().nodes_deleted, 0);
        let _ = store.get(&root_a).unwrap();
    }
}
