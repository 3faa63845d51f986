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

//! Storage contract for the Jellyfish Merkle Tree
//!
//! A [`JmtStore`] persists version-stamped nodes, versioned values with
//! tombstones, per-version roots, and the stale-node index. All writes of
//! one logical commit flow through a [`CommitBatch`] obtained from
//! [`JmtStore::begin_commit`] and land atomically on
//! [`CommitBatch::commit`]: node writes are never visible without the
//! root write that references them.
//!
//! The in-memory implementation here mirrors the behavior expected from
//! persistent stores (floor lookups, stale filtering, value history) and
//! backs tests; the RocksDB implementation lives in `dottrie-rocksdb`.

use crate::hash::Hash;
use crate::jmt::tree_cache::NodeEntry;
use crate::jmt::types::{JmtNode, NodeKey};
use crate::jmt::JmtResult;
use crate::nibbles::NibblePath;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// A root hash tagged with the version it was committed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionedRoot {
    pub version: u64,
    pub root_hash: Hash,
}

/// Outcome of a prune pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneReport {
    /// Stale markers up to and including this version were consumed.
    pub version_inclusive: u64,
    /// Number of physically deleted nodes.
    pub nodes_pruned: usize,
}

/// Versioned node/value/root storage for a Jellyfish Merkle Tree.
pub trait JmtStore {
    /// Most recently committed root, or `None` for an empty store.
    fn latest_root(&self) -> JmtResult<Option<VersionedRoot>>;

    /// Root committed exactly at `version`.
    fn root_hash(&self, version: u64) -> JmtResult<Option<Hash>>;

    /// Newest node at `path` created at or before `version` and not
    /// superseded at that version.
    fn get_node(&self, version: u64, path: &NibblePath) -> JmtResult<Option<NodeEntry>>;

    /// Node stored under an exact key.
    fn get_node_by_key(&self, node_key: &NodeKey) -> JmtResult<Option<JmtNode>>;

    /// Greatest live node with `(path, version)` at or below the given
    /// pair, regardless of path equality.
    fn floor_node(&self, version: u64, path: &NibblePath) -> JmtResult<Option<NodeEntry>>;

    /// Current value for a hashed key.
    fn get_value(&self, key_hash: &Hash) -> JmtResult<Option<Vec<u8>>>;

    /// Value for a hashed key as of `version` (floor semantics;
    /// tombstones hide deleted entries).
    fn get_value_at(&self, key_hash: &Hash, version: u64) -> JmtResult<Option<Vec<u8>>>;

    /// Opens an atomic commit batch for `version`.
    fn begin_commit(&self, version: u64) -> JmtResult<Box<dyn CommitBatch + '_>>;

    /// Node keys marked stale at or before `version`.
    fn stale_nodes_up_to(&self, version: u64) -> JmtResult<Vec<NodeKey>>;

    /// Physically deletes nodes whose stale markers are at or before
    /// `version`, consuming those markers. Returns the deletion count.
    fn prune_up_to(&self, version: u64) -> JmtResult<usize>;

    /// Drops all state newer than `version`, restoring it as the latest.
    fn truncate_after(&self, version: u64) -> JmtResult<()>;
}

/// Staging handle for one atomic commit.
///
/// Dropping a batch without calling [`CommitBatch::commit`] discards all
/// staged writes; prior state is left untouched.
pub trait CommitBatch {
    fn put_node(&mut self, node_key: &NodeKey, node: &JmtNode) -> JmtResult<()>;
    fn mark_stale(&mut self, node_key: &NodeKey) -> JmtResult<()>;
    fn put_value(&mut self, key_hash: &Hash, value: &[u8]) -> JmtResult<()>;
    fn delete_value(&mut self, key_hash: &Hash) -> JmtResult<()>;
    fn set_root_hash(&mut self, root_hash: &Hash) -> JmtResult<()>;
    /// Applies every staged write atomically.
    fn commit(self: Box<Self>) -> JmtResult<()>;
}

#[derive(Debug, Default)]
struct InMemoryInner {
    nodes: BTreeMap<NodeKey, JmtNode>,
    values: HashMap<Hash, Vec<u8>>,
    /// Per-key value history; `None` entries are delete tombstones.
    value_history: HashMap<Hash, BTreeMap<u64, Option<Vec<u8>>>>,
    roots: BTreeMap<u64, Hash>,
    stale_by_version: BTreeMap<u64, Vec<NodeKey>>,
}

impl InMemoryInner {
    fn is_stale(&self, key: &NodeKey, version: u64) -> bool {
        self.stale_by_version.range(..=version).any(|(_, keys)| keys.contains(key))
    }
}

/// Heap-backed [`JmtStore`] for tests and benchmarks.
#[derive(Debug, Default)]
pub struct InMemoryJmtStore {
    inner: Mutex<InMemoryInner>,
}

impl InMemoryJmtStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes, live and stale.
    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }
}

impl JmtStore for InMemoryJmtStore {
    fn latest_root(&self) -> JmtResult<Option<VersionedRoot>> {
        let inner = self.inner.lock();
        Ok(inner.roots.iter().next_back().map(|(version, root_hash)| VersionedRoot {
            version: *version,
            root_hash: *root_hash,
        }))
    }

    fn root_hash(&self, version: u64) -> JmtResult<Option<Hash>> {
        Ok(self.inner.lock().roots.get(&version).copied())
    }

    fn get_node(&self, version: u64, path: &NibblePath) -> JmtResult<Option<NodeEntry>> {
        let inner = self.inner.lock();
        let search = NodeKey::new(path.clone(), version);
        let Some((key, node)) = inner.nodes.range(..=search).next_back() else {
            return Ok(None);
        };
        if key.path() != path || inner.is_stale(key, version) {
            return Ok(None);
        }
        Ok(Some(NodeEntry::new(key.clone(), node.clone())))
    }

    fn get_node_by_key(&self, node_key: &NodeKey) -> JmtResult<Option<JmtNode>> {
        Ok(self.inner.lock().nodes.get(node_key).cloned())
    }

    fn floor_node(&self, version: u64, path: &NibblePath) -> JmtResult<Option<NodeEntry>> {
        let inner = self.inner.lock();
        let search = NodeKey::new(path.clone(), version);
        for (key, node) in inner.nodes.range(..=search).rev() {
            if key.version() <= version && !inner.is_stale(key, version) {
                return Ok(Some(NodeEntry::new(key.clone(), node.clone())));
            }
        }
        Ok(None)
    }

    fn get_value(&self, key_hash: &Hash) -> JmtResult<Option<Vec<u8>>> {
        Ok(self.inner.lock().values.get(key_hash).cloned())
    }

    fn get_value_at(&self, key_hash: &Hash, version: u64) -> JmtResult<Option<Vec<u8>>> {
        let inner = self.inner.lock();
        let Some(history) = inner.value_history.get(key_hash) else {
            return Ok(None);
        };
        Ok(history.range(..=version).next_back().and_then(|(_, value)| value.clone()))
    }

    fn begin_commit(&self, version: u64) -> JmtResult<Box<dyn CommitBatch + '_>> {
        Ok(Box::new(InMemoryCommitBatch {
            store: self,
            version,
            node_updates: Vec::new(),
            value_updates: Vec::new(),
            value_deletes: Vec::new(),
            stale_nodes: Vec::new(),
            root_hash: None,
        }))
    }

    fn stale_nodes_up_to(&self, version: u64) -> JmtResult<Vec<NodeKey>> {
        let inner = self.inner.lock();
        Ok(inner.stale_by_version.range(..=version).flat_map(|(_, keys)| keys.iter().cloned()).collect())
    }

    fn prune_up_to(&self, version: u64) -> JmtResult<usize> {
        let mut inner = self.inner.lock();
        let versions: Vec<u64> = inner.stale_by_version.range(..=version).map(|(v, _)| *v).collect();
        let mut pruned = 0;
        for v in versions {
            if let Some(keys) = inner.stale_by_version.remove(&v) {
                for key in keys {
                    if inner.nodes.remove(&key).is_some() {
                        pruned += 1;
                    }
                }
            }
        }
        Ok(pruned)
    }

    fn truncate_after(&self, version: u64) -> JmtResult<()> {
        let mut inner = self.inner.lock();
        inner.nodes.retain(|key, _| key.version() <= version);

        for history in inner.value_history.values_mut() {
            history.retain(|v, _| *v <= version);
        }
        inner.value_history.retain(|_, history| !history.is_empty());

        let latest_values: HashMap<Hash, Vec<u8>> = inner
            .value_history
            .iter()
            .filter_map(|(key, history)| history.range(..=version).next_back().and_then(|(_, value)| value.clone()).map(|value| (*key, value)))
            .collect();
        inner.values = latest_values;

        inner.roots.retain(|v, _| *v <= version);
        inner.stale_by_version.retain(|v, _| *v <= version);
        Ok(())
    }
}

struct InMemoryCommitBatch<'a> {
    store: &'a InMemoryJmtStore,
    version: u64,
    node_updates: Vec<(NodeKey, JmtNode)>,
    value_updates: Vec<(Hash, Vec<u8>)>,
    value_deletes: Vec<Hash>,
    stale_nodes: Vec<NodeKey>,
    root_hash: Option<Hash>,
}

impl CommitBatch for InMemoryCommitBatch<'_> {
    fn put_node(&mut self, node_key: &NodeKey, node: &JmtNode) -> JmtResult<()> {
        self.node_updates.push((node_key.clone(), node.clone()));
        Ok(())
    }

    fn mark_stale(&mut self, node_key: &NodeKey) -> JmtResult<()> {
        self.stale_nodes.push(node_key.clone());
        Ok(())
    }

    fn put_value(&mut self, key_hash: &Hash, value: &[u8]) -> JmtResult<()> {
        self.value_updates.push((*key_hash, value.to_vec()));
        Ok(())
    }

    fn delete_value(&mut self, key_hash: &Hash) -> JmtResult<()> {
        self.value_deletes.push(*key_hash);
        Ok(())
    }

    fn set_root_hash(&mut self, root_hash: &Hash) -> JmtResult<()> {
        self.root_hash = Some(*root_hash);
        Ok(())
    }

    fn commit(self: Box<Self>) -> JmtResult<()> {
        let mut inner = self.store.inner.lock();
        for (key, node) in self.node_updates {
            inner.nodes.insert(key, node);
        }
        for (key_hash, value) in self.value_updates {
            inner.values.insert(key_hash, value.clone());
            inner.value_history.entry(key_hash).or_default().insert(self.version, Some(value));
        }
        for key_hash in self.value_deletes {
            inner.values.remove(&key_hash);
            inner.value_history.entry(key_hash).or_default().insert(self.version, None);
        }
        if !self.stale_nodes.is_empty() {
            inner.stale_by_version.entry(self.version).or_default().extend(self.stale_nodes);
        }
        if let Some(root) = self.root_hash {
            inner.roots.insert(self.version, root);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::keccak256;

    fn leaf(n: u8) -> JmtNode {
        JmtNode::leaf(keccak256(&[n]), keccak256(&[n, n]))
    }

    fn commit_leaf_at(store: &InMemoryJmtStore, version: u64, node: &JmtNode) {
        let mut batch = store.begin_commit(version).unwrap();
        batch.put_node(&NodeKey::root(version), node).unwrap();
        batch.set_root_hash(&keccak256(&version.to_be_bytes())).unwrap();
        batch.commit().unwrap();
    }

    #[test]
    fn test_latest_root_tracks_highest_version() {
        let store = InMemoryJmtStore::new();
        assert_eq!(store.latest_root().unwrap(), None);

        commit_leaf_at(&store, 0, &leaf(0));
        commit_leaf_at(&store, 3, &leaf(3));

        let latest = store.latest_root().unwrap().unwrap();
        assert_eq!(latest.version, 3);
        assert_eq!(store.root_hash(0).unwrap(), Some(keccak256(&0u64.to_be_bytes())));
        assert_eq!(store.root_hash(1).unwrap(), None);
    }

    #[test]
    fn test_get_node_floor_semantics() {
        let store = InMemoryJmtStore::new();
        commit_leaf_at(&store, 0, &leaf(0));
        commit_leaf_at(&store, 5, &leaf(5));

        // A query between the two versions resolves to the older node.
        let entry = store.get_node(3, &NibblePath::empty()).unwrap().unwrap();
        assert_eq!(entry.node_key.version(), 0);
        let entry = store.get_node(5, &NibblePath::empty()).unwrap().unwrap();
        assert_eq!(entry.node_key.version(), 5);
    }

    #[test]
    fn test_stale_nodes_are_filtered() {
        let store = InMemoryJmtStore::new();
        commit_leaf_at(&store, 0, &leaf(0));

        // Version 1 replaces the root and marks the old one stale.
        let mut batch = store.begin_commit(1).unwrap();
        batch.put_node(&NodeKey::root(1), &leaf(1)).unwrap();
        batch.mark_stale(&NodeKey::root(0)).unwrap();
        batch.set_root_hash(&keccak256(b"r1")).unwrap();
        batch.commit().unwrap();

        // At version 0 the old node is still visible; at 1 the new wins.
        assert_eq!(store.get_node(0, &NibblePath::empty()).unwrap().unwrap().node_key.version(), 0);
        assert_eq!(store.get_node(1, &NibblePath::empty()).unwrap().unwrap().node_key.version(), 1);
    }

    #[test]
    fn test_value_history_with_tombstones() {
        let store = InMemoryJmtStore::new();
        let key_hash = keccak256(b"key");

        let mut batch = store.begin_commit(1).unwrap();
        batch.put_value(&key_hash, b"v1").unwrap();
        batch.commit().unwrap();

        let mut batch = store.begin_commit(3).unwrap();
        batch.delete_value(&key_hash).unwrap();
        batch.commit().unwrap();

        assert_eq!(store.get_value_at(&key_hash, 0).unwrap(), None);
        assert_eq!(store.get_value_at(&key_hash, 1).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get_value_at(&key_hash, 2).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get_value_at(&key_hash, 3).unwrap(), None);
        assert_eq!(store.get_value(&key_hash).unwrap(), None);
    }

    #[test]
    fn test_uncommitted_batch_is_invisible() {
        let store = InMemoryJmtStore::new();
        {
            let mut batch = store.begin_commit(0).unwrap();
            batch.put_node(&NodeKey::root(0), &leaf(0)).unwrap();
            batch.set_root_hash(&keccak256(b"r0")).unwrap();
            // Dropped without commit.
        }
        assert_eq!(store.latest_root().unwrap(), None);
        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn test_prune_consumes_stale_markers() {
        let store = InMemoryJmtStore::new();
        commit_leaf_at(&store, 0, &leaf(0));

        let mut batch = store.begin_commit(1).unwrap();
        batch.put_node(&NodeKey::root(1), &leaf(1)).unwrap();
        batch.mark_stale(&NodeKey::root(0)).unwrap();
        batch.set_root_hash(&keccak256(b"r1")).unwrap();
        batch.commit().unwrap();

        assert_eq!(store.stale_nodes_up_to(1).unwrap().len(), 1);
        assert_eq!(store.prune_up_to(1).unwrap(), 1);
        assert_eq!(store.stale_nodes_up_to(1).unwrap().len(), 0);
        assert_eq!(store.node_count(), 1);
        // Pruning again is a no-op.
        assert_eq!(store.prune_up_to(1).unwrap(), 0);
    }

    #[test]
    fn test_truncate_after_restores_earlier_version() {
        let store = InMemoryJmtStore::new();
        let key_hash = keccak256(b"key");

        commit_leaf_at(&store, 0, &leaf(0));
        let mut batch = store.begin_commit(1).unwrap();
        batch.put_node(&NodeKey::root(1), &leaf(1)).unwrap();
        batch.put_value(&key_hash, b"v1").unwrap();
        batch.set_root_hash(&keccak256(b"r1")).unwrap();
        batch.commit().unwrap();

        store.truncate_after(0).unwrap();
        assert_eq!(store.latest_root().unwrap().unwrap().version, 0);
        assert_eq!(store.get_value(&key_hash).unwrap(), None);
        assert_eq!(store.get_node(1, &NibblePath::empty()).unwrap().unwrap().node_key.version(), 0);
    }
}
