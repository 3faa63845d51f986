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

//! Batch-local staging cache for Jellyfish Merkle Tree updates
//!
//! `TreeCache` manages the in-memory state for one or more tree update
//! transactions before a single physical write:
//!
//! 1. **Staged** nodes belong to the current, uncommitted transaction.
//! 2. **Frozen** layers hold earlier transactions of the same batch,
//!    immutable once frozen.
//! 3. **Storage** is the committed fallback, consulted at the cache's
//!    base version.
//!
//! Lookups walk those tiers strictly in order, so a transaction reads its
//! own writes and the writes of earlier frozen transactions before ever
//! touching storage. [`TreeCache::freeze`] snapshots per-transaction
//! statistics and advances the version; [`TreeCache::to_batch`] flattens
//! everything frozen into one [`TreeUpdateBatch`] for atomic persistence.
//!
//! Staging the same node key twice, or marking the same key stale twice,
//! is a contract violation and fails fast.

use crate::hash::Hash;
use crate::jmt::store::JmtStore;
use crate::jmt::types::{JmtNode, NodeKey, StaleNodeIndex};
use crate::jmt::{JmtError, JmtResult};
use crate::nibbles::NibblePath;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// A staged or stored node together with its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    pub node_key: NodeKey,
    pub node: JmtNode,
}

impl NodeEntry {
    pub fn new(node_key: NodeKey, node: JmtNode) -> Self {
        Self { node_key, node }
    }
}

/// Per-transaction modification statistics captured at freeze time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    pub new_nodes: usize,
    pub new_leaves: usize,
    pub stale_nodes: usize,
    pub stale_leaves: usize,
}

/// Everything accumulated across frozen transactions, flattened for one
/// atomic commit: a sorted node map, the stale-node set, and the stats of
/// each transaction in order.
#[derive(Debug, Clone)]
pub struct TreeUpdateBatch {
    pub nodes: BTreeMap<NibblePath, NodeEntry>,
    pub stale_indices: BTreeSet<StaleNodeIndex>,
    pub stats: Vec<NodeStats>,
}

/// Immutable accumulation of frozen transactions.
#[derive(Debug, Default)]
struct FrozenTreeCache {
    nodes: BTreeMap<NibblePath, NodeEntry>,
    stale_indices: BTreeSet<StaleNodeIndex>,
    stale_keys: HashSet<NodeKey>,
    stats: Vec<NodeStats>,
    root_hashes: Vec<Hash>,
}

/// Batch-local cache over a read-only view of a [`JmtStore`].
pub struct TreeCache<'a, S: JmtStore + ?Sized> {
    store: &'a S,
    /// Version the cache reads committed state at; `None` at genesis.
    base_version: Option<u64>,
    /// Version of the transaction currently being built.
    next_version: u64,
    /// Current transaction's staged nodes, keyed by path.
    node_cache: HashMap<NibblePath, NodeEntry>,
    num_new_leaves: usize,
    /// Current transaction's stale markers.
    stale_cache: HashSet<NodeKey>,
    num_stale_leaves: usize,
    frozen: FrozenTreeCache,
    root_node_key: NodeKey,
}

impl<'a, S: JmtStore + ?Sized> TreeCache<'a, S> {
    /// Creates a cache whose first transaction commits at `version`,
    /// reading committed state from `version - 1`.
    pub fn new(store: &'a S, version: u64) -> Self {
        let base_version = version.checked_sub(1);
        let root_node_key = NodeKey::root(base_version.unwrap_or(0));
        Self {
            store,
            base_version,
            next_version: version,
            node_cache: HashMap::new(),
            num_new_leaves: 0,
            stale_cache: HashSet::new(),
            num_stale_leaves: 0,
            frozen: FrozenTreeCache::default(),
            root_node_key,
        }
    }

    /// Version the next freeze will stamp.
    pub fn next_version(&self) -> u64 {
        self.next_version
    }

    /// Key of the current root node.
    pub fn root_node_key(&self) -> &NodeKey {
        &self.root_node_key
    }

    /// Updates the root node key after a tree modification.
    pub fn set_root_node_key(&mut self, key: NodeKey) {
        self.root_node_key = key;
    }

    /// Three-tier lookup: staged, then frozen, then storage at the base
    /// version. Entries superseded earlier in this batch are not
    /// resurrected from storage.
    pub fn get_node(&self, path: &NibblePath) -> JmtResult<Option<NodeEntry>> {
        if let Some(entry) = self.node_cache.get(path) {
            return Ok(Some(entry.clone()));
        }
        if let Some(entry) = self.frozen.nodes.get(path) {
            return Ok(Some(entry.clone()));
        }
        let Some(base_version) = self.base_version else {
            return Ok(None);
        };
        match self.store.get_node(base_version, path)? {
            Some(entry) if self.is_superseded(&entry.node_key) => Ok(None),
            other => Ok(other),
        }
    }

    /// Stages a node for the current transaction.
    pub fn put_node(&mut self, node_key: NodeKey, node: JmtNode) -> JmtResult<()> {
        if self.node_cache.contains_key(node_key.path()) {
            return Err(JmtError::NodeAlreadyStaged(node_key));
        }
        if node.is_leaf() {
            self.num_new_leaves += 1;
        }
        self.node_cache.insert(node_key.path().clone(), NodeEntry::new(node_key, node));
        Ok(())
    }

    /// Deletes a node. A node staged in the current transaction is simply
    /// unstaged (the insertion is undone); anything older is recorded in
    /// the stale index for later pruning.
    pub fn delete_node(&mut self, node_key: &NodeKey, is_leaf: bool) -> JmtResult<()> {
        if let Some(removed) = self.node_cache.remove(node_key.path()) {
            if removed.node.is_leaf() {
                self.num_new_leaves -= 1;
            }
            return Ok(());
        }
        if !self.stale_cache.insert(node_key.clone()) {
            return Err(JmtError::NodeAlreadyStale(node_key.clone()));
        }
        if is_leaf {
            self.num_stale_leaves += 1;
        }
        Ok(())
    }

    /// Freezes the current transaction: moves staged nodes and stale
    /// markers into the frozen layer, snapshots statistics, records the
    /// transaction's root hash, and advances the version.
    pub fn freeze(&mut self, root_hash: Hash) {
        self.frozen.root_hashes.push(root_hash);
        self.frozen.stats.push(NodeStats {
            new_nodes: self.node_cache.len(),
            new_leaves: self.num_new_leaves,
            stale_nodes: self.stale_cache.len(),
            stale_leaves: self.num_stale_leaves,
        });

        for (path, entry) in self.node_cache.drain() {
            self.frozen.nodes.insert(path, entry);
        }
        for key in self.stale_cache.drain() {
            self.frozen.stale_indices.insert(StaleNodeIndex::new(self.next_version, key.clone()));
            self.frozen.stale_keys.insert(key);
        }

        self.num_new_leaves = 0;
        self.num_stale_leaves = 0;
        self.next_version += 1;
    }

    /// Root hashes of all frozen transactions, in freeze order.
    pub fn root_hashes(&self) -> &[Hash] {
        &self.frozen.root_hashes
    }

    /// Flattens the frozen layers into one update batch for storage.
    pub fn to_batch(&self) -> TreeUpdateBatch {
        TreeUpdateBatch {
            nodes: self.frozen.nodes.clone(),
            stale_indices: self.frozen.stale_indices.clone(),
            stats: self.frozen.stats.clone(),
        }
    }

    fn is_superseded(&self, key: &NodeKey) -> bool {
        self.stale_cache.contains(key) || self.frozen.stale_keys.contains(key)
    }
}
