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

//! Jellyfish Merkle Tree over a pluggable store
//!
//! Each [`JellyfishMerkleTree::put`] applies an ordered batch of updates
//! at an explicit version: mutations run against a [`TreeCache`], every
//! node update follows the delete-then-create pattern (the old version is
//! marked stale, a new version-stamped node is staged), the cache is
//! frozen to capture the root hash and statistics, and the flattened
//! batch is committed to storage atomically together with the root and
//! value writes.
//!
//! Leaves live at the shortest prefix of their key hash that
//! distinguishes them; internal nodes exist at every materialized prefix
//! above them. Historical reads and proofs resolve nodes through
//! version-stamped keys, so committed versions are immutable.

use crate::hash::{Hash, HashFunction};
use crate::jmt::commitment::CommitmentScheme;
use crate::jmt::proof::{self, BranchStep, JmtProof};
use crate::jmt::store::{JmtStore, PruneReport};
use crate::jmt::tree_cache::{NodeEntry, NodeStats, TreeCache};
use crate::jmt::types::{JmtNode, NodeKey, StaleNodeIndex};
use crate::jmt::{JmtError, JmtResult};
use crate::nibbles::NibblePath;
use tracing::debug;

/// A value mutation recorded by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueOp {
    Put { key_hash: Hash, value: Vec<u8> },
    Delete { key_hash: Hash },
}

/// Result of one committed version.
#[derive(Debug, Clone)]
pub struct CommitResult {
    pub version: u64,
    pub root_hash: Hash,
    /// Newly created nodes, sorted by path.
    pub nodes: Vec<NodeEntry>,
    /// Nodes superseded by this commit.
    pub stale_nodes: Vec<StaleNodeIndex>,
    /// Per-transaction statistics.
    pub stats: Vec<NodeStats>,
    /// Value mutations in application order.
    pub value_ops: Vec<ValueOp>,
}

/// One traversal frame recorded while descending towards a leaf.
struct PathFrame {
    path: NibblePath,
    node_key: NodeKey,
    expanded: [Option<Hash>; 16],
    child_index: usize,
}

/// Versioned Jellyfish Merkle Tree.
pub struct JellyfishMerkleTree<S: JmtStore, C: CommitmentScheme, H: HashFunction> {
    store: S,
    commitments: C,
    hasher: H,
}

impl<S: JmtStore, C: CommitmentScheme, H: HashFunction> JellyfishMerkleTree<S, C, H> {
    pub fn new(store: S, commitments: C, hasher: H) -> Self {
        Self { store, commitments, hasher }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The hash function this tree was built with.
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// The commitment scheme this tree was built with.
    pub fn commitments(&self) -> &C {
        &self.commitments
    }

    /// Highest committed version, or `None` for an empty tree.
    pub fn latest_version(&self) -> JmtResult<Option<u64>> {
        Ok(self.store.latest_root()?.map(|r| r.version))
    }

    /// Root of the latest version; the null hash for an empty tree.
    pub fn latest_root_hash(&self) -> JmtResult<Hash> {
        Ok(self.store.latest_root()?.map_or_else(|| self.commitments.null_hash(), |r| r.root_hash))
    }

    /// Root committed at `version`; the null hash when absent.
    pub fn root_hash(&self, version: u64) -> JmtResult<Hash> {
        Ok(self.store.root_hash(version)?.unwrap_or_else(|| self.commitments.null_hash()))
    }

    /// Applies an ordered batch of updates as one committed version.
    ///
    /// A `Some(value)` entry inserts or replaces the key; `None` deletes
    /// it. The version must be strictly greater than the latest committed
    /// one. All resulting node, value, stale-index, and root writes land
    /// in a single atomic store batch.
    pub fn put(&self, version: u64, updates: &[(Vec<u8>, Option<Vec<u8>>)]) -> JmtResult<CommitResult> {
        if let Some(latest) = self.store.latest_root()? {
            if version <= latest.version {
                return Err(JmtError::VersionNotMonotonic { version, latest: latest.version });
            }
        }

        let mut cache = TreeCache::new(&self.store, version);
        let mut value_ops = Vec::with_capacity(updates.len());

        for (key, maybe_value) in updates {
            let key_hash = self.hasher.digest(key);
            match maybe_value {
                Some(value) => {
                    let value_hash = self.hasher.digest(value);
                    self.insert_value(&mut cache, &key_hash, &value_hash)?;
                    value_ops.push(ValueOp::Put {
                        key_hash,
                        value: value.clone(),
                    });
                }
                None => {
                    if self.remove_value(&mut cache, &key_hash)? {
                        value_ops.push(ValueOp::Delete { key_hash });
                    }
                }
            }
        }

        let root_hash = match cache.get_node(&NibblePath::empty())? {
            Some(entry) => self.node_hash(entry.node_key.path(), &entry.node),
            None => self.commitments.null_hash(),
        };

        cache.freeze(root_hash);
        let batch = cache.to_batch();

        let mut store_batch = self.store.begin_commit(version)?;
        for entry in batch.nodes.values() {
            store_batch.put_node(&entry.node_key, &entry.node)?;
        }
        for stale in &batch.stale_indices {
            store_batch.mark_stale(&stale.node_key)?;
        }
        for op in &value_ops {
            match op {
                ValueOp::Put { key_hash, value } => store_batch.put_value(key_hash, value)?,
                ValueOp::Delete { key_hash } => store_batch.delete_value(key_hash)?,
            }
        }
        store_batch.set_root_hash(&root_hash)?;
        store_batch.commit()?;

        debug!(
            version,
            new_nodes = batch.nodes.len(),
            stale_nodes = batch.stale_indices.len(),
            root = %hex::encode(root_hash),
            "committed jmt version"
        );

        Ok(CommitResult {
            version,
            root_hash,
            nodes: batch.nodes.into_values().collect(),
            stale_nodes: batch.stale_indices.into_iter().collect(),
            stats: batch.stats,
            value_ops,
        })
    }

    /// Value stored under `key` at the latest version.
    pub fn get(&self, key: &[u8]) -> JmtResult<Option<Vec<u8>>> {
        match self.latest_version()? {
            Some(version) => self.get_at(key, version),
            None => Ok(None),
        }
    }

    /// Value stored under `key` as of `version`: reflects only updates
    /// committed at versions less than or equal to it.
    pub fn get_at(&self, key: &[u8], version: u64) -> JmtResult<Option<Vec<u8>>> {
        let Some(latest) = self.latest_version()? else {
            return Ok(None);
        };
        if version > latest {
            return Ok(None);
        }
        let key_hash = self.hasher.digest(key);
        self.store.get_value_at(&key_hash, version)
    }

    /// Builds an inclusion or non-inclusion proof for `key` at `version`.
    /// Returns `None` when the version was never committed.
    pub fn get_proof(&self, key: &[u8], version: u64) -> JmtResult<Option<JmtProof>> {
        if self.store.root_hash(version)?.is_none() {
            return Ok(None);
        }

        let key_hash = self.hasher.digest(key);
        let target = NibblePath::from_bytes(&key_hash);

        let Some(mut entry) = self.store.get_node(version, &NibblePath::empty())? else {
            return Ok(Some(JmtProof::non_inclusion_empty(Vec::new())));
        };

        let mut steps = Vec::new();
        let mut current_path = NibblePath::empty();
        let mut depth = 0usize;

        loop {
            match &entry.node {
                JmtNode::Leaf { key_hash: leaf_key, value_hash } => {
                    let full = NibblePath::from_bytes(leaf_key);
                    let suffix = full.suffix(current_path.len());
                    if *leaf_key == key_hash {
                        let value = self.store.get_value_at(&key_hash, version)?;
                        return Ok(Some(JmtProof::inclusion(steps, value, *value_hash, suffix, key_hash)));
                    }
                    return Ok(Some(JmtProof::non_inclusion_different_leaf(steps, *leaf_key, *value_hash, suffix)));
                }
                JmtNode::Internal { .. } => {
                    if depth >= target.len() {
                        return Err(JmtError::InvalidState("traversal depth exceeds key length".to_string()));
                    }
                    let nibble = target.get(depth);
                    let expanded = entry.node.expanded_children();
                    steps.push(BranchStep {
                        prefix: current_path.clone(),
                        children: expanded,
                        child_index: nibble,
                    });
                    if expanded[nibble as usize].is_none() {
                        return Ok(Some(JmtProof::non_inclusion_empty(steps)));
                    }
                    current_path = current_path.child(nibble);
                    match self.store.get_node(version, &current_path)? {
                        Some(next) => {
                            entry = next;
                            depth += 1;
                        }
                        None => return Ok(Some(JmtProof::non_inclusion_empty(steps))),
                    }
                }
            }
        }
    }

    /// Classic wire proof for `key` at `version`.
    pub fn proof_wire(&self, key: &[u8], version: u64) -> JmtResult<Option<Vec<u8>>> {
        Ok(self.get_proof(key, version)?.map(|p| proof::to_wire(&p)))
    }

    /// Verifies a classic wire proof against `expected_root`.
    pub fn verify_proof_wire(&self, expected_root: Option<&Hash>, key: &[u8], value: Option<&[u8]>, including: bool, wire: &[u8]) -> JmtResult<bool> {
        proof::verify_wire(expected_root, &self.hasher, &self.commitments, key, value, including, wire)
    }

    /// Physically deletes nodes whose stale markers are at or before
    /// `version`, consuming the markers.
    pub fn prune(&self, version: u64) -> JmtResult<PruneReport> {
        let nodes_pruned = self.store.prune_up_to(version)?;
        debug!(version, nodes_pruned, "pruned stale jmt nodes");
        Ok(PruneReport {
            version_inclusive: version,
            nodes_pruned,
        })
    }

    /// Drops every version newer than `version` (reorg rollback).
    pub fn truncate_after(&self, version: u64) -> JmtResult<()> {
        self.store.truncate_after(version)
    }

    fn node_hash(&self, path: &NibblePath, node: &JmtNode) -> Hash {
        match node {
            JmtNode::Leaf { key_hash, value_hash } => {
                let full = NibblePath::from_bytes(key_hash);
                self.commitments.commit_leaf(&full.suffix(path.len()), value_hash)
            }
            JmtNode::Internal { .. } => self.commitments.commit_branch(path, &node.expanded_children()),
        }
    }

    fn insert_value(&self, cache: &mut TreeCache<'_, S>, key_hash: &Hash, value_hash: &Hash) -> JmtResult<()> {
        let target = NibblePath::from_bytes(key_hash);
        let root_key = cache.root_node_key().clone();
        let new_root = self.insert_at(cache, &root_key, &target, 0, key_hash, value_hash)?;
        cache.set_root_node_key(new_root);
        Ok(())
    }

    /// Recursive insertion. Every node update deletes the old version
    /// first, then stages the replacement at the current version.
    fn insert_at(&self, cache: &mut TreeCache<'_, S>, node_key: &NodeKey, target: &NibblePath, depth: usize, key_hash: &Hash, value_hash: &Hash) -> JmtResult<NodeKey> {
        let version = cache.next_version();

        let Some(entry) = cache.get_node(node_key.path())? else {
            // Empty position: stage a fresh leaf.
            let key = NodeKey::new(node_key.path().clone(), version);
            cache.put_node(key.clone(), JmtNode::leaf(*key_hash, *value_hash))?;
            return Ok(key);
        };

        match &entry.node {
            JmtNode::Leaf { key_hash: leaf_key, .. } => {
                if leaf_key == key_hash {
                    cache.delete_node(&entry.node_key, true)?;
                    let key = NodeKey::new(node_key.path().clone(), version);
                    cache.put_node(key.clone(), JmtNode::leaf(*key_hash, *value_hash))?;
                    Ok(key)
                } else {
                    let existing = entry.clone();
                    cache.delete_node(&existing.node_key, true)?;
                    self.split_leaf(cache, &existing, target, depth, key_hash, value_hash, version)
                }
            }
            JmtNode::Internal { .. } => {
                let expanded = entry.node.expanded_children();
                cache.delete_node(&entry.node_key, false)?;

                let child_nibble = target.get(depth);
                let child_path = target.prefix(depth + 1);
                let child_version = cache.get_node(&child_path)?.map_or(version, |e| e.node_key.version());
                let child_key = NodeKey::new(child_path, child_version);

                let new_child_key = self.insert_at(cache, &child_key, target, depth + 1, key_hash, value_hash)?;
                let child_entry = cache
                    .get_node(new_child_key.path())?
                    .ok_or_else(|| JmtError::InvalidState("child missing after insert".to_string()))?;
                let child_hash = self.node_hash(new_child_key.path(), &child_entry.node);

                let mut full = expanded;
                full[child_nibble as usize] = Some(child_hash);
                let key = NodeKey::new(node_key.path().clone(), version);
                cache.put_node(key.clone(), JmtNode::internal_from_full(&full))?;
                Ok(key)
            }
        }
    }

    /// Splits on a leaf collision: both leaves move below the first
    /// diverging nibble, connected to the collision point by a chain of
    /// single-child internal nodes.
    #[allow(clippy::too_many_arguments)]
    fn split_leaf(&self, cache: &mut TreeCache<'_, S>, existing: &NodeEntry, target: &NibblePath, depth: usize, key_hash: &Hash, value_hash: &Hash, version: u64) -> JmtResult<NodeKey> {
        let JmtNode::Leaf {
            key_hash: existing_key,
            value_hash: existing_value,
        } = existing.node
        else {
            return Err(JmtError::InvalidState("split target is not a leaf".to_string()));
        };
        let existing_path = NibblePath::from_bytes(&existing_key);

        let mut diverge = depth;
        while existing_path.get(diverge) == target.get(diverge) {
            diverge += 1;
        }

        let fork_path = target.prefix(diverge);
        let existing_nib = existing_path.get(diverge);
        let new_nib = target.get(diverge);

        let existing_leaf_path = fork_path.child(existing_nib);
        cache.put_node(NodeKey::new(existing_leaf_path, version), JmtNode::leaf(existing_key, existing_value))?;

        let new_leaf_path = fork_path.child(new_nib);
        cache.put_node(NodeKey::new(new_leaf_path, version), JmtNode::leaf(*key_hash, *value_hash))?;

        let existing_hash = self.commitments.commit_leaf(&existing_path.suffix(diverge + 1), &existing_value);
        let new_hash = self.commitments.commit_leaf(&target.suffix(diverge + 1), value_hash);

        let mut full: [Option<Hash>; 16] = [None; 16];
        full[existing_nib as usize] = Some(existing_hash);
        full[new_nib as usize] = Some(new_hash);
        let mut level_hash = self.commitments.commit_branch(&fork_path, &full);
        cache.put_node(NodeKey::new(fork_path.clone(), version), JmtNode::internal_from_full(&full))?;
        let mut top_key = NodeKey::new(fork_path, version);

        // Single-child internal nodes walking back up to the collision
        // point keep every materialized prefix addressable.
        for d in (depth..diverge).rev() {
            let parent_path = target.prefix(d);
            let mut parent_full: [Option<Hash>; 16] = [None; 16];
            parent_full[target.get(d) as usize] = Some(level_hash);
            level_hash = self.commitments.commit_branch(&parent_path, &parent_full);
            top_key = NodeKey::new(parent_path.clone(), version);
            cache.put_node(top_key.clone(), JmtNode::internal_from_full(&parent_full))?;
        }

        Ok(top_key)
    }

    /// Removes a key's leaf and rebuilds the ancestors, collapsing an
    /// internal node left with a single leaf child by re-keying that leaf
    /// upward. Returns whether the key existed.
    fn remove_value(&self, cache: &mut TreeCache<'_, S>, key_hash: &Hash) -> JmtResult<bool> {
        let version = cache.next_version();
        let target = NibblePath::from_bytes(key_hash);

        let mut frames: Vec<PathFrame> = Vec::new();
        let mut path = NibblePath::empty();
        let mut depth = 0usize;

        loop {
            let Some(entry) = cache.get_node(&path)? else {
                if frames.is_empty() {
                    return Ok(false);
                }
                return Err(JmtError::InvalidState(format!("missing node at {path} during delete")));
            };
            match &entry.node {
                JmtNode::Leaf { key_hash: leaf_key, .. } => {
                    if leaf_key != key_hash {
                        return Ok(false);
                    }
                    cache.delete_node(&entry.node_key, true)?;
                    break;
                }
                JmtNode::Internal { .. } => {
                    let expanded = entry.node.expanded_children();
                    let nibble = target.get(depth) as usize;
                    if expanded[nibble].is_none() {
                        return Ok(false);
                    }
                    frames.push(PathFrame {
                        path: path.clone(),
                        node_key: entry.node_key.clone(),
                        expanded,
                        child_index: nibble,
                    });
                    path = path.child(nibble as u8);
                    depth += 1;
                }
            }
        }

        let mut child_hash: Option<Hash> = None;
        while let Some(frame) = frames.pop() {
            let mut full = frame.expanded;
            full[frame.child_index] = child_hash;
            cache.delete_node(&frame.node_key, false)?;

            let live: Vec<usize> = full.iter().enumerate().filter_map(|(i, h)| h.map(|_| i)).collect();
            match live.len() {
                0 => {
                    child_hash = None;
                }
                1 => {
                    let only_nib = live[0];
                    let child_path = frame.path.child(only_nib as u8);
                    let child_entry = cache
                        .get_node(&child_path)?
                        .ok_or_else(|| JmtError::InvalidState(format!("missing child at {child_path} during collapse")))?;
                    if let JmtNode::Leaf {
                        key_hash: leaf_key,
                        value_hash: leaf_value,
                    } = child_entry.node
                    {
                        // Re-key the surviving leaf one level up.
                        cache.delete_node(&child_entry.node_key, true)?;
                        cache.put_node(NodeKey::new(frame.path.clone(), version), JmtNode::leaf(leaf_key, leaf_value))?;
                        let leaf_full = NibblePath::from_bytes(&leaf_key);
                        child_hash = Some(self.commitments.commit_leaf(&leaf_full.suffix(frame.path.len()), &leaf_value));
                    } else {
                        // The sole child is a subtree: keep this internal
                        // node materialized so its prefix stays addressable.
                        cache.put_node(NodeKey::new(frame.path.clone(), version), JmtNode::internal_from_full(&full))?;
                        child_hash = Some(self.commitments.commit_branch(&frame.path, &full));
                    }
                }
                _ => {
                    cache.put_node(NodeKey::new(frame.path.clone(), version), JmtNode::internal_from_full(&full))?;
                    child_hash = Some(self.commitments.commit_branch(&frame.path, &full));
                }
            }
        }

        cache.set_root_node_key(NodeKey::root(version));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Keccak256;
    use crate::jmt::commitment::ClassicCommitments;
    use crate::jmt::store::InMemoryJmtStore;

    type Tree = JellyfishMerkleTree<InMemoryJmtStore, ClassicCommitments<Keccak256>, Keccak256>;

    fn tree() -> Tree {
        JellyfishMerkleTree::new(InMemoryJmtStore::new(), ClassicCommitments::new(Keccak256), Keccak256)
    }

    fn puts(pairs: &[(&str, &str)]) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        pairs.iter().map(|(k, v)| (k.as_bytes().to_vec(), Some(v.as_bytes().to_vec()))).collect()
    }

    #[test]
    fn test_single_commit_round_trip() {
        let tree = tree();
        let result = tree.put(1, &puts(&[("key1", "value1"), ("key2", "value2")])).unwrap();
        assert_eq!(result.version, 1);
        assert_ne!(result.root_hash, tree.commitments().null_hash());
        assert!(!result.nodes.is_empty());

        assert_eq!(tree.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(tree.get(b"key2").unwrap(), Some(b"value2".to_vec()));
        assert_eq!(tree.get(b"key3").unwrap(), None);
    }

    #[test]
    fn test_version_isolation_scenario() {
        let tree = tree();
        tree.put(1, &puts(&[("key1", "value1-v1"), ("key2", "value2-v1")])).unwrap();
        tree.put(2, &puts(&[("key1", "value1-v2"), ("key3", "value3-v2")])).unwrap();

        assert_eq!(tree.get_at(b"key1", 1).unwrap(), Some(b"value1-v1".to_vec()));
        assert_eq!(tree.get_at(b"key1", 2).unwrap(), Some(b"value1-v2".to_vec()));
        assert_eq!(tree.get_at(b"key3", 1).unwrap(), None);
        assert_eq!(tree.get_at(b"key3", 2).unwrap(), Some(b"value3-v2".to_vec()));
        assert_eq!(tree.get_at(b"key2", 2).unwrap(), Some(b"value2-v1".to_vec()));
    }

    #[test]
    fn test_version_must_be_monotonic() {
        let tree = tree();
        tree.put(5, &puts(&[("a", "1")])).unwrap();
        let err = tree.put(5, &puts(&[("b", "2")])).unwrap_err();
        assert!(matches!(err, JmtError::VersionNotMonotonic { .. }));
        let err = tree.put(3, &puts(&[("b", "2")])).unwrap_err();
        assert!(matches!(err, JmtError::VersionNotMonotonic { .. }));
    }

    #[test]
    fn test_commit_reports_stale_nodes() {
        let tree = tree();
        tree.put(1, &puts(&[("key1", "v1")])).unwrap();
        let second = tree.put(2, &puts(&[("key1", "v2")])).unwrap();
        // Rewriting the only leaf supersedes the version-1 node.
        assert_eq!(second.stale_nodes.len(), 1);
        assert_eq!(second.stale_nodes[0].node_key.version(), 1);
        assert_eq!(second.stale_nodes[0].stale_since_version, 2);
    }

    #[test]
    fn test_root_hash_deterministic_across_orderings() {
        let a = tree();
        let b = tree();
        a.put(1, &puts(&[("k1", "v1"), ("k2", "v2"), ("k3", "v3")])).unwrap();
        b.put(1, &puts(&[("k3", "v3"), ("k1", "v1"), ("k2", "v2")])).unwrap();
        assert_eq!(a.latest_root_hash().unwrap(), b.latest_root_hash().unwrap());
    }

    #[test]
    fn test_delete_restores_single_key_root() {
        let a = tree();
        a.put(1, &puts(&[("k1", "v1")])).unwrap();
        let single_root = a.latest_root_hash().unwrap();
        a.put(2, &puts(&[("k2", "v2")])).unwrap();
        a.put(3, &[(b"k2".to_vec(), None)]).unwrap();

        assert_eq!(a.latest_root_hash().unwrap(), single_root);
        assert_eq!(a.get(b"k2").unwrap(), None);
        assert_eq!(a.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        // The deleted key is still visible at its own version.
        assert_eq!(a.get_at(b"k2", 2).unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn test_delete_all_keys_yields_null_root() {
        let tree = tree();
        tree.put(1, &puts(&[("k1", "v1"), ("k2", "v2")])).unwrap();
        let result = tree.put(2, &[(b"k1".to_vec(), None), (b"k2".to_vec(), None)]).unwrap();
        assert_eq!(result.root_hash, tree.commitments().null_hash());
        assert_eq!(tree.get(b"k1").unwrap(), None);
    }

    #[test]
    fn test_delete_missing_key_records_no_op() {
        let tree = tree();
        tree.put(1, &puts(&[("k1", "v1")])).unwrap();
        let root = tree.latest_root_hash().unwrap();
        let result = tree.put(2, &[(b"missing".to_vec(), None)]).unwrap();
        assert_eq!(result.root_hash, root);
        assert!(result.value_ops.is_empty());
    }

    #[test]
    fn test_many_keys_round_trip() {
        let tree = tree();
        let pairs: Vec<(Vec<u8>, Option<Vec<u8>>)> = (0u32..64).map(|i| (format!("key-{i}").into_bytes(), Some(format!("value-{i}").into_bytes()))).collect();
        tree.put(1, &pairs).unwrap();
        for i in 0u32..64 {
            assert_eq!(tree.get(format!("key-{i}").as_bytes()).unwrap(), Some(format!("value-{i}").into_bytes()));
        }
    }

    #[test]
    fn test_incremental_commits_match_single_commit() {
        let incremental = tree();
        for (i, v) in (1u64..=8).enumerate() {
            incremental.put(v, &puts(&[(&format!("key-{i}"), &format!("value-{i}"))])).unwrap();
        }

        let single = tree();
        let pairs: Vec<(Vec<u8>, Option<Vec<u8>>)> = (0usize..8).map(|i| (format!("key-{i}").into_bytes(), Some(format!("value-{i}").into_bytes()))).collect();
        single.put(1, &pairs).unwrap();

        assert_eq!(incremental.latest_root_hash().unwrap(), single.latest_root_hash().unwrap());
    }

    #[test]
    fn test_prune_keeps_latest_state_readable() {
        let tree = tree();
        tree.put(1, &puts(&[("k", "v1")])).unwrap();
        tree.put(2, &puts(&[("k", "v2")])).unwrap();
        tree.put(3, &puts(&[("k", "v3")])).unwrap();

        let report = tree.prune(3).unwrap();
        assert!(report.nodes_pruned >= 2);
        assert_eq!(tree.get(b"k").unwrap(), Some(b"v3".to_vec()));
        let proof = tree.get_proof(b"k", 3).unwrap().unwrap();
        assert!(matches!(proof.kind, crate::jmt::proof::JmtProofKind::Inclusion { .. }));
    }

    #[test]
    fn test_truncate_after_rolls_back() {
        let tree = tree();
        tree.put(1, &puts(&[("k", "v1")])).unwrap();
        let v1_root = tree.latest_root_hash().unwrap();
        tree.put(2, &puts(&[("k", "v2")])).unwrap();

        tree.truncate_after(1).unwrap();
        assert_eq!(tree.latest_version().unwrap(), Some(1));
        assert_eq!(tree.latest_root_hash().unwrap(), v1_root);
        assert_eq!(tree.get(b"k").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn test_empty_update_batch_keeps_root() {
        let tree = tree();
        tree.put(1, &puts(&[("k", "v")])).unwrap();
        let root = tree.latest_root_hash().unwrap();
        let result = tree.put(2, &[]).unwrap();
        assert_eq!(result.root_hash, root);
        assert!(result.nodes.is_empty());
    }
}
