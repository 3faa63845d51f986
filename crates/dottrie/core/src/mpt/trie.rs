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

//! Merkle Patricia Trie implementation
//!
//! Copy-on-write trie over a content-addressed node store. Keys are split
//! into nibbles; traversal follows hex-prefix-encoded leaf/extension
//! segments and 16-way branches. Insertion may split an existing leaf or
//! extension into a branch plus remainders; deletion collapses nodes
//! (branch to extension/leaf, extension merging) to keep the structure
//! minimal, so the same key set always produces the same root regardless
//! of operation order.
//!
//! The trie is not internally synchronized for mutation: one logical
//! writer at a time. Reads against an already-committed root are safe to
//! share because stored nodes are immutable.

use crate::hash::{Hash, HashFunction, Keccak256};
use crate::mpt::node::MptNode;
use crate::mpt::proof::{self, MerklePatriciaProof, MptProofKind};
use crate::mpt::{Key, MptError, MptResult, Value};
use crate::nibbles;
use crate::store::{InMemoryNodeStore, NodeStore};
use parking_lot::RwLock;

/// Outcome of a recursive delete step.
enum Deleted {
    /// Key not found beneath this node; subtree unchanged.
    Unchanged,
    /// The whole subtree disappeared.
    Removed,
    /// The subtree was rewritten; the new root hash of it.
    Replaced(Hash),
}

/// Merkle Patricia Trie over a pluggable node store and hash function.
pub struct MerklePatriciaTrie<S: NodeStore, H: HashFunction = Keccak256> {
    storage: RwLock<S>,
    hasher: H,
    root: Option<Hash>,
}

impl<S: NodeStore, H: HashFunction> MerklePatriciaTrie<S, H> {
    /// Creates an empty trie over `storage`.
    pub fn new(storage: S, hasher: H) -> Self {
        Self::with_root(storage, hasher, None)
    }

    /// Opens a trie at an existing root (`None` for the empty trie).
    pub fn with_root(storage: S, hasher: H, root: Option<Hash>) -> Self {
        Self {
            storage: RwLock::new(storage),
            hasher,
            root,
        }
    }

    /// Current root commitment, or `None` for the empty trie.
    pub fn root_hash(&self) -> Option<Hash> {
        self.root
    }

    /// Repoints the trie at another root.
    pub fn set_root(&mut self, root: Option<Hash>) {
        self.root = root;
    }

    /// The hash function this trie was built with.
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Consumes the trie, returning the storage backend.
    pub fn into_storage(self) -> S {
        self.storage.into_inner()
    }

    /// Inserts or updates a key-value pair.
    ///
    /// An empty key is rejected; an empty value means "delete", matching
    /// the external contract that no key maps to an empty value.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> MptResult<()> {
        if key.is_empty() {
            return Err(MptError::EmptyKey);
        }
        if value.is_empty() {
            return self.delete(key);
        }
        let key_nibbles = nibbles::bytes_to_nibbles(key);
        let mut storage = self.storage.write();
        let new_root = put_at(&mut *storage, &self.hasher, self.root.as_ref(), &key_nibbles, 0, value)?;
        self.root = Some(new_root);
        Ok(())
    }

    /// Retrieves the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> MptResult<Option<Value>> {
        let key_nibbles = nibbles::bytes_to_nibbles(key);
        let storage = self.storage.read();
        get_at(&*storage, self.root.as_ref(), &key_nibbles, 0)
    }

    /// True if `key` is present.
    pub fn contains(&self, key: &[u8]) -> MptResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Deletes `key` if present; absent keys are a no-op.
    pub fn delete(&mut self, key: &[u8]) -> MptResult<()> {
        if key.is_empty() {
            return Err(MptError::EmptyKey);
        }
        let key_nibbles = nibbles::bytes_to_nibbles(key);
        let mut storage = self.storage.write();
        match delete_at(&mut *storage, &self.hasher, self.root.as_ref(), &key_nibbles, 0)? {
            Deleted::Unchanged => {}
            Deleted::Removed => self.root = None,
            Deleted::Replaced(hash) => self.root = Some(hash),
        }
        Ok(())
    }

    /// Collects all entries whose key starts with `prefix`, in key order.
    ///
    /// An empty prefix returns every entry; `limit == 0` means unlimited.
    /// The result reflects the trie at call time and is not restartable
    /// across mutations.
    pub fn scan_by_prefix(&self, prefix: &[u8], limit: usize) -> MptResult<Vec<(Key, Value)>> {
        let prefix_nibbles = nibbles::bytes_to_nibbles(prefix);
        let cap = if limit == 0 { usize::MAX } else { limit };
        let storage = self.storage.read();
        let mut results = Vec::new();
        let mut acc = Vec::new();
        scan_at(&*storage, self.root.as_ref(), &prefix_nibbles, &mut acc, cap, &mut results)?;
        Ok(results)
    }

    /// Builds a proof for `key` against the current root: every node
    /// touched from the root to the terminating node, root first.
    pub fn get_proof(&self, key: &[u8]) -> MptResult<MerklePatriciaProof> {
        let key_nibbles = nibbles::bytes_to_nibbles(key);
        let storage = self.storage.read();
        let mut nodes = Vec::new();
        let (kind, value) = collect_proof(&*storage, self.root.as_ref(), &key_nibbles, 0, &mut nodes)?;
        Ok(MerklePatriciaProof {
            kind,
            value,
            nodes,
            root: self.root,
        })
    }

    /// Classic wire proof for `key`: a CBOR array of encoded nodes.
    pub fn proof_wire(&self, key: &[u8]) -> MptResult<Vec<u8>> {
        Ok(self.get_proof(key)?.to_wire())
    }

    /// Verifies a classic wire proof against `expected_root`.
    ///
    /// With `including` set, the proof must demonstrate that `key` maps to
    /// `value`; otherwise it must demonstrate absence. Structurally
    /// malformed wire is an error; a proof that simply does not verify
    /// returns `false`.
    pub fn verify_proof_wire(&self, expected_root: Option<&Hash>, key: &[u8], value: Option<&[u8]>, including: bool, wire: &[u8]) -> MptResult<bool> {
        proof::verify_wire(expected_root, &self.hasher, key, value, including, wire)
    }
}

impl MerklePatriciaTrie<InMemoryNodeStore, Keccak256> {
    /// Creates an empty in-memory trie, mainly for tests.
    pub fn new_in_memory() -> Self {
        Self::new(InMemoryNodeStore::new(), Keccak256)
    }
}

fn load<S: NodeStore>(storage: &S, hash: &Hash) -> MptResult<MptNode> {
    let bytes = storage.get(hash)?.ok_or(MptError::NodeNotFound(*hash))?;
    MptNode::decode(&bytes)
}

fn persist<S: NodeStore, H: HashFunction>(storage: &mut S, hasher: &H, node: &MptNode) -> MptResult<Hash> {
    let encoded = node.encode();
    let hash = hasher.digest(&encoded);
    storage.put(&hash, &encoded)?;
    Ok(hash)
}

fn put_at<S: NodeStore, H: HashFunction>(storage: &mut S, hasher: &H, node_hash: Option<&Hash>, key: &[u8], pos: usize, value: &[u8]) -> MptResult<Hash> {
    let Some(node_hash) = node_hash else {
        let leaf = MptNode::leaf(&key[pos..], value.to_vec());
        return persist(storage, hasher, &leaf);
    };

    match load(storage, node_hash)? {
        MptNode::Leaf { hp, value: old_value } => {
            let leaf_path = nibbles::unpack_hp(&hp).nibbles;
            let rest = &key[pos..];
            if leaf_path == rest {
                let leaf = MptNode::leaf(rest, value.to_vec());
                persist(storage, hasher, &leaf)
            } else {
                split_leaf(storage, hasher, &leaf_path, &old_value, rest, value)
            }
        }
        MptNode::Extension { hp, child } => {
            let ext_path = nibbles::unpack_hp(&hp).nibbles;
            let rest = &key[pos..];
            let common = nibbles::common_prefix(rest, &ext_path);
            if common == ext_path.len() {
                let new_child = put_at(storage, hasher, Some(&child), key, pos + common, value)?;
                let ext = MptNode::extension(&ext_path, new_child);
                persist(storage, hasher, &ext)
            } else {
                split_extension(storage, hasher, &ext_path, child, rest, value, common)
            }
        }
        MptNode::Branch { mut children, value: branch_value } => {
            if pos == key.len() {
                let branch = MptNode::branch(children, Some(value.to_vec()));
                persist(storage, hasher, &branch)
            } else {
                let nib = key[pos] as usize;
                let new_child = put_at(storage, hasher, children[nib].as_ref(), key, pos + 1, value)?;
                children[nib] = Some(new_child);
                let branch = MptNode::branch(children, branch_value);
                persist(storage, hasher, &branch)
            }
        }
    }
}

/// Splits a leaf whose path diverges from the key being inserted into a
/// branch holding both remainders, prefixed by an extension when the two
/// paths share nibbles.
fn split_leaf<S: NodeStore, H: HashFunction>(storage: &mut S, hasher: &H, old_path: &[u8], old_value: &[u8], new_path: &[u8], new_value: &[u8]) -> MptResult<Hash> {
    let common = nibbles::common_prefix(old_path, new_path);
    let old_rest = &old_path[common..];
    let new_rest = &new_path[common..];

    let mut children: [Option<Hash>; 16] = [None; 16];
    let mut branch_value = None;

    if old_rest.is_empty() {
        branch_value = Some(old_value.to_vec());
    } else {
        let leaf = MptNode::leaf(&old_rest[1..], old_value.to_vec());
        children[old_rest[0] as usize] = Some(persist(storage, hasher, &leaf)?);
    }

    if new_rest.is_empty() {
        branch_value = Some(new_value.to_vec());
    } else {
        let leaf = MptNode::leaf(&new_rest[1..], new_value.to_vec());
        children[new_rest[0] as usize] = Some(persist(storage, hasher, &leaf)?);
    }

    let branch_hash = persist(storage, hasher, &MptNode::branch(children, branch_value))?;
    if common > 0 {
        persist(storage, hasher, &MptNode::extension(&new_path[..common], branch_hash))
    } else {
        Ok(branch_hash)
    }
}

/// Splits an extension on a partial path match: the diverging tail becomes
/// a branch child (directly, or behind a shorter extension), the new key's
/// remainder becomes a leaf or the branch value.
fn split_extension<S: NodeStore, H: HashFunction>(storage: &mut S, hasher: &H, ext_path: &[u8], child: Hash, rest: &[u8], value: &[u8], common: usize) -> MptResult<Hash> {
    let ext_rest = &ext_path[common..];
    let key_rest = &rest[common..];

    let mut children: [Option<Hash>; 16] = [None; 16];
    let mut branch_value = None;

    if ext_rest.len() == 1 {
        children[ext_rest[0] as usize] = Some(child);
    } else {
        let tail = MptNode::extension(&ext_rest[1..], child);
        children[ext_rest[0] as usize] = Some(persist(storage, hasher, &tail)?);
    }

    if key_rest.is_empty() {
        branch_value = Some(value.to_vec());
    } else {
        let leaf = MptNode::leaf(&key_rest[1..], value.to_vec());
        children[key_rest[0] as usize] = Some(persist(storage, hasher, &leaf)?);
    }

    let branch_hash = persist(storage, hasher, &MptNode::branch(children, branch_value))?;
    if common > 0 {
        persist(storage, hasher, &MptNode::extension(&rest[..common], branch_hash))
    } else {
        Ok(branch_hash)
    }
}

fn get_at<S: NodeStore>(storage: &S, node_hash: Option<&Hash>, key: &[u8], pos: usize) -> MptResult<Option<Value>> {
    let Some(node_hash) = node_hash else {
        return Ok(None);
    };

    match load(storage, node_hash)? {
        MptNode::Leaf { hp, value } => {
            let leaf_path = nibbles::unpack_hp(&hp).nibbles;
            Ok(if leaf_path == key[pos..] { Some(value) } else { None })
        }
        MptNode::Extension { hp, child } => {
            let ext_path = nibbles::unpack_hp(&hp).nibbles;
            let rest = &key[pos..];
            if rest.len() < ext_path.len() || rest[..ext_path.len()] != ext_path[..] {
                return Ok(None);
            }
            get_at(storage, Some(&child), key, pos + ext_path.len())
        }
        MptNode::Branch { children, value } => {
            if pos == key.len() {
                Ok(value)
            } else {
                match children[key[pos] as usize] {
                    Some(child) => get_at(storage, Some(&child), key, pos + 1),
                    None => Ok(None),
                }
            }
        }
    }
}

fn delete_at<S: NodeStore, H: HashFunction>(storage: &mut S, hasher: &H, node_hash: Option<&Hash>, key: &[u8], pos: usize) -> MptResult<Deleted> {
    let Some(node_hash) = node_hash else {
        return Ok(Deleted::Unchanged);
    };

    match load(storage, node_hash)? {
        MptNode::Leaf { hp, .. } => {
            let leaf_path = nibbles::unpack_hp(&hp).nibbles;
            Ok(if leaf_path == key[pos..] { Deleted::Removed } else { Deleted::Unchanged })
        }
        MptNode::Extension { hp, child } => {
            let ext_path = nibbles::unpack_hp(&hp).nibbles;
            let rest = &key[pos..];
            if rest.len() < ext_path.len() || rest[..ext_path.len()] != ext_path[..] {
                return Ok(Deleted::Unchanged);
            }
            match delete_at(storage, hasher, Some(&child), key, pos + ext_path.len())? {
                Deleted::Unchanged => Ok(Deleted::Unchanged),
                Deleted::Removed => Ok(Deleted::Removed),
                Deleted::Replaced(new_child) => {
                    // Merge with the rewritten child to keep paths compressed.
                    let merged = match load(storage, &new_child)? {
                        MptNode::Extension { hp: child_hp, child: grandchild } => {
                            let mut path = ext_path;
                            path.extend(nibbles::unpack_hp(&child_hp).nibbles);
                            MptNode::extension(&path, grandchild)
                        }
                        MptNode::Leaf { hp: child_hp, value } => {
                            let mut path = ext_path;
                            path.extend(nibbles::unpack_hp(&child_hp).nibbles);
                            MptNode::leaf(&path, value)
                        }
                        MptNode::Branch { .. } => MptNode::extension(&ext_path, new_child),
                    };
                    Ok(Deleted::Replaced(persist(storage, hasher, &merged)?))
                }
            }
        }
        MptNode::Branch { mut children, value } => {
            if pos == key.len() {
                if value.is_none() {
                    return Ok(Deleted::Unchanged);
                }
                return compress_branch(storage, hasher, children, None);
            }

            let nib = key[pos] as usize;
            let Some(child) = children[nib] else {
                return Ok(Deleted::Unchanged);
            };
            match delete_at(storage, hasher, Some(&child), key, pos + 1)? {
                Deleted::Unchanged => Ok(Deleted::Unchanged),
                Deleted::Removed => {
                    children[nib] = None;
                    compress_branch(storage, hasher, children, value)
                }
                Deleted::Replaced(new_child) => {
                    children[nib] = Some(new_child);
                    compress_branch(storage, hasher, children, value)
                }
            }
        }
    }
}

/// Rewrites a branch after a child was removed or replaced, collapsing it
/// when it no longer justifies a 16-way node.
fn compress_branch<S: NodeStore, H: HashFunction>(storage: &mut S, hasher: &H, children: [Option<Hash>; 16], value: Option<Vec<u8>>) -> MptResult<Deleted> {
    let child_count = children.iter().filter(|c| c.is_some()).count();

    if child_count == 0 {
        return match value {
            None => Ok(Deleted::Removed),
            Some(v) => {
                let leaf = MptNode::leaf(&[], v);
                Ok(Deleted::Replaced(persist(storage, hasher, &leaf)?))
            }
        };
    }

    if child_count == 1 && value.is_none() {
        let idx = children
            .iter()
            .position(|c| c.is_some())
            .and_then(|i| children[i].map(|h| (i, h)));
        let Some((nib, child_hash)) = idx else {
            return Ok(Deleted::Unchanged);
        };
        let merged = match load(storage, &child_hash)? {
            MptNode::Extension { hp, child } => {
                let mut path = vec![nib as u8];
                path.extend(nibbles::unpack_hp(&hp).nibbles);
                MptNode::extension(&path, child)
            }
            MptNode::Leaf { hp, value } => {
                let mut path = vec![nib as u8];
                path.extend(nibbles::unpack_hp(&hp).nibbles);
                MptNode::leaf(&path, value)
            }
            MptNode::Branch { .. } => MptNode::extension(&[nib as u8], child_hash),
        };
        return Ok(Deleted::Replaced(persist(storage, hasher, &merged)?));
    }

    let branch = MptNode::branch(children, value);
    Ok(Deleted::Replaced(persist(storage, hasher, &branch)?))
}

fn scan_at<S: NodeStore>(storage: &S, node_hash: Option<&Hash>, prefix: &[u8], acc: &mut Vec<u8>, limit: usize, out: &mut Vec<(Key, Value)>) -> MptResult<()> {
    let Some(node_hash) = node_hash else {
        return Ok(());
    };
    if out.len() >= limit {
        return Ok(());
    }

    match load(storage, node_hash)? {
        MptNode::Leaf { hp, value } => {
            let leaf_path = nibbles::unpack_hp(&hp).nibbles;
            acc.extend_from_slice(&leaf_path);
            if acc.starts_with(prefix) {
                out.push((nibbles::nibbles_to_bytes(acc), value));
            }
            acc.truncate(acc.len() - leaf_path.len());
        }
        MptNode::Extension { hp, child } => {
            let ext_path = nibbles::unpack_hp(&hp).nibbles;
            acc.extend_from_slice(&ext_path);
            scan_at(storage, Some(&child), prefix, acc, limit, out)?;
            acc.truncate(acc.len() - ext_path.len());
        }
        MptNode::Branch { children, value } => {
            if let Some(v) = value {
                if acc.starts_with(prefix) {
                    out.push((nibbles::nibbles_to_bytes(acc), v));
                    if out.len() >= limit {
                        return Ok(());
                    }
                }
            }
            for (nib, child) in children.iter().enumerate() {
                if out.len() >= limit {
                    break;
                }
                if let Some(child) = child {
                    acc.push(nib as u8);
                    scan_at(storage, Some(child), prefix, acc, limit, out)?;
                    acc.pop();
                }
            }
        }
    }
    Ok(())
}

fn collect_proof<S: NodeStore>(storage: &S, node_hash: Option<&Hash>, key: &[u8], pos: usize, nodes: &mut Vec<Vec<u8>>) -> MptResult<(MptProofKind, Option<Value>)> {
    let Some(node_hash) = node_hash else {
        return Ok((MptProofKind::NonInclusionMissingBranch, None));
    };

    let bytes = storage.get(node_hash)?.ok_or(MptError::NodeNotFound(*node_hash))?;
    let node = MptNode::decode(&bytes)?;
    nodes.push(bytes);

    match node {
        MptNode::Leaf { hp, value } => {
            let leaf_path = nibbles::unpack_hp(&hp).nibbles;
            if leaf_path == key[pos..] {
                Ok((MptProofKind::Inclusion, Some(value)))
            } else {
                Ok((MptProofKind::NonInclusionDifferentLeaf, None))
            }
        }
        MptNode::Extension { hp, child } => {
            let ext_path = nibbles::unpack_hp(&hp).nibbles;
            let rest = &key[pos..];
            if rest.len() < ext_path.len() || rest[..ext_path.len()] != ext_path[..] {
                return Ok((MptProofKind::NonInclusionMissingBranch, None));
            }
            collect_proof(storage, Some(&child), key, pos + ext_path.len(), nodes)
        }
        MptNode::Branch { children, value } => {
            if pos == key.len() {
                return Ok(match value {
                    Some(v) => (MptProofKind::Inclusion, Some(v)),
                    None => (MptProofKind::NonInclusionMissingBranch, None),
                });
            }
            match children[key[pos] as usize] {
                Some(child) => collect_proof(storage, Some(&child), key, pos + 1, nodes),
                None => Ok((MptProofKind::NonInclusionMissingBranch, None)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    #[test]
    fn test_empty_trie() {
        let trie = MerklePatriciaTrie::new_in_memory();
        assert_eq!(trie.root_hash(), None);
        assert_eq!(trie.get(b"missing").unwrap(), None);
    }

    #[test]
    fn test_single_key_value() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        trie.put(b"test", b"value").unwrap();
        assert!(trie.root_hash().is_some());
        assert_eq!(trie.get(b"test").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn test_multiple_keys() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (b"key1".to_vec(), b"value1".to_vec()),
            (b"key2".to_vec(), b"value2".to_vec()),
            (b"key3".to_vec(), b"value3".to_vec()),
            (b"completely-different".to_vec(), b"value4".to_vec()),
        ];
        for (key, value) in &pairs {
            trie.put(key, value).unwrap();
        }
        for (key, value) in &pairs {
            assert_eq!(trie.get(key).unwrap(), Some(value.clone()));
        }
    }

    #[test]
    fn test_key_update() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        trie.put(b"test", b"value1").unwrap();
        trie.put(b"test", b"value2").unwrap();
        assert_eq!(trie.get(b"test").unwrap(), Some(b"value2".to_vec()));
    }

    #[test]
    fn test_delete_restores_previous_root() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        trie.put(b"alpha", b"1").unwrap();
        let root_before = trie.root_hash();

        trie.put(b"beta", b"2").unwrap();
        assert_ne!(trie.root_hash(), root_before);

        trie.delete(b"beta").unwrap();
        assert_eq!(trie.root_hash(), root_before);
        assert_eq!(trie.get(b"beta").unwrap(), None);
        assert_eq!(trie.get(b"alpha").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_delete_last_key_empties_trie() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        trie.put(b"only", b"one").unwrap();
        trie.delete(b"only").unwrap();
        assert_eq!(trie.root_hash(), None);
    }

    #[test]
    fn test_delete_missing_key_is_noop() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        trie.put(b"key", b"value").unwrap();
        let root = trie.root_hash();
        trie.delete(b"other").unwrap();
        assert_eq!(trie.root_hash(), root);
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        assert!(matches!(trie.put(b"", b"value"), Err(MptError::EmptyKey)));
        assert!(matches!(trie.delete(b""), Err(MptError::EmptyKey)));
    }

    #[test]
    fn test_empty_value_means_delete() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        trie.put(b"key", b"value").unwrap();
        trie.put(b"key", b"").unwrap();
        assert_eq!(trie.get(b"key").unwrap(), None);
        assert_eq!(trie.root_hash(), None);
    }

    #[test]
    fn test_root_is_insertion_order_independent() {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = (0u32..32).map(|i| (format!("key-{i}").into_bytes(), format!("value-{i}").into_bytes())).collect();

        let mut forward = MerklePatriciaTrie::new_in_memory();
        for (k, v) in &pairs {
            forward.put(k, v).unwrap();
        }

        let mut backward = MerklePatriciaTrie::new_in_memory();
        for (k, v) in pairs.iter().rev() {
            backward.put(k, v).unwrap();
        }

        assert_eq!(forward.root_hash(), backward.root_hash());
    }

    #[test]
    fn test_convergence_after_random_churn() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut trie = MerklePatriciaTrie::new_in_memory();

        // Insert a base set, churn extra keys in and out, and expect the
        // root to converge back to the base set's root.
        let base: Vec<(Vec<u8>, Vec<u8>)> = (0u32..16).map(|i| (format!("base-{i}").into_bytes(), format!("v{i}").into_bytes())).collect();
        for (k, v) in &base {
            trie.put(k, v).unwrap();
        }
        let base_root = trie.root_hash();

        let extras: Vec<Vec<u8>> = (0u32..16).map(|i| format!("extra-{}-{}", i, rng.r#gen::<u16>()).into_bytes()).collect();
        for k in &extras {
            trie.put(k, b"tmp").unwrap();
        }
        for k in &extras {
            trie.delete(k).unwrap();
        }
        assert_eq!(trie.root_hash(), base_root);
    }

    #[test]
    fn test_scan_by_prefix() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        trie.put(b"app/one", b"1").unwrap();
        trie.put(b"app/two", b"2").unwrap();
        trie.put(b"apple", b"3").unwrap();
        trie.put(b"banana", b"4").unwrap();

        let hits = trie.scan_by_prefix(b"app", 0).unwrap();
        assert_eq!(hits.len(), 3);
        let keys: HashSet<Vec<u8>> = hits.iter().map(|(k, _)| k.clone()).collect();
        assert!(keys.contains(&b"app/one".to_vec()));
        assert!(keys.contains(&b"apple".to_vec()));
        assert!(!keys.contains(&b"banana".to_vec()));
    }

    #[test]
    fn test_scan_empty_prefix_returns_all() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        for i in 0u32..10 {
            trie.put(format!("k{i}").as_bytes(), b"v").unwrap();
        }
        assert_eq!(trie.scan_by_prefix(b"", 0).unwrap().len(), 10);
    }

    #[test]
    fn test_scan_respects_limit() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        for i in 0u32..10 {
            trie.put(format!("k{i}").as_bytes(), b"v").unwrap();
        }
        assert_eq!(trie.scan_by_prefix(b"", 4).unwrap().len(), 4);
    }

    #[test]
    fn test_scan_results_are_key_ordered() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        trie.put(b"b", b"2").unwrap();
        trie.put(b"a", b"1").unwrap();
        trie.put(b"c", b"3").unwrap();
        let hits = trie.scan_by_prefix(b"", 0).unwrap();
        let keys: Vec<Vec<u8>> = hits.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_random_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut trie = MerklePatriciaTrie::new_in_memory();
        let mut expected = Vec::new();

        for i in 0..64 {
            let key: Vec<u8> = (0..rng.gen_range(1..24)).map(|_| rng.r#gen()).collect();
            let value = format!("value-{i}").into_bytes();
            trie.put(&key, &value).unwrap();
            expected.retain(|(k, _): &(Vec<u8>, Vec<u8>)| k != &key);
            expected.push((key, value));
        }

        for (key, value) in &expected {
            assert_eq!(trie.get(key).unwrap(), Some(value.clone()), "key {}", hex::encode(key));
        }
    }
}
