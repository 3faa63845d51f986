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

//! Sparse Merkle Tree implementation
//!
//! Both key and value enter hashed; the 256-bit key hash selects the
//! branch at each of 256 depths. Every stored key sits below a full path
//! of internal nodes whose off-path children are the canonical empty
//! digests, so sibling arrays in proofs are always complete.

use crate::hash::{Hash, HashFunction, Keccak256};
use crate::smt::node::{EmptyDigests, SmtNode, TREE_DEPTH, bit_at, first_diverging_bit};
use crate::smt::proof::SparseMerkleProof;
use crate::smt::{SmtError, SmtResult};
use crate::store::{InMemoryNodeStore, NodeStore};
use parking_lot::RwLock;

/// Sparse Merkle Tree over a pluggable node store and hash function.
pub struct SparseMerkleTree<S: NodeStore, H: HashFunction = Keccak256> {
    storage: RwLock<S>,
    hasher: H,
    empty: EmptyDigests,
    root: Option<Hash>,
}

/// One traversal step recorded on the way down, used by delete to
/// recompute digests bottom-up.
struct PathEntry {
    depth: usize,
    left: Hash,
    right: Hash,
    went_left: bool,
}

impl<S: NodeStore, H: HashFunction> SparseMerkleTree<S, H> {
    /// Creates an empty tree.
    pub fn new(storage: S, hasher: H) -> Self {
        Self::with_root(storage, hasher, None)
    }

    /// Opens a tree at an existing root (`None` for the empty tree).
    pub fn with_root(storage: S, hasher: H, root: Option<Hash>) -> Self {
        let empty = EmptyDigests::compute(&hasher);
        Self {
            storage: RwLock::new(storage),
            hasher,
            empty,
            root,
        }
    }

    /// Current root commitment, or `None` for the empty tree.
    pub fn root_hash(&self) -> Option<Hash> {
        self.root
    }

    /// Repoints the tree at another root.
    pub fn set_root(&mut self, root: Option<Hash>) {
        self.root = root;
    }

    /// The hash function this tree was built with.
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Canonical empty-subtree digest table.
    pub fn empty_digests(&self) -> &EmptyDigests {
        &self.empty
    }

    /// Consumes the tree, returning the storage backend.
    pub fn into_storage(self) -> S {
        self.storage.into_inner()
    }

    /// Inserts or updates a key-value pair.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> SmtResult<()> {
        let key_hash = self.hasher.digest(key);
        let mut storage = self.storage.write();
        let new_root = self.insert_at(&mut *storage, self.root, &key_hash, value, 0)?;
        self.root = Some(new_root);
        Ok(())
    }

    /// Retrieves the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> SmtResult<Option<Vec<u8>>> {
        let key_hash = self.hasher.digest(key);
        let storage = self.storage.read();
        self.get_at(&*storage, self.root, &key_hash, 0)
    }

    /// Deletes `key` if present; absent keys are a no-op.
    pub fn delete(&mut self, key: &[u8]) -> SmtResult<()> {
        let Some(root) = self.root else {
            return Ok(());
        };
        let key_hash = self.hasher.digest(key);
        let mut storage = self.storage.write();

        // Walk down, recording both children at every depth.
        let mut stack = Vec::with_capacity(TREE_DEPTH);
        let mut digest = root;
        for depth in 0..TREE_DEPTH {
            let node = self.load(&*storage, &digest)?;
            let SmtNode::Internal { left, right } = node else {
                return Ok(());
            };
            let bit = bit_at(&key_hash, depth);
            let went_left = bit == 0;
            stack.push(PathEntry {
                depth,
                left,
                right,
                went_left,
            });
            digest = if went_left { left } else { right };
            if self.empty.is_empty_at(&digest, depth + 1) {
                return Ok(());
            }
        }

        // The terminal node must be our leaf.
        match self.load(&*storage, &digest)? {
            SmtNode::Leaf { key_hash: leaf_key, .. } if leaf_key == key_hash => {}
            _ => return Ok(()),
        }

        // Recompute bottom-up with the leaf replaced by the empty digest.
        let mut current = *self.empty.at(TREE_DEPTH);
        for entry in stack.iter().rev() {
            let left = if entry.went_left { current } else { entry.left };
            let right = if entry.went_left { entry.right } else { current };
            if self.empty.is_empty_at(&left, entry.depth + 1) && self.empty.is_empty_at(&right, entry.depth + 1) {
                current = *self.empty.at(entry.depth);
            } else {
                current = self.persist(&mut *storage, &SmtNode::Internal { left, right })?;
            }
        }

        self.root = if self.empty.is_empty_at(&current, 0) { None } else { Some(current) };
        Ok(())
    }

    /// Builds an inclusion or non-inclusion proof for `key`.
    pub fn get_proof(&self, key: &[u8]) -> SmtResult<SparseMerkleProof> {
        let key_hash = self.hasher.digest(key);
        let mut siblings = vec![[0u8; 32]; TREE_DEPTH];
        let storage = self.storage.read();

        let Some(root) = self.root else {
            for (depth, sibling) in siblings.iter_mut().enumerate() {
                *sibling = *self.empty.at(depth + 1);
            }
            return Ok(SparseMerkleProof::non_inclusion(siblings));
        };

        let mut digest = root;
        for depth in 0..TREE_DEPTH {
            let node = self.load(&*storage, &digest)?;
            let SmtNode::Internal { left, right } = node else {
                for (d, sibling) in siblings.iter_mut().enumerate().skip(depth) {
                    *sibling = *self.empty.at(d + 1);
                }
                return Ok(SparseMerkleProof::non_inclusion(siblings));
            };
            let bit = bit_at(&key_hash, depth);
            siblings[depth] = if bit == 0 { right } else { left };
            digest = if bit == 0 { left } else { right };
            if self.empty.is_empty_at(&digest, depth + 1) {
                for (d, sibling) in siblings.iter_mut().enumerate().skip(depth + 1) {
                    *sibling = *self.empty.at(d + 1);
                }
                return Ok(SparseMerkleProof::non_inclusion(siblings));
            }
        }

        match self.load(&*storage, &digest)? {
            SmtNode::Leaf { key_hash: leaf_key, value } if leaf_key == key_hash => Ok(SparseMerkleProof::inclusion(siblings, value)),
            _ => Ok(SparseMerkleProof::non_inclusion(siblings)),
        }
    }

    fn load(&self, storage: &S, hash: &Hash) -> SmtResult<SmtNode> {
        let bytes = storage.get(hash)?.ok_or(SmtError::NodeNotFound(*hash))?;
        SmtNode::decode(&bytes)
    }

    fn persist(&self, storage: &mut S, node: &SmtNode) -> SmtResult<Hash> {
        let encoded = node.encode();
        let hash = self.hasher.digest(&encoded);
        storage.put(&hash, &encoded)?;
        Ok(hash)
    }

    fn insert_at(&self, storage: &mut S, node_hash: Option<Hash>, key_hash: &Hash, value: &[u8], depth: usize) -> SmtResult<Hash> {
        let Some(node_hash) = node_hash else {
            let leaf_hash = self.persist(
                storage,
                &SmtNode::Leaf {
                    key_hash: *key_hash,
                    value: value.to_vec(),
                },
            )?;
            return self.build_path_to_depth(storage, leaf_hash, key_hash, depth);
        };

        match self.load(storage, &node_hash)? {
            SmtNode::Leaf { key_hash: leaf_key, .. } if leaf_key == *key_hash => self.persist(
                storage,
                &SmtNode::Leaf {
                    key_hash: *key_hash,
                    value: value.to_vec(),
                },
            ),
            SmtNode::Leaf {
                key_hash: leaf_key,
                value: leaf_value,
            } => {
                // Collision below this depth: hang both leaves under the
                // first diverging bit.
                let diverge = first_diverging_bit(&leaf_key, key_hash, depth);

                let existing_hash = self.persist(
                    storage,
                    &SmtNode::Leaf {
                        key_hash: leaf_key,
                        value: leaf_value,
                    },
                )?;
                let existing_sub = self.build_path_to_depth(storage, existing_hash, &leaf_key, diverge + 1)?;

                let new_hash = self.persist(
                    storage,
                    &SmtNode::Leaf {
                        key_hash: *key_hash,
                        value: value.to_vec(),
                    },
                )?;
                let new_sub = self.build_path_to_depth(storage, new_hash, key_hash, diverge + 1)?;

                let (left, right) = if bit_at(&leaf_key, diverge) == 0 { (existing_sub, new_sub) } else { (new_sub, existing_sub) };
                let fork = self.persist(storage, &SmtNode::Internal { left, right })?;
                self.build_path_between(storage, fork, key_hash, depth, diverge)
            }
            SmtNode::Internal { left, right } => {
                let bit = bit_at(key_hash, depth);
                let child_depth = depth + 1;
                let pick = |stored: Hash| if self.empty.is_empty_at(&stored, child_depth) { None } else { Some(stored) };

                let node = if bit == 0 {
                    let new_left = self.insert_at(storage, pick(left), key_hash, value, child_depth)?;
                    SmtNode::Internal { left: new_left, right }
                } else {
                    let new_right = self.insert_at(storage, pick(right), key_hash, value, child_depth)?;
                    SmtNode::Internal { left, right: new_right }
                };
                self.persist(storage, &node)
            }
        }
    }

    fn get_at(&self, storage: &S, node_hash: Option<Hash>, key_hash: &Hash, depth: usize) -> SmtResult<Option<Vec<u8>>> {
        let Some(node_hash) = node_hash else {
            return Ok(None);
        };

        match self.load(storage, &node_hash)? {
            SmtNode::Leaf { key_hash: leaf_key, value } => Ok(if leaf_key == *key_hash { Some(value) } else { None }),
            SmtNode::Internal { left, right } => {
                let bit = bit_at(key_hash, depth);
                let child = if bit == 0 { left } else { right };
                if self.empty.is_empty_at(&child, depth + 1) {
                    return Ok(None);
                }
                self.get_at(storage, Some(child), key_hash, depth + 1)
            }
        }
    }

    /// Chains internal nodes from depth 255 up to `depth`, leading to
    /// `subtree` along the key-hash bits, with empty digests elsewhere.
    fn build_path_to_depth(&self, storage: &mut S, subtree: Hash, key_hash: &Hash, depth: usize) -> SmtResult<Hash> {
        let mut hash = subtree;
        for d in (depth..TREE_DEPTH).rev() {
            let empty = *self.empty.at(d + 1);
            let node = if bit_at(key_hash, d) == 0 {
                SmtNode::Internal { left: hash, right: empty }
            } else {
                SmtNode::Internal { left: empty, right: hash }
            };
            hash = self.persist(storage, &node)?;
        }
        Ok(hash)
    }

    /// Chains internal nodes from `diverge - 1` up to `depth`, attaching
    /// an already-built subtree rooted at the divergence level.
    fn build_path_between(&self, storage: &mut S, subtree: Hash, key_hash: &Hash, depth: usize, diverge: usize) -> SmtResult<Hash> {
        let mut hash = subtree;
        for d in (depth..diverge).rev() {
            let empty = *self.empty.at(d + 1);
            let node = if bit_at(key_hash, d) == 0 {
                SmtNode::Internal { left: hash, right: empty }
            } else {
                SmtNode::Internal { left: empty, right: hash }
            };
            hash = self.persist(storage, &node)?;
        }
        Ok(hash)
    }
}

impl SparseMerkleTree<InMemoryNodeStore, Keccak256> {
    /// Creates an empty in-memory tree, mainly for tests.
    pub fn new_in_memory() -> Self {
        Self::new(InMemoryNodeStore::new(), Keccak256)
    }
}
