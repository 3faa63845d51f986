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

//! Node types and empty-subtree digests for the Sparse Merkle Tree
//!
//! Only two node shapes exist: a 2-ary internal node holding the digests
//! of its children and a leaf holding the hashed key plus the value.
//! Subtrees containing no keys are never materialized; their digests come
//! from the canonical [`EmptyDigests`] table instead.

use crate::cbor;
use crate::hash::{Hash, HashFunction};
use crate::smt::{SmtError, SmtResult};

/// Depth of the tree: one level per bit of the 256-bit key hash.
pub const TREE_DEPTH: usize = 256;

const TAG_INTERNAL: u64 = 0;
const TAG_LEAF: u64 = 1;

/// A node in the Sparse Merkle Tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtNode {
    /// 2-ary internal node; children may be canonical empty digests.
    Internal { left: Hash, right: Hash },
    /// Terminal node holding the hashed key and the raw value.
    Leaf { key_hash: Hash, value: Vec<u8> },
}

impl SmtNode {
    /// Canonical CBOR encoding: `[0, left, right]` or `[1, key_hash, value]`.
    pub fn encode(&self) -> Vec<u8> {
        let value = match self {
            SmtNode::Internal { left, right } => cbor::array(vec![cbor::uint(TAG_INTERNAL), cbor::bytes(left), cbor::bytes(right)]),
            SmtNode::Leaf { key_hash, value } => cbor::array(vec![cbor::uint(TAG_LEAF), cbor::bytes(key_hash), cbor::bytes(value)]),
        };
        cbor::to_vec(&value)
    }

    /// Decodes a node from its canonical encoding.
    pub fn decode(data: &[u8]) -> SmtResult<Self> {
        let value = cbor::from_slice(data)?;
        let items = cbor::as_array(&value)?;
        if items.len() != 3 {
            return Err(SmtError::InvalidNode(format!("node array has {} elements", items.len())));
        }
        match cbor::as_uint(&items[0])? {
            TAG_INTERNAL => Ok(SmtNode::Internal {
                left: cbor::as_hash(&items[1])?,
                right: cbor::as_hash(&items[2])?,
            }),
            TAG_LEAF => Ok(SmtNode::Leaf {
                key_hash: cbor::as_hash(&items[1])?,
                value: cbor::as_bytes(&items[2])?.to_vec(),
            }),
            tag => Err(SmtError::InvalidNode(format!("unknown node tag {tag}"))),
        }
    }

    /// Storage hash: digest of the canonical encoding.
    pub fn hash<H: HashFunction>(&self, hasher: &H) -> Hash {
        hasher.digest(&self.encode())
    }
}

/// Canonical digests of empty subtrees at every depth.
///
/// Entry 256 is the digest of the empty-leaf marker; entry `d` is the
/// digest of an internal node whose children are both `entry[d + 1]`.
/// Entry 0 is therefore the root of a completely empty tree.
#[derive(Debug, Clone)]
pub struct EmptyDigests {
    digests: Vec<Hash>,
}

impl EmptyDigests {
    /// Computes the table for a hash function.
    pub fn compute<H: HashFunction>(hasher: &H) -> Self {
        let mut digests = vec![[0u8; 32]; TREE_DEPTH + 1];
        digests[TREE_DEPTH] = hasher.digest(&[]);
        for depth in (0..TREE_DEPTH).rev() {
            let child = digests[depth + 1];
            digests[depth] = SmtNode::Internal { left: child, right: child }.hash(hasher);
        }
        Self { digests }
    }

    /// Digest of the empty subtree rooted at `depth`.
    pub fn at(&self, depth: usize) -> &Hash {
        &self.digests[depth]
    }

    /// Root digest of a completely empty tree.
    pub fn empty_root(&self) -> &Hash {
        &self.digests[0]
    }

    /// True if `digest` is the canonical empty digest for `depth`.
    pub fn is_empty_at(&self, digest: &Hash, depth: usize) -> bool {
        digest == &self.digests[depth]
    }
}

/// Bit of a 256-bit hash at `index`, MSB-first within each byte.
pub fn bit_at(hash: &Hash, index: usize) -> u8 {
    (hash[index >> 3] >> (7 - (index & 7))) & 1
}

/// First bit position at or after `from` where two hashes diverge, or
/// `TREE_DEPTH` when identical.
pub fn first_diverging_bit(a: &Hash, b: &Hash, from: usize) -> usize {
    for i in from..TREE_DEPTH {
        if bit_at(a, i) != bit_at(b, i) {
            return i;
        }
    }
    TREE_DEPTH
}
