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

//! Commitment schemes for JMT node digests
//!
//! The scheme that turns a node into its digest is pluggable per tree
//! flavor: the classic scheme below hashes domain-tagged byte layouts,
//! while alternate encodings can be swapped in behind the trait without
//! touching tree logic. The same scheme instance must be used for commit,
//! proof generation, and proof verification.

use crate::hash::{Hash, HashFunction};
use crate::nibbles::{self, NibblePath};

/// Computes node digests for a JMT flavor.
pub trait CommitmentScheme {
    /// Digest standing in for an absent child and for the empty tree.
    fn null_hash(&self) -> Hash;

    /// Digest of a leaf: commits to the key suffix below the leaf's
    /// position and the value hash.
    fn commit_leaf(&self, suffix: &NibblePath, value_hash: &Hash) -> Hash;

    /// Digest of an internal node from its full 16-slot child array.
    /// `prefix` is the node's position; schemes may ignore it.
    fn commit_branch(&self, prefix: &NibblePath, children: &[Option<Hash>; 16]) -> Hash;
}

const LEAF_TAG: u8 = 0x00;
const BRANCH_TAG: u8 = 0x01;

/// Classic JMT commitments: domain-tagged flat byte layouts.
///
/// - leaf:   `H(0x00 || hp(suffix) || value_hash)`
/// - branch: `H(0x01 || bitmap_be || child_0 .. child_15)` with absent
///   children replaced by the null hash
/// - null:   all-zero digest
///
/// Branch digests deliberately ignore the node's position so that a
/// subtree's commitment depends only on its contents.
#[derive(Debug, Clone)]
pub struct ClassicCommitments<H: HashFunction> {
    hasher: H,
}

impl<H: HashFunction> ClassicCommitments<H> {
    pub fn new(hasher: H) -> Self {
        Self { hasher }
    }
}

impl<H: HashFunction> CommitmentScheme for ClassicCommitments<H> {
    fn null_hash(&self) -> Hash {
        [0u8; 32]
    }

    fn commit_leaf(&self, suffix: &NibblePath, value_hash: &Hash) -> Hash {
        let hp = nibbles::pack_hp(true, suffix.nibbles());
        let mut preimage = Vec::with_capacity(1 + hp.len() + 32);
        preimage.push(LEAF_TAG);
        preimage.extend_from_slice(&hp);
        preimage.extend_from_slice(value_hash);
        self.hasher.digest(&preimage)
    }

    fn commit_branch(&self, _prefix: &NibblePath, children: &[Option<Hash>; 16]) -> Hash {
        let mut bitmap = 0u16;
        for (nibble, child) in children.iter().enumerate() {
            if child.is_some() {
                bitmap |= 1 << nibble;
            }
        }
        let null = self.null_hash();
        let mut preimage = Vec::with_capacity(1 + 2 + 16 * 32);
        preimage.push(BRANCH_TAG);
        preimage.extend_from_slice(&bitmap.to_be_bytes());
        for child in children {
            preimage.extend_from_slice(child.as_ref().unwrap_or(&null));
        }
        self.hasher.digest(&preimage)
    }
}
