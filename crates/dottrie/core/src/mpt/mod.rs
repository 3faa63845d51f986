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

//! Merkle Patricia Trie
//!
//! A hexary (16-way) trie with hex-prefix path compression over a
//! content-addressed [`crate::store::NodeStore`]. All updates are
//! copy-on-write: mutations produce new nodes and a new root, never
//! altering stored bytes, so any historical root remains verifiable.
//!
//! # Components
//!
//! - [`node`]: the `Leaf`/`Extension`/`Branch` sum type and its canonical
//!   CBOR encoding
//! - [`trie`]: put/get/delete, prefix scans, and proof collection
//! - [`secure`]: a wrapper that hashes keys before every operation
//! - [`proof`]: the classic node-list proof, its wire codec, and the pure
//!   verifier

pub mod node;
pub mod proof;
pub mod secure;
pub mod trie;

pub use node::MptNode;
pub use proof::{MerklePatriciaProof, MptProofKind};
pub use secure::SecureTrie;
pub use trie::MerklePatriciaTrie;

use crate::cbor::CborError;
use crate::hash::Hash;
use crate::store::StoreError;
use thiserror::Error;

/// Key type for the trie.
pub type Key = Vec<u8>;

/// Value type for the trie.
pub type Value = Vec<u8>;

/// Errors raised by trie operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MptError {
    /// A node referenced by the trie structure is missing from storage.
    /// This is a data-integrity violation, not a normal miss.
    #[error("node not found: {}", hex::encode(.0))]
    NodeNotFound(Hash),

    /// Keys must be non-empty; an empty value means "delete".
    #[error("empty key")]
    EmptyKey,

    /// Stored or supplied bytes do not decode as a trie node.
    #[error("invalid node encoding: {0}")]
    InvalidNode(String),

    /// A proof wire that does not parse as the expected CBOR shape.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// Underlying storage fault.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CborError> for MptError {
    fn from(err: CborError) -> Self {
        MptError::InvalidNode(err.0)
    }
}

/// Result type for trie operations.
pub type MptResult<T> = Result<T, MptError>;
