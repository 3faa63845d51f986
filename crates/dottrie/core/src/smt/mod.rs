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

//! Sparse Merkle Tree
//!
//! A fixed-depth (256) binary trie over hashed keys. The key hash selects
//! a left/right branch at each depth, root to leaf. Empty subtrees at
//! every depth have precomputed canonical digests, so proofs carry a full
//! 256-entry sibling array and never special-case missing branches; a
//! non-inclusion proof is simply a sibling path terminating in the
//! canonical empty-leaf digest.
//!
//! Like the MPT, nodes are immutable, CBOR-encoded, and content-addressed
//! through [`crate::store::NodeStore`].

pub mod node;
pub mod proof;
pub mod tree;

pub use node::{EmptyDigests, SmtNode, TREE_DEPTH};
pub use proof::{SmtProofKind, SparseMerkleProof};
pub use tree::SparseMerkleTree;

use crate::cbor::CborError;
use crate::hash::Hash;
use crate::store::StoreError;
use thiserror::Error;

/// Errors raised by sparse Merkle tree operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SmtError {
    /// A node referenced by the structure is missing from storage.
    #[error("node not found: {}", hex::encode(.0))]
    NodeNotFound(Hash),

    /// Stored bytes do not decode as an SMT node.
    #[error("invalid node encoding: {0}")]
    InvalidNode(String),

    /// Underlying storage fault.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CborError> for SmtError {
    fn from(err: CborError) -> Self {
        SmtError::InvalidNode(err.0)
    }
}

/// Result type for SMT operations.
pub type SmtResult<T> = Result<T, SmtError>;
