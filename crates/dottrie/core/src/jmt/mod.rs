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

//! Jellyfish Merkle Tree
//!
//! A versioned radix-16 sparse trie. Every commit applies an ordered
//! batch of updates at an explicit version, producing new version-stamped
//! nodes instead of mutating old ones (copy-on-write), so any committed
//! version stays queryable and provable.
//!
//! # Components
//!
//! - [`types`]: version-stamped [`NodeKey`]s, the internal/leaf node sum
//!   type, and the stale-node index entries consumed by pruning
//! - [`commitment`]: the pluggable scheme computing node digests
//! - [`tree_cache`]: the staging layer of uncommitted writes, frozen
//!   transactions, and the flattened update batch
//! - [`store`]: the storage contract plus an in-memory implementation
//! - [`tree`]: the tree itself, versioned put/get/proof/prune
//! - [`proof`]: branch-step proofs and the classic wire codec

pub mod commitment;
pub mod proof;
pub mod store;
pub mod tree;
pub mod tree_cache;
pub mod types;

pub use commitment::{ClassicCommitments, CommitmentScheme};
pub use proof::{BranchStep, JmtProof, JmtProofKind};
pub use store::{CommitBatch, InMemoryJmtStore, JmtStore, PruneReport, VersionedRoot};
pub use tree::{CommitResult, JellyfishMerkleTree, ValueOp};
pub use tree_cache::{NodeEntry, NodeStats, TreeCache, TreeUpdateBatch};
pub use types::{JmtNode, NodeKey, StaleNodeIndex};

use crate::cbor::CborError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors raised by Jellyfish Merkle Tree operations.
///
/// `NodeAlreadyStaged` and `NodeAlreadyStale` are programming-contract
/// violations inside a transaction and fail fast rather than silently
/// overwriting state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JmtError {
    /// A node key was staged twice within one transaction.
    #[error("node already staged in current transaction: {0}")]
    NodeAlreadyStaged(NodeKey),

    /// A node key was marked stale twice.
    #[error("node already marked stale: {0}")]
    NodeAlreadyStale(NodeKey),

    /// Commits must use strictly increasing versions.
    #[error("version {version} is not greater than latest committed version {latest}")]
    VersionNotMonotonic { version: u64, latest: u64 },

    /// Stored or supplied bytes do not decode as a JMT node.
    #[error("invalid node encoding: {0}")]
    InvalidNode(String),

    /// A proof wire that does not parse as the expected structure.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// Tree structure and storage disagree.
    #[error("invalid tree state: {0}")]
    InvalidState(String),

    /// Underlying storage fault.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CborError> for JmtError {
    fn from(err: CborError) -> Self {
        JmtError::InvalidNode(err.0)
    }
}

/// Result type for JMT operations.
pub type JmtResult<T> = Result<T, JmtError>;
