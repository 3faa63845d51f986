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

//! Authenticated, versioned key-value storage built on Merkle tries.
//!
//! This crate provides three trie variants sharing one content-addressed
//! storage contract, plus the proof machinery to verify any of them against
//! a root commitment without trusting the storage layer:
//!
//! # Core Components
//!
//! ## Merkle Patricia Trie (MPT)
//! - Hex-prefix compressed radix-16 trie over raw or pre-hashed keys
//! - Put/get/delete with automatic node collapsing on deletion
//! - Prefix scans and classic node-list proofs with a CBOR wire format
//! - `SecureTrie` wrapper that hashes keys before insertion
//!
//! ## Sparse Merkle Tree (SMT)
//! - Fixed 256-depth binary trie over hashed keys
//! - Precomputed empty-subtree digests so proofs never special-case
//!   missing siblings
//! - Inclusion and non-inclusion proofs with a pure verifier
//!
//! ## Jellyfish Merkle Tree (JMT)
//! - Versioned radix-16 sparse trie with copy-on-write node keys
//! - `TreeCache` staging layer batching multiple transactions before one
//!   atomic commit, tracking superseded nodes for pruning
//! - Point-in-time historical queries by version
//!
//! All tries resolve children through the [`store::NodeStore`] /
//! [`jmt::JmtStore`] contracts, so any backend satisfying those traits is
//! pluggable. In-memory implementations live here; a RocksDB backend lives
//! in the `dottrie-rocksdb` crate.
//!
//! # Error Handling
//!
//! All operations return `Result` types with subsystem-specific error
//! enums. A missing key, version, or root is a normal `Ok(None)` outcome,
//! never an error; storage faults and contract violations always surface
//! to the caller.

pub mod cbor;
pub mod hash;
pub mod jmt;
pub mod mpt;
pub mod nibbles;
pub mod smt;
pub mod store;

// Re-export commonly used types
pub use hash::{Hash, HashFunction, Keccak256};
pub use nibbles::NibblePath;
pub use store::{InMemoryNodeStore, InMemoryRootsIndex, NodeStore, RootsIndex, StoreError};
