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

//! RocksDB persistence for the dottrie storage contracts
//!
//! This crate implements `dottrie-core`'s `NodeStore`, `RootsIndex`, and
//! `JmtStore` on top of RocksDB with one column family per namespace:
//!
//! - `nodes`: content-addressed trie nodes (hash → bytes)
//! - `roots`: version → root commitment, plus latest/last-version
//!   sentinels, optionally key-prefixed to host multiple logical trees
//! - `refs`: node reference counts for the refcount GC strategy
//! - `jmt-nodes` / `jmt-values` / `jmt-roots` / `jmt-stale` /
//!   `jmt-stale-keys`: the Jellyfish Merkle Tree store
//!
//! All writes of one logical commit are staged into a single RocksDB
//! `WriteBatch` (via [`session::SessionStore`] for the MPT side, or the
//! JMT commit batch) and flushed atomically, so a crash can never leave
//! a root pointing at missing nodes. Batch state is an explicit session
//! value passed to every consumer; there is no ambient per-thread batch.

pub mod gc;
pub mod jmt_store;
pub mod namespace;
pub mod node_store;
pub mod roots_index;
pub mod session;
pub mod state_trees;

pub use gc::{GcError, GcReport, MarkSweepGc, RefcountGc, RetentionPolicy};
pub use jmt_store::RocksDbJmtStore;
pub use namespace::{KeyPrefixer, NamespaceOptions};
pub use node_store::RocksDbNodeStore;
pub use roots_index::RocksDbRootsIndex;
pub use session::SessionStore;
pub use state_trees::{CommitOutcome, RocksDbStateTrees, StateTreesError};

use dottrie_core::store::StoreError;

/// Column family for content-addressed trie nodes.
pub const CF_NODES: &str = "nodes";
/// Column family for version → root commitments.
pub const CF_ROOTS: &str = "roots";
/// Column family for node reference counts.
pub const CF_REFS: &str = "refs";
/// Column families for the JMT store.
pub const CF_JMT_NODES: &str = "jmt-nodes";
pub const CF_JMT_VALUES: &str = "jmt-values";
pub const CF_JMT_ROOTS: &str = "jmt-roots";
pub const CF_JMT_STALE: &str = "jmt-stale";
pub const CF_JMT_STALE_KEYS: &str = "jmt-stale-keys";

pub(crate) fn backend_err(err: rocksdb::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

pub(crate) fn missing_cf(name: &str) -> StoreError {
    StoreError::Backend(format!("column family {name} not opened"))
}

/// Opens (or creates) a RocksDB database with every column family this
/// crate uses, preserving any other families already present.
pub(crate) fn open_db(path: &std::path::Path) -> Result<rocksdb::DB, StoreError> {
    use rocksdb::{ColumnFamilyDescriptor, DB, Options};

    let mut names: Vec<String> = DB::list_cf(&Options::default(), path).unwrap_or_default();
    if !names.iter().any(|n| n == "default") {
        names.insert(0, "default".to_string());
    }
    for required in [CF_NODES, CF_ROOTS, CF_REFS, CF_JMT_NODES, CF_JMT_VALUES, CF_JMT_ROOTS, CF_JMT_STALE, CF_JMT_STALE_KEYS] {
        if !names.iter().any(|n| n == required) {
            names.push(required.to_string());
        }
    }

    let descriptors: Vec<ColumnFamilyDescriptor> = names.into_iter().map(|name| ColumnFamilyDescriptor::new(name, Options::default())).collect();

    let mut options = Options::default();
    options.create_if_missing(true);
    options.create_missing_column_families(true);
    DB::open_cf_descriptors(&options, path, descriptors).map_err(backend_err)
}
