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

//! RocksDB-backed Jellyfish Merkle Tree store
//!
//! Column family layout:
//!
//! - `jmt-nodes`: order-preserving [`NodeKey`] bytes → CBOR node. The
//!   key encoding sorts by `(path, version)`, so "newest node at this
//!   path at or below version v" is one reverse seek.
//! - `jmt-values`: `key_hash || version BE` → flag byte + value, where a
//!   zero flag is a delete tombstone; historical reads are floor scans.
//! - `jmt-roots`: `version BE` → root hash, plus latest-root and
//!   latest-version sentinels.
//! - `jmt-stale`: `stale_since BE || NodeKey bytes` → empty, the
//!   version-ordered pruning queue.
//! - `jmt-stale-keys`: `NodeKey bytes` → `stale_since BE`, the reverse
//!   marker consulted by versioned reads.
//!
//! Every commit is one RocksDB `WriteBatch`: nodes, values, stale
//! markers, and the root land atomically or not at all.

use crate::{backend_err, missing_cf, open_db, CF_JMT_NODES, CF_JMT_ROOTS, CF_JMT_STALE, CF_JMT_STALE_KEYS, CF_JMT_VALUES};
use byteorder::{BigEndian, ByteOrder};
use dottrie_core::hash::Hash;
use dottrie_core::jmt::{CommitBatch, JmtError, JmtNode, JmtResult, JmtStore, NodeEntry, NodeKey, VersionedRoot};
use dottrie_core::nibbles::NibblePath;
use dottrie_core::store::StoreError;
use rocksdb::{ColumnFamily, DB, Direction, IteratorMode, WriteBatch};
use std::path::Path;
use std::sync::Arc;

const LATEST_ROOT_KEY: &[u8] = b"LATEST";
const LATEST_VERSION_KEY: &[u8] = b"VERSION";

const VALUE_PRESENT: u8 = 0x01;
const VALUE_TOMBSTONE: u8 = 0x00;

/// RocksDB implementation of [`JmtStore`].
#[derive(Clone)]
pub struct RocksDbJmtStore {
    db: Arc<DB>,
}

impl RocksDbJmtStore {
    /// Opens (or creates) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> JmtResult<Self> {
        Ok(Self {
            db: Arc::new(open_db(path.as_ref())?),
        })
    }

    /// Shares an already-open database.
    pub fn from_db(db: Arc<DB>) -> Self {
        Self { db }
    }

    fn cf(&self, name: &str) -> JmtResult<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| JmtError::Store(missing_cf(name)))
    }

    fn get_raw(&self, cf_name: &str, key: &[u8]) -> JmtResult<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        self.db.get_cf(cf, key).map_err(|e| JmtError::Store(backend_err(e)))
    }

    /// Version the node was marked stale at, if any.
    fn stale_since(&self, node_key_bytes: &[u8]) -> JmtResult<Option<u64>> {
        match self.get_raw(CF_JMT_STALE_KEYS, node_key_bytes)? {
            Some(bytes) if bytes.len() == 8 => Ok(Some(BigEndian::read_u64(&bytes))),
            Some(bytes) => Err(JmtError::Store(StoreError::Corrupt(format!("stale marker has {} bytes, expected 8", bytes.len())))),
            None => Ok(None),
        }
    }

    fn is_stale_at(&self, node_key_bytes: &[u8], version: u64) -> JmtResult<bool> {
        Ok(self.stale_since(node_key_bytes)?.is_some_and(|since| since <= version))
    }

    fn decode_entry(key_bytes: &[u8], value: &[u8]) -> JmtResult<NodeEntry> {
        let node_key = NodeKey::from_bytes(key_bytes)?;
        let node = JmtNode::decode(value)?;
        Ok(NodeEntry::new(node_key, node))
    }
}

impl JmtStore for RocksDbJmtStore {
    fn latest_root(&self) -> JmtResult<Option<VersionedRoot>> {
        let Some(root_bytes) = self.get_raw(CF_JMT_ROOTS, LATEST_ROOT_KEY)? else {
            return Ok(None);
        };
        let root_hash = as_hash(&root_bytes)?;

        if let Some(version_bytes) = self.get_raw(CF_JMT_ROOTS, LATEST_VERSION_KEY)? {
            if version_bytes.len() == 8 {
                return Ok(Some(VersionedRoot {
                    version: BigEndian::read_u64(&version_bytes),
                    root_hash,
                }));
            }
        }

        // Version marker missing: fall back to scanning for the highest
        // 8-byte version entry.
        let cf = self.cf(CF_JMT_ROOTS)?;
        for item in self.db.iterator_cf(cf, IteratorMode::End) {
            let (key, value) = item.map_err(|e| JmtError::Store(backend_err(e)))?;
            if key.len() != 8 {
                continue;
            }
            return Ok(Some(VersionedRoot {
                version: BigEndian::read_u64(&key),
                root_hash: as_hash(&value)?,
            }));
        }
        Ok(None)
    }

    fn root_hash(&self, version: u64) -> JmtResult<Option<Hash>> {
        self.get_raw(CF_JMT_ROOTS, &version_key(version))?.map(|bytes| as_hash(&bytes)).transpose()
    }

    fn get_node(&self, version: u64, path: &NibblePath) -> JmtResult<Option<NodeEntry>> {
        let search = NodeKey::new(path.clone(), version).to_bytes();
        let cf = self.cf(CF_JMT_NODES)?;
        for item in self.db.iterator_cf(cf, IteratorMode::From(&search, Direction::Reverse)) {
            let (key_bytes, value) = item.map_err(|e| JmtError::Store(backend_err(e)))?;
            let entry = Self::decode_entry(&key_bytes, &value)?;
            if entry.node_key.path() != path {
                return Ok(None);
            }
            if entry.node_key.version() > version {
                continue;
            }
            if self.is_stale_at(&key_bytes, version)? {
                return Ok(None);
            }
            return Ok(Some(entry));
        }
        Ok(None)
    }

    fn get_node_by_key(&self, node_key: &NodeKey) -> JmtResult<Option<JmtNode>> {
        match self.get_raw(CF_JMT_NODES, &node_key.to_bytes())? {
            Some(bytes) => Ok(Some(JmtNode::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn floor_node(&self, version: u64, path: &NibblePath) -> JmtResult<Option<NodeEntry>> {
        let search = NodeKey::new(path.clone(), version).to_bytes();
        let cf = self.cf(CF_JMT_NODES)?;
        for item in self.db.iterator_cf(cf, IteratorMode::From(&search, Direction::Reverse)) {
            let (key_bytes, value) = item.map_err(|e| JmtError::Store(backend_err(e)))?;
            let entry = Self::decode_entry(&key_bytes, &value)?;
            if entry.node_key.version() > version || self.is_stale_at(&key_bytes, version)? {
                continue;
            }
            return Ok(Some(entry));
        }
        Ok(None)
    }

    fn get_value(&self, key_hash: &Hash) -> JmtResult<Option<Vec<u8>>> {
        self.get_value_at(key_hash, u64::MAX)
    }

    fn get_value_at(&self, key_hash: &Hash, version: u64) -> JmtResult<Option<Vec<u8>>> {
        let search = value_key(key_hash, version);
        let cf = self.cf(CF_JMT_VALUES)?;
        for item in self.db.iterator_cf(cf, IteratorMode::From(&search, Direction::Reverse)) {
            let (key_bytes, value) = item.map_err(|e| JmtError::Store(backend_err(e)))?;
            if key_bytes.len() != 40 || &key_bytes[..32] != key_hash.as_slice() {
                return Ok(None);
            }
            return match value.first() {
                Some(&VALUE_PRESENT) => Ok(Some(value[1..].to_vec())),
                Some(&VALUE_TOMBSTONE) => Ok(None),
                _ => Err(JmtError::Store(StoreError::Corrupt("value entry missing flag byte".to_string()))),
            };
        }
        Ok(None)
    }

    fn begin_commit(&self, version: u64) -> JmtResult<Box<dyn CommitBatch + '_>> {
        Ok(Box::new(RocksCommitBatch {
            store: self,
            version,
            batch: WriteBatch::default(),
            root_hash: None,
        }))
    }

    fn stale_nodes_up_to(&self, version: u64) -> JmtResult<Vec<NodeKey>> {
        let cf = self.cf(CF_JMT_STALE)?;
        let mut results = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key_bytes, _) = item.map_err(|e| JmtError::Store(backend_err(e)))?;
            if key_bytes.len() < 8 {
                return Err(JmtError::Store(StoreError::Corrupt("stale index key shorter than version".to_string())));
            }
            if BigEndian::read_u64(&key_bytes[..8]) > version {
                break;
            }
            results.push(NodeKey::from_bytes(&key_bytes[8..])?);
        }
        Ok(results)
    }

    fn prune_up_to(&self, version: u64) -> JmtResult<usize> {
        let stale_cf = self.cf(CF_JMT_STALE)?;
        let nodes_cf = self.cf(CF_JMT_NODES)?;
        let stale_keys_cf = self.cf(CF_JMT_STALE_KEYS)?;

        let mut batch = WriteBatch::default();
        let mut pruned = 0usize;
        for item in self.db.iterator_cf(stale_cf, IteratorMode::Start) {
            let (key_bytes, _) = item.map_err(|e| JmtError::Store(backend_err(e)))?;
            if key_bytes.len() < 8 {
                return Err(JmtError::Store(StoreError::Corrupt("stale index key shorter than version".to_string())));
            }
            if BigEndian::read_u64(&key_bytes[..8]) > version {
                break;
            }
            let node_key_bytes = &key_bytes[8..];
            batch.delete_cf(nodes_cf, node_key_bytes);
            batch.delete_cf(stale_keys_cf, node_key_bytes);
            batch.delete_cf(stale_cf, &key_bytes);
            pruned += 1;
        }
        if pruned > 0 {
            self.db.write(batch).map_err(|e| JmtError::Store(backend_err(e)))?;
        }
        Ok(pruned)
    }

    fn truncate_after(&self, version: u64) -> JmtResult<()> {
        let nodes_cf = self.cf(CF_JMT_NODES)?;
        let values_cf = self.cf(CF_JMT_VALUES)?;
        let roots_cf = self.cf(CF_JMT_ROOTS)?;
        let stale_cf = self.cf(CF_JMT_STALE)?;
        let stale_keys_cf = self.cf(CF_JMT_STALE_KEYS)?;

        let mut batch = WriteBatch::default();

        for item in self.db.iterator_cf(nodes_cf, IteratorMode::Start) {
            let (key_bytes, _) = item.map_err(|e| JmtError::Store(backend_err(e)))?;
            if NodeKey::from_bytes(&key_bytes)?.version() > version {
                batch.delete_cf(nodes_cf, &key_bytes);
            }
        }

        for item in self.db.iterator_cf(values_cf, IteratorMode::Start) {
            let (key_bytes, _) = item.map_err(|e| JmtError::Store(backend_err(e)))?;
            if key_bytes.len() == 40 && BigEndian::read_u64(&key_bytes[32..]) > version {
                batch.delete_cf(values_cf, &key_bytes);
            }
        }

        let mut latest_kept: Option<(u64, Hash)> = None;
        for item in self.db.iterator_cf(roots_cf, IteratorMode::Start) {
            let (key_bytes, value) = item.map_err(|e| JmtError::Store(backend_err(e)))?;
            if key_bytes.len() != 8 {
                continue;
            }
            let v = BigEndian::read_u64(&key_bytes);
            if v > version {
                batch.delete_cf(roots_cf, &key_bytes);
            } else {
                latest_kept = Some((v, as_hash(&value)?));
            }
        }
        match latest_kept {
            Some((v, root)) => {
                batch.put_cf(roots_cf, LATEST_ROOT_KEY, root);
                batch.put_cf(roots_cf, LATEST_VERSION_KEY, version_key(v));
            }
            None => {
                batch.delete_cf(roots_cf, LATEST_ROOT_KEY);
                batch.delete_cf(roots_cf, LATEST_VERSION_KEY);
            }
        }

        for item in self.db.iterator_cf(stale_cf, IteratorMode::Start) {
            let (key_bytes, _) = item.map_err(|e| JmtError::Store(backend_err(e)))?;
            if key_bytes.len() >= 8 && BigEndian::read_u64(&key_bytes[..8]) > version {
                batch.delete_cf(stale_cf, &key_bytes);
                batch.delete_cf(stale_keys_cf, &key_bytes[8..]);
            }
        }

        self.db.write(batch).map_err(|e| JmtError::Store(backend_err(e)))
    }
}

struct RocksCommitBatch<'a> {
    store: &'a RocksDbJmtStore,
    version: u64,
    batch: WriteBatch,
    root_hash: Option<Hash>,
}

impl CommitBatch for RocksCommitBatch<'_> {
    fn put_node(&mut self, node_key: &NodeKey, node: &JmtNode) -> JmtResult<()> {
        let cf = self.store.cf(CF_JMT_NODES)?;
        self.batch.put_cf(cf, node_key.to_bytes(), node.encode());
        Ok(())
    }

    fn mark_stale(&mut self, node_key: &NodeKey) -> JmtResult<()> {
        let node_key_bytes = node_key.to_bytes();
        let stale_cf = self.store.cf(CF_JMT_STALE)?;
        let stale_keys_cf = self.store.cf(CF_JMT_STALE_KEYS)?;

        let mut index_key = Vec::with_capacity(8 + node_key_bytes.len());
        index_key.extend_from_slice(&version_key(self.version));
        index_key.extend_from_slice(&node_key_bytes);
        self.batch.put_cf(stale_cf, index_key, []);
        self.batch.put_cf(stale_keys_cf, node_key_bytes, version_key(self.version));
        Ok(())
    }

    fn put_value(&mut self, key_hash: &Hash, value: &[u8]) -> JmtResult<()> {
        let cf = self.store.cf(CF_JMT_VALUES)?;
        let mut flagged = Vec::with_capacity(value.len() + 1);
        flagged.push(VALUE_PRESENT);
        flagged.extend_from_slice(value);
        self.batch.put_cf(cf, value_key(key_hash, self.version), flagged);
        Ok(())
    }

    fn delete_value(&mut self, key_hash: &Hash) -> JmtResult<()> {
        let cf = self.store.cf(CF_JMT_VALUES)?;
        self.batch.put_cf(cf, value_key(key_hash, self.version), [VALUE_TOMBSTONE]);
        Ok(())
    }

    fn set_root_hash(&mut self, root_hash: &Hash) -> JmtResult<()> {
        self.root_hash = Some(*root_hash);
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> JmtResult<()> {
        if let Some(root) = self.root_hash {
            let cf = self.store.cf(CF_JMT_ROOTS)?;
            self.batch.put_cf(cf, version_key(self.version), root);
            self.batch.put_cf(cf, LATEST_ROOT_KEY, root);
            self.batch.put_cf(cf, LATEST_VERSION_KEY, version_key(self.version));
        }
        self.store.db.write(self.batch).map_err(|e| JmtError::Store(backend_err(e)))
    }
}

fn version_key(version: u64) -> [u8; 8] {
    let mut key = [0u8; 8];
    BigEndian::write_u64(&mut key, version);
    key
}

fn value_key(key_hash: &Hash, version: u64) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..32].copy_from_slice(key_hash);
    BigEndian::write_u64(&mut key[32..], version);
    key
}

fn as_hash(bytes: &[u8]) -> JmtResult<Hash> {
    bytes.try_into().map_err(|_| JmtError::Store(StoreError::Corrupt(format!("root entry has {} bytes, expected 32", bytes.len()))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dottrie_core::hash::{Keccak256, keccak256};
    use dottrie_core::jmt::{ClassicCommitments, JellyfishMerkleTree};
    use tempfile::TempDir;

    type Tree = JellyfishMerkleTree<RocksDbJmtStore, ClassicCommitments<Keccak256>, Keccak256>;

    fn tree(dir: &TempDir) -> Tree {
        let store = RocksDbJmtStore::open(dir.path()).unwrap();
        JellyfishMerkleTree::new(store, ClassicCommitments::new(Keccak256), Keccak256)
    }

    fn puts(pairs: &[(&str, &str)]) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        pairs.iter().map(|(k, v)| (k.as_bytes().to_vec(), Some(v.as_bytes().to_vec()))).collect()
    }

    #[test]
    fn test_commit_and_read_back() {
        let dir = TempDir::new().unwrap();
        let tree = tree(&dir);
        tree.put(1, &puts(&[("key1", "value1"), ("key2", "value2")])).unwrap();
        assert_eq!(tree.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(tree.latest_version().unwrap(), Some(1));
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let root = {
            let tree = tree(&dir);
            tree.put(1, &puts(&[("durable", "yes")])).unwrap();
            tree.latest_root_hash().unwrap()
        };
        let tree = tree(&dir);
        assert_eq!(tree.latest_root_hash().unwrap(), root);
        assert_eq!(tree.get(b"durable").unwrap(), Some(b"yes".to_vec()));
    }

    #[test]
    fn test_historical_reads_and_proofs() {
        let dir = TempDir::new().unwrap();
        let tree = tree(&dir);
        tree.put(1, &puts(&[("key1", "value1-v1"), ("key2", "value2-v1")])).unwrap();
        tree.put(2, &puts(&[("key1", "value1-v2"), ("key3", "value3-v2")])).unwrap();

        assert_eq!(tree.get_at(b"key1", 1).unwrap(), Some(b"value1-v1".to_vec()));
        assert_eq!(tree.get_at(b"key1", 2).unwrap(), Some(b"value1-v2".to_vec()));
        assert_eq!(tree.get_at(b"key3", 1).unwrap(), None);

        let root_v1 = tree.root_hash(1).unwrap();
        let root_v2 = tree.root_hash(2).unwrap();
        let wire = tree.proof_wire(b"key1", 2).unwrap().unwrap();
        assert!(tree.verify_proof_wire(Some(&root_v2), b"key1", Some(b"value1-v2"), true, &wire).unwrap());
        assert!(!tree.verify_proof_wire(Some(&root_v1), b"key1", Some(b"value1-v2"), true, &wire).unwrap());
    }

    #[test]
    fn test_deletes_with_tombstones() {
        let dir = TempDir::new().unwrap();
        let tree = tree(&dir);
        tree.put(1, &puts(&[("k", "v1")])).unwrap();
        tree.put(2, &[(b"k".to_vec(), None)]).unwrap();

        assert_eq!(tree.get_at(b"k", 1).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(tree.get_at(b"k", 2).unwrap(), None);
        assert_eq!(tree.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_same_root_as_in_memory_store() {
        use dottrie_core::jmt::InMemoryJmtStore;
        let dir = TempDir::new().unwrap();
        let rocks = tree(&dir);
        let memory = JellyfishMerkleTree::new(InMemoryJmtStore::new(), ClassicCommitments::new(Keccak256), Keccak256);

        let updates = puts(&[("alpha", "1"), ("beta", "2"), ("gamma", "3")]);
        rocks.put(1, &updates).unwrap();
        memory.put(1, &updates).unwrap();
        assert_eq!(rocks.latest_root_hash().unwrap(), memory.latest_root_hash().unwrap());
    }

    #[test]
    fn test_prune_then_latest_still_readable() {
        let dir = TempDir::new().unwrap();
        let tree = tree(&dir);
        tree.put(1, &puts(&[("k", "v1")])).unwrap();
        tree.put(2, &puts(&[("k", "v2")])).unwrap();

        let report = tree.prune(2).unwrap();
        assert!(report.nodes_pruned >= 1);
        assert_eq!(tree.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn test_truncate_after_restores_earlier_state() {
        let dir = TempDir::new().unwrap();
        let tree = tree(&dir);
        tree.put(1, &puts(&[("k", "v1")])).unwrap();
        let v1_root = tree.latest_root_hash().unwrap();
        tree.put(2, &puts(&[("k", "v2"), ("extra", "x")])).unwrap();

        tree.truncate_after(1).unwrap();
        assert_eq!(tree.latest_version().unwrap(), Some(1));
        assert_eq!(tree.latest_root_hash().unwrap(), v1_root);
        assert_eq!(tree.get(b"k").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(tree.get(b"extra").unwrap(), None);
        // The tree accepts new commits after the rollback.
        tree.put(2, &puts(&[("k", "v2-again")])).unwrap();
        assert_eq!(tree.get(b"k").unwrap(), Some(b"v2-again".to_vec()));
    }

    #[test]
    fn test_value_key_layout() {
        let key_hash = keccak256(b"k");
        let key = value_key(&key_hash, 7);
        assert_eq!(&key[..32], key_hash.as_slice());
        assert_eq!(BigEndian::read_u64(&key[32..]), 7);
    }
}
