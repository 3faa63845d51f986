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

//! Secure trie: key-hashing wrapper over the Merkle Patricia Trie
//!
//! `SecureTrie` hashes every key through the trie's hash function before
//! insertion, which prevents adversarially chosen keys from degenerating
//! the trie shape and keeps the key space uniformly distributed. This is
//! an external-compatibility mode for wire-compatible implementations that
//! always operate on hashed keys.
//!
//! The trade-off is that prefix relationships between original keys are
//! destroyed: `scan_by_prefix` operates on the hashed key space and is
//! provided for API parity only.

use crate::hash::{Hash, HashFunction};
use crate::mpt::trie::MerklePatriciaTrie;
use crate::mpt::{Key, MptResult, Value};
use crate::store::NodeStore;

/// API-identical trie that hashes keys before every operation.
pub struct SecureTrie<S: NodeStore, H: HashFunction + Clone> {
    inner: MerklePatriciaTrie<S, H>,
    hasher: H,
}

impl<S: NodeStore, H: HashFunction + Clone> SecureTrie<S, H> {
    /// Creates an empty secure trie.
    pub fn new(storage: S, hasher: H) -> Self {
        Self {
            inner: MerklePatriciaTrie::new(storage, hasher.clone()),
            hasher,
        }
    }

    /// Opens a secure trie at an existing root.
    pub fn with_root(storage: S, hasher: H, root: Option<Hash>) -> Self {
        Self {
            inner: MerklePatriciaTrie::with_root(storage, hasher.clone(), root),
            hasher,
        }
    }

    /// Current root commitment.
    pub fn root_hash(&self) -> Option<Hash> {
        self.inner.root_hash()
    }

    /// Repoints the trie at another root.
    pub fn set_root(&mut self, root: Option<Hash>) {
        self.inner.set_root(root);
    }

    /// Stores a key-value pair; the key is hashed before storage.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> MptResult<()> {
        self.inner.put(&self.hasher.digest(key), value)
    }

    /// Retrieves the value stored under the original key.
    pub fn get(&self, key: &[u8]) -> MptResult<Option<Value>> {
        self.inner.get(&self.hasher.digest(key))
    }

    /// Removes a key-value pair; absent keys are a no-op.
    pub fn delete(&mut self, key: &[u8]) -> MptResult<()> {
        self.inner.delete(&self.hasher.digest(key))
    }

    /// Scans the hashed key space. Of limited use since hashing destroys
    /// prefix relationships; provided for API parity.
    pub fn scan_by_prefix(&self, prefix: &[u8], limit: usize) -> MptResult<Vec<(Key, Value)>> {
        self.inner.scan_by_prefix(&self.hasher.digest(prefix), limit)
    }

    /// Classic wire proof in the hashed key space.
    pub fn proof_wire(&self, key: &[u8]) -> MptResult<Vec<u8>> {
        self.inner.proof_wire(&self.hasher.digest(key))
    }

    /// Verifies a wire proof produced by [`Self::proof_wire`].
    pub fn verify_proof_wire(&self, expected_root: Option<&Hash>, key: &[u8], value: Option<&[u8]>, including: bool, wire: &[u8]) -> MptResult<bool> {
        self.inner.verify_proof_wire(expected_root, &self.hasher.digest(key), value, including, wire)
    }

    /// Consumes the wrapper, returning the inner trie.
    pub fn into_inner(self) -> MerklePatriciaTrie<S, H> {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Keccak256;
    use crate::store::InMemoryNodeStore;

    fn secure_trie() -> SecureTrie<InMemoryNodeStore, Keccak256> {
        SecureTrie::new(InMemoryNodeStore::new(), Keccak256)
    }

    #[test]
    fn test_round_trip() {
        let mut trie = secure_trie();
        trie.put(b"account123", b"balance=5").unwrap();
        assert_eq!(trie.get(b"account123").unwrap(), Some(b"balance=5".to_vec()));
        trie.delete(b"account123").unwrap();
        assert_eq!(trie.get(b"account123").unwrap(), None);
    }

    #[test]
    fn test_keys_are_stored_hashed() {
        let mut trie = secure_trie();
        trie.put(b"plain", b"value").unwrap();
        let inner = trie.into_inner();
        // The raw key is not present in the trie; its hash is.
        assert_eq!(inner.get(b"plain").unwrap(), None);
        assert_eq!(inner.get(&Keccak256.digest(b"plain")).unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn test_same_root_as_prehashed_inserts() {
        let hasher = Keccak256;
        let mut secure = secure_trie();
        let mut plain = crate::mpt::trie::MerklePatriciaTrie::new_in_memory();

        for i in 0u32..8 {
            let key = format!("key-{i}");
            secure.put(key.as_bytes(), b"v").unwrap();
            plain.put(&hasher.digest(key.as_bytes()), b"v").unwrap();
        }
        assert_eq!(secure.root_hash(), plain.root_hash());
    }

    #[test]
    fn test_wire_proofs() {
        let mut trie = secure_trie();
        trie.put(b"k", b"v").unwrap();
        let wire = trie.proof_wire(b"k").unwrap();
        let root = trie.root_hash();
        assert!(trie.verify_proof_wire(root.as_ref(), b"k", Some(b"v"), true, &wire).unwrap());
        let absent = trie.proof_wire(b"missing").unwrap();
        assert!(trie.verify_proof_wire(root.as_ref(), b"missing", None, false, &absent).unwrap());
    }
}
