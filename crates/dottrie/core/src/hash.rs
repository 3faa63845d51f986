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

//! Pluggable hash function abstraction
//!
//! Every trie in this crate hashes node encodings (and, for the secure
//! variants, keys and values) through the [`HashFunction`] trait instead of
//! a hard-coded digest, so deployments can swap the algorithm without
//! touching trie code. The default is Keccak-256.

use sha3::{Digest, Keccak256 as Keccak256Hasher};

/// 32-byte digest used throughout the tries.
///
/// Node identifiers, root commitments, and hashed keys are all values of
/// this type.
pub type Hash = [u8; 32];

/// A one-way digest over arbitrary bytes.
///
/// Implementations must be deterministic: equal input always produces an
/// equal digest. The trait is object-safe so stores and verifiers can hold
/// `&dyn HashFunction` where generics are inconvenient.
pub trait HashFunction: Send + Sync {
    /// Computes the 32-byte digest of `data`.
    fn digest(&self, data: &[u8]) -> Hash;
}

/// Keccak-256 hash function, the default for all tries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Keccak256;

impl HashFunction for Keccak256 {
    fn digest(&self, data: &[u8]) -> Hash {
        keccak256(data)
    }
}

impl<T: HashFunction + ?Sized> HashFunction for &T {
    fn digest(&self, data: &[u8]) -> Hash {
        (**self).digest(data)
    }
}

/// Calculate the Keccak-256 hash of the input data.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256Hasher::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_determinism() {
        let hasher = Keccak256;
        assert_eq!(hasher.digest(b"dottrie"), hasher.digest(b"dottrie"));
        assert_ne!(hasher.digest(b"dottrie"), hasher.digest(b"dottrie!"));
    }

    #[test]
    fn test_digest_of_empty_input() {
        let hasher = Keccak256;
        // Keccak-256 of the empty string is a well-known constant.
        assert_eq!(hex::encode(hasher.digest(&[])), "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");
    }

    #[test]
    fn test_trait_object_usage() {
        let hasher: &dyn HashFunction = &Keccak256;
        assert_eq!(hasher.digest(b"x"), keccak256(b"x"));
    }
}
