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

//! Core value types for the Jellyfish Merkle Tree
//!
//! [`NodeKey`] identifies a node by its logical position (nibble path)
//! and the version that created it; ordering is by path then version so
//! that iteration over a sorted key space yields deterministic batches and
//! a floor lookup on `(path, version)` finds the newest node at or below
//! a target version.
//!
//! [`JmtNode`] is the closed node sum type: an internal node stores up to
//! 16 child digests compactly behind an existence bitmap; a leaf stores
//! the hashed key and the hashed value.

use crate::cbor;
use crate::hash::Hash;
use crate::jmt::{JmtError, JmtResult};
use crate::nibbles::NibblePath;
use std::fmt;

const TAG_INTERNAL: u64 = 0;
const TAG_LEAF: u64 = 1;

/// Identifies a node by position and creating version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    path: NibblePath,
    version: u64,
}

impl NodeKey {
    pub fn new(path: NibblePath, version: u64) -> Self {
        Self { path, version }
    }

    /// Root key for a given version.
    pub fn root(version: u64) -> Self {
        Self::new(NibblePath::empty(), version)
    }

    pub fn path(&self) -> &NibblePath {
        &self.path
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Byte encoding whose raw lexicographic order equals the logical
    /// `(path, version)` order: each nibble shifted up by one, a zero
    /// terminator, then the big-endian version. The terminator sorts
    /// below every shifted nibble, so a shorter path precedes all of its
    /// extensions regardless of version bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.path.len() + 9);
        for nibble in self.path.nibbles() {
            out.push(nibble + 1);
        }
        out.push(0x00);
        out.extend_from_slice(&self.version.to_be_bytes());
        out
    }

    /// Parses the encoding produced by [`Self::to_bytes`].
    pub fn from_bytes(data: &[u8]) -> JmtResult<Self> {
        let Some(terminator) = data.iter().position(|b| *b == 0x00) else {
            return Err(JmtError::InvalidNode("node key missing terminator".to_string()));
        };
        if data.len() != terminator + 1 + 8 {
            return Err(JmtError::InvalidNode(format!("node key has {} trailing bytes, expected 8", data.len() - terminator - 1)));
        }
        let mut nibbles = Vec::with_capacity(terminator);
        for byte in &data[..terminator] {
            if *byte == 0 || *byte > 0x10 {
                return Err(JmtError::InvalidNode(format!("invalid node key nibble byte {byte:#x}")));
            }
            nibbles.push(byte - 1);
        }
        let mut version_bytes = [0u8; 8];
        version_bytes.copy_from_slice(&data[terminator + 1..]);
        Ok(Self {
            path: NibblePath::new(nibbles),
            version: u64::from_be_bytes(version_bytes),
        })
    }
}

impl PartialOrd for NodeKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.cmp(&other.path).then(self.version.cmp(&other.version))
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, v{})", self.path, self.version)
    }
}

/// Marks a node as superseded starting at a version; consumed by pruning.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StaleNodeIndex {
    pub stale_since_version: u64,
    pub node_key: NodeKey,
}

impl StaleNodeIndex {
    pub fn new(stale_since_version: u64, node_key: NodeKey) -> Self {
        Self { stale_since_version, node_key }
    }
}

impl PartialOrd for StaleNodeIndex {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StaleNodeIndex {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.stale_since_version.cmp(&other.stale_since_version).then_with(|| self.node_key.cmp(&other.node_key))
    }
}

/// A node in the Jellyfish Merkle Tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JmtNode {
    /// Radix-16 internal node: existence bitmap plus the digests of the
    /// present children in nibble order.
    Internal { bitmap: u16, children: Vec<Hash> },
    /// Terminal node: hashed key and hashed value.
    Leaf { key_hash: Hash, value_hash: Hash },
}

impl JmtNode {
    pub fn leaf(key_hash: Hash, value_hash: Hash) -> Self {
        JmtNode::Leaf { key_hash, value_hash }
    }

    /// Builds an internal node from a full 16-slot child array.
    pub fn internal_from_full(full: &[Option<Hash>; 16]) -> Self {
        let mut bitmap = 0u16;
        let mut children = Vec::new();
        for (nibble, child) in full.iter().enumerate() {
            if let Some(hash) = child {
                bitmap |= 1 << nibble;
                children.push(*hash);
            }
        }
        JmtNode::Internal { bitmap, children }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, JmtNode::Leaf { .. })
    }

    /// Expands an internal node's compact child list to 16 slots.
    /// Returns all-empty slots for a leaf.
    pub fn expanded_children(&self) -> [Option<Hash>; 16] {
        let mut full: [Option<Hash>; 16] = [None; 16];
        if let JmtNode::Internal { bitmap, children } = self {
            let mut index = 0;
            for (nibble, slot) in full.iter_mut().enumerate() {
                if bitmap & (1 << nibble) != 0 {
                    if let Some(hash) = children.get(index) {
                        *slot = Some(*hash);
                    }
                    index += 1;
                }
            }
        }
        full
    }

    /// Canonical CBOR encoding: `[0, bitmap, [child...]]` for internal
    /// nodes, `[1, key_hash, value_hash]` for leaves.
    pub fn encode(&self) -> Vec<u8> {
        let value = match self {
            JmtNode::Internal { bitmap, children } => {
                let child_items = children.iter().map(|h| cbor::bytes(h)).collect();
                cbor::array(vec![cbor::uint(TAG_INTERNAL), cbor::uint(u64::from(*bitmap)), cbor::array(child_items)])
            }
            JmtNode::Leaf { key_hash, value_hash } => cbor::array(vec![cbor::uint(TAG_LEAF), cbor::bytes(key_hash), cbor::bytes(value_hash)]),
        };
        cbor::to_vec(&value)
    }

    /// Decodes a node from its canonical encoding.
    pub fn decode(data: &[u8]) -> JmtResult<Self> {
        let value = cbor::from_slice(data)?;
        let items = cbor::as_array(&value)?;
        if items.len() != 3 {
            return Err(JmtError::InvalidNode(format!("node array has {} elements", items.len())));
        }
        match cbor::as_uint(&items[0])? {
            TAG_INTERNAL => {
                let bitmap = cbor::as_uint(&items[1])?;
                let bitmap = u16::try_from(bitmap).map_err(|_| JmtError::InvalidNode(format!("bitmap {bitmap:#x} exceeds 16 bits")))?;
                let child_items = cbor::as_array(&items[2])?;
                if child_items.len() != bitmap.count_ones() as usize {
                    return Err(JmtError::InvalidNode(format!(
                        "bitmap declares {} children, encoding carries {}",
                        bitmap.count_ones(),
                        child_items.len()
                    )));
                }
                let children = child_items.iter().map(cbor::as_hash).collect::<Result<Vec<_>, _>>()?;
                Ok(JmtNode::Internal { bitmap, children })
            }
            TAG_LEAF => Ok(JmtNode::Leaf {
                key_hash: cbor::as_hash(&items[1])?,
                value_hash: cbor::as_hash(&items[2])?,
            }),
            tag => Err(JmtError::InvalidNode(format!("unknown node tag {tag}"))),
        }
    }
}
