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

//! Node types for the Merkle Patricia Trie
//!
//! Nodes form a closed sum type so that encode/decode/proof sites can match
//! exhaustively:
//!
//! - `Leaf`: HP-encoded key remainder plus the stored value
//! - `Extension`: HP-encoded shared path segment plus one child digest
//! - `Branch`: sixteen child slots plus an optional in-place value
//!
//! # Wire Encoding
//!
//! The canonical encoding is CBOR: a branch is a 17-element array of byte
//! strings (16 child digests plus the value slot, empty byte string for an
//! absent entry); a leaf or extension is a 2-element array of the HP path
//! and the value-or-child byte string. A node's storage hash is always the
//! digest of this encoding.

use crate::cbor;
use crate::hash::{Hash, HashFunction};
use crate::mpt::{MptError, MptResult};
use crate::nibbles::{self, NibblePath};

/// A node in the Merkle Patricia Trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MptNode {
    /// Terminal node holding the remaining key path and the value.
    Leaf { hp: Vec<u8>, value: Vec<u8> },
    /// Path compression node pointing at a single child.
    Extension { hp: Vec<u8>, child: Hash },
    /// 16-way fan-out with an optional value for keys ending here.
    Branch {
        children: [Option<Hash>; 16],
        value: Option<Vec<u8>>,
    },
}

impl MptNode {
    /// Creates a leaf for the given nibble remainder.
    pub fn leaf(path: &[u8], value: Vec<u8>) -> Self {
        MptNode::Leaf {
            hp: nibbles::pack_hp(true, path),
            value,
        }
    }

    /// Creates an extension for the given shared nibble segment.
    pub fn extension(path: &[u8], child: Hash) -> Self {
        MptNode::Extension {
            hp: nibbles::pack_hp(false, path),
            child,
        }
    }

    /// Creates a branch node.
    pub fn branch(children: [Option<Hash>; 16], value: Option<Vec<u8>>) -> Self {
        MptNode::Branch { children, value }
    }

    /// Nibble path carried by a leaf or extension.
    pub fn path(&self) -> Option<NibblePath> {
        match self {
            MptNode::Leaf { hp, .. } | MptNode::Extension { hp, .. } => Some(NibblePath::new(nibbles::unpack_hp(hp).nibbles)),
            MptNode::Branch { .. } => None,
        }
    }

    /// Canonical CBOR encoding of this node.
    pub fn encode(&self) -> Vec<u8> {
        let value = match self {
            MptNode::Leaf { hp, value } => cbor::array(vec![cbor::bytes(hp), cbor::bytes(value)]),
            MptNode::Extension { hp, child } => cbor::array(vec![cbor::bytes(hp), cbor::bytes(child)]),
            MptNode::Branch { children, value } => {
                let mut items = Vec::with_capacity(17);
                for child in children {
                    items.push(cbor::bytes(child.as_ref().map_or(&[][..], |h| &h[..])));
                }
                items.push(cbor::bytes(value.as_deref().unwrap_or(&[])));
                cbor::array(items)
            }
        };
        cbor::to_vec(&value)
    }

    /// Decodes a node from its canonical CBOR encoding.
    pub fn decode(data: &[u8]) -> MptResult<Self> {
        let value = cbor::from_slice(data)?;
        let items = cbor::as_array(&value)?;
        match items.len() {
            17 => {
                let mut children: [Option<Hash>; 16] = [None; 16];
                for (i, slot) in items[..16].iter().enumerate() {
                    let bytes = cbor::as_bytes(slot)?;
                    if !bytes.is_empty() {
                        children[i] = Some(bytes.try_into().map_err(|_| MptError::InvalidNode(format!("branch child {i} is not a 32-byte digest")))?);
                    }
                }
                let value_bytes = cbor::as_bytes(&items[16])?;
                let value = if value_bytes.is_empty() { None } else { Some(value_bytes.to_vec()) };
                Ok(MptNode::Branch { children, value })
            }
            2 => {
                let hp = cbor::as_bytes(&items[0])?.to_vec();
                let payload = cbor::as_bytes(&items[1])?;
                if nibbles::unpack_hp(&hp).is_leaf {
                    Ok(MptNode::Leaf { hp, value: payload.to_vec() })
                } else {
                    let child: Hash = payload.try_into().map_err(|_| MptError::InvalidNode("extension child is not a 32-byte digest".to_string()))?;
                    Ok(MptNode::Extension { hp, child })
                }
            }
            n => Err(MptError::InvalidNode(format!("node array has {n} elements"))),
        }
    }

    /// Storage hash of this node: the digest of its canonical encoding.
    pub fn hash<H: HashFunction>(&self, hasher: &H) -> Hash {
        hasher.digest(&self.encode())
    }

    /// Number of populated child slots on a branch.
    pub fn branch_child_count(&self) -> usize {
        match self {
            MptNode::Branch { children, .. } => children.iter().filter(|c| c.is_some()).count(),
            _ => 0,
        }
    }

    /// Index of the first populated child slot on a branch.
    pub fn first_branch_child(&self) -> Option<usize> {
        match self {
            MptNode::Branch { children, .. } => children.iter().position(|c| c.is_some()),
            _ => None,
        }
    }
}
