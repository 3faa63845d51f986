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

//! Jellyfish Merkle Tree proofs
//!
//! A proof records one [`BranchStep`] per internal-node hop from the root
//! towards the key (prefix consumed, the full 16-slot sibling digests,
//! and the selected child index), terminating in a leaf comparison. Three
//! outcomes exist: inclusion, a missing branch, or a leaf with a
//! different key.
//!
//! The classic wire format is a CBOR array of encoded nodes: one internal
//! node per branch step, then the terminal leaf when one exists.
//! Verification replays the wire top-down to assign depths, recomputes
//! digests bottom-up through the commitment scheme, and compares against
//! the expected root. Structural violations (trailing nodes after a
//! terminal, undecodable nodes) fail fast as [`JmtError::MalformedProof`];
//! a proof that merely does not recompute returns `false`.

use crate::cbor;
use crate::hash::{Hash, HashFunction};
use crate::jmt::commitment::CommitmentScheme;
use crate::jmt::types::JmtNode;
use crate::jmt::{JmtError, JmtResult};
use crate::nibbles::NibblePath;

/// One internal-node hop in a proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchStep {
    /// Nibbles consumed before this node.
    pub prefix: NibblePath,
    /// Full 16-slot child digests (absent slots are `None`).
    pub children: [Option<Hash>; 16],
    /// Child index the search descended into.
    pub child_index: u8,
}

/// What a JMT proof attests to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JmtProofKind {
    /// The key is present.
    Inclusion {
        /// The raw value when available to the prover.
        value: Option<Vec<u8>>,
        value_hash: Hash,
        /// Key-path nibbles below the leaf's position.
        suffix: NibblePath,
        key_hash: Hash,
    },
    /// The search fell off the tree at a missing branch.
    NonInclusionEmpty,
    /// The search reached a leaf for a different key.
    NonInclusionDifferentLeaf { key_hash: Hash, value_hash: Hash, suffix: NibblePath },
}

/// Proof for one key at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JmtProof {
    pub kind: JmtProofKind,
    pub steps: Vec<BranchStep>,
}

impl JmtProof {
    pub fn inclusion(steps: Vec<BranchStep>, value: Option<Vec<u8>>, value_hash: Hash, suffix: NibblePath, key_hash: Hash) -> Self {
        Self {
            kind: JmtProofKind::Inclusion {
                value,
                value_hash,
                suffix,
                key_hash,
            },
            steps,
        }
    }

    pub fn non_inclusion_empty(steps: Vec<BranchStep>) -> Self {
        Self {
            kind: JmtProofKind::NonInclusionEmpty,
            steps,
        }
    }

    pub fn non_inclusion_different_leaf(steps: Vec<BranchStep>, key_hash: Hash, value_hash: Hash, suffix: NibblePath) -> Self {
        Self {
            kind: JmtProofKind::NonInclusionDifferentLeaf { key_hash, value_hash, suffix },
            steps,
        }
    }

    /// True if the proof crosses more than one internal level.
    pub fn is_multi_level(&self) -> bool {
        self.steps.len() >= 2
    }
}

/// Encodes a proof as the classic wire format: a CBOR array of encoded
/// nodes, branch steps first, then the terminal leaf when present.
pub fn to_wire(proof: &JmtProof) -> Vec<u8> {
    let mut items = Vec::with_capacity(proof.steps.len() + 1);
    for step in &proof.steps {
        items.push(cbor::bytes(&JmtNode::internal_from_full(&step.children).encode()));
    }
    match &proof.kind {
        JmtProofKind::Inclusion { value_hash, key_hash, .. } => {
            items.push(cbor::bytes(&JmtNode::leaf(*key_hash, *value_hash).encode()));
        }
        JmtProofKind::NonInclusionDifferentLeaf { key_hash, value_hash, .. } => {
            items.push(cbor::bytes(&JmtNode::leaf(*key_hash, *value_hash).encode()));
        }
        JmtProofKind::NonInclusionEmpty => {}
    }
    cbor::to_vec(&cbor::array(items))
}

/// Verifies a classic wire proof.
///
/// With `including` set, the proof must demonstrate that `key` maps to
/// `value`; otherwise it must demonstrate absence. Structurally invalid
/// wire raises [`JmtError::MalformedProof`]; everything else resolves to
/// a boolean verdict.
pub fn verify_wire<H: HashFunction, C: CommitmentScheme>(
    expected_root: Option<&Hash>,
    hasher: &H,
    commitments: &C,
    key: &[u8],
    value: Option<&[u8]>,
    including: bool,
    wire: &[u8],
) -> JmtResult<bool> {
    let nodes = decode_wire(wire)?;
    let key_hash = hasher.digest(key);
    let key_path = NibblePath::from_bytes(&key_hash);

    // Forward pass: assign a depth to every internal node and find the
    // terminal condition. A step that terminates the search must be the
    // final wire element.
    let mut internal_depths = vec![0usize; nodes.len()];
    let mut depth = 0usize;
    let last = nodes.len().saturating_sub(1);
    let mut terminal_leaf: Option<(Hash, Hash)> = None;
    let mut terminal_missing = false;

    for (i, node) in nodes.iter().enumerate() {
        match node {
            JmtNode::Internal { bitmap, .. } => {
                internal_depths[i] = depth;
                let nibble = if depth < key_path.len() { key_path.get(depth) } else { 0 };
                if (bitmap >> nibble) & 1 == 0 {
                    if i != last {
                        return Err(JmtError::MalformedProof("nodes follow a missing-branch terminal".to_string()));
                    }
                    terminal_missing = true;
                    break;
                }
                depth += 1;
            }
            JmtNode::Leaf { key_hash: lk, value_hash: lv } => {
                if i != last {
                    return Err(JmtError::MalformedProof("nodes follow a terminal leaf".to_string()));
                }
                terminal_leaf = Some((*lk, *lv));
                break;
            }
        }
    }

    // Recompute the terminal digest.
    let mut computed: Option<Hash> = match terminal_leaf {
        Some((leaf_key, leaf_value_hash)) => {
            if including {
                let Some(value) = value else {
                    return Ok(false);
                };
                if leaf_key != key_hash {
                    return Ok(false);
                }
                let value_hash = hasher.digest(value);
                if value_hash != leaf_value_hash {
                    return Ok(false);
                }
                Some(commitments.commit_leaf(&key_path.suffix(depth), &value_hash))
            } else {
                if leaf_key == key_hash {
                    return Ok(false);
                }
                let leaf_path = NibblePath::from_bytes(&leaf_key);
                Some(commitments.commit_leaf(&leaf_path.suffix(depth), &leaf_value_hash))
            }
        }
        None => {
            let _ = terminal_missing;
            None
        }
    };

    // Ascend through the internal nodes in reverse, grafting the computed
    // child digest into the traversed slot.
    for (i, node) in nodes.iter().enumerate().rev() {
        let JmtNode::Internal { .. } = node else {
            continue;
        };
        let node_depth = internal_depths[i];
        let nibble = if node_depth < key_path.len() { key_path.get(node_depth) } else { 0 };
        let mut full = node.expanded_children();
        full[nibble as usize] = computed;
        computed = Some(commitments.commit_branch(&key_path.prefix(node_depth), &full));
    }

    let null = commitments.null_hash();
    let recomputed = computed.unwrap_or(null);
    let expected = expected_root.copied().unwrap_or(null);
    Ok(recomputed == expected)
}

fn decode_wire(wire: &[u8]) -> JmtResult<Vec<JmtNode>> {
    let value = cbor::from_slice(wire).map_err(|e| JmtError::MalformedProof(e.0))?;
    let items = cbor::as_array(&value).map_err(|e| JmtError::MalformedProof(e.0))?;
    items
        .iter()
        .map(|item| {
            let bytes = cbor::as_bytes(item).map_err(|e| JmtError::MalformedProof(e.0))?;
            JmtNode::decode(bytes).map_err(|e| JmtError::MalformedProof(e.to_string()))
        })
        .collect()
}
