//! Merkle proofs for the Patricia trie
//!
//! A proof is the ordered list of encoded nodes touched while searching
//! for a key, root first, tagged with the outcome the search reached:
//! inclusion, a missing branch, or a leaf with a diverging key suffix.
//! The wire format is a CBOR array of byte strings, one per node.
//!
//! Verification is pure: it replays the authentication path against an
//! expected root, checking at every step that the node bytes hash to the
//! digest referenced by the parent and that no non-terminal step claims to
//! be the last one. The latter rejects both truncated and padded proofs.

use crate::cbor;
use crate::hash::{Hash, HashFunction};
use crate::mpt::node::MptNode;
use crate::mpt::{MptError, MptResult, Value};
use crate::nibbles;

/// Outcome a proof attests to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MptProofKind {
    /// The key is present with the attached value.
    Inclusion,
    /// The search fell off the trie at a missing branch or path mismatch.
    NonInclusionMissingBranch,
    /// The search reached a leaf whose key suffix diverges.
    NonInclusionDifferentLeaf,
}

/// A node-list proof bound to the root it was generated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerklePatriciaProof {
    /// What the proof demonstrates.
    pub kind: MptProofKind,
    /// The proven value for inclusion proofs.
    pub value: Option<Value>,
    /// Encoded nodes from root to terminal node.
    pub nodes: Vec<Vec<u8>>,
    /// Root the proof was generated against (`None` for the empty trie).
    pub root: Option<Hash>,
}

impl MerklePatriciaProof {
    /// Encodes the node list as the classic CBOR wire format.
    pub fn to_wire(&self) -> Vec<u8> {
        nodes_to_wire(&self.nodes)
    }
}

/// Encodes proof nodes as a CBOR array of byte strings, root first.
pub fn nodes_to_wire(nodes: &[Vec<u8>]) -> Vec<u8> {
    let items = nodes.iter().map(|n| cbor::bytes(n)).collect();
    cbor::to_vec(&cbor::array(items))
}

/// Decodes a classic wire proof back into its node list.
pub fn wire_to_nodes(wire: &[u8]) -> MptResult<Vec<Vec<u8>>> {
    let value = cbor::from_slice(wire).map_err(|e| MptError::MalformedProof(e.0))?;
    let items = cbor::as_array(&value).map_err(|e| MptError::MalformedProof(e.0))?;
    items
        .iter()
        .map(|item| cbor::as_bytes(item).map(<[u8]>::to_vec).map_err(|e| MptError::MalformedProof(e.0)))
        .collect()
}

/// Verifies that `proof_nodes` demonstrate `key -> value` under `root`.
pub fn verify_inclusion<H: HashFunction>(root: Option<&Hash>, hasher: &H, key: &[u8], value: &[u8], proof_nodes: &[Vec<u8>]) -> bool {
    match evaluate(root, hasher, key, proof_nodes) {
        Some((MptProofKind::Inclusion, Some(proven))) => proven == value,
        _ => false,
    }
}

/// Verifies that `proof_nodes` demonstrate the absence of `key` under
/// `root`.
pub fn verify_non_inclusion<H: HashFunction>(root: Option<&Hash>, hasher: &H, key: &[u8], proof_nodes: &[Vec<u8>]) -> bool {
    matches!(
        evaluate(root, hasher, key, proof_nodes),
        Some((MptProofKind::NonInclusionMissingBranch | MptProofKind::NonInclusionDifferentLeaf, _))
    )
}

/// Verifies a classic wire proof.
///
/// Malformed wire (bytes that do not parse as a CBOR array of byte
/// strings) is an error; a well-formed proof that does not check out
/// returns `Ok(false)`.
pub fn verify_wire<H: HashFunction>(root: Option<&Hash>, hasher: &H, key: &[u8], value: Option<&[u8]>, including: bool, wire: &[u8]) -> MptResult<bool> {
    let nodes = wire_to_nodes(wire)?;
    Ok(if including {
        match value {
            Some(value) => verify_inclusion(root, hasher, key, value, &nodes),
            None => false,
        }
    } else {
        verify_non_inclusion(root, hasher, key, &nodes)
    })
}

/// Replays the authentication path. Returns `None` for an invalid proof,
/// or the outcome and proven value.
fn evaluate<H: HashFunction>(root: Option<&Hash>, hasher: &H, key: &[u8], proof_nodes: &[Vec<u8>]) -> Option<(MptProofKind, Option<Value>)> {
    let Some(root) = root else {
        // Empty trie: the only valid proof is the empty node list.
        return if proof_nodes.is_empty() {
            Some((MptProofKind::NonInclusionMissingBranch, None))
        } else {
            None
        };
    };
    if proof_nodes.is_empty() {
        return None;
    }

    let key_nibbles = nibbles::bytes_to_nibbles(key);
    let mut position = 0usize;
    let mut expected = *root;
    let last = proof_nodes.len() - 1;

    for (idx, node_bytes) in proof_nodes.iter().enumerate() {
        if hasher.digest(node_bytes) != expected {
            return None;
        }
        let node = MptNode::decode(node_bytes).ok()?;

        match node {
            MptNode::Branch { children, value } => {
                if position == key_nibbles.len() {
                    if idx != last {
                        return None;
                    }
                    return Some(match value {
                        Some(v) => (MptProofKind::Inclusion, Some(v)),
                        None => (MptProofKind::NonInclusionMissingBranch, None),
                    });
                }
                let nib = key_nibbles[position] as usize;
                match children[nib] {
                    None => {
                        if idx != last {
                            return None;
                        }
                        return Some((MptProofKind::NonInclusionMissingBranch, None));
                    }
                    Some(child) => {
                        expected = child;
                        position += 1;
                        if idx == last {
                            // A followed branch must not be the final step.
                            return None;
                        }
                    }
                }
            }
            MptNode::Leaf { hp, value } => {
                if idx != last {
                    return None;
                }
                let leaf_path = nibbles::unpack_hp(&hp).nibbles;
                if leaf_path == key_nibbles[position..] {
                    return Some((MptProofKind::Inclusion, Some(value)));
                }
                return Some((MptProofKind::NonInclusionDifferentLeaf, None));
            }
            MptNode::Extension { hp, child } => {
                let ext_path = nibbles::unpack_hp(&hp).nibbles;
                let rest = &key_nibbles[position..];
                if rest.len() < ext_path.len() || rest[..ext_path.len()] != ext_path[..] {
                    if idx != last {
                        return None;
                    }
                    return Some((MptProofKind::NonInclusionMissingBranch, None));
                }
                position += ext_path.len();
                expected = child;
                if idx == last {
                    return None;
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Keccak256;
    use crate::mpt::trie::MerklePatriciaTrie;

    fn sample_trie() -> MerklePatriciaTrie<crate::store::InMemoryNodeStore, Keccak256> {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        trie.put(b"key1", b"value1").unwrap();
        trie.put(b"key2", b"value2").unwrap();
        trie.put(b"other", b"value3").unwrap();
        trie
    }

    #[test]
    fn test_inclusion_proof_verifies() {
        let trie = sample_trie();
        let proof = trie.get_proof(b"key1").unwrap();
        assert_eq!(proof.kind, MptProofKind::Inclusion);
        assert_eq!(proof.value, Some(b"value1".to_vec()));
        assert!(verify_inclusion(trie.root_hash().as_ref(), trie.hasher(), b"key1", b"value1", &proof.nodes));
    }

    #[test]
    fn test_inclusion_proof_rejects_wrong_value() {
        let trie = sample_trie();
        let proof = trie.get_proof(b"key1").unwrap();
        assert!(!verify_inclusion(trie.root_hash().as_ref(), trie.hasher(), b"key1", b"wrong", &proof.nodes));
    }

    #[test]
    fn test_inclusion_proof_rejects_wrong_root() {
        let trie = sample_trie();
        let proof = trie.get_proof(b"key1").unwrap();
        let wrong_root = crate::hash::keccak256(b"wrong-root");
        assert!(!verify_inclusion(Some(&wrong_root), trie.hasher(), b"key1", b"value1", &proof.nodes));
    }

    #[test]
    fn test_non_inclusion_missing_branch() {
        let trie = sample_trie();
        let proof = trie.get_proof(b"absent-key").unwrap();
        assert_ne!(proof.kind, MptProofKind::Inclusion);
        assert!(verify_non_inclusion(trie.root_hash().as_ref(), trie.hasher(), b"absent-key", &proof.nodes));
        // The same proof must not pass as an inclusion of any value.
        assert!(!verify_inclusion(trie.root_hash().as_ref(), trie.hasher(), b"absent-key", b"x", &proof.nodes));
    }

    #[test]
    fn test_non_inclusion_different_leaf() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        trie.put(b"shared-prefix-aa", b"1").unwrap();
        // A key diverging below the stored leaf's path produces a
        // different-leaf witness.
        let proof = trie.get_proof(b"shared-prefix-ab").unwrap();
        assert_eq!(proof.kind, MptProofKind::NonInclusionDifferentLeaf);
        assert!(verify_non_inclusion(trie.root_hash().as_ref(), trie.hasher(), b"shared-prefix-ab", &proof.nodes));
    }

    #[test]
    fn test_single_byte_mutation_invalidates() {
        let trie = sample_trie();
        let proof = trie.get_proof(b"key1").unwrap();
        for node_idx in 0..proof.nodes.len() {
            let mut tampered = proof.nodes.clone();
            let byte_idx = tampered[node_idx].len() / 2;
            tampered[node_idx][byte_idx] ^= 0x01;
            assert!(
                !verify_inclusion(trie.root_hash().as_ref(), trie.hasher(), b"key1", b"value1", &tampered),
                "mutation in node {node_idx} was not detected"
            );
        }
    }

    #[test]
    fn test_truncated_proof_rejected() {
        let trie = sample_trie();
        let proof = trie.get_proof(b"key1").unwrap();
        if proof.nodes.len() > 1 {
            let truncated = proof.nodes[..proof.nodes.len() - 1].to_vec();
            assert!(!verify_inclusion(trie.root_hash().as_ref(), trie.hasher(), b"key1", b"value1", &truncated));
        }
    }

    #[test]
    fn test_padded_proof_rejected() {
        let trie = sample_trie();
        let mut proof = trie.get_proof(b"key1").unwrap();
        proof.nodes.push(MptNode::leaf(&[1], b"junk".to_vec()).encode());
        assert!(!verify_inclusion(trie.root_hash().as_ref(), trie.hasher(), b"key1", b"value1", &proof.nodes));
    }

    #[test]
    fn test_empty_trie_proof() {
        let trie = MerklePatriciaTrie::new_in_memory();
        let proof = trie.get_proof(b"anything").unwrap();
        assert!(proof.nodes.is_empty());
        assert!(verify_non_inclusion(None, trie.hasher(), b"anything", &proof.nodes));
        // A non-empty node list against an empty root is invalid.
        let junk = vec![MptNode::leaf(&[1], b"x".to_vec()).encode()];
        assert!(!verify_non_inclusion(None, trie.hasher(), b"anything", &junk));
    }

    #[test]
    fn test_wire_round_trip() {
        let trie = sample_trie();
        let wire = trie.proof_wire(b"key2").unwrap();
        assert!(trie.verify_proof_wire(trie.root_hash().as_ref(), b"key2", Some(b"value2"), true, &wire).unwrap());
        assert!(!trie.verify_proof_wire(trie.root_hash().as_ref(), b"key2", Some(b"value1"), true, &wire).unwrap());
        assert!(!trie.verify_proof_wire(trie.root_hash().as_ref(), b"key2", None, false, &wire).unwrap());
    }

    #[test]
    fn test_malformed_wire_is_an_error() {
        let trie = sample_trie();
        let result = trie.verify_proof_wire(trie.root_hash().as_ref(), b"key1", Some(b"value1"), true, b"\xffgarbage");
        assert!(matches!(result, Err(MptError::MalformedProof(_))));
    }

    #[test]
    fn test_proof_verifies_against_historical_root() {
        let mut trie = MerklePatriciaTrie::new_in_memory();
        trie.put(b"key1", b"v1").unwrap();
        let old_root = trie.root_hash();
        let old_proof = trie.get_proof(b"key1").unwrap();

        trie.put(b"key1", b"v2").unwrap();
        let new_root = trie.root_hash();

        // Old proof verifies against the old root only.
        assert!(verify_inclusion(old_root.as_ref(), trie.hasher(), b"key1", b"v1", &old_proof.nodes));
        assert!(!verify_inclusion(new_root.as_ref(), trie.hasher(), b"key1", b"v1", &old_proof.nodes));
    }
}
