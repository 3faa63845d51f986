//! Sparse Merkle proofs and their verifier
//!
//! An SMT proof always carries exactly 256 sibling digests, one per depth,
//! root to leaf. Inclusion attaches the stored value; non-inclusion
//! terminates in the canonical empty-leaf digest. Verification recomputes
//! bit-by-bit from the leaf up and compares against the claimed root,
//! which is normalized to the empty-tree constant when absent.

use crate::hash::{Hash, HashFunction};
use crate::smt::node::{EmptyDigests, SmtNode, TREE_DEPTH, bit_at};

/// What an SMT proof attests to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtProofKind {
    /// The key is present with the attached value.
    Inclusion,
    /// The key's slot is empty at the leaf level.
    NonInclusionEmpty,
}

/// A sibling-path proof for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseMerkleProof {
    /// What the proof demonstrates.
    pub kind: SmtProofKind,
    /// One sibling digest per depth, index 0 nearest the root.
    pub siblings: Vec<Hash>,
    /// The proven value for inclusion proofs.
    pub value: Option<Vec<u8>>,
}

impl SparseMerkleProof {
    pub fn inclusion(siblings: Vec<Hash>, value: Vec<u8>) -> Self {
        Self {
            kind: SmtProofKind::Inclusion,
            siblings,
            value: Some(value),
        }
    }

    pub fn non_inclusion(siblings: Vec<Hash>) -> Self {
        Self {
            kind: SmtProofKind::NonInclusionEmpty,
            siblings,
            value: None,
        }
    }
}

/// Verifies an SMT proof against an expected root.
///
/// `expected_value` of `Some` demands an inclusion proof of exactly that
/// value; `None` demands a non-inclusion proof. Returns `false` for any
/// mismatch, including a wrong sibling count.
pub fn verify<H: HashFunction>(root: Option<&Hash>, hasher: &H, empty: &EmptyDigests, key: &[u8], expected_value: Option<&[u8]>, proof: &SparseMerkleProof) -> bool {
    if proof.siblings.len() != TREE_DEPTH {
        return false;
    }

    let key_hash = hasher.digest(key);
    let leaf_digest = match (expected_value, proof.kind, proof.value.as_deref()) {
        (Some(expected), SmtProofKind::Inclusion, Some(value)) => {
            if expected != value {
                return false;
            }
            SmtNode::Leaf {
                key_hash,
                value: value.to_vec(),
            }
            .hash(hasher)
        }
        (None, SmtProofKind::NonInclusionEmpty, None) => *empty.at(TREE_DEPTH),
        _ => return false,
    };

    let mut current = leaf_digest;
    for depth in (0..TREE_DEPTH).rev() {
        let sibling = proof.siblings[depth];
        let (left, right) = if bit_at(&key_hash, depth) == 0 { (current, sibling) } else { (sibling, current) };
        current = SmtNode::Internal { left, right }.hash(hasher);
    }

    let expected_root = root.copied().unwrap_or(*empty.empty_root());
    current == expected_root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::tree::SparseMerkleTree;

    #[test]
    fn test_inclusion_proof_verifies() {
        let mut tree = SparseMerkleTree::new_in_memory();
        tree.put(b"key", b"value").unwrap();
        tree.put(b"noise", b"other").unwrap();

        let proof = tree.get_proof(b"key").unwrap();
        assert_eq!(proof.kind, SmtProofKind::Inclusion);
        let root = tree.root_hash();
        assert!(verify(root.as_ref(), tree.hasher(), tree.empty_digests(), b"key", Some(b"value"), &proof));
        assert!(!verify(root.as_ref(), tree.hasher(), tree.empty_digests(), b"key", Some(b"wrong"), &proof));
        assert!(!verify(root.as_ref(), tree.hasher(), tree.empty_digests(), b"key", None, &proof));
    }

    #[test]
    fn test_non_inclusion_proof_verifies() {
        let mut tree = SparseMerkleTree::new_in_memory();
        tree.put(b"present", b"value").unwrap();

        let proof = tree.get_proof(b"absent").unwrap();
        assert_eq!(proof.kind, SmtProofKind::NonInclusionEmpty);
        let root = tree.root_hash();
        assert!(verify(root.as_ref(), tree.hasher(), tree.empty_digests(), b"absent", None, &proof));
        // Must not pass as inclusion of any value.
        assert!(!verify(root.as_ref(), tree.hasher(), tree.empty_digests(), b"absent", Some(b"x"), &proof));
    }

    #[test]
    fn test_empty_tree_non_inclusion() {
        let tree = SparseMerkleTree::new_in_memory();
        let proof = tree.get_proof(b"anything").unwrap();
        assert!(verify(None, tree.hasher(), tree.empty_digests(), b"anything", None, &proof));
    }

    #[test]
    fn test_tampered_sibling_rejected() {
        let mut tree = SparseMerkleTree::new_in_memory();
        tree.put(b"key", b"value").unwrap();
        let mut proof = tree.get_proof(b"key").unwrap();
        proof.siblings[128][0] ^= 0x01;
        assert!(!verify(tree.root_hash().as_ref(), tree.hasher(), tree.empty_digests(), b"key", Some(b"value"), &proof));
    }

    #[test]
    fn test_wrong_root_rejected() {
        let mut tree = SparseMerkleTree::new_in_memory();
        tree.put(b"key", b"value").unwrap();
        let proof = tree.get_proof(b"key").unwrap();
        let mut wrong = tree.root_hash().unwrap();
        wrong[0] ^= 0xff;
        assert!(!verify(Some(&wrong), tree.hasher(), tree.empty_digests(), b"key", Some(b"value"), &proof));
    }

    #[test]
    fn test_short_sibling_array_rejected() {
        let mut tree = SparseMerkleTree::new_in_memory();
        tree.put(b"key", b"value").unwrap();
        let mut proof = tree.get_proof(b"key").unwrap();
        proof.siblings.pop();
        assert!(!verify(tree.root_hash().as_ref(), tree.hasher(), tree.empty_digests(), b"key", Some(b"value"), &proof));
    }

    #[test]
    fn test_proof_after_delete_is_non_inclusion() {
        let mut tree = SparseMerkleTree::new_in_memory();
        tree.put(b"a", b"1").unwrap();
        tree.put(b"b", b"2").unwrap();
        tree.delete(b"a").unwrap();

        let proof = tree.get_proof(b"a").unwrap();
        assert_eq!(proof.kind, SmtProofKind::NonInclusionEmpty);
        assert!(verify(tree.root_hash().as_ref(), tree.hasher(), tree.empty_digests(), b"a", None, &proof));
    }
}
