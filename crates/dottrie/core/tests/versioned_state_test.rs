// End-to-end exercise of the three trie variants against the shared
// storage contracts: versioned MPT commits tracked through a RootsIndex,
// and the JMT multi-version scenario with proofs.

use dottrie_core::hash::Keccak256;
use dottrie_core::jmt::{ClassicCommitments, InMemoryJmtStore, JellyfishMerkleTree};
use dottrie_core::mpt::{self, MerklePatriciaTrie};
use dottrie_core::smt::SparseMerkleTree;
use dottrie_core::store::{InMemoryNodeStore, InMemoryRootsIndex, RootsIndex};

#[test]
fn test_mpt_versions_through_roots_index() -> Result<(), Box<dyn std::error::Error>> {
    let mut trie = MerklePatriciaTrie::new(InMemoryNodeStore::new(), Keccak256);
    let mut roots = InMemoryRootsIndex::new();

    // Version 0: two accounts.
    trie.put(b"acct/alice", b"100")?;
    trie.put(b"acct/bob", b"50")?;
    let root_v0 = trie.root_hash().expect("non-empty trie");
    roots.put(roots.next_version(), &root_v0)?;

    // Version 1: alice spends, carol appears.
    trie.put(b"acct/alice", b"75")?;
    trie.put(b"acct/carol", b"25")?;
    let root_v1 = trie.root_hash().expect("non-empty trie");
    roots.put(roots.next_version(), &root_v1)?;

    assert_eq!(roots.get(0)?, Some(root_v0));
    assert_eq!(roots.latest()?, Some(root_v1));
    assert_eq!(roots.last_version(), Some(1));

    // A proof generated now verifies against the latest recorded root
    // and fails against the older one.
    let wire = trie.proof_wire(b"acct/alice")?;
    assert!(trie.verify_proof_wire(roots.latest()?.as_ref(), b"acct/alice", Some(b"75"), true, &wire)?);
    assert!(!trie.verify_proof_wire(roots.get(0)?.as_ref(), b"acct/alice", Some(b"75"), true, &wire)?);

    // Rewinding the trie to version 0 reproduces the old state.
    trie.set_root(roots.get(0)?);
    assert_eq!(trie.get(b"acct/alice")?, Some(b"100".to_vec()));
    assert_eq!(trie.get(b"acct/carol")?, None);
    Ok(())
}

#[test]
fn test_all_tries_are_deterministic_over_the_same_data() -> Result<(), Box<dyn std::error::Error>> {
    let pairs: Vec<(Vec<u8>, Vec<u8>)> = (0u32..20).map(|i| (format!("entry-{i}").into_bytes(), format!("payload-{i}").into_bytes())).collect();

    let mut mpt_a = MerklePatriciaTrie::new(InMemoryNodeStore::new(), Keccak256);
    let mut mpt_b = MerklePatriciaTrie::new(InMemoryNodeStore::new(), Keccak256);
    let mut smt_a = SparseMerkleTree::new(InMemoryNodeStore::new(), Keccak256);
    let mut smt_b = SparseMerkleTree::new(InMemoryNodeStore::new(), Keccak256);

    for (k, v) in &pairs {
        mpt_a.put(k, v)?;
        smt_a.put(k, v)?;
    }
    for (k, v) in pairs.iter().rev() {
        mpt_b.put(k, v)?;
        smt_b.put(k, v)?;
    }

    assert_eq!(mpt_a.root_hash(), mpt_b.root_hash());
    assert_eq!(smt_a.root_hash(), smt_b.root_hash());
    // The two structures commit differently to the same data.
    assert_ne!(mpt_a.root_hash(), smt_a.root_hash());
    Ok(())
}

#[test]
fn test_jmt_point_in_time_queries_with_proofs() -> Result<(), Box<dyn std::error::Error>> {
    let tree = JellyfishMerkleTree::new(InMemoryJmtStore::new(), ClassicCommitments::new(Keccak256), Keccak256);

    tree.put(1, &[(b"key1".to_vec(), Some(b"value1-v1".to_vec())), (b"key2".to_vec(), Some(b"value2-v1".to_vec()))])?;
    tree.put(2, &[(b"key1".to_vec(), Some(b"value1-v2".to_vec())), (b"key3".to_vec(), Some(b"value3-v2".to_vec()))])?;

    assert_eq!(tree.get_at(b"key1", 1)?, Some(b"value1-v1".to_vec()));
    assert_eq!(tree.get_at(b"key1", 2)?, Some(b"value1-v2".to_vec()));
    assert_eq!(tree.get_at(b"key3", 1)?, None);
    assert_eq!(tree.get_at(b"key3", 2)?, Some(b"value3-v2".to_vec()));

    let root_v1 = tree.root_hash(1)?;
    let root_v2 = tree.root_hash(2)?;
    let wire = tree.proof_wire(b"key1", 2)?.expect("version 2 exists");
    assert!(tree.verify_proof_wire(Some(&root_v2), b"key1", Some(b"value1-v2"), true, &wire)?);
    assert!(!tree.verify_proof_wire(Some(&root_v1), b"key1", Some(b"value1-v2"), true, &wire)?);

    // Non-inclusion of key3 at version 1, inclusion at version 2.
    let absent = tree.proof_wire(b"key3", 1)?.expect("version 1 exists");
    assert!(tree.verify_proof_wire(Some(&root_v1), b"key3", None, false, &absent)?);
    let present = tree.proof_wire(b"key3", 2)?.expect("version 2 exists");
    assert!(tree.verify_proof_wire(Some(&root_v2), b"key3", Some(b"value3-v2"), true, &present)?);
    Ok(())
}

#[test]
fn test_secure_trie_interoperates_with_plain_trie_storage() -> Result<(), Box<dyn std::error::Error>> {
    let mut secure = mpt::SecureTrie::new(InMemoryNodeStore::new(), Keccak256);
    secure.put(b"spendable-utxo", b"abc")?;
    let root = secure.root_hash();

    // The wire proof verifies with the hashed key against the same root.
    let wire = secure.proof_wire(b"spendable-utxo")?;
    assert!(secure.verify_proof_wire(root.as_ref(), b"spendable-utxo", Some(b"abc"), true, &wire)?);
    Ok(())
}
