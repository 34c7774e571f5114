//! Entanglement properties: every artifact is load-bearing.  Remove or
//! tamper with any one of them and reconstruction must fail as a typed
//! error, never as silently corrupted plaintext.

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tanglepack::manifest::{BlockHash, Manifest, UnlockKey};
use tanglepack::package::ChunkOptions;
use tanglepack::{chunker, unchunker, CancelToken, PackError, Packaged};
use tempfile::TempDir;

/// Deterministic 4-block fixture: 1 MiB + 123 bytes at a fixed 256 KiB
/// block size.
fn make_package(seed: u64) -> (TempDir, Packaged, Vec<u8>) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.bin");
    let mut data = vec![0u8; 1024 * 1024 + 123];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    fs::write(&input, &data).unwrap();

    let opts = ChunkOptions {
        override_block_size: Some(256 * 1024),
        ..ChunkOptions::default()
    };
    let packaged = chunker::chunk_with_rng(
        &input,
        dir.path(),
        &opts,
        &CancelToken::new(),
        &mut StdRng::seed_from_u64(seed ^ 0xDEAD),
    )
    .unwrap();
    assert_eq!(packaged.manifest.block_count(), 4);
    (dir, packaged, data)
}

fn try_unchunk(dir: &Path, packaged: &Packaged) -> (PathBuf, Result<(), PackError>) {
    let output = dir.join("reconstructed.bin");
    let res = unchunker::unchunk(
        &packaged.layout.manifest_path(),
        dir,
        &output,
        false,
        &CancelToken::new(),
    );
    (output, res)
}

fn rewrite_manifest(packaged: &Packaged, manifest: &Manifest) {
    fs::write(packaged.layout.manifest_path(), manifest.to_json().unwrap()).unwrap();
}

#[test]
fn missing_block_fails_with_no_output() {
    let (dir, packaged, _data) = make_package(1);
    fs::remove_file(packaged.layout.block_path(0)).unwrap();

    let (output, res) = try_unchunk(dir.path(), &packaged);
    assert!(matches!(res, Err(PackError::InvalidInput { .. })));
    assert!(!output.exists());
}

#[test]
fn missing_middle_block_fails_too() {
    let (dir, packaged, _data) = make_package(2);
    fs::remove_file(packaged.layout.block_path(2)).unwrap();

    let (output, res) = try_unchunk(dir.path(), &packaged);
    assert!(res.is_err());
    assert!(!output.exists());
}

#[test]
fn tampered_tail_poisons_every_hash() {
    let (dir, packaged, _data) = make_package(3);

    // Flip one byte inside the 32-byte tail of block 1.  The combined tail
    // mask changes, so un-blinding goes wrong for every block; the first
    // verification (index 0) already fails.
    let path = packaged.layout.block_path(1);
    let mut bytes = fs::read(&path).unwrap();
    let at = bytes.len() - 16;
    bytes[at] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    let (output, res) = try_unchunk(dir.path(), &packaged);
    assert!(matches!(res, Err(PackError::IntegrityFailure { index: 0 })));
    assert!(!output.exists());
}

#[test]
fn tampered_block_body_names_the_block() {
    let (dir, packaged, _data) = make_package(4);

    // Flip one bit in the middle of block 1, far from the tail.  Tails are
    // unchanged, so un-blinding still works and the check lands exactly on
    // the damaged block.
    let path = packaged.layout.block_path(1);
    let mut bytes = fs::read(&path).unwrap();
    let at = bytes.len() / 2;
    bytes[at] ^= 0x10;
    fs::write(&path, &bytes).unwrap();

    let (output, res) = try_unchunk(dir.path(), &packaged);
    assert!(matches!(res, Err(PackError::IntegrityFailure { index: 1 })));
    assert!(!output.exists());
}

#[test]
fn truncated_block_fails_verification() {
    let (dir, packaged, _data) = make_package(5);

    let path = packaged.layout.block_path(3);
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 64]).unwrap();

    let (output, res) = try_unchunk(dir.path(), &packaged);
    assert!(matches!(res, Err(PackError::IntegrityFailure { .. })));
    assert!(!output.exists());
}

#[test]
fn tampered_manifest_hash_is_caught() {
    let (dir, packaged, _data) = make_package(6);

    let mut manifest = packaged.manifest.clone();
    let mut raw = *manifest.block_hashes[1].as_bytes();
    raw[7] ^= 0x80;
    manifest.block_hashes[1] = BlockHash::from_bytes(raw);
    rewrite_manifest(&packaged, &manifest);

    let (output, res) = try_unchunk(dir.path(), &packaged);
    assert!(matches!(res, Err(PackError::IntegrityFailure { index: 1 })));
    assert!(!output.exists());
}

#[test]
fn tampered_manifest_hash_tail_is_caught() {
    let (dir, packaged, _data) = make_package(7);

    // The trailing 32 bytes of a stored hash are unblinded; a flip there
    // must still fail verification of that block.
    let mut manifest = packaged.manifest.clone();
    let mut raw = *manifest.block_hashes[2].as_bytes();
    raw[50] ^= 0x04;
    manifest.block_hashes[2] = BlockHash::from_bytes(raw);
    rewrite_manifest(&packaged, &manifest);

    let (output, res) = try_unchunk(dir.path(), &packaged);
    assert!(matches!(res, Err(PackError::IntegrityFailure { index: 2 })));
    assert!(!output.exists());
}

#[test]
fn tampered_unlock_key_cannot_reconstruct() {
    let (dir, packaged, data) = make_package(8);

    let mut manifest = packaged.manifest.clone();
    let mut raw = *manifest.unlock_key.as_bytes();
    raw[0] ^= 0x01;
    manifest.unlock_key = UnlockKey::from_bytes(raw);
    rewrite_manifest(&packaged, &manifest);

    // Block hashes still verify; the key is wrong, so decryption fails
    // with overwhelming probability.  A freak padding coincidence may let
    // it "succeed", but the plaintext can never match.
    let (output, res) = try_unchunk(dir.path(), &packaged);
    match res {
        Err(PackError::Decryption(_)) => assert!(!output.exists()),
        Err(other) => panic!("unexpected error kind: {other}"),
        Ok(()) => assert_ne!(fs::read(&output).unwrap(), data),
    }
}

#[test]
fn swapped_blocks_fail_verification() {
    let (dir, packaged, _data) = make_package(9);

    // Exchange block files 1 and 2: tails and the combined mask are
    // unchanged as a set, but each file no longer matches its manifest slot.
    let p1 = packaged.layout.block_path(1);
    let p2 = packaged.layout.block_path(2);
    let b1 = fs::read(&p1).unwrap();
    let b2 = fs::read(&p2).unwrap();
    fs::write(&p1, &b2).unwrap();
    fs::write(&p2, &b1).unwrap();

    let (output, res) = try_unchunk(dir.path(), &packaged);
    assert!(matches!(res, Err(PackError::IntegrityFailure { .. })));
    assert!(!output.exists());
}

#[test]
fn foreign_manifest_does_not_open_blocks() {
    // Two packages from different inputs; graft package B's manifest onto
    // package A's blocks (under A's base name).  Association must fail.
    let (dir_a, packaged_a, _data_a) = make_package(10);
    let (_dir_b, packaged_b, _data_b) = make_package(11);

    rewrite_manifest(&packaged_a, &packaged_b.manifest);

    let (output, res) = try_unchunk(dir_a.path(), &packaged_a);
    assert!(matches!(res, Err(PackError::IntegrityFailure { .. })));
    assert!(!output.exists());
}
