//! Unchunk engine: manifest + block files back into the original file.
//!
//! # Recovery order
//!
//! 1. Read the last 32 bytes (the tail `T_i`) of every block file.
//! 2. Un-blind each manifest hash: `H_i = H'_i ⊕ (⊕_j T_j ⊕ T_i)` over the
//!    first 32 bytes.
//! 3. Recompute SHA-512 of every block file and compare against `H_i`
//!    (mandatory); a mismatch names the offending index.
//! 4. Recover the nonce key: `N = K ⊕ P_0 ⊕ … ⊕ P_{n-1}`.
//! 5. Stream-decrypt the blocks in manifest order into the output.
//!
//! Steps 1–4 need every block file and the manifest; removing any single
//! artifact breaks the chain before a byte of plaintext exists.  A partial
//! output file is deleted on any error after step 5 begins.

use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha512};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::crypto::{self, KEY_LEN};
use crate::error::{PackError, Result};
use crate::hash::{self, DIGEST_LEN};
use crate::manifest::Manifest;
use crate::package::PackageLayout;
use crate::xor::xor32_into;

/// Tail length read from the end of each encrypted block.
const TAIL_LEN: u64 = 32;

/// Reconstruct the packaged file described by `manifest_path` into
/// `output`, looking the blocks up in `block_dir`.
pub fn unchunk(
    manifest_path: &Path,
    block_dir: &Path,
    output: &Path,
    force: bool,
    cancel: &CancelToken,
) -> Result<()> {
    let manifest = read_manifest(manifest_path)?;
    let layout = PackageLayout::from_manifest_path(manifest_path, block_dir)?;

    if output.exists() && !force {
        return Err(PackError::AlreadyExists(output.to_path_buf()));
    }

    info!(
        base = layout.base(),
        blocks = manifest.block_count(),
        output = %output.display(),
        "unchunking"
    );

    let nonce_key = recover_nonce_key(&manifest, &layout, cancel)?;

    let out = File::create(output).map_err(|e| PackError::io(output, e))?;
    let mut guard = OutputGuard::new(output.to_path_buf());
    let mut dst = BufWriter::new(out);
    let written = stream_blocks(&manifest, &layout, &nonce_key, &mut dst, cancel)?;
    dst.flush().map_err(|e| PackError::io(output, e))?;

    guard.disarm();
    info!(written, "reconstruction complete");
    Ok(())
}

/// Run the full unchunk pipeline into a hashing sink and return the
/// SHA-512 of the reconstructed stream.  No output file is produced;
/// this backs both the chunker's self-verification and `tangle verify`.
pub fn verify_package(
    manifest_path: &Path,
    block_dir: &Path,
    cancel: &CancelToken,
) -> Result<[u8; DIGEST_LEN]> {
    let manifest = read_manifest(manifest_path)?;
    let layout = PackageLayout::from_manifest_path(manifest_path, block_dir)?;
    reconstruct_digest(&manifest, &layout, cancel)
}

/// [`verify_package`] against an in-memory manifest and layout.
pub fn reconstruct_digest(
    manifest: &Manifest,
    layout: &PackageLayout,
    cancel: &CancelToken,
) -> Result<[u8; DIGEST_LEN]> {
    let nonce_key = recover_nonce_key(manifest, layout, cancel)?;
    let mut sink = DigestSink::new();
    stream_blocks(manifest, layout, &nonce_key, &mut sink, cancel)?;
    Ok(sink.finish())
}

// ── Recovery pipeline ────────────────────────────────────────────────────────

fn read_manifest(path: &Path) -> Result<Manifest> {
    let bytes = fs::read(path).map_err(|e| PackError::InvalidInput {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Manifest::from_json(&bytes)
}

/// Steps 1–4: tails, un-blinding, mandatory hash verification, nonce
/// recovery.  Needs every block file to be present and untouched.
fn recover_nonce_key(
    manifest: &Manifest,
    layout: &PackageLayout,
    cancel: &CancelToken,
) -> Result<[u8; KEY_LEN]> {
    let count = manifest.block_count();

    // 1. Tails of every block, then the combined mask.
    let mut tails: Vec<[u8; 32]> = Vec::with_capacity(count);
    for index in 0..count {
        cancel.check()?;
        tails.push(read_tail(&layout.block_path(index))?);
    }
    let mut total_mask = [0u8; 32];
    for t in &tails {
        xor32_into(&mut total_mask, t);
    }

    // 2–3. Un-blind and verify each block hash.
    let mut nonce_key = *manifest.unlock_key.as_bytes();
    for (index, (blinded, tail)) in manifest.block_hashes.iter().zip(&tails).enumerate() {
        cancel.check()?;
        let mut mask = total_mask;
        xor32_into(&mut mask, tail);
        let expected = blinded.masked(&mask);

        let path = layout.block_path(index);
        let mut reader = File::open(&path).map_err(|e| PackError::io(&path, e))?;
        let actual = hash::sha512_stream(&mut reader).map_err(|e| PackError::io(&path, e))?;
        if actual != *expected.as_bytes() {
            return Err(PackError::IntegrityFailure { index });
        }
        debug!(index, hash = %expected.short_hex(), "block verified");

        // 4. Fold P_i into K as we go; what remains is N.
        xor32_into(&mut nonce_key, &expected.prefix());
    }

    Ok(nonce_key)
}

/// Step 5: decrypt every block in manifest order into `dst`.
fn stream_blocks<W: Write>(
    manifest: &Manifest,
    layout: &PackageLayout,
    nonce_key: &[u8; KEY_LEN],
    dst: &mut W,
    cancel: &CancelToken,
) -> Result<u64> {
    let mut written = 0u64;
    for index in 0..manifest.block_count() {
        cancel.check()?;
        let path = layout.block_path(index);
        let mut src = File::open(&path).map_err(|e| PackError::io(&path, e))?;
        let n = crypto::decrypt_stream(&mut src, nonce_key, dst)
            .map_err(|e| PackError::from_crypto(&path, e))?;
        debug!(index, plaintext_bytes = n, "block decrypted");
        written += n;
    }
    Ok(written)
}

/// Last `TAIL_LEN` bytes of a block file.
fn read_tail(path: &Path) -> Result<[u8; 32]> {
    let ctx = |e: io::Error| PackError::io(path, e);
    let mut f = File::open(path).map_err(|e| PackError::InvalidInput {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let len = f.metadata().map_err(ctx)?.len();
    if len < TAIL_LEN {
        return Err(PackError::InvalidInput {
            path: path.to_path_buf(),
            reason: format!("block file is {len} bytes, shorter than its {TAIL_LEN}-byte tail"),
        });
    }
    f.seek(SeekFrom::End(-(TAIL_LEN as i64))).map_err(ctx)?;
    let mut tail = [0u8; 32];
    io::Read::read_exact(&mut f, &mut tail).map_err(ctx)?;
    Ok(tail)
}

// ── Sinks and guards ─────────────────────────────────────────────────────────

/// Write sink that folds SHA-512 and discards the bytes.
struct DigestSink {
    hasher: Sha512,
}

impl DigestSink {
    fn new() -> Self {
        Self { hasher: Sha512::new() }
    }

    fn finish(self) -> [u8; DIGEST_LEN] {
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&self.hasher.finalize());
        out
    }
}

impl Write for DigestSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Deletes the partially-written output file on drop unless disarmed.
struct OutputGuard {
    path: PathBuf,
    armed: bool,
}

impl OutputGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}
