//! Chunk engine: one plaintext file in, encrypted blocks + entangled
//! manifest out.
//!
//! # Pipeline
//!
//! ```text
//! input ──► Sizer ──► encrypt_stream ──► block file
//!                          │
//!                          └─► SHA-512 + tail fold (single pass, tee writer)
//! ```
//!
//! Every block is encrypted under one random nonce key `N` with a fresh IV.
//! Hashing happens on the *ciphertext* as it is written, so each block is
//! read once and written once regardless of size.  After the last block:
//!
//! - unlock key `K = N ⊕ P_0 ⊕ … ⊕ P_{n-1}` (`P_i` = first 32 bytes of hash)
//! - each manifest hash is blinded with the XOR of all *other* block tails
//! - the manifest is written **last**, so any observer holding a manifest
//!   can rely on every block already being on disk
//!
//! Any failure (I/O, cancellation, failed self-verification) removes every
//! artifact this invocation created (best effort) before the error surfaces.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::crypto;
use crate::error::{PackError, Result};
use crate::hash;
use crate::manifest::{epoch_seconds, BlockHash, Manifest, UnlockKey};
use crate::package::{ChunkOptions, PackageLayout, Packaged};
use crate::sizer::Sizer;
use crate::unchunker;
use crate::xor::{xor32, xor32_into};

/// Chunk `input` into encrypted blocks plus a manifest under `output_dir`.
///
/// Key and IV material comes from the operating system RNG.  See
/// [`chunk_with_rng`] for the seedable form.
pub fn chunk(
    input: &Path,
    output_dir: &Path,
    opts: &ChunkOptions,
    cancel: &CancelToken,
) -> Result<Packaged> {
    chunk_with_rng(input, output_dir, opts, cancel, &mut OsRng)
}

/// [`chunk`] with caller-supplied randomness.
///
/// All entropy (nonce key, IVs, block sizing, the opaque artifact base)
/// flows from `rng`, so a seeded generator reproduces a package bit for bit.
pub fn chunk_with_rng<R: RngCore + CryptoRng>(
    input: &Path,
    output_dir: &Path,
    opts: &ChunkOptions,
    cancel: &CancelToken,
    rng: &mut R,
) -> Result<Packaged> {
    let (total, created_utc, modified_utc) = inspect_input(input)?;
    if !output_dir.is_dir() {
        return Err(PackError::InvalidInput {
            path: output_dir.to_path_buf(),
            reason: "output directory does not exist".into(),
        });
    }

    let layout = PackageLayout::random(output_dir, rng);
    let manifest_path = layout.manifest_path();
    if manifest_path.exists() && !opts.force {
        return Err(PackError::AlreadyExists(manifest_path));
    }

    info!(input = %input.display(), total, base = layout.base(), "chunking");

    let nonce_key = crypto::random_key(rng);
    let mut unlock = nonce_key; // K starts at N, folds in every P_i
    let sizer = Sizer::new(total, opts.override_block_size);

    let mut src = File::open(input).map_err(|e| PackError::InvalidInput {
        path: input.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut guard = CleanupGuard::new();
    let mut hashes: Vec<BlockHash> = Vec::new();
    let mut tails: Vec<[u8; 32]> = Vec::new();
    let mut remaining = total;
    let mut index = 0usize;

    while remaining > 0 {
        cancel.check()?;

        let len = sizer.next_len(rng, remaining);
        let path = layout.block_path(index);
        if path.exists() && !opts.force {
            return Err(PackError::AlreadyExists(path));
        }

        let iv = crypto::random_iv(rng);
        let out = File::create(&path).map_err(|e| PackError::io(&path, e))?;
        guard.track(path.clone());

        let mut sink = TailHashWriter::new(BufWriter::new(out));
        let mut taker = (&mut src).take(len);
        let consumed = crypto::encrypt_stream(&mut taker, &nonce_key, &iv, &mut sink)
            .map_err(|e| PackError::from_crypto(&path, e))?;
        if consumed != len {
            return Err(PackError::InvalidInput {
                path: input.to_path_buf(),
                reason: format!("input ended early: block {index} wanted {len} bytes, got {consumed}"),
            });
        }
        let (digest, tail, written) = sink.finish().map_err(|e| PackError::io(&path, e))?;

        let hash = BlockHash::from_bytes(digest);
        xor32_into(&mut unlock, &hash.prefix());
        if opts.verbose {
            info!(index, len, written, hash = %hash.short_hex(), "block written");
        } else {
            debug!(index, len, written, hash = %hash.short_hex(), "block written");
        }

        hashes.push(hash);
        tails.push(tail);
        remaining -= len;
        index += 1;
    }

    // Blinding barrier: needs the tails of every block.
    let mut total_mask = [0u8; 32];
    for t in &tails {
        xor32_into(&mut total_mask, t);
    }
    let block_hashes: Vec<BlockHash> = hashes
        .iter()
        .zip(&tails)
        .map(|(h, t)| h.masked(&xor32(&total_mask, t)))
        .collect();

    let manifest = Manifest {
        name: input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".into()),
        created_utc,
        modified_utc,
        block_hashes,
        unlock_key: UnlockKey::from_bytes(unlock),
    };

    if opts.verify {
        cancel.check()?;
        let mut reader = File::open(input).map_err(|e| PackError::io(input, e))?;
        let expected = hash::sha512_stream(&mut reader).map_err(|e| PackError::io(input, e))?;
        let actual = unchunker::reconstruct_digest(&manifest, &layout, cancel)?;
        if actual != expected {
            return Err(PackError::VerifyFailed);
        }
        debug!("self-verification passed");
    }

    // Manifest last: a reader that sees it can rely on every block existing.
    guard.track(manifest_path.clone());
    fs::write(&manifest_path, manifest.to_json()?)
        .map_err(|e| PackError::io(&manifest_path, e))?;

    guard.disarm();
    info!(blocks = index, base = layout.base(), "package complete");
    Ok(Packaged { layout, manifest })
}

/// Validate the input file and pull its timestamps.
fn inspect_input(input: &Path) -> Result<(u64, i64, i64)> {
    let invalid = |reason: String| PackError::InvalidInput {
        path: input.to_path_buf(),
        reason,
    };
    let meta = fs::metadata(input).map_err(|e| invalid(e.to_string()))?;
    if !meta.is_file() {
        return Err(invalid("not a regular file".into()));
    }
    if meta.len() == 0 {
        return Err(invalid("input file is empty".into()));
    }
    let modified = meta.modified().map(epoch_seconds).unwrap_or(0);
    let created = meta.created().map(epoch_seconds).unwrap_or(modified);
    Ok((meta.len(), created, modified))
}

// ── TailHashWriter ───────────────────────────────────────────────────────────

/// Write tee: forwards bytes to the inner writer while folding SHA-512 and
/// keeping the most recent 32 bytes.  One pass gives the block hash `H` and
/// the tail `T` without re-reading the file.
struct TailHashWriter<W: Write> {
    inner: W,
    hasher: Sha512,
    tail: [u8; 32],
    written: u64,
}

impl<W: Write> TailHashWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, hasher: Sha512::new(), tail: [0u8; 32], written: 0 }
    }

    /// Flush and return `(sha512, tail, bytes_written)`.
    fn finish(mut self) -> io::Result<([u8; hash::DIGEST_LEN], [u8; 32], u64)> {
        self.inner.flush()?;
        let mut digest = [0u8; hash::DIGEST_LEN];
        digest.copy_from_slice(&self.hasher.finalize());
        Ok((digest, self.tail, self.written))
    }
}

impl<W: Write> Write for TailHashWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        let seen = &buf[..n];
        self.hasher.update(seen);
        if seen.len() >= 32 {
            self.tail.copy_from_slice(&seen[seen.len() - 32..]);
        } else {
            // Slide the window: keep the old tail's end, append the new bytes.
            let keep = 32 - seen.len();
            self.tail.copy_within(seen.len().., 0);
            self.tail[keep..].copy_from_slice(seen);
        }
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ── CleanupGuard ─────────────────────────────────────────────────────────────

/// Deletes every tracked artifact on drop unless disarmed.  Keeps the output
/// directory clean on any error or cancellation path.
struct CleanupGuard {
    paths: Vec<PathBuf>,
    armed: bool,
}

impl CleanupGuard {
    fn new() -> Self {
        Self { paths: Vec::new(), armed: true }
    }

    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for path in &self.paths {
            // Best effort; the error is already on its way to the caller.
            let _ = fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_window_tracks_last_32_bytes() {
        let mut sink = TailHashWriter::new(Vec::new());
        let data: Vec<u8> = (0u8..=255).collect();
        // Uneven write sizes to exercise the sliding path.
        sink.write_all(&data[..7]).unwrap();
        sink.write_all(&data[7..40]).unwrap();
        sink.write_all(&data[40..41]).unwrap();
        sink.write_all(&data[41..]).unwrap();
        let (digest, tail, written) = sink.finish().unwrap();
        assert_eq!(written, 256);
        assert_eq!(&tail[..], &data[256 - 32..]);
        assert_eq!(digest, hash::sha512(&data));
    }

    #[test]
    fn tail_window_handles_tiny_total() {
        let mut sink = TailHashWriter::new(Vec::new());
        sink.write_all(&[0xAA; 5]).unwrap();
        let (_, tail, written) = sink.finish().unwrap();
        assert_eq!(written, 5);
        assert_eq!(&tail[27..], &[0xAA; 5]);
    }

    #[test]
    fn cleanup_guard_removes_tracked_files() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep");
        let lose = dir.path().join("lose");
        fs::write(&keep, b"k").unwrap();
        fs::write(&lose, b"l").unwrap();
        {
            let mut g = CleanupGuard::new();
            g.track(lose.clone());
        }
        assert!(keep.exists());
        assert!(!lose.exists());
    }

    #[test]
    fn disarmed_guard_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("artifact");
        fs::write(&p, b"x").unwrap();
        {
            let mut g = CleanupGuard::new();
            g.track(p.clone());
            g.disarm();
        }
        assert!(p.exists());
    }
}
