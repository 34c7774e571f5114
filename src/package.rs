//! Artifact naming and chunk configuration.
//!
//! A package is `n` block files plus one manifest, all sharing an opaque
//! base:
//!
//! ```text
//! <base>.00000000   block 0   (16-byte IV + ciphertext, no header)
//! <base>.00000001   block 1
//! ...
//! <base>.manifest   canonical JSON manifest
//! ```
//!
//! The index suffix is lowercase hex, fixed at 8 digits so plain
//! lexicographic order is reconstruction order.  The base is a random UUID,
//! never the input file name: storage peers holding blocks learn nothing
//! from the names; the original name travels only inside the manifest.

use std::path::{Path, PathBuf};

use rand::{CryptoRng, RngCore};
use uuid::Builder;

use crate::error::{PackError, Result};

/// Hex digits in the block-file index suffix.
pub const BLOCK_INDEX_WIDTH: usize = 8;
/// Extension of the manifest side-car.
pub const MANIFEST_EXT: &str = "manifest";

// ── PackageLayout ────────────────────────────────────────────────────────────

/// Where a package's artifacts live and what they are called.
#[derive(Debug, Clone)]
pub struct PackageLayout {
    dir: PathBuf,
    base: String,
}

impl PackageLayout {
    pub fn new(dir: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        Self { dir: dir.into(), base: base.into() }
    }

    /// A fresh opaque base in `dir`.  The UUID is built from the injected
    /// RNG so seeded runs name their artifacts deterministically.
    pub fn random<R: RngCore + CryptoRng>(dir: impl Into<PathBuf>, rng: &mut R) -> Self {
        let mut raw = [0u8; 16];
        rng.fill_bytes(&mut raw);
        let base = Builder::from_random_bytes(raw).into_uuid().simple().to_string();
        Self { dir: dir.into(), base }
    }

    /// Recover the layout from a manifest path: the base is the manifest's
    /// file stem, the blocks live in `block_dir`.
    pub fn from_manifest_path(manifest: &Path, block_dir: impl Into<PathBuf>) -> Result<Self> {
        let base = manifest
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PackError::InvalidInput {
                path: manifest.to_path_buf(),
                reason: "manifest path has no usable file stem".into(),
            })?;
        Ok(Self { dir: block_dir.into(), base: base.to_owned() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn block_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.{:0width$x}", self.base, index, width = BLOCK_INDEX_WIDTH))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.base, MANIFEST_EXT))
    }
}

// ── ChunkOptions ─────────────────────────────────────────────────────────────

/// Configuration for a chunk run.
#[derive(Debug, Clone, Default)]
pub struct ChunkOptions {
    /// Overwrite existing artifacts instead of failing with `AlreadyExists`.
    pub force: bool,
    /// Emit per-block events at info level instead of debug.
    pub verbose: bool,
    /// After chunking, reconstruct in memory and compare digests.
    pub verify: bool,
    /// Fixed block size instead of the randomized sizer draw.
    pub override_block_size: Option<u64>,
}

/// Everything a successful chunk run produced.
#[derive(Debug, Clone)]
pub struct Packaged {
    pub layout: PackageLayout,
    pub manifest: crate::manifest::Manifest,
}
