//! Crate-wide error surface.
//!
//! Every failure is a typed value; nothing in the core panics on bad input
//! or uses errors for control flow.  I/O errors always carry the path they
//! occurred on.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Error, Debug)]
pub enum PackError {
    /// Input file missing, empty, or unreadable.
    #[error("invalid input {path}: {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// An output artifact is already present and `force` was not set.
    #[error("artifact already exists: {0} (use force to overwrite)")]
    AlreadyExists(PathBuf),

    /// Two byte sequences that must be equal-length were not.
    #[error("length mismatch: left is {left} bytes, right is {right}")]
    SizeMismatch { left: usize, right: usize },

    /// A block's recomputed SHA-512 disagrees with its un-blinded manifest
    /// hash.  Indicates a missing/tampered block, a tampered manifest, or a
    /// mismatched block/manifest pairing.
    #[error("block {index} failed hash verification")]
    IntegrityFailure { index: usize },

    /// Cipher-level failure: bad padding, short IV, ragged ciphertext.
    /// Indicative of a wrong key (incomplete artifact set) or corruption.
    #[error("decryption failed: {0}")]
    Decryption(CryptoError),

    /// Post-chunk self-verification did not reproduce the input stream.
    #[error("verification failed: reconstructed stream does not match input")]
    VerifyFailed,

    /// Underlying storage failure, with the path it happened on.
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    /// The caller requested cancellation mid-operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The manifest could not be encoded or decoded.
    #[error("manifest error: {0}")]
    Manifest(String),
}

impl PackError {
    /// Attach path context to a raw I/O error.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PackError::Io { path: path.into(), source }
    }

    /// Map a cipher-stream error: I/O inside the stream is storage trouble,
    /// everything else is a decryption failure.
    pub fn from_crypto(path: impl Into<PathBuf>, err: CryptoError) -> Self {
        match err {
            CryptoError::Io(source) => PackError::Io { path: path.into(), source },
            other => PackError::Decryption(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PackError>;
