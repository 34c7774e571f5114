//! # tanglepack: entangled file packager
//!
//! Splits one file into independently stored, encrypted block files plus a
//! separate manifest.  The artifacts are mutually entangled:
//!
//! - Blocks alone reveal nothing: no name, no length, no chunk count, no
//!   key.  A block file is a 16-byte IV followed by AES-256-CBC ciphertext;
//!   no magic, no header, no length prefix.
//! - The manifest alone reveals nothing: its unlock key is the encryption
//!   key XORed with the first 32 bytes of every block's SHA-512, and each
//!   stored block hash is blinded by the tails of every *other* block.
//! - All artifacts together reconstruct the original bit for bit.
//!
//! Format invariants (frozen):
//! - Block hash = SHA-512 of the encrypted block file, all 64 bytes.
//! - Blinding XORs the 32-byte tail mask into the **first** 32 bytes of the
//!   hash; the trailing 32 bytes are stored untouched.
//! - One AES-256 key per package, one fresh random IV per block file.
//! - Block files sort lexicographically into reconstruction order
//!   (`<base>.00000000`, `<base>.00000001`, …, `<base>.manifest`).
//! - The manifest is written last; whoever observes it may rely on every
//!   block already existing.
//!
//! The ciphertext carries no MAC; integrity comes from the mandatory
//! un-blinded SHA-512 check during reconstruction, which holds only while
//! manifest and blocks are presented together.

pub mod cancel;
pub mod chunker;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod package;
pub mod sizer;
pub mod unchunker;
pub mod xor;

// Flat re-exports for the most common types.
pub use cancel::CancelToken;
pub use chunker::{chunk, chunk_with_rng};
pub use crypto::CryptoError;
pub use error::{PackError, Result};
pub use manifest::{BlockHash, Manifest, UnlockKey};
pub use package::{ChunkOptions, PackageLayout, Packaged};
pub use sizer::{Sizer, MAX_BLOCK, MIN_BLOCK};
pub use unchunker::{unchunk, verify_package};
