//! The manifest: the side-car record a package cannot be opened without.
//!
//! # Canonical JSON layout
//!
//! ```json
//! {
//!   "Name":                "report.pdf",
//!   "DateCreatedUtc":      1700000000,
//!   "DateLastModifiedUtc": 1700000001,
//!   "BlockHashes":         ["<base64, 64 bytes>", ...],
//!   "UnlockKey":           "<base64, 32 bytes>"
//! }
//! ```
//!
//! `BlockHashes` holds the *blinded* hashes in reconstruction order: each
//! entry is the SHA-512 of one encrypted block file with its first 32 bytes
//! XORed against the tails of every **other** block.  The trailing 32 bytes
//! are stored as-is.  `UnlockKey` is the random encryption key XORed with
//! the first 32 bytes of every block hash; recovering the key requires the
//! manifest *and* every block.
//!
//! Timestamps are integer Unix epoch seconds; conversion from platform
//! `SystemTime` happens only at this boundary.

use std::time::SystemTime;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PackError, Result};
use crate::xor::xor32_into;

/// Byte length of one (blinded or raw) block hash.
pub const BLOCK_HASH_LEN: usize = 64;
/// Byte length of the unlock key (AES-256 key length).
pub const UNLOCK_KEY_LEN: usize = 32;

// ── BlockHash ────────────────────────────────────────────────────────────────

/// A 64-byte SHA-512 value, raw or blinded.  Fixed width at the type level;
/// a wrong-length value cannot be constructed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BlockHash([u8; BLOCK_HASH_LEN]);

impl BlockHash {
    pub fn from_bytes(bytes: [u8; BLOCK_HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_HASH_LEN] {
        &self.0
    }

    /// First 32 bytes, the key-schedule prefix `P`.
    pub fn prefix(&self) -> [u8; 32] {
        let mut p = [0u8; 32];
        p.copy_from_slice(&self.0[..32]);
        p
    }

    /// XOR `mask` into the first 32 bytes, leaving the trailing 32 bytes
    /// untouched.  Self-inverse: the same call blinds a raw hash and
    /// un-blinds a stored one.
    pub fn masked(&self, mask: &[u8; 32]) -> Self {
        let mut head = self.prefix();
        xor32_into(&mut head, mask);
        let mut out = self.0;
        out[..32].copy_from_slice(&head);
        Self(out)
    }

    /// Short hex form for human-facing output.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl std::fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockHash({}…)", self.short_hex())
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        let bytes = BASE64.decode(&text).map_err(D::Error::custom)?;
        let arr: [u8; BLOCK_HASH_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| D::Error::custom(format!(
                "block hash must be {BLOCK_HASH_LEN} bytes, got {}", b.len(),
            )))?;
        Ok(Self(arr))
    }
}

// ── UnlockKey ────────────────────────────────────────────────────────────────

/// The 32-byte manifest-stored key `K = N ⊕ P_0 ⊕ … ⊕ P_{n-1}`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UnlockKey([u8; UNLOCK_KEY_LEN]);

impl UnlockKey {
    pub fn from_bytes(bytes: [u8; UNLOCK_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; UNLOCK_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for UnlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        write!(f, "UnlockKey(..)")
    }
}

impl Serialize for UnlockKey {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for UnlockKey {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        let bytes = BASE64.decode(&text).map_err(D::Error::custom)?;
        let arr: [u8; UNLOCK_KEY_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| D::Error::custom(format!(
                "unlock key must be {UNLOCK_KEY_LEN} bytes, got {}", b.len(),
            )))?;
        Ok(Self(arr))
    }
}

// ── Manifest ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Original file base name (artifacts themselves carry opaque names).
    #[serde(rename = "Name")]
    pub name: String,
    /// Original file creation time, Unix epoch seconds.
    #[serde(rename = "DateCreatedUtc")]
    pub created_utc: i64,
    /// Original file modification time, Unix epoch seconds.
    #[serde(rename = "DateLastModifiedUtc")]
    pub modified_utc: i64,
    /// Blinded hashes in reconstruction order.
    #[serde(rename = "BlockHashes")]
    pub block_hashes: Vec<BlockHash>,
    #[serde(rename = "UnlockKey")]
    pub unlock_key: UnlockKey,
}

impl Manifest {
    pub fn block_count(&self) -> usize {
        self.block_hashes.len()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| PackError::Manifest(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let m: Manifest =
            serde_json::from_slice(bytes).map_err(|e| PackError::Manifest(e.to_string()))?;
        if m.block_hashes.is_empty() {
            return Err(PackError::Manifest("manifest lists no blocks".into()));
        }
        Ok(m)
    }
}

/// `SystemTime` → Unix epoch seconds, at the serialization boundary only.
pub fn epoch_seconds(t: SystemTime) -> i64 {
    DateTime::<Utc>::from(t).timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest {
            name: "report.pdf".into(),
            created_utc: 1_700_000_000,
            modified_utc: 1_700_000_001,
            block_hashes: vec![
                BlockHash::from_bytes([0xAB; BLOCK_HASH_LEN]),
                BlockHash::from_bytes([0xCD; BLOCK_HASH_LEN]),
            ],
            unlock_key: UnlockKey::from_bytes([0x11; UNLOCK_KEY_LEN]),
        }
    }

    #[test]
    fn json_roundtrip_preserves_everything() {
        let m = sample();
        let json = m.to_json().unwrap();
        assert_eq!(Manifest::from_json(&json).unwrap(), m);
    }

    #[test]
    fn canonical_key_names() {
        let json = String::from_utf8(sample().to_json().unwrap()).unwrap();
        for key in ["Name", "DateCreatedUtc", "DateLastModifiedUtc", "BlockHashes", "UnlockKey"] {
            assert!(json.contains(&format!("\"{key}\"")), "missing key {key}");
        }
    }

    #[test]
    fn wrong_length_hash_rejected() {
        let short = BASE64.encode([0u8; 63]);
        let json = format!(
            "{{\"Name\":\"x\",\"DateCreatedUtc\":0,\"DateLastModifiedUtc\":0,\
             \"BlockHashes\":[\"{short}\"],\"UnlockKey\":\"{}\"}}",
            BASE64.encode([0u8; UNLOCK_KEY_LEN]),
        );
        assert!(matches!(
            Manifest::from_json(json.as_bytes()),
            Err(PackError::Manifest(_))
        ));
    }

    #[test]
    fn empty_block_list_rejected() {
        let json = format!(
            "{{\"Name\":\"x\",\"DateCreatedUtc\":0,\"DateLastModifiedUtc\":0,\
             \"BlockHashes\":[],\"UnlockKey\":\"{}\"}}",
            BASE64.encode([0u8; UNLOCK_KEY_LEN]),
        );
        assert!(matches!(
            Manifest::from_json(json.as_bytes()),
            Err(PackError::Manifest(_))
        ));
    }

    #[test]
    fn masking_is_self_inverse_and_leaves_tail() {
        let h = BlockHash::from_bytes(std::array::from_fn(|i| i as u8));
        let mask = [0x5Au8; 32];
        let blinded = h.masked(&mask);
        assert_ne!(blinded, h);
        assert_eq!(&blinded.as_bytes()[32..], &h.as_bytes()[32..]);
        assert_eq!(blinded.masked(&mask), h);
    }
}
