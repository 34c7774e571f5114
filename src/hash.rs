//! SHA-512 over byte slices and whole streams.
//!
//! Hashes are opaque 64-byte values; there are no endian concerns.  The
//! stream form never loads more than one read buffer at a time, so hashing
//! a multi-gigabyte block file stays in bounded memory.

use std::io::{self, Read};

use sha2::{Digest, Sha512};

/// Byte length of a SHA-512 digest.
pub const DIGEST_LEN: usize = 64;

/// Read-buffer size for stream hashing.
const HASH_BUF: usize = 64 * 1024;

/// SHA-512 of an in-memory byte slice.
pub fn sha512(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&Sha512::digest(bytes));
    out
}

/// SHA-512 of everything `reader` yields until EOF.
pub fn sha512_stream<R: Read>(reader: &mut R) -> io::Result<[u8; DIGEST_LEN]> {
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; HASH_BUF];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    Ok(out)
}
