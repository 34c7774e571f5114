//! AES-256-CBC encryption with PKCS#7 padding: the block cipher of the
//! package format.
//!
//! Block file layout: `[ IV (16 B) | CBC ciphertext, PKCS#7 padded ]`
//!
//! One key encrypts every block of a package; each block file gets its own
//! random IV, stored as the file's first 16 bytes.  Nothing else is added:
//! no magic, no length prefix, no authentication tag.  Without external
//! context a block file is indistinguishable from random bytes.
//!
//! Both directions stream through a fixed 64 KiB buffer, so block size never
//! affects memory use.  Decryption holds back one cipher block until EOF is
//! confirmed, then validates and strips the padding.

use std::io::{self, Read, Write};

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes256, Block};
use rand::{CryptoRng, RngCore};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;
/// CBC initialisation-vector length (one AES block).
pub const IV_LEN: usize = 16;

/// AES block size.
const BLOCK_LEN: usize = 16;
/// I/O buffer for both stream directions.  Must be a multiple of BLOCK_LEN.
const STREAM_BUF: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encrypted block is truncated: missing or short IV")]
    TruncatedIv,
    #[error("ciphertext is empty after the IV")]
    EmptyCiphertext,
    #[error("ciphertext length is not a whole number of AES blocks")]
    RaggedCiphertext,
    #[error("invalid PKCS#7 padding: wrong key or corrupted block")]
    InvalidPadding,
    #[error("I/O during cipher stream: {0}")]
    Io(#[from] io::Error),
}

/// Draw a fresh AES-256 key from `rng`.
pub fn random_key<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rng.fill_bytes(&mut key);
    key
}

/// Draw a fresh CBC IV from `rng`.  Every block file gets its own.
pub fn random_iv<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut iv);
    iv
}

/// Encrypt `src` to `dst` as `IV || CBC(PKCS#7(plaintext))`.
///
/// Returns the number of plaintext bytes consumed.  PKCS#7 always appends
/// padding, so the ciphertext is at least one block even for empty input.
pub fn encrypt_stream<R: Read, W: Write>(
    src: &mut R,
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    dst: &mut W,
) -> Result<u64, CryptoError> {
    let mut enc = Aes256CbcEnc::new(key.into(), iv.into());
    dst.write_all(iv)?;

    let mut buf = vec![0u8; STREAM_BUF];
    let mut fill = 0usize; // bytes buffered but not yet encrypted
    let mut total = 0u64;

    loop {
        let n = src.read(&mut buf[fill..])?;
        if n == 0 {
            break;
        }
        total += n as u64;
        fill += n;

        let whole = fill - fill % BLOCK_LEN;
        for block in buf[..whole].chunks_exact_mut(BLOCK_LEN) {
            enc.encrypt_block_mut(Block::from_mut_slice(block));
        }
        dst.write_all(&buf[..whole])?;

        buf.copy_within(whole..fill, 0);
        fill -= whole;
    }

    // Terminal block: pad the 0..=15 leftover bytes to a full block.
    let pad = (BLOCK_LEN - fill % BLOCK_LEN) as u8;
    let mut last = [pad; BLOCK_LEN];
    last[..fill].copy_from_slice(&buf[..fill]);
    enc.encrypt_block_mut(Block::from_mut_slice(&mut last));
    dst.write_all(&last)?;

    Ok(total)
}

/// Decrypt `IV || ciphertext` from `src` into `dst`, stripping padding.
///
/// Returns the number of plaintext bytes written.
pub fn decrypt_stream<R: Read, W: Write>(
    src: &mut R,
    key: &[u8; KEY_LEN],
    dst: &mut W,
) -> Result<u64, CryptoError> {
    let mut iv = [0u8; IV_LEN];
    src.read_exact(&mut iv).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => CryptoError::TruncatedIv,
        _ => CryptoError::Io(e),
    })?;
    let mut dec = Aes256CbcDec::new(key.into(), (&iv).into());

    let mut buf = vec![0u8; STREAM_BUF];
    // Last decrypted block of the previous batch; padding candidate until
    // more ciphertext proves otherwise.
    let mut held: Option<[u8; BLOCK_LEN]> = None;
    let mut total = 0u64;

    loop {
        let n = read_full(src, &mut buf)?;
        if n == 0 {
            break;
        }
        if n % BLOCK_LEN != 0 {
            return Err(CryptoError::RaggedCiphertext);
        }
        for block in buf[..n].chunks_exact_mut(BLOCK_LEN) {
            dec.decrypt_block_mut(Block::from_mut_slice(block));
        }

        if let Some(prev) = held.take() {
            dst.write_all(&prev)?;
            total += BLOCK_LEN as u64;
        }
        dst.write_all(&buf[..n - BLOCK_LEN])?;
        total += (n - BLOCK_LEN) as u64;

        let mut last = [0u8; BLOCK_LEN];
        last.copy_from_slice(&buf[n - BLOCK_LEN..n]);
        held = Some(last);

        if n < buf.len() {
            break; // short fill == EOF
        }
    }

    let last = held.ok_or(CryptoError::EmptyCiphertext)?;
    let pad = last[BLOCK_LEN - 1] as usize;
    if pad == 0 || pad > BLOCK_LEN {
        return Err(CryptoError::InvalidPadding);
    }
    if last[BLOCK_LEN - pad..].iter().any(|&b| b as usize != pad) {
        return Err(CryptoError::InvalidPadding);
    }
    dst.write_all(&last[..BLOCK_LEN - pad])?;
    total += (BLOCK_LEN - pad) as u64;

    Ok(total)
}

/// Read until `buf` is full or the source hits EOF.  Returns bytes read.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
