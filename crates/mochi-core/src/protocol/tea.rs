//! QQ-flavoured TEA: 16 rounds, big-endian words, random-prefixed padding
//! and the two-IV interleaved CBC chain.
//!
//! Plain text layout before encryption:
//!
//! ```text
//! [rand & 0xF8 | fill] [fill random bytes] [2 random bytes] [data] [7 zero bytes]
//! ```
//!
//! where `fill` brings the total to a multiple of 8.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use thiserror::Error;

const DELTA: u32 = 0x9E37_79B9;
const ROUNDS: u32 = 16;
const BLOCK: usize = 8;
const ZERO_TAIL: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TeaError {
    #[error("cipher text length {0} is not a multiple of 8 of at least 16")]
    InvalidLength(usize),
    #[error("key must be 16 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("key is not valid hex: {0}")]
    InvalidKeyHex(String),
    #[error("decrypted padding is corrupt (wrong key?)")]
    Corrupted,
}

/// A 16-byte TEA key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TeaKey([u8; 16]);

impl TeaKey {
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    fn words(&self) -> [u32; 4] {
        let k = &self.0;
        [
            u32::from_be_bytes([k[0], k[1], k[2], k[3]]),
            u32::from_be_bytes([k[4], k[5], k[6], k[7]]),
            u32::from_be_bytes([k[8], k[9], k[10], k[11]]),
            u32::from_be_bytes([k[12], k[13], k[14], k[15]]),
        ]
    }
}

impl TryFrom<&[u8]> for TeaKey {
    type Error = TeaError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 16]>::try_from(bytes)
            .map(Self)
            .map_err(|_| TeaError::InvalidKeyLength(bytes.len()))
    }
}

/// Hex, optionally grouped with whitespace: `"00 11 22 ..."`.
impl FromStr for TeaKey {
    type Err = TeaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes =
            super::parse_hex(s).map_err(|e| TeaError::InvalidKeyHex(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Display for TeaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::hex_groups(&self.0))
    }
}

// Keys end up in logs through `{:?}` on packets; keep them out.
impl fmt::Debug for TeaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TeaKey(..)")
    }
}

// ============================================================================
// Block cipher
// ============================================================================

fn encipher(block: [u8; BLOCK], key: &[u32; 4]) -> [u8; BLOCK] {
    let mut y = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
    let mut z = u32::from_be_bytes([block[4], block[5], block[6], block[7]]);
    let mut sum = 0u32;
    for _ in 0..ROUNDS {
        sum = sum.wrapping_add(DELTA);
        y = y.wrapping_add(
            (z << 4).wrapping_add(key[0]) ^ z.wrapping_add(sum) ^ (z >> 5).wrapping_add(key[1]),
        );
        z = z.wrapping_add(
            (y << 4).wrapping_add(key[2]) ^ y.wrapping_add(sum) ^ (y >> 5).wrapping_add(key[3]),
        );
    }
    join(y, z)
}

fn decipher(block: [u8; BLOCK], key: &[u32; 4]) -> [u8; BLOCK] {
    let mut y = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
    let mut z = u32::from_be_bytes([block[4], block[5], block[6], block[7]]);
    let mut sum = DELTA.wrapping_mul(ROUNDS);
    for _ in 0..ROUNDS {
        z = z.wrapping_sub(
            (y << 4).wrapping_add(key[2]) ^ y.wrapping_add(sum) ^ (y >> 5).wrapping_add(key[3]),
        );
        y = y.wrapping_sub(
            (z << 4).wrapping_add(key[0]) ^ z.wrapping_add(sum) ^ (z >> 5).wrapping_add(key[1]),
        );
        sum = sum.wrapping_sub(DELTA);
    }
    join(y, z)
}

fn join(y: u32, z: u32) -> [u8; BLOCK] {
    let mut out = [0u8; BLOCK];
    out[..4].copy_from_slice(&y.to_be_bytes());
    out[4..].copy_from_slice(&z.to_be_bytes());
    out
}

fn xor(a: [u8; BLOCK], b: [u8; BLOCK]) -> [u8; BLOCK] {
    let mut out = a;
    for (o, x) in out.iter_mut().zip(b) {
        *o ^= x;
    }
    out
}

fn block_at(buf: &[u8], offset: usize) -> [u8; BLOCK] {
    let mut block = [0u8; BLOCK];
    block.copy_from_slice(&buf[offset..offset + BLOCK]);
    block
}

// ============================================================================
// Buffer API
// ============================================================================

/// Encrypt `plain` with fresh random padding.
pub fn encrypt(plain: &[u8], key: &TeaKey) -> Vec<u8> {
    encrypt_with(plain, key, &mut rand::thread_rng())
}

/// Encrypt `plain`, drawing padding bytes from `rng`.
pub fn encrypt_with<R: Rng + ?Sized>(plain: &[u8], key: &TeaKey, rng: &mut R) -> Vec<u8> {
    let fill = match (plain.len() + 10) % BLOCK {
        0 => 0,
        n => BLOCK - n,
    };

    let mut padded = Vec::with_capacity(plain.len() + 10 + fill);
    padded.push((rng.r#gen::<u8>() & 0xF8) | fill as u8);
    for _ in 0..fill + 2 {
        padded.push(rng.r#gen::<u8>());
    }
    padded.extend_from_slice(plain);
    padded.extend_from_slice(&[0u8; ZERO_TAIL]);

    let words = key.words();
    let mut out = Vec::with_capacity(padded.len());
    let mut pre_plain = [0u8; BLOCK];
    let mut pre_crypt = [0u8; BLOCK];
    for offset in (0..padded.len()).step_by(BLOCK) {
        let mixed = xor(block_at(&padded, offset), pre_crypt);
        let crypt = xor(encipher(mixed, &words), pre_plain);
        out.extend_from_slice(&crypt);
        pre_plain = mixed;
        pre_crypt = crypt;
    }
    out
}

/// Decrypt a whole cipher text, checking length and the zero tail.
pub fn decrypt(cipher: &[u8], key: &TeaKey) -> Result<Vec<u8>, TeaError> {
    if cipher.len() % BLOCK != 0 || cipher.len() < 2 * BLOCK {
        return Err(TeaError::InvalidLength(cipher.len()));
    }

    let words = key.words();
    let mut plain = Vec::with_capacity(cipher.len());
    let mut pre_plain = [0u8; BLOCK];
    let mut pre_crypt = [0u8; BLOCK];
    for offset in (0..cipher.len()).step_by(BLOCK) {
        let crypt = block_at(cipher, offset);
        let mixed = decipher(xor(crypt, pre_plain), &words);
        plain.extend_from_slice(&xor(mixed, pre_crypt));
        pre_plain = mixed;
        pre_crypt = crypt;
    }

    let start = usize::from(plain[0] & 0x07) + 3;
    let end = plain.len() - ZERO_TAIL;
    if start > end || plain[end..].iter().any(|&b| b != 0) {
        return Err(TeaError::Corrupted);
    }
    Ok(plain[start..end].to_vec())
}
