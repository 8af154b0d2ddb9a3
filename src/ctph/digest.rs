//! Digest strings and the chunk values derived from them.

use crate::error::{IndexError, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::hasher::SPAMSUM_LENGTH;

/// Signature alphabet (standard base64).
pub(crate) const B64: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Characters per chunk window.
pub const CHUNK_WINDOW: usize = 7;

/// Longest run of one character kept by [`canonicalize`].
const MAX_RUN: usize = 3;

fn b64_value(c: u8) -> Option<u64> {
    let v = match c {
        b'A'..=b'Z' => c - b'A',
        b'a'..=b'z' => c - b'a' + 26,
        b'0'..=b'9' => c - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(u64::from(v))
}

/// A parsed `block_size:block_signature:double_block_signature` digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    block_size: u64,
    block: String,
    double_block: String,
}

impl Digest {
    pub(crate) fn from_parts(block_size: u64, block: String, double_block: String) -> Self {
        Self {
            block_size,
            block,
            double_block,
        }
    }

    /// Parse and validate a digest string.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        let (Some(size), Some(block), Some(double_block)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(IndexError::malformed(s, "expected block_size:sig1:sig2"));
        };
        let block_size: u64 = size
            .parse()
            .map_err(|_| IndexError::malformed(s, format!("bad block size {size:?}")))?;
        if block_size == 0 {
            return Err(IndexError::malformed(s, "block size is zero"));
        }
        for half in [block, double_block] {
            if half.len() > SPAMSUM_LENGTH {
                return Err(IndexError::malformed(s, "signature longer than 64 characters"));
            }
            if let Some(bad) = half.bytes().find(|&c| b64_value(c).is_none()) {
                return Err(IndexError::malformed(
                    s,
                    format!("character {:?} outside the signature alphabet", bad as char),
                ));
            }
        }
        Ok(Self::from_parts(block_size, block.to_string(), double_block.to_string()))
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Signature at `block_size`.
    pub fn block(&self) -> &str {
        &self.block
    }

    /// Signature at `2 * block_size`.
    pub fn double_block(&self) -> &str {
        &self.double_block
    }

    /// Same digest with every run longer than 3 cut down to 3.
    pub fn canonical(&self) -> Digest {
        Self::from_parts(
            self.block_size,
            canonicalize(&self.block),
            canonicalize(&self.double_block),
        )
    }

    /// Chunk sets of both canonical halves.
    pub fn chunks(&self) -> (BTreeSet<u64>, BTreeSet<u64>) {
        (
            chunk_set(&canonicalize(&self.block)),
            chunk_set(&canonicalize(&self.double_block)),
        )
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.block_size, self.block, self.double_block)
    }
}

impl FromStr for Digest {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Collapse every run of a repeated character longer than 3 to exactly 3.
pub fn canonicalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev = None;
    let mut run = 0;
    for c in s.chars() {
        if prev == Some(c) {
            run += 1;
        } else {
            prev = Some(c);
            run = 1;
        }
        if run <= MAX_RUN {
            out.push(c);
        }
    }
    out
}

/// Decode a 7-character window into its chunk value.
///
/// The 42 decoded bits keep their leading 40 (five bytes, the last character
/// contributes only its top four bits). Those bytes, zero-padded to eight,
/// are read as a little-endian `u64`.
pub fn decode_window(window: &[u8]) -> Option<u64> {
    if window.len() != CHUNK_WINDOW {
        return None;
    }
    let mut acc = 0u64;
    for &c in window {
        acc = (acc << 6) | b64_value(c)?;
    }
    let be = (acc >> 2).to_be_bytes();
    let mut le = [0u8; 8];
    le[..5].copy_from_slice(&be[3..]);
    Some(u64::from_le_bytes(le))
}

/// Distinct chunk values of every 7-character window of `signature`.
///
/// Signatures shorter than the window yield no chunks.
pub fn chunk_set(signature: &str) -> BTreeSet<u64> {
    signature
        .as_bytes()
        .windows(CHUNK_WINDOW)
        .filter_map(decode_window)
        .collect()
}
