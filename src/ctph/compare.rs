//! Digest similarity on a 0 to 100 scale.

use super::digest::{Digest, CHUNK_WINDOW};
use super::hasher::{MIN_BLOCKSIZE, SPAMSUM_LENGTH};
use crate::error::Result;
use std::collections::HashSet;

/// Score of two identical digests.
pub const MAX_SCORE: u32 = 100;

/// Below this block size the score is capped by the signature length.
const SMALL_BLOCK_LIMIT: u64 = (99 + CHUNK_WINDOW as u64) / CHUNK_WINDOW as u64 * MIN_BLOCKSIZE;

/// Compare two digest strings.
///
/// ```
/// use kindred::ctph::compare;
///
/// let a = "3:AXGBicFlgVNhBGcL6wCrFQEv:AXGHsNhxLsr2C";
/// assert_eq!(compare(a, a).unwrap(), 100);
/// assert_eq!(compare(a, "192:abc:def").unwrap(), 0);
/// ```
pub fn compare(a: &str, b: &str) -> Result<u32> {
    Ok(compare_digests(&Digest::parse(a)?, &Digest::parse(b)?))
}

/// Compare two parsed digests. Symmetric; block sizes must be equal or
/// differ by a factor of two, otherwise the score is 0.
pub fn compare_digests(a: &Digest, b: &Digest) -> u32 {
    let (bs1, bs2) = (a.block_size(), b.block_size());
    if bs1 != bs2 && bs1.checked_mul(2) != Some(bs2) && bs2.checked_mul(2) != Some(bs1) {
        return 0;
    }

    let a = a.canonical();
    let b = b.canonical();

    if bs1 == bs2 && a.block() == b.block() && a.double_block() == b.double_block() {
        return MAX_SCORE;
    }

    if bs1 == bs2 {
        let s1 = score_strings(a.block(), b.block(), bs1);
        let s2 = score_strings(a.double_block(), b.double_block(), bs1.saturating_mul(2));
        s1.max(s2)
    } else if bs1.checked_mul(2) == Some(bs2) {
        score_strings(b.block(), a.double_block(), bs2)
    } else {
        score_strings(a.block(), b.double_block(), bs1)
    }
}

fn has_common_substring(s1: &[u8], s2: &[u8]) -> bool {
    if s1.len() < CHUNK_WINDOW || s2.len() < CHUNK_WINDOW {
        return false;
    }
    let windows: HashSet<&[u8]> = s1.windows(CHUNK_WINDOW).collect();
    s2.windows(CHUNK_WINDOW).any(|w| windows.contains(w))
}

/// Edit distance with insertion and deletion cost 1, substitution cost 2.
fn edit_distance(s1: &[u8], s2: &[u8]) -> u64 {
    let mut prev: Vec<u64> = (0..=s2.len() as u64).collect();
    let mut cur = vec![0u64; s2.len() + 1];
    for (i, &c1) in s1.iter().enumerate() {
        cur[0] = i as u64 + 1;
        for (j, &c2) in s2.iter().enumerate() {
            let substitute = prev[j] + if c1 == c2 { 0 } else { 2 };
            cur[j + 1] = substitute.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[s2.len()]
}

fn score_strings(s1: &str, s2: &str, block_size: u64) -> u32 {
    let (s1, s2) = (s1.as_bytes(), s2.as_bytes());
    if !has_common_substring(s1, s2) {
        return 0;
    }
    let len = SPAMSUM_LENGTH as u64;
    let mut score = edit_distance(s1, s2) * len / (s1.len() + s2.len()) as u64;
    score = 100 * score / len;
    score = 100u64.saturating_sub(score);

    if block_size < SMALL_BLOCK_LIMIT {
        let cap = block_size / MIN_BLOCKSIZE * s1.len().min(s2.len()) as u64;
        score = score.min(cap);
    }
    score as u32
}
