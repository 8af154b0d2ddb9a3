//! Streaming context-triggered piecewise hash.
//!
//! A rolling hash over the last 7 bytes decides where pieces end; each piece
//! contributes one base64 character (the low 6 bits of an FNV-style hash of
//! the piece) to the signature. 31 block sizes (`3 << i`) are tracked at once
//! and the smallest one whose signature still fits is reported, together with
//! the signature at twice that block size.

use super::digest::{Digest, B64};
use std::io::{self, Read};

const ROLLING_WINDOW: usize = 7;
pub(crate) const MIN_BLOCKSIZE: u64 = 3;
const HASH_PRIME: u32 = 0x0100_0193;
const HASH_INIT: u32 = 0x2802_1967;
const NUM_BLOCKHASHES: usize = 31;
pub(crate) const SPAMSUM_LENGTH: usize = 64;

/// Size of the reads [`FuzzyHasher::digest_reader`] feeds the engine.
pub const BLOCK_READ_SIZE: usize = 8192;

#[inline]
fn block_size(index: usize) -> u64 {
    MIN_BLOCKSIZE << index
}

#[inline]
fn sum_hash(c: u8, h: u32) -> u32 {
    h.wrapping_mul(HASH_PRIME) ^ u32::from(c)
}

#[inline]
fn b64(h: u32) -> u8 {
    B64[(h % 64) as usize]
}

#[derive(Debug, Clone, Default)]
struct RollState {
    window: [u8; ROLLING_WINDOW],
    h1: u32,
    h2: u32,
    h3: u32,
    n: usize,
}

impl RollState {
    fn push(&mut self, c: u8) {
        let c32 = u32::from(c);
        let slot = self.n % ROLLING_WINDOW;
        self.h2 = self.h2.wrapping_sub(self.h1);
        self.h2 = self.h2.wrapping_add(ROLLING_WINDOW as u32 * c32);
        self.h1 = self.h1.wrapping_add(c32);
        self.h1 = self.h1.wrapping_sub(u32::from(self.window[slot]));
        self.window[slot] = c;
        self.n += 1;
        self.h3 = (self.h3 << 5) ^ c32;
    }

    fn sum(&self) -> u32 {
        self.h1.wrapping_add(self.h2).wrapping_add(self.h3)
    }
}

/// Signature state for one candidate block size.
#[derive(Debug, Clone)]
struct BlockHash {
    h: u32,
    halfh: u32,
    /// `digest[dlen]` is 0 unless the signature is full.
    digest: [u8; SPAMSUM_LENGTH],
    halfdigest: u8,
    dlen: usize,
}

impl BlockHash {
    fn new() -> Self {
        Self {
            h: HASH_INIT,
            halfh: HASH_INIT,
            digest: [0; SPAMSUM_LENGTH],
            halfdigest: 0,
            dlen: 0,
        }
    }

    fn forked(&self) -> Self {
        Self {
            h: self.h,
            halfh: self.halfh,
            ..Self::new()
        }
    }
}

/// Incremental fuzzy hasher.
///
/// ```
/// use kindred::ctph::FuzzyHasher;
///
/// let mut hasher = FuzzyHasher::new();
/// hasher.update(b"MZ");
/// hasher.update(&[0u8; 62]);
/// let digest = hasher.digest();
/// assert_eq!(digest.block_size(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct FuzzyHasher {
    total_size: u64,
    bhstart: usize,
    bh: Vec<BlockHash>,
    roll: RollState,
    lasth: u32,
    need_lasth: bool,
}

impl Default for FuzzyHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl FuzzyHasher {
    pub fn new() -> Self {
        Self {
            total_size: 0,
            bhstart: 0,
            bh: vec![BlockHash::new()],
            roll: RollState::default(),
            lasth: 0,
            need_lasth: false,
        }
    }

    /// Number of bytes fed so far.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn update(&mut self, buf: &[u8]) {
        self.total_size += buf.len() as u64;
        for &c in buf {
            self.step(c);
        }
    }

    fn try_fork(&mut self) {
        if self.bh.len() < NUM_BLOCKHASHES {
            let next = self.bh[self.bh.len() - 1].forked();
            self.bh.push(next);
        } else if !self.need_lasth {
            self.need_lasth = true;
            self.lasth = self.bh[NUM_BLOCKHASHES - 1].h;
        }
    }

    fn try_reduce(&mut self) {
        if self.bh.len() - self.bhstart < 2 {
            return;
        }
        if block_size(self.bhstart) * SPAMSUM_LENGTH as u64 >= self.total_size {
            return;
        }
        if self.bh[self.bhstart + 1].dlen < SPAMSUM_LENGTH / 2 {
            return;
        }
        self.bhstart += 1;
    }

    fn step(&mut self, c: u8) {
        self.roll.push(c);
        let h = u64::from(self.roll.sum());

        for bh in &mut self.bh[self.bhstart..] {
            bh.h = sum_hash(c, bh.h);
            bh.halfh = sum_hash(c, bh.halfh);
        }
        if self.need_lasth {
            self.lasth = sum_hash(c, self.lasth);
        }

        // bh may grow inside the loop
        let mut i = self.bhstart;
        while i < self.bh.len() {
            let bs = block_size(i);
            if h % bs != bs - 1 {
                break;
            }
            if self.bh[i].dlen == 0 {
                self.try_fork();
            }
            let bh = &mut self.bh[i];
            bh.digest[bh.dlen] = b64(bh.h);
            bh.halfdigest = b64(bh.halfh);
            if bh.dlen < SPAMSUM_LENGTH - 1 {
                bh.dlen += 1;
                bh.digest[bh.dlen] = 0;
                bh.h = HASH_INIT;
                if bh.dlen < SPAMSUM_LENGTH / 2 {
                    bh.halfh = HASH_INIT;
                    bh.halfdigest = 0;
                }
            } else {
                self.try_reduce();
            }
            i += 1;
        }
    }

    /// Digest of everything fed so far. Does not consume the hasher.
    pub fn digest(&self) -> Digest {
        let roll = self.roll.sum();
        let bhend = self.bh.len();

        let mut bi = self.bhstart;
        while bi < NUM_BLOCKHASHES - 1
            && block_size(bi) * (SPAMSUM_LENGTH as u64) < self.total_size
        {
            bi += 1;
        }
        bi = bi.min(bhend - 1);
        while bi > self.bhstart && self.bh[bi].dlen < SPAMSUM_LENGTH / 2 {
            bi -= 1;
        }

        let first = &self.bh[bi];
        let mut block = first.digest[..first.dlen].to_vec();
        if roll != 0 {
            block.push(b64(first.h));
        } else if first.digest[first.dlen] != 0 {
            block.push(first.digest[first.dlen]);
        }

        let mut double = Vec::new();
        if bi < bhend - 1 {
            let second = &self.bh[bi + 1];
            let len = second.dlen.min(SPAMSUM_LENGTH / 2 - 1);
            double.extend_from_slice(&second.digest[..len]);
            if roll != 0 {
                double.push(b64(second.halfh));
            } else if second.halfdigest != 0 {
                double.push(second.halfdigest);
            }
        } else if roll != 0 {
            let h = if bi == 0 { first.h } else { self.lasth };
            double.push(b64(h));
        }

        // B64 bytes are ASCII
        Digest::from_parts(
            block_size(bi),
            String::from_utf8_lossy(&block).into_owned(),
            String::from_utf8_lossy(&double).into_owned(),
        )
    }

    /// Digest of a whole byte slice.
    pub fn digest_bytes(data: &[u8]) -> Digest {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.digest()
    }

    /// Digest of a stream, read in [`BLOCK_READ_SIZE`] blocks.
    pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<Digest> {
        let mut hasher = Self::new();
        let mut buf = vec![0u8; BLOCK_READ_SIZE];
        loop {
            let n = read_block(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.digest())
    }
}

/// Fill `buf` unless the stream ends first.
fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
