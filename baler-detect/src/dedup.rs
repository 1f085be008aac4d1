// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::debug;

/// Bits in the rolling-hash window size.
pub const WINDOW_BITS: u32 = 16;

/// Size of the rolling-hash window in bytes.
pub const WINDOW_SIZE: u64 = 1 << WINDOW_BITS;

const WINDOW_MASK: u64 = WINDOW_SIZE - 1;

/// Polynomial base of the rolling hash.
const PRIME: u64 = 153191;

const TABLE_BITS: u32 = 20;
const TABLE_MASK: u64 = (1 << TABLE_BITS) - 1;

/// Initial `hash_extra` value; chosen so an empty slot never matches a real hash by default.
const EMPTY_EXTRA: u32 = 97654321;

/// A fingerprint bookmark for a window-aligned stream position.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DedupEntry {
    /// File namespace the bookmark belongs to.
    pub file_idx: u32,
    /// High 32 bits of the rolling hash at the bookmarked position.
    pub hash_extra: u32,
    /// Position of the last byte covered by the bookmarked window.
    pub offset: u64,
}

impl Default for DedupEntry {
    fn default() -> Self {
        DedupEntry { file_idx: 0, hash_extra: EMPTY_EXTRA, offset: 0 }
    }
}

/// `Deduplicator` maintains a rolling polynomial hash over a fixed window and a single-slot
/// fingerprint table keyed by it.
///
/// The hash update is `H <- H * P + in - out * P^W` in modular 64-bit arithmetic, so after `W`
/// ingested bytes `H` equals the polynomial hash of the current window; before that it equals the
/// hash of a zero-padded prefix. Candidates returned by [`Deduplicator::add_byte`] are only
/// fingerprint matches; the caller confirms them by direct byte comparison.
pub struct Deduplicator {
    pos: u64,
    window: Vec<u8>,
    power: u64,
    rolling_hash: u64,
    hash_table: Vec<DedupEntry>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Deduplicator {
    pub fn new() -> Self {
        // P^W mod 2^64, the weight of the byte leaving the window.
        let mut power = 1u64;
        for _ in 0..WINDOW_SIZE {
            power = power.wrapping_mul(PRIME);
        }

        Deduplicator {
            pos: 0,
            window: vec![0; WINDOW_SIZE as usize],
            power,
            rolling_hash: 0,
            hash_table: vec![DedupEntry::default(); (TABLE_MASK + 1) as usize],
        }
    }

    /// Ingests one byte. Returns a candidate bookmark when the fingerprint table already holds an
    /// entry with the same high hash bits; otherwise, at window-aligned positions, the slot is
    /// (re)claimed for the current position.
    pub fn add_byte(&mut self, in_byte: u8, file_idx: u32) -> Option<DedupEntry> {
        let slot = (self.pos & WINDOW_MASK) as usize;
        let out_byte = self.window[slot];

        self.rolling_hash = self
            .rolling_hash
            .wrapping_mul(PRIME)
            .wrapping_add(u64::from(in_byte))
            .wrapping_sub(u64::from(out_byte).wrapping_mul(self.power));

        let masked_hash = (self.rolling_hash & TABLE_MASK) as usize;
        let hash_extra = (self.rolling_hash >> 32) as u32;

        let entry = &mut self.hash_table[masked_hash];
        let candidate = if entry.hash_extra == hash_extra {
            debug!("dedup candidate at {} against bookmark {}", self.pos, entry.offset);
            Some(*entry)
        }
        else {
            if self.pos & WINDOW_MASK == 0 {
                *entry = DedupEntry { file_idx, hash_extra, offset: self.pos };
            }
            None
        };

        self.window[slot] = in_byte;
        self.pos += 1;
        candidate
    }

    /// Resets the window, hash, and position for a new stream. The fingerprint table is kept so
    /// bookmarks survive across files sharing the table.
    pub fn reset_pos(&mut self) {
        self.pos = 0;
        self.rolling_hash = 0;
        self.window.fill(0);
    }

    /// Number of bytes ingested.
    pub fn pos(&self) -> u64 {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::{Deduplicator, PRIME, WINDOW_SIZE};

    use rand::rngs::SmallRng;
    use rand::{RngCore, SeedableRng};

    #[test]
    fn verify_rolling_hash_matches_polynomial_sum() {
        let mut data = vec![0u8; WINDOW_SIZE as usize];
        SmallRng::seed_from_u64(7).fill_bytes(&mut data);

        let mut dedup = Deduplicator::new();
        for &b in &data {
            dedup.add_byte(b, 0);
        }

        // Horner evaluation of sum(b[i] * P^(W-1-i)) over the full window.
        let mut expect = 0u64;
        for &b in &data {
            expect = expect.wrapping_mul(PRIME).wrapping_add(u64::from(b));
        }
        assert_eq!(dedup.rolling_hash, expect);
    }

    #[test]
    fn verify_hash_is_a_window_function() {
        // After sliding past a differing prefix, two streams with the same trailing window agree
        // bit for bit.
        let mut window = vec![0u8; WINDOW_SIZE as usize];
        SmallRng::seed_from_u64(11).fill_bytes(&mut window);

        let mut a = Deduplicator::new();
        for &b in window.iter().chain(window.iter()) {
            a.add_byte(b, 0);
        }

        let mut b = Deduplicator::new();
        let mut prefix = vec![0u8; WINDOW_SIZE as usize];
        SmallRng::seed_from_u64(13).fill_bytes(&mut prefix);
        for &byte in prefix.iter().chain(window.iter()) {
            b.add_byte(byte, 0);
        }

        assert_eq!(a.rolling_hash, b.rolling_hash);
    }

    #[test]
    fn verify_repeated_region_produces_candidate() {
        // A repeated chunk larger than the window; the second copy must hit the bookmark planted
        // at a window-aligned position inside the first.
        let period = WINDOW_SIZE as usize + 4096;
        let mut chunk = vec![0u8; period];
        SmallRng::seed_from_u64(17).fill_bytes(&mut chunk);
        let stream: Vec<u8> = chunk.iter().chain(chunk.iter()).copied().collect();

        let mut dedup = Deduplicator::new();
        let mut candidate = None;
        for &b in &stream {
            if let Some(entry) = dedup.add_byte(b, 0) {
                candidate = Some((entry, dedup.pos() - 1));
                break;
            }
        }

        let (entry, at) = candidate.expect("expected a dedup candidate");
        assert_eq!(at - entry.offset, period as u64);

        // The windows ending at the bookmark and at the candidate hold identical bytes.
        let w = WINDOW_SIZE as usize;
        let (old_end, new_end) = (entry.offset as usize, at as usize);
        assert_eq!(stream[old_end + 1 - w..=old_end], stream[new_end + 1 - w..=new_end]);
    }

    #[test]
    fn verify_reset_pos() {
        let mut dedup = Deduplicator::new();
        for b in 0..255u8 {
            dedup.add_byte(b, 0);
        }
        assert_eq!(dedup.pos(), 255);

        dedup.reset_pos();
        assert_eq!(dedup.pos(), 0);
        assert_eq!(dedup.rolling_hash, 0);
    }
}
