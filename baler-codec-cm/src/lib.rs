// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Context-mixing block codec for Baler.
//!
//! Each byte is coded bit by bit, MSB first. Four context streams (order-1 direct, order-2 and
//! order-4 by hash, and a word hash for text) each map a bit-history state to a stationary
//! probability; the predictions are averaged in the stretched domain and drive the binary range
//! coder. Block boundaries are marked in-stream by a sentinel byte disambiguated by one raw
//! flag bit, so payloads need no length field.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Baler crates. Please see the workspace Cargo.toml
// for their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

use baler_core::block::Profile;
use baler_core::errors::{
    decode_error, length_overflow_error, truncated_error, unsupported_error, Result,
};
use baler_core::io::{ReadBytes, WriteBytes};

use log::debug;

mod model;
mod range;
mod sstable;
mod state;
mod word;

pub use range::{RangeDecoder, RangeEncoder};
pub use sstable::{squash, stretch};

use model::{StationaryModel, INITIAL_PROBS};
use state::{state_table, StateTable};
use word::WordModel;

/// End-of-block marker byte. A payload occurrence is followed by a raw 0 flag bit; the closing
/// occurrence by a raw 1.
pub const SENTINEL: u8 = 0xE9;

/// Highest supported memory level.
pub const MAX_MEM_LEVEL: u8 = 8;

/// Base size of the state hash table at memory level 0.
const HASH_TABLE_BASE: usize = 2 * 1024 * 1024;

/// Number of context streams mixed per bit.
const NUM_STREAMS: usize = 4;

const O3_MUL: u32 = 3413763181;
const O4_MUL: u32 = 798765431;

/// Per-byte context addresses and learn rate, fixed before coding the byte's eight bits.
struct ByteContexts {
    o1_base: usize,
    o2h: u32,
    o4h: u32,
    aux: u32,
    rate: u32,
}

/// `CmCoder` compresses or decompresses the payload of one block.
///
/// The coder is parameterized by the block's profile: text blocks use the word-hash context,
/// anything else substitutes the order-3 hash. All model state is owned by the instance; the
/// state-transition and stretch tables are shared immutable lookups.
pub struct CmCoder {
    profile: Profile,
    /// Rolling hash of the last four bytes.
    owhash: u32,
    byte_count: u64,
    /// Direct order-1 state table, indexed by previous byte and partial-bit context.
    order1: Vec<u8>,
    /// Shared state table for the hashed context streams.
    hash_table: Vec<u8>,
    hash_mask: u32,
    probs: [Vec<StationaryModel>; NUM_STREAMS],
    word: WordModel,
    states: &'static StateTable,
}

impl CmCoder {
    /// Creates a coder for one block. `mem_level` scales the hash table as
    /// `2 MiB << mem_level`; encoder and decoder must agree on it.
    pub fn try_new(profile: Profile, mem_level: u8) -> Result<Self> {
        if mem_level > MAX_MEM_LEVEL {
            return unsupported_error("cm: memory level out of range");
        }
        let hash_size = HASH_TABLE_BASE << mem_level;
        debug!("cm: {} blocks use a {} byte hash table", profile.as_str(), hash_size);

        let probs =
            INITIAL_PROBS.map(|row| row.iter().map(|&p| StationaryModel::new(p)).collect());

        Ok(CmCoder {
            profile,
            owhash: 0,
            byte_count: 0,
            order1: vec![0; 256 * 256],
            hash_table: vec![0; hash_size],
            hash_mask: (hash_size - 1) as u32,
            probs,
            word: WordModel::new(),
            states: state_table(),
        })
    }

    fn byte_contexts(&self) -> ByteContexts {
        let o3h = (self.owhash & 0xFFFFFF).wrapping_mul(O3_MUL) & self.hash_mask;
        let aux = match self.profile {
            Profile::Text => self.word.hash() & self.hash_mask,
            _ => o3h,
        };

        let rate = 4
            + u32::from(self.byte_count > 1 << 10)
            + u32::from(self.byte_count > 16 << 10)
            + u32::from(self.byte_count > 256 << 10)
            + u32::from(self.byte_count > 1 << 20);

        ByteContexts {
            o1_base: ((self.owhash & 0xFF) as usize) << 8,
            o2h: ((self.owhash & 0xFFFF) * 256) & self.hash_mask,
            o4h: self.owhash.wrapping_mul(O4_MUL) & self.hash_mask,
            aux,
            rate,
        }
    }

    fn slots(&self, cx: &ByteContexts, ctx: u32) -> [usize; NUM_STREAMS] {
        [
            cx.o1_base + ctx as usize,
            (cx.o2h ^ ctx) as usize,
            (cx.o4h ^ ctx) as usize,
            (cx.aux ^ ctx) as usize,
        ]
    }

    /// Reads the four states and combines their predictions through a stretched average.
    fn predict(&self, slots: &[usize; NUM_STREAMS]) -> (u32, [u8; NUM_STREAMS]) {
        let states = [
            self.order1[slots[0]],
            self.hash_table[slots[1]],
            self.hash_table[slots[2]],
            self.hash_table[slots[3]],
        ];

        let mut sum = 0;
        for (stream, &state) in states.iter().enumerate() {
            sum += stretch(self.probs[stream][state as usize].p());
        }
        let p = squash(sum / NUM_STREAMS as i32).clamp(1, 4095);
        (p as u32, states)
    }

    /// Adapts every stream's probability toward the observed bit and advances its state.
    fn train(&mut self, slots: &[usize; NUM_STREAMS], states: &[u8; NUM_STREAMS], bit: u32, rate: u32) {
        for (stream, &state) in states.iter().enumerate() {
            self.probs[stream][state as usize].update(bit, rate);
        }
        self.order1[slots[0]] = self.states.next(states[0], bit);
        self.hash_table[slots[1]] = self.states.next(states[1], bit);
        self.hash_table[slots[2]] = self.states.next(states[2], bit);
        self.hash_table[slots[3]] = self.states.next(states[3], bit);
    }

    fn encode_byte<W: WriteBytes>(
        &mut self,
        encoder: &mut RangeEncoder,
        sink: &mut W,
        byte: u8,
    ) -> Result<()> {
        let cx = self.byte_contexts();
        let mut ctx: u32 = 1;
        for i in (0..8).rev() {
            let bit = u32::from((byte >> i) & 1);
            let slots = self.slots(&cx, ctx);
            let (p, states) = self.predict(&slots);
            encoder.encode_bit(sink, bit, p)?;
            self.train(&slots, &states, bit, cx.rate);
            ctx = (ctx << 1) | bit;
        }
        Ok(())
    }

    fn decode_byte<R: ReadBytes>(
        &mut self,
        decoder: &mut RangeDecoder,
        src: &mut R,
    ) -> Result<u8> {
        let cx = self.byte_contexts();
        let mut ctx: u32 = 1;
        for _ in 0..8 {
            let slots = self.slots(&cx, ctx);
            let (p, states) = self.predict(&slots);
            let bit = decoder.decode_bit(src, p)?;
            self.train(&slots, &states, bit, cx.rate);
            ctx = (ctx << 1) | bit;
        }
        Ok((ctx ^ 256) as u8)
    }

    /// Folds a coded byte into the rolling contexts.
    fn update(&mut self, byte: u8) {
        self.owhash = (self.owhash << 8) | u32::from(byte);
        self.word.update(byte);
        self.byte_count += 1;
    }

    /// Compresses one block payload, closing it with the sentinel marker and flushing the range
    /// coder.
    pub fn encode_block<W: WriteBytes>(&mut self, sink: &mut W, data: &[u8]) -> Result<()> {
        let mut encoder = RangeEncoder::new();
        for &byte in data {
            self.encode_byte(&mut encoder, sink, byte)?;
            if byte == SENTINEL {
                encoder.encode_bit_raw(sink, 0)?;
            }
            self.update(byte);
        }
        self.encode_byte(&mut encoder, sink, SENTINEL)?;
        encoder.encode_bit_raw(sink, 1)?;
        encoder.flush(sink)
    }

    /// Decompresses one block payload of `expected_len` bytes. Consumes exactly the bytes the
    /// encoder produced for the block.
    pub fn decode_block<R: ReadBytes>(&mut self, src: &mut R, expected_len: u64) -> Result<Vec<u8>> {
        let mut decoder = RangeDecoder::new(src)?;
        let mut out = Vec::with_capacity(expected_len.min(1 << 20) as usize);
        loop {
            let byte = self.decode_byte(&mut decoder, src)?;
            if byte == SENTINEL && decoder.decode_bit_raw(src)? == 1 {
                break;
            }
            if out.len() as u64 >= expected_len {
                if decoder.exhausted() {
                    return truncated_error();
                }
                return length_overflow_error();
            }
            out.push(byte);
            self.update(byte);
        }
        if decoder.exhausted() {
            return truncated_error();
        }
        if out.len() as u64 != expected_len {
            return decode_error("cm: block ended before its declared length");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::{CmCoder, SENTINEL};
    use baler_core::block::Profile;
    use baler_core::errors::Error;
    use baler_core::io::{ReadBytes, SinkStream, SourceStream, WriteBytes};

    use rand::rngs::SmallRng;
    use rand::{RngCore, SeedableRng};

    fn encode(profile: Profile, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut sink = SinkStream::new(&mut out);
        let mut coder = CmCoder::try_new(profile, 0).unwrap();
        coder.encode_block(&mut sink, data).unwrap();
        sink.flush().unwrap();
        drop(sink);
        out
    }

    fn round_trip(profile: Profile, data: &[u8]) {
        let encoded = encode(profile, data);
        let mut src = SourceStream::new(&encoded[..]);
        let mut coder = CmCoder::try_new(profile, 0).unwrap();
        let decoded = coder.decode_block(&mut src, data.len() as u64).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(src.pos(), encoded.len() as u64);
    }

    #[test]
    fn verify_text_round_trip() {
        let data: Vec<u8> =
            b"the quick brown fox jumps over the lazy dog. ".iter().copied().cycle().take(4096).collect();
        round_trip(Profile::Text, &data);
    }

    #[test]
    fn verify_binary_round_trip() {
        let mut data = vec![0u8; 4096];
        SmallRng::seed_from_u64(0xC0DEC).fill_bytes(&mut data);
        round_trip(Profile::Binary, &data);
        round_trip(Profile::Wave16, &data);
    }

    #[test]
    fn verify_sentinel_byte_round_trip() {
        // A lone sentinel byte: the flag bit after it is 0, and 1 after the closing sentinel.
        round_trip(Profile::Binary, &[SENTINEL]);

        let data = vec![SENTINEL; 257];
        round_trip(Profile::Binary, &data);
    }

    #[test]
    fn verify_empty_block_round_trip() {
        round_trip(Profile::Text, &[]);
    }

    #[test]
    fn verify_profiles_select_different_models() {
        let data: Vec<u8> = b"a wagtail walks the watermark and warbles wandering words. "
            .iter()
            .copied()
            .cycle()
            .take(1 << 16)
            .collect();
        let as_text = encode(Profile::Text, &data);
        let as_binary = encode(Profile::Binary, &data);

        // Repetitive text compresses far below its size under either profile, but the word
        // context is only active for text, so the streams differ.
        assert!(as_text.len() < data.len() / 4);
        assert!(as_binary.len() < data.len() / 4);
        assert_ne!(as_text, as_binary);
    }

    #[test]
    fn verify_truncated_stream_is_detected() {
        let data: Vec<u8> = (0u8..=255).cycle().take(2048).collect();
        let mut encoded = encode(Profile::Binary, &data);
        encoded.truncate(encoded.len() / 3);

        let mut src = SourceStream::new(&encoded[..]);
        let mut coder = CmCoder::try_new(Profile::Binary, 0).unwrap();
        let err = coder.decode_block(&mut src, data.len() as u64).unwrap_err();
        assert!(matches!(err, Error::TruncatedInput | Error::DecodeError(_)));
    }

    #[test]
    fn verify_length_mismatch_is_detected() {
        let data = b"some block content that is long enough to matter".to_vec();
        let encoded = encode(Profile::Binary, &data);

        let mut src = SourceStream::new(&encoded[..]);
        let mut coder = CmCoder::try_new(Profile::Binary, 0).unwrap();
        let err = coder.decode_block(&mut src, 4).unwrap_err();
        assert!(matches!(err, Error::LengthOverflow));
    }

    #[test]
    fn verify_blocks_pack_back_to_back() {
        let first: Vec<u8> = b"first block payload ".iter().copied().cycle().take(600).collect();
        let mut second = vec![0u8; 600];
        SmallRng::seed_from_u64(77).fill_bytes(&mut second);

        let mut out = Vec::new();
        let mut sink = SinkStream::new(&mut out);
        CmCoder::try_new(Profile::Text, 0).unwrap().encode_block(&mut sink, &first).unwrap();
        CmCoder::try_new(Profile::Binary, 0).unwrap().encode_block(&mut sink, &second).unwrap();
        sink.flush().unwrap();
        drop(sink);

        let mut src = SourceStream::new(&out[..]);
        let a = CmCoder::try_new(Profile::Text, 0)
            .unwrap()
            .decode_block(&mut src, first.len() as u64)
            .unwrap();
        let b = CmCoder::try_new(Profile::Binary, 0)
            .unwrap()
            .decode_block(&mut src, second.len() as u64)
            .unwrap();
        assert_eq!(a, first);
        assert_eq!(b, second);
        assert_eq!(src.pos(), out.len() as u64);
    }

    #[test]
    fn verify_memory_level_is_validated() {
        assert!(CmCoder::try_new(Profile::Binary, 9).is_err());
    }
}
