// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `range` module implements the binary arithmetic coder: a range coder over 32-bit state
//! with 8-bit renormalization and carry propagation into previously buffered bytes.
//!
//! Every encoded bit must be matched by an identically parameterized decode in the same order;
//! the encoder emits exactly the bytes the decoder consumes, so block payloads pack back to back
//! in one stream.

use baler_core::errors::Result;
use baler_core::io::{ReadBytes, WriteBytes};

use crate::sstable::PROB_BITS;

/// Renormalization threshold.
const TOP: u32 = 1 << 24;

/// The probability of an even split, for coding raw bits.
const HALF: u32 = 1 << (PROB_BITS - 1);

/// Number of state bytes emitted by the final flush; the same number primes the decoder.
const FLUSH_LEN: u32 = 5;

/// Binary range encoder.
///
/// `low` is held in 33 effective bits so a carry out of the 32-bit coding state is visible; the
/// carry is folded into the cached byte and the run of 0xFF bytes behind it.
pub struct RangeEncoder {
    low: u64,
    range: u32,
    cache: u8,
    /// Bytes withheld from the sink pending carry resolution (the cache byte plus a run of
    /// 0xFF).
    cache_len: u64,
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeEncoder {
    pub fn new() -> Self {
        RangeEncoder { low: 0, range: u32::MAX, cache: 0, cache_len: 1 }
    }

    /// Encodes one bit with probability `p` (of the bit being 1) out of `1 << PROB_BITS`.
    /// `p` must lie in `[1, 4095]`.
    pub fn encode_bit<W: WriteBytes>(&mut self, sink: &mut W, bit: u32, p: u32) -> Result<()> {
        debug_assert!(p >= 1 && p < (1 << PROB_BITS));
        debug_assert!(bit <= 1);

        let bound = (self.range >> PROB_BITS) * p;
        if bit == 1 {
            self.range = bound;
        }
        else {
            self.low += u64::from(bound);
            self.range -= bound;
        }

        while self.range < TOP {
            self.shift_low(sink)?;
            self.range <<= 8;
        }
        Ok(())
    }

    /// Encodes one bit at probability one half.
    pub fn encode_bit_raw<W: WriteBytes>(&mut self, sink: &mut W, bit: u32) -> Result<()> {
        self.encode_bit(sink, bit, HALF)
    }

    fn shift_low<W: WriteBytes>(&mut self, sink: &mut W) -> Result<()> {
        if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
            let carry = (self.low >> 32) as u8;
            sink.write_byte(self.cache.wrapping_add(carry))?;
            for _ in 1..self.cache_len {
                sink.write_byte(0xFFu8.wrapping_add(carry))?;
            }
            self.cache_len = 0;
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_len += 1;
        self.low = (self.low << 8) & 0xFFFF_FFFF;
        Ok(())
    }

    /// Emits enough bytes to uniquely determine `low` on the decoder side.
    pub fn flush<W: WriteBytes>(&mut self, sink: &mut W) -> Result<()> {
        for _ in 0..FLUSH_LEN {
            self.shift_low(sink)?;
        }
        Ok(())
    }
}

/// Binary range decoder.
pub struct RangeDecoder {
    range: u32,
    code: u32,
    /// Set once the source ran dry and a zero byte was substituted.
    exhausted: bool,
}

impl RangeDecoder {
    /// Creates a decoder and primes its state from the source.
    pub fn new<R: ReadBytes>(src: &mut R) -> Result<Self> {
        let mut decoder = RangeDecoder { range: u32::MAX, code: 0, exhausted: false };
        for _ in 0..FLUSH_LEN {
            let byte = decoder.next_byte(src)?;
            decoder.code = (decoder.code << 8) | u32::from(byte);
        }
        Ok(decoder)
    }

    /// Reads the next payload byte. Past the end of the source, yields zero bytes; that is only
    /// legal after the end-of-block flag has been decoded, which the caller checks through
    /// [`RangeDecoder::exhausted`].
    fn next_byte<R: ReadBytes>(&mut self, src: &mut R) -> Result<u8> {
        let mut byte = [0u8; 1];
        if src.read_buf(&mut byte)? == 0 {
            self.exhausted = true;
            return Ok(0);
        }
        Ok(byte[0])
    }

    /// Decodes one bit with probability `p` (of the bit being 1) out of `1 << PROB_BITS`.
    pub fn decode_bit<R: ReadBytes>(&mut self, src: &mut R, p: u32) -> Result<u32> {
        debug_assert!(p >= 1 && p < (1 << PROB_BITS));

        let bound = (self.range >> PROB_BITS) * p;
        let bit = if self.code < bound {
            self.range = bound;
            1
        }
        else {
            self.code -= bound;
            self.range -= bound;
            0
        };

        while self.range < TOP {
            let byte = self.next_byte(src)?;
            self.code = (self.code << 8) | u32::from(byte);
            self.range <<= 8;
        }
        Ok(bit)
    }

    /// Decodes one bit at probability one half.
    pub fn decode_bit_raw<R: ReadBytes>(&mut self, src: &mut R) -> Result<u32> {
        self.decode_bit(src, HALF)
    }

    /// Whether the decoder has read past the end of the source.
    pub fn exhausted(&self) -> bool {
        self.exhausted
    }
}
