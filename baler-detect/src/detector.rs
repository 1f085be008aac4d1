// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::VecDeque;

use baler_core::block::{DetectedBlock, Profile, MAX_HEADER_LEN, PROFILE_COUNT};
use baler_core::errors::Result;
use baler_core::io::{ReadBytes, WriteBytes};
use baler_core::utf8::Utf8Decoder;

use log::debug;
use smallvec::SmallVec;

/// Capacity of the lookahead buffer.
pub const LOOKAHEAD_CAPACITY: usize = 256 * 1024;

const REFILL_CHUNK: usize = 4 * 1024;

/// Minimum run of clean UTF-8 for a text classification.
const TEXT_RUN_MIN: usize = 128;

/// Control characters that rarely appear in text. Tab, line feed, carriage return, and DC2 are
/// permitted.
const FORBIDDEN: [u8; 28] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 11, 12, 14, 15, 16, 17, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28,
    29, 30, 31,
];

const RIFF_MAGIC: u32 = 0x52494646;
const WAVE_MAGIC: u32 = 0x57415645;
const FMT_MAGIC: u32 = 0x666D7420;
const DATA_MAGIC: u32 = 0x64617461;

/// `Detector` partitions an arbitrary byte stream into typed blocks.
///
/// The detector classifies through a bounded lookahead buffer and never fails on valid input:
/// UTF-8 errors and forbidden bytes are classification signals. It additionally runs the
/// wire-framing state machine: [`Detector::get`] interleaves serialized header bytes with payload
/// bytes on the encoder side, and [`Detector::put`] consumes that sequence on the decoder side,
/// buffering payload bytes for [`Detector::flush`].
pub struct Detector {
    is_forbidden: [bool; 256],
    buffer: VecDeque<u8>,
    /// Blocks detected but not yet returned, used by the Wave16 side channel.
    pending: SmallVec<[DetectedBlock; 4]>,
    /// Rolling window of the last four scanned bytes.
    last_word: u32,
    profile_override: Option<Profile>,

    /// Block currently being read or written through the framing state machine.
    current: DetectedBlock,
    /// Detected but not yet current.
    detected: DetectedBlock,
    header_buf: [u8; MAX_HEADER_LEN],
    header_pos: usize,
    header_len: usize,

    num_blocks: [u64; PROFILE_COUNT],
    num_bytes: [u64; PROFILE_COUNT],
    overhead_bytes: u64,
}

impl Detector {
    /// Creates a detector. When `profile_override` is set, classification is bypassed and every
    /// block takes the forced profile.
    pub fn new(profile_override: Option<Profile>) -> Self {
        let mut is_forbidden = [false; 256];
        for &b in FORBIDDEN.iter() {
            is_forbidden[b as usize] = true;
        }

        Detector {
            is_forbidden,
            buffer: VecDeque::with_capacity(LOOKAHEAD_CAPACITY),
            pending: SmallVec::new(),
            last_word: 0,
            profile_override,
            current: DetectedBlock::new(Profile::Binary, 0),
            detected: DetectedBlock::new(Profile::Binary, 0),
            header_buf: [0; MAX_HEADER_LEN],
            header_pos: 0,
            header_len: 0,
            num_blocks: [0; PROFILE_COUNT],
            num_bytes: [0; PROFILE_COUNT],
            overhead_bytes: 0,
        }
    }

    /// Refills the lookahead to capacity or to the end of the source.
    fn refill<S: ReadBytes>(&mut self, src: &mut S) -> Result<()> {
        let mut chunk = [0u8; REFILL_CHUNK];
        loop {
            let remain = LOOKAHEAD_CAPACITY - self.buffer.len();
            let want = remain.min(REFILL_CHUNK);
            if want == 0 {
                break;
            }
            let n = src.read_buf(&mut chunk[..want])?;
            self.buffer.extend(chunk[..n].iter().copied());
            if n == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Removes and returns the next byte, refilling the lookahead when it runs dry. Returns
    /// `None` once the source is exhausted.
    pub fn pop_byte<S: ReadBytes>(&mut self, src: &mut S) -> Result<Option<u8>> {
        if self.buffer.is_empty() {
            self.refill(src)?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Returns the next byte without consuming it, or `None` once the source is exhausted.
    pub fn peek_byte<S: ReadBytes>(&mut self, src: &mut S) -> Result<Option<u8>> {
        if self.buffer.is_empty() {
            self.refill(src)?;
        }
        Ok(self.buffer.front().copied())
    }

    fn read_scalar(&self, pos: usize, bytes: usize, big_endian: bool) -> u32 {
        if pos + bytes > self.buffer.len() {
            return 0;
        }
        let mut w = 0u32;
        if big_endian {
            for i in 0..bytes {
                w = (w << 8) | u32::from(self.buffer[pos + i]);
            }
        }
        else {
            for i in 0..bytes {
                w |= u32::from(self.buffer[pos + i]) << (i * 8);
            }
        }
        w
    }

    /// Attempts to parse a canonical WAVE header with the chunk size field at `pos` (the four
    /// `RIFF` magic bytes precede it). On success returns the pending stereo 16-bit PCM block and
    /// the lookahead offset where the sample data starts.
    fn probe_wave(&self, pos: usize) -> Option<(DetectedBlock, usize)> {
        let chunk_size = self.read_scalar(pos, 4, false);
        let format = self.read_scalar(pos + 4, 4, true);
        let subchunk_id = self.read_scalar(pos + 8, 4, true);
        if format != WAVE_MAGIC || subchunk_id != FMT_MAGIC {
            return None;
        }

        let subchunk_size = self.read_scalar(pos + 12, 4, false);
        if subchunk_size != 16 && subchunk_size != 18 {
            return None;
        }

        let audio_format = self.read_scalar(pos + 16, 2, false);
        let num_channels = self.read_scalar(pos + 18, 2, false);
        if audio_format != 1 || num_channels != 2 {
            return None;
        }

        // Skip sample rate, byte rate, and block align to bits per sample.
        let mut fpos = pos + 20 + (subchunk_size as usize - 6);
        let _bits_per_sample = self.read_scalar(fpos, 2, false);
        fpos += 2;

        for _ in 0..5 {
            let subchunk2_id = self.read_scalar(fpos, 4, true);
            let subchunk2_size = self.read_scalar(fpos + 4, 4, false);
            fpos += 8;
            if subchunk2_id == DATA_MAGIC {
                if subchunk2_size >= chunk_size {
                    return None;
                }
                return Some((
                    DetectedBlock::new(Profile::Wave16, u64::from(chunk_size)),
                    fpos,
                ));
            }
            fpos += subchunk2_size as usize;
            if fpos >= self.buffer.len() {
                break;
            }
        }
        None
    }

    /// Classifies the next contiguous run of one profile. Returns an end-of-stream block once the
    /// source and the lookahead are both empty.
    pub fn detect_block<S: ReadBytes>(&mut self, src: &mut S) -> Result<DetectedBlock> {
        let block = self.detect_block_inner(src)?;
        self.num_blocks[block.profile() as usize] += 1;
        self.num_bytes[block.profile() as usize] += block.length();
        Ok(block)
    }

    fn detect_block_inner<S: ReadBytes>(&mut self, src: &mut S) -> Result<DetectedBlock> {
        if let Some(block) = self.pending.first().copied() {
            self.pending.remove(0);
            return Ok(block);
        }

        self.refill(src)?;
        let buffer_len = self.buffer.len();
        if buffer_len == 0 {
            return Ok(DetectedBlock::eof());
        }

        if let Some(profile) = self.profile_override {
            return Ok(DetectedBlock::new(profile, buffer_len as u64));
        }

        let mut binary_len = 0;
        while binary_len < buffer_len {
            let mut decoder = Utf8Decoder::new();
            let mut text_len = 0;
            while binary_len + text_len < buffer_len {
                let pos = binary_len + text_len;

                if self.last_word == RIFF_MAGIC {
                    self.refill(src)?;
                    if let Some((wave, data_start)) = self.probe_wave(pos) {
                        debug!(
                            "wav chunk at lookahead offset {}, {} sample bytes pending",
                            pos,
                            wave.length()
                        );
                        self.pending.push(wave);
                        return Ok(DetectedBlock::new(Profile::Binary, data_start as u64));
                    }
                }

                let c = self.buffer[pos];
                self.last_word = (self.last_word << 8) | u32::from(c);
                decoder.update(c);
                if decoder.err() || self.is_forbidden[c as usize] {
                    break;
                }
                text_len += 1;
            }

            if text_len >= TEXT_RUN_MIN {
                if binary_len == 0 {
                    return Ok(DetectedBlock::new(Profile::Text, text_len as u64));
                }
                break;
            }

            binary_len += text_len;
            if binary_len >= buffer_len {
                break;
            }
            binary_len += 1;
        }

        Ok(DetectedBlock::new(Profile::Binary, binary_len as u64))
    }

    /// The profile of the block the framing state machine is currently inside.
    pub fn detect(&self) -> Profile {
        if self.current.length() > 0 {
            return self.current.profile();
        }
        if self.current.profile() == Profile::Eof {
            return Profile::Eof;
        }
        Profile::Binary
    }

    /// Encoder-side framing: produces the next byte of the interleaved header-and-payload
    /// sequence along with the profile it was classified under. Header bytes are reported as
    /// binary. Returns `None` after the end-of-stream header has been fully produced.
    pub fn get<S: ReadBytes>(&mut self, src: &mut S) -> Result<Option<(u8, Profile)>> {
        if self.current.length() > 0 {
            let profile = self.current.profile();
            self.current.pop(1);
            return Ok(self.pop_byte(src)?.map(|byte| (byte, profile)));
        }

        // Still have some header to emit?
        if self.header_pos < self.header_len {
            let byte = self.header_buf[self.header_pos];
            self.header_pos += 1;
            if self.header_pos == self.header_len {
                self.current = self.detected;
            }
            self.overhead_bytes += 1;
            return Ok(Some((byte, Profile::Binary)));
        }

        if self.current.profile() == Profile::Eof {
            return Ok(None);
        }

        self.detected = self.detect_block(src)?;
        self.header_len = self.detected.write_to(&mut self.header_buf);
        self.header_pos = 1;
        self.overhead_bytes += 1;
        Ok(Some((self.header_buf[0], Profile::Binary)))
    }

    /// Decoder-side framing: consumes one byte of the interleaved sequence. Header bytes rebuild
    /// the block descriptors; payload bytes are buffered and pushed to `sink` whenever the buffer
    /// fills.
    pub fn put<W: WriteBytes>(&mut self, byte: u8, sink: &mut W) -> Result<()> {
        if self.current.length() > 0 {
            self.current.pop(1);
            if self.buffer.len() >= LOOKAHEAD_CAPACITY {
                self.flush(sink)?;
            }
            self.buffer.push_back(byte);
            return Ok(());
        }

        self.header_buf[self.header_pos] = byte;
        self.header_pos += 1;
        let need = DetectedBlock::header_len_from_first(self.header_buf[0]);
        if self.header_pos == need {
            self.current = DetectedBlock::read_from(&self.header_buf[..need])?;
            self.header_pos = 0;
            self.overhead_bytes += need as u64;
        }
        Ok(())
    }

    /// Pushes all buffered payload bytes to `sink`.
    pub fn flush<W: WriteBytes>(&mut self, sink: &mut W) -> Result<()> {
        let (front, back) = self.buffer.as_slices();
        sink.write_buf(front)?;
        sink.write_buf(back)?;
        self.buffer.clear();
        Ok(())
    }

    /// Per-profile count of detected blocks.
    pub fn num_blocks(&self) -> &[u64; PROFILE_COUNT] {
        &self.num_blocks
    }

    /// Per-profile count of detected bytes.
    pub fn num_bytes(&self) -> &[u64; PROFILE_COUNT] {
        &self.num_bytes
    }

    /// Framing header bytes produced or consumed so far.
    pub fn overhead_bytes(&self) -> u64 {
        self.overhead_bytes
    }
}
