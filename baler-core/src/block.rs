// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `block` module defines the block model shared by the detector, analyzer, and codec: the
//! content [`Profile`], the [`DetectedBlock`] descriptor, and the compact wire-header framing.
//!
//! A header is 1 byte carrying the profile code in the low 6 bits and the length-byte count minus
//! one in the top 2 bits, followed by 1 to 4 little-endian bytes encoding `length - 1`.

use crate::errors::{corrupt_header_error, Result};
use crate::io::{ReadBytes, WriteBytes};

/// Number of wire profiles.
pub const PROFILE_COUNT: usize = 5;

/// Maximum length of a single block in bytes.
pub const MAX_BLOCK_LEN: u64 = 1 << 32;

const LENGTH_BYTES_SHIFT: u8 = 6;
const PROFILE_MASK: u8 = (1 << LENGTH_BYTES_SHIFT) - 1;

/// The content classification of a block. The integer codes are stable wire values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Profile {
    /// Valid UTF-8 free of control characters that rarely appear in text.
    Text = 0,
    /// Anything that is not text or audio.
    Binary = 1,
    /// Stereo 16-bit PCM samples found inside a RIFF WAVE container.
    Wave16 = 2,
    /// A deduplicated region. Carries no payload on the wire.
    Skip = 3,
    /// End of stream marker.
    Eof = 4,
}

impl Profile {
    /// Gets the profile for a wire code, or a corrupt-header error if the code is out of range.
    pub fn from_code(code: u8) -> Result<Profile> {
        match code {
            0 => Ok(Profile::Text),
            1 => Ok(Profile::Binary),
            2 => Ok(Profile::Wave16),
            3 => Ok(Profile::Skip),
            4 => Ok(Profile::Eof),
            _ => corrupt_header_error(code),
        }
    }

    /// Gets the stable wire code for the profile.
    pub fn into_code(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match *self {
            Profile::Text => "text",
            Profile::Binary => "binary",
            Profile::Wave16 => "wav16",
            Profile::Skip => "skip",
            Profile::Eof => "eof",
        }
    }
}

/// A contiguous run of bytes sharing one profile.
///
/// The length of every block is at least 1 at emission, except the end-of-stream block whose
/// length is 0. On the wire the length is stored as `length - 1` so a single length byte can
/// express up to 256 bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DetectedBlock {
    profile: Profile,
    length: u64,
}

impl DetectedBlock {
    pub fn new(profile: Profile, length: u64) -> Self {
        DetectedBlock { profile, length }
    }

    /// The end-of-stream block.
    pub fn eof() -> Self {
        DetectedBlock { profile: Profile::Eof, length: 0 }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn set_length(&mut self, length: u64) {
        self.length = length;
    }

    pub fn extend(&mut self, len: u64) {
        self.length += len;
    }

    /// Removes `count` bytes from the length.
    pub fn pop(&mut self, count: u64) {
        debug_assert!(self.length >= count);
        self.length -= count;
    }

    /// Number of bytes needed to store an encoded length.
    fn length_bytes(enc_len: u32) -> usize {
        if enc_len & 0xFF000000 != 0 {
            return 4;
        }
        if enc_len & 0xFF0000 != 0 {
            return 3;
        }
        if enc_len & 0xFF00 != 0 {
            return 2;
        }
        1
    }

    /// Total header size, in bytes, implied by the first header byte.
    pub fn header_len_from_first(byte: u8) -> usize {
        1 + (byte >> LENGTH_BYTES_SHIFT) as usize + 1
    }

    /// Serializes the header into `out`, returning the number of bytes written. `out` must hold
    /// at least [`MAX_HEADER_LEN`] bytes.
    pub fn write_to(&self, out: &mut [u8]) -> usize {
        let enc_len = (self.length as u32).wrapping_sub(1);
        let length_bytes = Self::length_bytes(enc_len);
        out[0] = self.profile.into_code() | (((length_bytes - 1) as u8) << LENGTH_BYTES_SHIFT);
        for i in 0..length_bytes {
            out[1 + i] = (enc_len >> (i * 8)) as u8;
        }
        1 + length_bytes
    }

    /// Deserializes a header from `bytes`. The slice must be exactly the size reported by
    /// [`DetectedBlock::header_len_from_first`] for its first byte.
    pub fn read_from(bytes: &[u8]) -> Result<DetectedBlock> {
        let profile = Profile::from_code(bytes[0] & PROFILE_MASK)?;
        let mut enc_len = 0u32;
        for (i, byte) in bytes[1..].iter().enumerate() {
            enc_len |= u32::from(*byte) << (i * 8);
        }
        let length = match profile {
            Profile::Eof => 0,
            _ => u64::from(enc_len) + 1,
        };
        Ok(DetectedBlock { profile, length })
    }

    /// Writes the header to a byte sink, returning the number of bytes written.
    pub fn write_header<W: WriteBytes>(&self, sink: &mut W) -> Result<usize> {
        let mut buf = [0u8; MAX_HEADER_LEN];
        let len = self.write_to(&mut buf);
        sink.write_buf(&buf[..len])?;
        Ok(len)
    }

    /// Reads a header from a byte source.
    pub fn read_header<R: ReadBytes>(src: &mut R) -> Result<DetectedBlock> {
        let mut buf = [0u8; MAX_HEADER_LEN];
        buf[0] = src.read_byte()?;
        let len = Self::header_len_from_first(buf[0]);
        src.read_buf_exact(&mut buf[1..len])?;
        Self::read_from(&buf[..len])
    }
}

/// Maximum size of a serialized block header in bytes.
pub const MAX_HEADER_LEN: usize = 5;

#[cfg(test)]
mod tests {
    use super::{DetectedBlock, Profile};

    #[test]
    fn verify_profile_codes() {
        for code in 0..5 {
            assert_eq!(Profile::from_code(code).unwrap().into_code(), code);
        }
        assert!(Profile::from_code(5).is_err());
        assert!(Profile::from_code(0x3F).is_err());
    }

    #[test]
    fn verify_wave16_header_wire_bytes() {
        let block = DetectedBlock::new(Profile::Wave16, 0x01020304);

        let mut buf = [0u8; 5];
        let len = block.write_to(&mut buf);

        // Profile 2 with four length bytes, then 0x01020304 - 1 little-endian.
        assert_eq!(len, 5);
        assert_eq!(&buf[..len], &[0xC2, 0x03, 0x03, 0x02, 0x01]);

        assert_eq!(DetectedBlock::read_from(&buf[..len]).unwrap(), block);
    }

    #[test]
    fn verify_header_round_trip_all_length_classes() {
        let profiles =
            [Profile::Text, Profile::Binary, Profile::Wave16, Profile::Skip, Profile::Eof];

        // One length per encoded length-byte class, plus both class boundaries.
        let lengths: &[u64] = &[
            1,
            2,
            0x100,
            0x101,
            0x10000,
            0x10001,
            0x1000000,
            0x1000001,
            0xFFFFFFFF,
            0x100000000,
        ];

        for &profile in &profiles {
            for &length in lengths {
                let block = match profile {
                    Profile::Eof => DetectedBlock::eof(),
                    _ => DetectedBlock::new(profile, length),
                };

                let mut buf = [0u8; 5];
                let len = block.write_to(&mut buf);
                assert!(len >= 2 && len <= 5);
                assert_eq!(len, DetectedBlock::header_len_from_first(buf[0]));
                assert_eq!(DetectedBlock::read_from(&buf[..len]).unwrap(), block);
            }
        }
    }

    #[test]
    fn verify_eof_header() {
        let mut buf = [0u8; 5];
        let len = DetectedBlock::eof().write_to(&mut buf);

        assert_eq!(&buf[..len], &[0xC4, 0xFF, 0xFF, 0xFF, 0xFF]);

        let block = DetectedBlock::read_from(&buf[..len]).unwrap();
        assert_eq!(block.profile(), Profile::Eof);
        assert_eq!(block.length(), 0);
    }

    #[test]
    fn verify_header_via_streams() {
        use crate::io::{ReadBytes, SinkStream, SourceStream, WriteBytes};

        let mut out = Vec::new();
        let mut sink = SinkStream::new(&mut out);
        DetectedBlock::new(Profile::Text, 200).write_header(&mut sink).unwrap();
        DetectedBlock::eof().write_header(&mut sink).unwrap();
        sink.flush().unwrap();
        drop(sink);

        let mut src = SourceStream::new(&out[..]);
        let first = DetectedBlock::read_header(&mut src).unwrap();
        assert_eq!(first, DetectedBlock::new(Profile::Text, 200));
        let second = DetectedBlock::read_header(&mut src).unwrap();
        assert_eq!(second.profile(), Profile::Eof);
        assert!(src.read_byte().is_err());
    }
}
