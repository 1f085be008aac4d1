// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements composable byte-level I/O.
//!
//! All `Stream`s operating on bytes of data at a time implement the [`ReadBytes`] or
//! [`WriteBytes`] traits. The underlying source or sink is opaque: any [`std::io::Read`] may back
//! a [`SourceStream`], and any [`std::io::Write`] may back a [`SinkStream`]. Neither requires
//! seeking.

use crate::errors::Result;

mod sink_stream;
mod source_stream;

pub use sink_stream::SinkStream;
pub use source_stream::SourceStream;

/// `ReadBytes` provides methods to read bytes and interpret them as little- or big-endian
/// unsigned integers of standard widths.
pub trait ReadBytes {
    /// Reads a single byte from the stream and returns it or an error. Reaching the end of the
    /// stream is an error ([`crate::errors::Error::TruncatedInput`]).
    fn read_byte(&mut self) -> Result<u8>;

    /// Reads up-to the number of bytes required to fill `buf` or returns an error. Returns the
    /// number of bytes actually read, which is 0 if and only if the stream is exhausted.
    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reads exactly the number of bytes required to fill the provided buffer or returns an
    /// error.
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Reads two bytes from the stream and interprets them as an unsigned 16-bit little-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_buf_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Reads four bytes from the stream and interprets them as an unsigned 32-bit little-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_buf_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads four bytes from the stream and interprets them as an unsigned 32-bit big-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_be_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_buf_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Gets the position of the stream.
    fn pos(&self) -> u64;
}

impl<'b, R: ReadBytes> ReadBytes for &'b mut R {
    #[inline(always)]
    fn read_byte(&mut self) -> Result<u8> {
        (*self).read_byte()
    }

    #[inline(always)]
    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize> {
        (*self).read_buf(buf)
    }

    #[inline(always)]
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        (*self).read_buf_exact(buf)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (**self).pos()
    }
}

/// `WriteBytes` provides methods to write bytes and standard-width little-endian unsigned
/// integers.
pub trait WriteBytes {
    /// Writes a single byte to the stream or returns an error.
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Writes the entire buffer to the stream or returns an error.
    fn write_buf(&mut self, buf: &[u8]) -> Result<()>;

    /// Writes two bytes encoding an unsigned 16-bit little-endian integer or returns an error.
    #[inline(always)]
    fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_buf(&value.to_le_bytes())
    }

    /// Writes four bytes encoding an unsigned 32-bit little-endian integer or returns an error.
    #[inline(always)]
    fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_buf(&value.to_le_bytes())
    }

    /// Flushes all written bytes to the underlying sink or returns an error.
    fn flush(&mut self) -> Result<()>;

    /// Gets the position of the stream. This is the total number of bytes written.
    fn pos(&self) -> u64;
}

impl<'b, W: WriteBytes> WriteBytes for &'b mut W {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        (*self).write_byte(byte)
    }

    #[inline(always)]
    fn write_buf(&mut self, buf: &[u8]) -> Result<()> {
        (*self).write_buf(buf)
    }

    #[inline(always)]
    fn flush(&mut self) -> Result<()> {
        (*self).flush()
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (**self).pos()
    }
}
