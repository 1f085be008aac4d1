// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

use crate::errors::Result;
use crate::io::WriteBytes;

const BUFFER_LEN: usize = 4 * 1024;

/// `SinkStream` is a buffered [`WriteBytes`] over any [`std::io::Write`].
///
/// Bytes are staged in an internal buffer and pushed to the sink when the buffer fills or
/// [`WriteBytes::flush`] is called. Dropping the stream without flushing discards staged bytes,
/// which is the intended way to abandon a partial compression.
pub struct SinkStream<W: io::Write> {
    inner: W,
    buf: Vec<u8>,
    abs_pos: u64,
}

impl<W: io::Write> SinkStream<W> {
    pub fn new(inner: W) -> Self {
        SinkStream { inner, buf: Vec::with_capacity(BUFFER_LEN), abs_pos: 0 }
    }

    /// Flushes staged bytes and unwraps this `SinkStream`, returning the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    fn drain(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl<W: io::Write> WriteBytes for SinkStream<W> {
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        if self.buf.len() >= BUFFER_LEN {
            self.drain()?;
        }
        self.buf.push(byte);
        self.abs_pos += 1;
        Ok(())
    }

    fn write_buf(&mut self, buf: &[u8]) -> Result<()> {
        if self.buf.len() + buf.len() > BUFFER_LEN {
            self.drain()?;
        }
        if buf.len() >= BUFFER_LEN {
            self.inner.write_all(buf)?;
        }
        else {
            self.buf.extend_from_slice(buf);
        }
        self.abs_pos += buf.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.drain()?;
        self.inner.flush()?;
        Ok(())
    }

    fn pos(&self) -> u64 {
        self.abs_pos
    }
}

#[cfg(test)]
mod tests {
    use super::SinkStream;
    use crate::io::WriteBytes;

    #[test]
    fn verify_write_and_flush() {
        let mut out = Vec::new();
        let mut sink = SinkStream::new(&mut out);

        sink.write_byte(0x01).unwrap();
        sink.write_buf(&[0x02, 0x03]).unwrap();
        sink.write_u16(0x0504).unwrap();
        sink.write_u32(0x09080706).unwrap();
        assert_eq!(sink.pos(), 9);

        sink.flush().unwrap();
        drop(sink);

        assert_eq!(out, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);
    }

    #[test]
    fn verify_large_writes_bypass_buffer() {
        let mut out = Vec::new();
        let mut sink = SinkStream::new(&mut out);

        let chunk = vec![0x5Au8; 16 * 1024];
        sink.write_buf(&chunk).unwrap();
        sink.flush().unwrap();
        drop(sink);

        assert_eq!(out.len(), 16 * 1024);
    }
}
