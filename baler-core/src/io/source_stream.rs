// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

use crate::errors::{truncated_error, Result};
use crate::io::ReadBytes;

const BUFFER_LEN: usize = 4 * 1024;

/// `SourceStream` is a buffered [`ReadBytes`] over any [`std::io::Read`].
///
/// The stream never seeks. A read of 0 bytes from the underlying reader is interpreted as
/// end-of-stream, after which [`ReadBytes::read_buf`] reports 0 and [`ReadBytes::read_byte`]
/// reports a truncation error.
pub struct SourceStream<R: io::Read> {
    inner: R,
    buf: Box<[u8]>,
    /// Read head within `buf`.
    head: usize,
    /// Number of valid bytes in `buf`.
    len: usize,
    /// Absolute position, in bytes, of the read head in the stream.
    abs_pos: u64,
    eof: bool,
}

impl<R: io::Read> SourceStream<R> {
    pub fn new(inner: R) -> Self {
        SourceStream {
            inner,
            buf: vec![0u8; BUFFER_LEN].into_boxed_slice(),
            head: 0,
            len: 0,
            abs_pos: 0,
            eof: false,
        }
    }

    /// Unwraps this `SourceStream`, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fetch(&mut self) -> Result<()> {
        if self.head < self.len || self.eof {
            return Ok(());
        }
        self.head = 0;
        self.len = 0;
        loop {
            match self.inner.read(&mut self.buf) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(count) => {
                    self.len = count;
                    break;
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

impl<R: io::Read> ReadBytes for SourceStream<R> {
    fn read_byte(&mut self) -> Result<u8> {
        self.fetch()?;
        if self.head >= self.len {
            return truncated_error();
        }
        let byte = self.buf[self.head];
        self.head += 1;
        self.abs_pos += 1;
        Ok(byte)
    }

    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut copied = 0;
        while copied < buf.len() {
            self.fetch()?;
            if self.head >= self.len {
                break;
            }
            let count = (self.len - self.head).min(buf.len() - copied);
            buf[copied..copied + count].copy_from_slice(&self.buf[self.head..self.head + count]);
            self.head += count;
            self.abs_pos += count as u64;
            copied += count;
        }
        Ok(copied)
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.read_buf(buf)? < buf.len() {
            return truncated_error();
        }
        Ok(())
    }

    fn pos(&self) -> u64 {
        self.abs_pos
    }
}
