// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Baler.
#[derive(Debug)]
pub enum Error {
    /// An IO error occurred while reading or writing the underlying stream.
    IoError(io::Error),
    /// The decoder required a byte, but the reader was already exhausted before the end-of-block
    /// flag was read.
    TruncatedInput,
    /// A block header carried a profile code outside the valid range. The offending code is
    /// attached.
    CorruptHeader(u8),
    /// A decoded length exceeds the maximum block size, or the payload would extend past the
    /// declared block boundary.
    LengthOverflow,
    /// An internal invariant was violated. This indicates a bug in the coder, not a problem with
    /// the input.
    InternalInvariant(&'static str),
    /// The stream contained malformed data not covered by a more specific error kind.
    DecodeError(&'static str),
    /// An unsupported configuration or feature was requested.
    Unsupported(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
            Error::TruncatedInput => {
                write!(f, "input truncated before end-of-block flag")
            }
            Error::CorruptHeader(code) => {
                write!(f, "corrupt block header: profile code {}", code)
            }
            Error::LengthOverflow => {
                write!(f, "block length overflow")
            }
            Error::InternalInvariant(msg) => {
                write!(f, "internal invariant violated: {}", msg)
            }
            Error::DecodeError(msg) => {
                write!(f, "malformed stream: {}", msg)
            }
            Error::Unsupported(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a truncated-input error.
pub fn truncated_error<T>() -> Result<T> {
    Err(Error::TruncatedInput)
}

/// Convenience function to create a corrupt-header error.
pub fn corrupt_header_error<T>(code: u8) -> Result<T> {
    Err(Error::CorruptHeader(code))
}

/// Convenience function to create a length-overflow error.
pub fn length_overflow_error<T>() -> Result<T> {
    Err(Error::LengthOverflow)
}

/// Convenience function to create an internal-invariant error.
///
/// Debug builds abort immediately with diagnostics since an invariant violation is always a bug.
pub fn invariant_error<T>(msg: &'static str) -> Result<T> {
    debug_assert!(false, "internal invariant violated: {}", msg);
    Err(Error::InternalInvariant(msg))
}

/// Convenience function to create a decode error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::DecodeError(desc))
}

/// Convenience function to create an unsupported-feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}
