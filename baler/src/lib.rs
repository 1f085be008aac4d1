// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Project Baler is a block-based context-mixing compressor.
//!
//! An input stream is analyzed into typed blocks (text, binary, stereo 16-bit PCM, deduplicated
//! skips), each block is framed with a compact header, and every non-skip payload is compressed
//! by a context-mixing coder driving a binary range coder.
//!
//! The compressed container is self-delimiting: headers are raw bytes, payloads end with an
//! in-stream sentinel marker, and the stream ends with an end-of-stream header. Decompression
//! therefore needs no out-of-band lengths, but it must be configured with the same
//! [`CompressorOptions::mem_level`] used for compression.
//!
//! `Skip` blocks carry no payload. Their byte ranges are reported to the caller, who is expected
//! to reconstruct them from a dedup log maintained outside this crate; compression with
//! deduplication enabled is only useful alongside such a log.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Baler crates. Please see the workspace Cargo.toml
// for their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

use std::io;

use baler_core::block::{DetectedBlock, Profile, MAX_HEADER_LEN, PROFILE_COUNT};
use baler_core::errors::{unsupported_error, Result};
use baler_core::io::{ReadBytes, SinkStream, SourceStream, WriteBytes};

use baler_codec_cm::{CmCoder, MAX_MEM_LEVEL};
use baler_detect::{Analyzer, AnalyzerOptions, Detector};

use log::info;

pub use baler_codec_cm as codec;
pub use baler_core as core;
pub use baler_detect as detect;

/// Forces the detector's classification.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ProfileOverride {
    #[default]
    Auto,
    Text,
    Binary,
}

impl ProfileOverride {
    fn as_profile(self) -> Option<Profile> {
        match self {
            ProfileOverride::Auto => None,
            ProfileOverride::Text => Some(Profile::Text),
            ProfileOverride::Binary => Some(Profile::Binary),
        }
    }
}

/// Options shared by compression and decompression.
#[derive(Clone, Copy, Debug)]
pub struct CompressorOptions {
    /// Compression level in `[1, 9]`. Selects the default [`CompressorOptions::mem_level`]
    /// through [`CompressorOptions::new`]. The model set implemented here corresponds to level
    /// 6; other levels are reserved for alternative back-ends.
    pub level: u8,
    /// Scales the model hash table as `2 MiB << mem_level`, in `[0, 8]`. Defaults to
    /// `level - 1`, capped at the maximum. Must match between compression and decompression.
    pub mem_level: u8,
    /// Detector override. Only meaningful for compression.
    pub profile_override: ProfileOverride,
    /// Run the deduplicator during analysis. Only meaningful for compression; see the crate
    /// documentation for the reconstruction contract.
    pub dedup: bool,
}

impl Default for CompressorOptions {
    fn default() -> Self {
        Self::new(6)
    }
}

impl CompressorOptions {
    /// Creates options for a compression level, deriving the default memory level from it.
    /// Override `mem_level` afterwards to size the model tables independently.
    pub fn new(level: u8) -> Self {
        CompressorOptions {
            level,
            mem_level: level.saturating_sub(1).min(MAX_MEM_LEVEL),
            profile_override: ProfileOverride::Auto,
            dedup: false,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.level < 1 || self.level > 9 {
            return unsupported_error("baler: compression level out of range");
        }
        if self.mem_level > MAX_MEM_LEVEL {
            return unsupported_error("baler: memory level out of range");
        }
        Ok(())
    }
}

/// Summary of one compression.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompressStats {
    /// Bytes consumed from the input.
    pub bytes_in: u64,
    /// Bytes written to the output, headers included.
    pub bytes_out: u64,
    /// Emitted blocks per profile code.
    pub blocks: [u64; PROFILE_COUNT],
    /// Input bytes elided through deduplication.
    pub skipped_bytes: u64,
}

/// A deduplicated byte range of the decompressed stream, to be reconstructed by the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SkipRange {
    /// Offset of the range in the decompressed stream.
    pub pos: u64,
    /// Length of the range in bytes.
    pub len: u64,
}

/// Summary of one decompression.
#[derive(Clone, Debug, Default)]
pub struct DecompressStats {
    /// Bytes written to the output. Skipped ranges contribute nothing here.
    pub bytes_out: u64,
    /// Length of the decompressed stream including skipped ranges.
    pub logical_len: u64,
    /// Skipped ranges in stream order.
    pub skips: Vec<SkipRange>,
}

/// Compresses `reader` to `writer`.
///
/// The input is fully analyzed before any output is produced; the analyzer retains the stream in
/// memory, so no seeking is required of the reader.
pub fn compress<R: io::Read, W: io::Write>(
    reader: R,
    writer: W,
    options: &CompressorOptions,
) -> Result<CompressStats> {
    options.validate()?;

    let mut src = SourceStream::new(reader);
    let mut analyzer = Analyzer::new(AnalyzerOptions {
        dedup: options.dedup,
        profile_override: options.profile_override.as_profile(),
        file_idx: 0,
    });
    analyzer.analyze(&mut src)?;
    let analysis = analyzer.into_analysis();

    let mut sink = SinkStream::new(writer);
    let mut stats = CompressStats { bytes_in: analysis.data.len() as u64, ..Default::default() };

    let mut pos = 0usize;
    for block in &analysis.blocks {
        block.write_header(&mut sink)?;
        stats.blocks[block.profile() as usize] += 1;

        let len = block.length() as usize;
        match block.profile() {
            Profile::Skip => stats.skipped_bytes += block.length(),
            profile => {
                let mut coder = CmCoder::try_new(profile, options.mem_level)?;
                coder.encode_block(&mut sink, &analysis.data[pos..pos + len])?;
            }
        }
        pos += len;
    }

    DetectedBlock::eof().write_header(&mut sink)?;
    sink.flush()?;
    stats.bytes_out = sink.pos();

    info!(
        "compressed {} bytes to {} ({} deduplicated)",
        stats.bytes_in, stats.bytes_out, stats.skipped_bytes
    );
    Ok(stats)
}

/// Decompresses `reader` to `writer`.
///
/// Returns once the end-of-stream header is decoded; anything less is an error and the output
/// should be discarded. Skipped ranges are reported, not written.
pub fn decompress<R: io::Read, W: io::Write>(
    reader: R,
    writer: W,
    options: &CompressorOptions,
) -> Result<DecompressStats> {
    options.validate()?;

    let mut src = SourceStream::new(reader);
    let mut sink = SinkStream::new(writer);
    let mut detector = Detector::new(None);
    let mut stats = DecompressStats::default();

    loop {
        let mut header = [0u8; MAX_HEADER_LEN];
        header[0] = src.read_byte()?;
        let header_len = DetectedBlock::header_len_from_first(header[0]);
        src.read_buf_exact(&mut header[1..header_len])?;
        let block = DetectedBlock::read_from(&header[..header_len])?;

        match block.profile() {
            Profile::Eof => break,
            Profile::Skip => {
                stats.skips.push(SkipRange { pos: stats.logical_len, len: block.length() });
                stats.logical_len += block.length();
            }
            profile => {
                // The framing state machine tracks the block so buffered payload bytes flush
                // with the right boundaries.
                for &byte in &header[..header_len] {
                    detector.put(byte, &mut sink)?;
                }
                debug_assert_eq!(detector.detect(), profile);

                let mut coder = CmCoder::try_new(profile, options.mem_level)?;
                let payload = coder.decode_block(&mut src, block.length())?;
                for &byte in &payload {
                    detector.put(byte, &mut sink)?;
                }
                stats.logical_len += block.length();
            }
        }
    }

    detector.flush(&mut sink)?;
    sink.flush()?;
    stats.bytes_out = sink.pos();

    info!(
        "decompressed {} bytes ({} skipped across {} ranges)",
        stats.logical_len,
        stats.logical_len - stats.bytes_out,
        stats.skips.len()
    );
    Ok(stats)
}
