// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use baler_core::block::{DetectedBlock, Profile, MAX_BLOCK_LEN, PROFILE_COUNT};
use baler_core::errors::{invariant_error, Result};
use baler_core::io::ReadBytes;

use log::{debug, info};

use crate::dedup::{DedupEntry, Deduplicator, WINDOW_SIZE};
use crate::detector::Detector;
use crate::dict::{DictBuilder, Dictionary};

/// Binary runs shorter than this, sandwiched between two text blocks, are merged into the text.
const MIN_BINARY_LEN: u64 = 1;

/// Options for [`Analyzer`].
#[derive(Clone, Copy, Debug)]
pub struct AnalyzerOptions {
    /// Run the deduplicator alongside detection.
    pub dedup: bool,
    /// Force every block to the given profile instead of classifying.
    pub profile_override: Option<Profile>,
    /// Namespace for dedup bookmarks produced by this stream.
    pub file_idx: u32,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        AnalyzerOptions { dedup: true, profile_override: None, file_idx: 0 }
    }
}

/// The product of analyzing a stream.
pub struct Analysis {
    /// The finalized block list. Lengths sum to the length of `data`.
    pub blocks: Vec<DetectedBlock>,
    /// Every byte consumed from the stream, in order.
    pub data: Vec<u8>,
    /// Word frequencies accumulated from text blocks.
    pub dictionary: Dictionary,
}

enum ByteOutcome {
    Continue,
    /// Abandon the current block and restart detection.
    Restart,
}

/// `Analyzer` drives the detector and deduplicator jointly over a whole input and produces the
/// finalized block list.
///
/// Adjacent blocks of one profile are coalesced, tiny binary slivers between text blocks are
/// suppressed, and confirmed dedup matches rewrite the tail of the block list into `Skip`
/// blocks. The analyzer retains the consumed bytes: they back both match confirmation and the
/// later compression pass, so no seeking is ever required of the source.
pub struct Analyzer {
    options: AnalyzerOptions,
    blocks: Vec<DetectedBlock>,
    /// Total length of all emitted blocks, in bytes.
    emitted_len: u64,
    /// Offset of the current stream's first byte within `data`.
    data_base: u64,
    dedup: Option<Deduplicator>,
    dict: DictBuilder,
    data: Vec<u8>,
}

impl Analyzer {
    pub fn new(options: AnalyzerOptions) -> Self {
        Analyzer {
            options,
            blocks: Vec::new(),
            emitted_len: 0,
            data_base: 0,
            dedup: options.dedup.then(Deduplicator::new),
            dict: DictBuilder::new(),
            data: Vec::new(),
        }
    }

    /// Analyzes one stream to its end, appending to the block list. When analyzing several
    /// streams through one analyzer, give each a distinct `file_idx`.
    pub fn analyze<S: ReadBytes>(&mut self, src: &mut S) -> Result<()> {
        let mut detector = Detector::new(self.options.profile_override);
        self.data_base = self.data.len() as u64;
        if let Some(dedup) = self.dedup.as_mut() {
            dedup.reset_pos();
        }

        'stream: loop {
            let mut block = detector.detect_block(src)?;
            if block.profile() == Profile::Eof {
                break;
            }

            let mut seen = 0u64;
            while seen < block.length() {
                let byte = match detector.pop_byte(src)? {
                    Some(byte) => byte,
                    None => {
                        // The detected length can overrun the stream; clamp at its end.
                        block.set_length(seen);
                        break;
                    }
                };
                self.data.push(byte);
                seen += 1;

                match self.process_byte(byte, block.profile(), &mut detector, src)? {
                    ByteOutcome::Restart => continue 'stream,
                    ByteOutcome::Continue => (),
                }
            }

            if block.length() > 0 {
                self.push_coalesced(block);
            }
        }

        self.log_summary();
        Ok(())
    }

    fn process_byte<S: ReadBytes>(
        &mut self,
        byte: u8,
        profile: Profile,
        detector: &mut Detector,
        src: &mut S,
    ) -> Result<ByteOutcome> {
        // The deduplicator is taken out for the duration of the confirmation so it can be fed
        // alongside the retained bytes, and restored before any error propagates.
        if let Some(mut dedup) = self.dedup.take() {
            let confirmed = match dedup.add_byte(byte, self.options.file_idx) {
                Some(entry) if entry.file_idx == self.options.file_idx => {
                    self.confirm_match(&mut dedup, &entry, detector, src)
                }
                Some(entry) => {
                    debug!("dedup candidate in foreign file {} ignored", entry.file_idx);
                    Ok(None)
                }
                None => Ok(None),
            };
            self.dedup = Some(dedup);

            if let Some((new_pos, len)) = confirmed? {
                self.rewrite_for_match(profile, new_pos, len)?;
                return Ok(ByteOutcome::Restart);
            }
        }

        if profile == Profile::Text {
            self.dict.add_byte(byte);
        }
        Ok(ByteOutcome::Continue)
    }

    /// Confirms a dedup candidate by direct byte comparison, then grows the match backward over
    /// retained bytes and forward over the lookahead. Returns the match start and length, or
    /// `None` for a false positive.
    ///
    /// Forward growth consumes the matched bytes, which keeps the deduplicator aligned with the
    /// logical stream.
    fn confirm_match<S: ReadBytes>(
        &mut self,
        dedup: &mut Deduplicator,
        entry: &DedupEntry,
        detector: &mut Detector,
        src: &mut S,
    ) -> Result<Option<(u64, u64)>> {
        let w = WINDOW_SIZE;
        // The candidate byte has been ingested, so it sits at `pos - 1`.
        let cand_end = self.data_base + dedup.pos() - 1;
        let book_end = self.data_base + entry.offset;

        // Reject bookmarks and candidates whose window was not yet full, and self-matches.
        if book_end < self.data_base + (w - 1)
            || cand_end < self.data_base + (w - 1)
            || book_end >= cand_end
        {
            return Ok(None);
        }

        let book_start = (book_end + 1 - w) as usize;
        let cand_start = (cand_end + 1 - w) as usize;
        if self.data[book_start..book_start + w as usize]
            != self.data[cand_start..cand_start + w as usize]
        {
            debug!("dedup candidate at {} was a fingerprint collision", cand_end);
            return Ok(None);
        }

        // Grow backward over bytes already retained.
        let mut new_pos = cand_start as u64;
        let mut mirror = book_start as u64;
        while new_pos > self.data_base
            && mirror > self.data_base
            && cand_end + 1 - new_pos < MAX_BLOCK_LEN
            && self.data[(mirror - 1) as usize] == self.data[(new_pos - 1) as usize]
        {
            new_pos -= 1;
            mirror -= 1;
        }

        // Grow forward over the lookahead, byte for byte against the mirror region.
        let base_len = cand_end + 1 - new_pos;
        let mut fwd = 0u64;
        while base_len + fwd < MAX_BLOCK_LEN {
            let mirror_idx = (book_end + 1 + fwd) as usize;
            debug_assert!(mirror_idx < self.data.len());
            match detector.peek_byte(src)? {
                Some(byte) if byte == self.data[mirror_idx] => {
                    detector.pop_byte(src)?;
                    self.data.push(byte);
                    // Nested candidates inside a match being consumed are of no further use.
                    dedup.add_byte(byte, self.options.file_idx);
                    fwd += 1;
                }
                _ => break,
            }
        }

        Ok(Some((new_pos, base_len + fwd)))
    }

    /// Rewrites the block list for a confirmed match covering `[new_pos, new_pos + len)` and
    /// appends the `Skip` block.
    fn rewrite_for_match(
        &mut self,
        profile: Profile,
        new_pos: u64,
        len: u64,
    ) -> Result<()> {
        if new_pos >= self.emitted_len {
            // The match begins inside the current block; emit its unmatched prefix first.
            let prefix = new_pos - self.emitted_len;
            if prefix > 0 {
                self.push_coalesced(DetectedBlock::new(profile, prefix));
            }
        }
        else {
            // The match reaches back into already-emitted blocks; reclaim the overlap.
            let mut delta = self.emitted_len - new_pos;
            if delta > len {
                return invariant_error("dedup walkback delta exceeds match length");
            }
            while delta > 0 {
                let last = match self.blocks.last_mut() {
                    Some(last) => last,
                    None => return invariant_error("dedup walkback past start of block list"),
                };
                let sub = delta.min(last.length());
                if last.length() > sub {
                    last.pop(sub);
                }
                else {
                    self.blocks.pop();
                }
                delta -= sub;
                self.emitted_len -= sub;
            }
        }

        debug!("dedup match of {} bytes at {}", len, new_pos);
        self.push_coalesced(DetectedBlock::new(Profile::Skip, len));
        Ok(())
    }

    fn push_coalesced(&mut self, block: DetectedBlock) {
        self.emitted_len += block.length();

        if let Some(last) = self.blocks.last_mut() {
            if last.profile() == block.profile() {
                last.extend(block.length());
                return;
            }
        }

        // Replace <text> <binary> <text> with <text> when the binary sliver is below the
        // minimum.
        if block.profile() == Profile::Text && self.blocks.len() >= 2 {
            let tail = self.blocks.len() - 2;
            let b1 = self.blocks[tail + 1];
            let b2 = self.blocks[tail];
            if b1.profile() == Profile::Binary
                && b2.profile() == Profile::Text
                && b1.length() < MIN_BINARY_LEN
            {
                self.blocks[tail].extend(b1.length() + block.length());
                self.blocks.pop();
                return;
            }
        }

        self.blocks.push(block);
    }

    fn log_summary(&self) {
        let mut blocks = [0u64; PROFILE_COUNT];
        let mut bytes = [0u64; PROFILE_COUNT];
        for block in &self.blocks {
            blocks[block.profile() as usize] += 1;
            bytes[block.profile() as usize] += block.length();
        }

        info!("analyzed {} bytes into {} blocks", self.emitted_len, self.blocks.len());
        for profile in [Profile::Text, Profile::Binary, Profile::Wave16, Profile::Skip] {
            let i = profile as usize;
            if bytes[i] > 0 {
                info!("  {} : {} ({} bytes)", profile.as_str(), blocks[i], bytes[i]);
            }
        }
    }

    /// Current finalized block list.
    pub fn blocks(&self) -> &[DetectedBlock] {
        &self.blocks
    }

    /// Finishes analysis and hands over the block list, retained bytes, and dictionary.
    pub fn into_analysis(self) -> Analysis {
        Analysis { blocks: self.blocks, data: self.data, dictionary: self.dict.build() }
    }
}

#[cfg(test)]
mod tests {
    use super::{Analyzer, AnalyzerOptions};
    use baler_core::block::{DetectedBlock, Profile};
    use baler_core::io::SourceStream;

    use rand::rngs::SmallRng;
    use rand::{Rng, RngCore, SeedableRng};

    fn make_text(len: usize) -> Vec<u8> {
        b"Hello, world! This is text. ".iter().copied().cycle().take(len).collect()
    }

    /// Aperiodic ASCII text: random lowercase words.
    fn make_random_text(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            for _ in 0..rng.random_range(2..10) {
                out.push(rng.random_range(b'a'..=b'z'));
            }
            out.push(b' ');
        }
        out.truncate(len);
        out
    }

    fn make_random_binary(len: usize, seed: u64) -> Vec<u8> {
        let mut out = vec![0u8; len];
        SmallRng::seed_from_u64(seed).fill_bytes(&mut out);
        out
    }

    fn make_wav(data: &[u8]) -> Vec<u8> {
        let mut file = Vec::new();
        file.extend_from_slice(b"RIFF");
        file.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        file.extend_from_slice(b"WAVE");
        file.extend_from_slice(b"fmt ");
        file.extend_from_slice(&16u32.to_le_bytes());
        file.extend_from_slice(&1u16.to_le_bytes());
        file.extend_from_slice(&2u16.to_le_bytes());
        file.extend_from_slice(&44100u32.to_le_bytes());
        file.extend_from_slice(&176400u32.to_le_bytes());
        file.extend_from_slice(&4u16.to_le_bytes());
        file.extend_from_slice(&16u16.to_le_bytes());
        file.extend_from_slice(b"data");
        file.extend_from_slice(&(data.len() as u32).to_le_bytes());
        file.extend_from_slice(data);
        file
    }

    fn analyze(data: &[u8], options: AnalyzerOptions) -> Vec<DetectedBlock> {
        let mut src = SourceStream::new(data);
        let mut analyzer = Analyzer::new(options);
        analyzer.analyze(&mut src).unwrap();
        let analysis = analyzer.into_analysis();
        assert_eq!(analysis.data, data);
        assert_eq!(
            analysis.blocks.iter().map(|b| b.length()).sum::<u64>(),
            data.len() as u64
        );
        analysis.blocks
    }

    #[test]
    fn verify_repeated_sentence_is_one_text_block() {
        let data = make_text(200);
        let blocks = analyze(&data, AnalyzerOptions { dedup: false, ..Default::default() });
        assert_eq!(blocks, vec![DetectedBlock::new(Profile::Text, 200)]);
    }

    #[test]
    fn verify_uniform_random_is_one_binary_block() {
        let data = make_random_binary(4096, 99);
        let blocks = analyze(&data, AnalyzerOptions::default());
        assert_eq!(blocks, vec![DetectedBlock::new(Profile::Binary, 4096)]);
    }

    #[test]
    fn verify_wav_file_blocks() {
        let samples = make_random_binary(1024, 3);
        let data = make_wav(&samples);
        let blocks = analyze(&data, AnalyzerOptions::default());
        assert_eq!(
            blocks,
            vec![
                DetectedBlock::new(Profile::Binary, 44),
                DetectedBlock::new(Profile::Wave16, 1024),
            ]
        );
    }

    #[test]
    fn verify_duplicate_text_becomes_skip() {
        let copy = make_random_text(70 * 1024, 42);
        let mut data = copy.clone();
        data.extend_from_slice(&copy);

        let blocks = analyze(&data, AnalyzerOptions::default());
        assert_eq!(
            blocks,
            vec![
                DetectedBlock::new(Profile::Text, 70 * 1024),
                DetectedBlock::new(Profile::Skip, 70 * 1024),
            ]
        );
    }

    #[test]
    fn verify_no_adjacent_blocks_share_a_profile() {
        let mut data = make_text(300);
        data.extend_from_slice(&make_random_binary(600, 5));
        data.extend_from_slice(&make_text(400));
        data.extend_from_slice(&make_random_binary(200, 6));

        let blocks = analyze(&data, AnalyzerOptions::default());
        assert!(blocks.len() >= 2);
        for pair in blocks.windows(2) {
            assert_ne!(pair[0].profile(), pair[1].profile());
        }
    }

    #[test]
    fn verify_dedup_disabled_emits_no_skip() {
        let copy = make_random_text(70 * 1024, 21);
        let mut data = copy.clone();
        data.extend_from_slice(&copy);

        let blocks = analyze(&data, AnalyzerOptions { dedup: false, ..Default::default() });
        assert_eq!(blocks, vec![DetectedBlock::new(Profile::Text, 140 * 1024)]);
    }

    #[test]
    fn verify_analysis_dictionary() {
        let data = make_text(200);
        let mut src = SourceStream::new(&data[..]);
        let mut analyzer =
            Analyzer::new(AnalyzerOptions { dedup: false, ..Default::default() });
        analyzer.analyze(&mut src).unwrap();
        let analysis = analyzer.into_analysis();

        // "hello" appears once per 28-byte phrase.
        let hello: Vec<u8> = b"hello".iter().map(|b| b - b'a').collect();
        assert!(analysis.dictionary.count(&hello) >= 7);
    }
}
