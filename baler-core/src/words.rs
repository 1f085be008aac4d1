// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `words` module defines the byte-to-word-code transform shared by the text model and the
//! dictionary builder.
//!
//! Letters fold to the same low code regardless of case, a handful of punctuation bytes that
//! carry word-like information get dedicated codes, and Latin-1 letter pairs share codes. Every
//! other byte maps to [`WordTransform::SENTINEL`], the word-terminator code.

use once_cell::sync::Lazy;

static TRANSFORM: Lazy<WordTransform> = Lazy::new(WordTransform::init);

/// Gets the shared word transform table.
pub fn word_transform() -> &'static WordTransform {
    &TRANSFORM
}

/// Mapping from byte to compact word code.
pub struct WordTransform {
    map: [u16; 256],
}

impl WordTransform {
    /// The word-terminator code. All bytes that cannot appear inside a word map here.
    pub const SENTINEL: u16 = 256;

    fn init() -> Self {
        let mut map = [Self::SENTINEL; 256];
        let mut index = 0u16;

        for b in b'a'..=b'z' {
            map[b as usize] = index;
            index += 1;
        }
        for b in b'A'..=b'Z' {
            map[b as usize] = map[(b + 32) as usize];
        }

        for b in [b'"', b'&', b'<', b'{'] {
            map[b as usize] = index;
            index += 1;
        }

        // Latin-1 letters fold in upper/lower pairs. 0xD7 and 0xF7 are the multiplication and
        // division signs, not letters.
        for upper in 0xC0u16..=0xDE {
            if upper == 0xD7 {
                continue;
            }
            map[upper as usize] = index;
            map[(upper + 0x20) as usize] = index;
            index += 1;
        }

        WordTransform { map }
    }

    /// Gets the word code for a byte.
    #[inline(always)]
    pub fn index(&self, byte: u8) -> u16 {
        self.map[byte as usize]
    }

    /// Whether the byte terminates a word.
    #[inline(always)]
    pub fn is_terminator(&self, byte: u8) -> bool {
        self.map[byte as usize] == Self::SENTINEL
    }
}

#[cfg(test)]
mod tests {
    use super::{word_transform, WordTransform};

    #[test]
    fn verify_letters_fold_to_unique_low_codes() {
        let transform = word_transform();

        for (i, b) in (b'a'..=b'z').enumerate() {
            assert_eq!(transform.index(b), i as u16);
            assert_eq!(transform.index(b.to_ascii_uppercase()), i as u16);
        }
    }

    #[test]
    fn verify_terminators() {
        let transform = word_transform();

        for b in [b' ', b'\n', b'.', b',', b'0', b'9', 0x00, 0xD7, 0xF7] {
            assert!(transform.is_terminator(b), "byte {:#04X} should terminate", b);
        }
        for b in [b'a', b'Z', b'"', b'&', b'<', b'{', 0xC0, 0xE0, 0xDE, 0xFE] {
            assert!(!transform.is_terminator(b), "byte {:#04X} should not terminate", b);
        }
    }

    #[test]
    fn verify_latin1_pairs_share_codes() {
        let transform = word_transform();

        for upper in 0xC0u8..=0xDE {
            if upper == 0xD7 {
                continue;
            }
            assert_eq!(transform.index(upper), transform.index(upper + 0x20));
            assert_ne!(transform.index(upper), WordTransform::SENTINEL);
        }
    }
}
