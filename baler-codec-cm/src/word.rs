// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use baler_core::utf8::Utf8Decoder;
use baler_core::words::{word_transform, WordTransform};

/// `WordModel` hashes the current word, code point by code point, through a UTF-8 decoder.
///
/// Complete code points below 256 are folded through the shared word transform; a terminator
/// rolls the word hash into `prev` and resets. Bytes inside a multi-byte sequence stir only the
/// secondary hash, so partial code points still contribute context.
pub struct WordModel {
    h1: u32,
    h2: u32,
    prev: u32,
    len: u32,
    decoder: Utf8Decoder,
    transform: &'static WordTransform,
}

const H1_INIT: u32 = 0x1F20239A;
const H2_INIT: u32 = 0xBE5FD47A;

fn hash_func(c: u32, mut h: u32) -> u32 {
    h = h.wrapping_mul(61).wrapping_add(c);
    h = h.wrapping_add(h.rotate_left(10));
    h ^ (h >> 8)
}

impl Default for WordModel {
    fn default() -> Self {
        Self::new()
    }
}

impl WordModel {
    pub fn new() -> Self {
        WordModel {
            h1: H1_INIT,
            h2: H2_INIT,
            prev: 0,
            len: 0,
            decoder: Utf8Decoder::new(),
            transform: word_transform(),
        }
    }

    fn reset(&mut self) {
        self.h1 = H1_INIT;
        self.h2 = H2_INIT;
        self.len = 0;
    }

    /// Current word-context hash.
    #[inline(always)]
    pub fn hash(&self) -> u32 {
        self.h1.wrapping_add(self.h2)
    }

    /// Hash of the previous word.
    #[inline(always)]
    pub fn prev_hash(&self) -> u32 {
        self.prev
    }

    /// Completed code points in the current word.
    #[inline(always)]
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Feeds one byte through the UTF-8 decoder and into the word hashes.
    pub fn update(&mut self, byte: u8) {
        self.decoder.update(byte);
        let mut cur = self.decoder.acc();
        if self.decoder.done() {
            if cur < 256 {
                cur = u32::from(self.transform.index(cur as u8));
            }
            if cur != u32::from(WordTransform::SENTINEL) {
                self.h1 = hash_func(cur, self.h1);
                self.h2 = self.h1.wrapping_mul(8);
                self.len += 1;
            }
            else if self.len != 0 {
                self.prev = self.hash().rotate_left(13);
                self.reset();
            }
        }
        else {
            self.h2 = hash_func(cur, self.h2);
        }
    }
}
