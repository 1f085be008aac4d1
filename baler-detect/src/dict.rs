// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use baler_core::words::{word_transform, WordTransform};

use hashbrown::HashMap;

/// Words shorter than this are not counted.
const MIN_WORD_LEN: usize = 2;

/// Words longer than this are dropped outright.
const MAX_WORD_LEN: usize = 32;

/// `DictBuilder` accumulates case-folded word frequencies from the text blocks of a stream.
///
/// Bytes are segmented with the shared word transform: any byte mapping to the sentinel code
/// terminates the current word. Words are keyed by their transform codes, so `The` and `the`
/// count as one word.
pub struct DictBuilder {
    transform: &'static WordTransform,
    counts: HashMap<Box<[u8]>, u64>,
    current: Vec<u8>,
    overlong: bool,
}

impl Default for DictBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DictBuilder {
    pub fn new() -> Self {
        DictBuilder {
            transform: word_transform(),
            counts: HashMap::new(),
            current: Vec::with_capacity(MAX_WORD_LEN),
            overlong: false,
        }
    }

    pub fn add_byte(&mut self, byte: u8) {
        let code = self.transform.index(byte);
        if code != WordTransform::SENTINEL {
            if self.current.len() < MAX_WORD_LEN {
                self.current.push(code as u8);
            }
            else {
                self.overlong = true;
            }
            return;
        }
        self.finish_word();
    }

    fn finish_word(&mut self) {
        if !self.overlong && self.current.len() >= MIN_WORD_LEN {
            *self.counts.entry_ref(&self.current[..]).or_insert(0) += 1;
        }
        self.current.clear();
        self.overlong = false;
    }

    /// Finalizes the trailing word and produces the dictionary.
    pub fn build(mut self) -> Dictionary {
        self.finish_word();
        Dictionary { counts: self.counts }
    }
}

/// A word-frequency dictionary keyed by case-folded word codes.
pub struct Dictionary {
    counts: HashMap<Box<[u8]>, u64>,
}

impl Dictionary {
    /// Number of distinct words.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Occurrence count for a word given as transform codes.
    pub fn count(&self, word: &[u8]) -> u64 {
        self.counts.get(word).copied().unwrap_or(0)
    }

    /// The `n` most frequent words, most frequent first. Ties order by word code.
    pub fn top(&self, n: usize) -> Vec<(&[u8], u64)> {
        let mut all: Vec<(&[u8], u64)> =
            self.counts.iter().map(|(word, &count)| (word.as_ref(), count)).collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        all.truncate(n);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::DictBuilder;

    fn codes(word: &str) -> Vec<u8> {
        word.bytes().map(|b| b - b'a').collect()
    }

    #[test]
    fn verify_word_counts_fold_case() {
        let mut builder = DictBuilder::new();
        for b in b"The cat and the other cat".iter() {
            builder.add_byte(*b);
        }
        let dict = builder.build();

        assert_eq!(dict.count(&codes("the")), 2);
        assert_eq!(dict.count(&codes("cat")), 2);
        assert_eq!(dict.count(&codes("and")), 1);
        assert_eq!(dict.count(&codes("other")), 1);
        assert_eq!(dict.len(), 4);
    }

    #[test]
    fn verify_short_and_overlong_words_dropped() {
        let mut builder = DictBuilder::new();
        for b in b"a bb ".iter() {
            builder.add_byte(*b);
        }
        for _ in 0..40 {
            builder.add_byte(b'z');
        }
        builder.add_byte(b' ');
        let dict = builder.build();

        assert_eq!(dict.count(&codes("bb")), 1);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn verify_top_orders_by_frequency() {
        let mut builder = DictBuilder::new();
        for b in b"red red red green green blue".iter() {
            builder.add_byte(*b);
        }
        let dict = builder.build();

        let top = dict.top(2);
        assert_eq!(top[0], (&codes("red")[..], 3));
        assert_eq!(top[1], (&codes("green")[..], 2));
    }
}
