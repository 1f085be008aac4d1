// Baler
// Copyright (c) The Project Baler Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stream analysis for Baler: block detection, content-defined deduplication, and the analyzer
//! that drives both over a whole input.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Baler crates. Please see the workspace Cargo.toml
// for their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

mod analyzer;
mod dedup;
mod detector;
mod dict;

pub use analyzer::{Analysis, Analyzer, AnalyzerOptions};
pub use dedup::{DedupEntry, Deduplicator, WINDOW_SIZE};
pub use detector::{Detector, LOOKAHEAD_CAPACITY};
pub use dict::{DictBuilder, Dictionary};
