// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `stream` module defines the seams to the external container world:
//! the input source the stream feeder drains, the output sink drained bricks
//! are written to, and the descriptors the runtime keeps for both.

use std::path::{Path, PathBuf};

use bitflags::bitflags;

use crate::config::{DEFAULT_SAMPLE_RATE, OUTPUT_BITS_PER_SAMPLE_DFLT};
use crate::errors::Result;
use crate::transfer::DecodeInfo;

bitflags! {
    /// Control flags of one stream descriptor.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StreamFlags: u32 {
        /// The backing file has not been opened yet.
        const FIRST_OPEN = 1 << 0;
        /// The end of the stream has been reached.
        const END_OF_FILE = 1 << 1;
        /// The stream carries a compressed bitstream, not PCM words.
        const COMPRESSED = 1 << 2;
        /// Samples should be rounded on output. Accepted but not applied.
        const ROUNDING = 1 << 3;
    }
}

/// Properties of an opened input container.
#[derive(Clone, Copy, Debug, Default)]
pub struct InputInfo {
    /// The container did not parse as PCM; words are raw stream bytes.
    pub compressed: bool,
    pub sample_rate: u32,
    pub channel_count: u32,
    pub bits_per_sample: u32,
    /// Samples per channel, zero when unknown.
    pub channel_samples: u32,
}

/// A container that yields 32-bit words in stream order.
///
/// For a PCM container every word is one left-justified signed sample; for a
/// compressed container words are four stream bytes in little-endian order.
/// After EOF, `next_word` keeps returning zero words.
pub trait InputSource {
    fn info(&self) -> InputInfo;

    fn next_word(&mut self) -> u32;

    fn eof(&self) -> bool;
}

/// Shape of the output stream, fixed at open time.
#[derive(Clone, Copy, Debug)]
pub struct OutputSpec {
    pub bits_per_sample: u32,
    pub channel_count: u32,
    pub sample_rate: u32,
}

/// A sink accepting 32-bit left-justified signed samples.
pub trait OutputSink {
    /// Append one sample. `rounding` requests half-LSB rounding before
    /// truncation; the request is recorded by the contract but currently not
    /// applied by any sink.
    fn send_sample(&mut self, sample: i32, rounding: bool);

    /// Rewrite the container header so everything appended so far is
    /// observable.
    fn flush_header(&mut self) -> Result<()>;

    /// Samples per channel written so far.
    fn channel_samples(&self) -> u32;
}

/// Factory for the concrete container implementations.
///
/// The runtime opens streams lazily through this seam, keeping the core free
/// of any container format knowledge.
pub trait StreamIo {
    fn open_input(&mut self, path: &Path) -> Result<Box<dyn InputSource>>;

    fn open_output(&mut self, path: &Path, spec: &OutputSpec) -> Result<Box<dyn OutputSink>>;
}

/// Runtime descriptor of the input stream.
pub struct InStream {
    pub flags: StreamFlags,
    pub path: Option<PathBuf>,
    pub source: Option<Box<dyn InputSource>>,
    pub decode: DecodeInfo,
    pub sample_rate: u32,
    pub channel_count: u32,
    pub bits_per_sample: u32,
    pub channel_samples: u32,
}

impl InStream {
    pub fn new(path: Option<PathBuf>) -> InStream {
        InStream {
            flags: StreamFlags::FIRST_OPEN,
            path,
            source: None,
            decode: DecodeInfo::Unknown,
            sample_rate: 0,
            channel_count: 0,
            bits_per_sample: 0,
            channel_samples: 0,
        }
    }

    pub fn eof(&self) -> bool {
        self.flags.contains(StreamFlags::END_OF_FILE)
    }

    pub fn set_eof(&mut self, value: bool) {
        self.flags.set(StreamFlags::END_OF_FILE, value);
    }

    pub fn compressed(&self) -> bool {
        self.flags.contains(StreamFlags::COMPRESSED)
    }

    pub fn set_compressed(&mut self, value: bool) {
        self.flags.set(StreamFlags::COMPRESSED, value);
    }
}

/// Runtime descriptor of the output stream.
pub struct OutStream {
    pub flags: StreamFlags,
    pub path: Option<PathBuf>,
    pub sink: Option<Box<dyn OutputSink>>,
    pub sample_rate: u32,
    pub channel_count: u32,
    pub bits_per_sample: u32,
    /// `--ofs` override; wins over frame metadata and the input rate.
    pub forced_sample_rate: Option<u32>,
    /// `--osample` override; wins over the input sample width.
    pub forced_bits_per_sample: Option<u32>,
}

impl OutStream {
    pub fn new(path: Option<PathBuf>) -> OutStream {
        OutStream {
            flags: StreamFlags::empty(),
            path,
            sink: None,
            sample_rate: 0,
            channel_count: 0,
            bits_per_sample: OUTPUT_BITS_PER_SAMPLE_DFLT,
            forced_sample_rate: None,
            forced_bits_per_sample: None,
        }
    }

    /// The sample width the sink should be opened with: an explicit
    /// override, then the input width, then the system default.
    pub fn resolve_bits_per_sample(&self, input_bits: u32) -> u32 {
        if let Some(forced) = self.forced_bits_per_sample {
            forced
        }
        else if input_bits != 0 {
            input_bits
        }
        else {
            OUTPUT_BITS_PER_SAMPLE_DFLT
        }
    }

    /// The sample rate the sink should be opened with: an explicit override,
    /// then frame metadata, then the fallback passed by the caller, then the
    /// system default.
    pub fn resolve_sample_rate(&self, input_rate: u32) -> u32 {
        if let Some(forced) = self.forced_sample_rate {
            forced
        }
        else if self.sample_rate != 0 {
            self.sample_rate
        }
        else if input_rate != 0 {
            input_rate
        }
        else {
            DEFAULT_SAMPLE_RATE
        }
    }
}
