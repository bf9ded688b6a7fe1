// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! WAV container support for the haOS simulator.
//!
//! The crate provides the concrete stream backends behind the runtime's
//! [`StreamIo`] seam: a RIFF/WAVE reader yielding 32-bit left-justified
//! samples, a raw word source for inputs that are not PCM containers
//! (compressed bitstreams), and a WAVE writer that rewrites its header on
//! every flush so partial output stays observable.

mod read;
mod write;

pub use read::{RawWordSource, WavReader, WavSource};
pub use write::WavWriter;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::debug;

use haos_core::errors::{config_error, Error, Result};
use haos_core::stream::{InputSource, OutputSink, OutputSpec, StreamIo};

/// File-backed container backend.
///
/// Input files are probed as WAVE first; anything that does not parse as a
/// PCM container is served as a raw little-endian word stream and flagged
/// compressed.
#[derive(Default)]
pub struct WavIo;

impl StreamIo for WavIo {
    fn open_input(&mut self, path: &Path) -> Result<Box<dyn InputSource>> {
        let file = File::open(path).map_err(|err| {
            Error::ConfigError(format!("unable to open input file '{}': {}", path.display(), err))
        })?;

        match WavReader::new(BufReader::new(file)) {
            Ok(reader) => Ok(Box::new(WavSource::new(reader))),
            Err(err) => {
                debug!("'{}' is not a PCM wave file ({}), treating as compressed", path.display(), err);

                let file = File::open(path).map_err(Error::IoError)?;
                Ok(Box::new(RawWordSource::new(file)))
            }
        }
    }

    fn open_output(&mut self, path: &Path, spec: &OutputSpec) -> Result<Box<dyn OutputSink>> {
        match WavWriter::create(path, spec) {
            Ok(writer) => Ok(Box::new(writer)),
            Err(err) => config_error(format!(
                "unable to open output file '{}': {}",
                path.display(),
                err
            )),
        }
    }
}
