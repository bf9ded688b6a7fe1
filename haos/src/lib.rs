// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! # haOS
//!
//! haOS is a simulation harness for a small home audio operating system: a
//! cooperative, brick-based runtime that schedules a pipeline of audio
//! processing modules on emulated DSP cores, moves fixed-size blocks of PCM
//! through per-core I/O buffer matrices, and feeds compressed input to
//! decoder front-ends through a bit-addressable FIFO.
//!
//! This crate ties the workspace together: it re-exports the runtime core,
//! the WAV container backend, and the stock processing modules, and provides
//! the default pipeline assembly used by the `haos-play` binary.

pub use haos_core as core;
pub use haos_format_wav as wav;
pub use haos_module_am as am;
pub use haos_module_mp3 as mp3;
pub use haos_module_pcm as pcm;

pub mod default {
    //! The `default` module provides the stock pipeline assemblies so a
    //! simulation can be brought up with minimal boiler-plate.

    use haos_core::module::OdtEntry;
    use haos_core::system::FrontEnd;

    use haos_module_am::AudioManager;
    use haos_module_mp3::{FrameDecoder, Mp3FrontEnd, NullFrameDecoder};
    use haos_module_pcm::PcmDecoder;

    /// The single-core module lists for the selected front-end: the decoder
    /// followed by the audio manager.
    pub fn pipeline(front_end: FrontEnd) -> Vec<Option<Vec<OdtEntry>>> {
        let decoder = match front_end {
            FrontEnd::Pcm => PcmDecoder::odt_entry(),
            FrontEnd::Mp3 => Mp3FrontEnd::odt_entry(Box::new(NullFrameDecoder)),
        };

        vec![Some(vec![decoder, AudioManager::odt_entry()])]
    }

    /// Like [`pipeline`], with a caller-provided MP3 frame decoder.
    pub fn mp3_pipeline(decoder: Box<dyn FrameDecoder>) -> Vec<Option<Vec<OdtEntry>>> {
        vec![Some(vec![Mp3FrontEnd::odt_entry(decoder), AudioManager::odt_entry()])]
    }
}
