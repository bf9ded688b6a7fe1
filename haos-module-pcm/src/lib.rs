// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! The PCM front-end decoder module.
//!
//! The decoder pulls interleaved 32-bit left-justified samples out of the
//! active core's FIFO through the bit-ripper, deinterleaves them into one
//! brick per source channel, and hands the bricks to the core with frame
//! metadata attached. The source-to-IO-channel routing is host-comm
//! controlled through the parameter block.

use log::debug;

use haos_core::config::{ChannelMask, Sample, BRICK_SIZE, NO_SOURCE, NUM_IO_CHANNELS, SAMPLE_SCALE};
use haos_core::module::{Module, OdtEntry};
use haos_core::system::HostContext;
use haos_core::transfer::{BrickTransfer, DecodeInfo, FrameData};

/// Host-comm module id of the PCM decoder.
pub const PCM_DECODER_MODULE_ID: u32 = 0x10;

// Parameter block layout, in words.
const MCV_ENABLE: usize = 0;
const MCV_SRC_MAP: usize = 1;
const MCV_RESERVED_WORDS: usize = 32;
const MCV_WORDS: usize = MCV_SRC_MAP + NUM_IO_CHANNELS + MCV_RESERVED_WORDS;

/// The PCM decoder.
///
/// MCV layout: word 0 enables the decoder; words 1..33 map each IO channel
/// to a source (WAV) channel, `NO_SOURCE` marking unrouted channels. The
/// defaults route source channels 0 and 1 to IO channels 0 and 1.
pub struct PcmDecoder {
    mcv: [u32; MCV_WORDS],
    frame_data: FrameData,
}

impl PcmDecoder {
    pub fn new() -> PcmDecoder {
        let mut mcv = [NO_SOURCE; MCV_WORDS];

        mcv[MCV_ENABLE] = 1;
        mcv[MCV_SRC_MAP] = 0;
        mcv[MCV_SRC_MAP + 1] = 1;

        PcmDecoder { mcv, frame_data: FrameData::default() }
    }

    /// The decoder packaged as a module table entry.
    pub fn odt_entry() -> OdtEntry {
        OdtEntry::new(PCM_DECODER_MODULE_ID, Box::new(PcmDecoder::new()))
    }

    fn enabled(&self) -> bool {
        self.mcv[MCV_ENABLE] != 0
    }

    /// Channels with a routed source, per the parameter block.
    fn routed_mask(&self) -> ChannelMask {
        let mut mask = 0;

        for channel in 0..NUM_IO_CHANNELS {
            if self.mcv[MCV_SRC_MAP + channel] != NO_SOURCE {
                mask |= 1 << channel;
            }
        }

        mask
    }
}

impl Default for PcmDecoder {
    fn default() -> Self {
        PcmDecoder::new()
    }
}

impl Module for PcmDecoder {
    fn mcv_mut(&mut self) -> Option<&mut [u32]> {
        Some(&mut self.mcv)
    }

    fn postkick(&mut self, ctx: &mut HostContext<'_>) {
        let mask = self.routed_mask();

        self.frame_data.input_channel_mask = mask;
        self.frame_data.output_channel_mask = mask;
        self.frame_data.sample_rate = ctx.input_sample_rate() as i32;
        self.frame_data.decode_info = DecodeInfo::Pcm;
    }

    fn brick(&mut self, ctx: &mut HostContext<'_>) {
        if !self.enabled() {
            return;
        }

        // Keep decoding while data is buffered; after EOF the feeder's zero
        // padding flushes the pipeline with silent bricks.
        if ctx.input_stream_eof() && ctx.read_dipstick() == 0 {
            return;
        }

        let input_channels = ctx.input_channel_count() as usize;
        if input_channels == 0 {
            return;
        }

        // Extract one brick of interleaved samples and split them by source
        // channel.
        let mut bricks = [[0.0 as Sample; BRICK_SIZE]; NUM_IO_CHANNELS];

        for sample in 0..BRICK_SIZE {
            for channel in 0..input_channels {
                let word = ctx.extract_bits(32) as i32;
                if channel < NUM_IO_CHANNELS {
                    bricks[channel][sample] = Sample::from(word) / SAMPLE_SCALE;
                }
            }
        }

        self.frame_data.output_channel_mask = self.frame_data.input_channel_mask;
        self.frame_data.sample_rate = ctx.input_sample_rate() as i32;

        // The k-th routed IO channel receives the k-th source channel.
        let mut transfer = BrickTransfer::new();
        transfer.frame_data = Some(&self.frame_data);

        let mut source = 0;
        let mut mask = self.frame_data.input_channel_mask;
        let mut channel = 0;

        while mask != 0 {
            if mask & 1 != 0 {
                transfer.channels[channel] = Some(&bricks[source]);
                source += 1;
            }
            channel += 1;
            mask >>= 1;
        }

        let output_mask = self.frame_data.output_channel_mask;

        ctx.copy_brick_to_io(&transfer);
        ctx.set_valid_channel_mask(output_mask);
    }

    fn premalloc(&mut self, _ctx: &mut HostContext<'_>) {
        debug!("pcm decoder premalloc");
    }
}
