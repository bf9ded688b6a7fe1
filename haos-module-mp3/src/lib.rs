// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! The MP3 front-end module.
//!
//! The front-end splits decoding across the background and foreground:
//! the background hook pulls a compressed chunk out of the FIFO through the
//! bit-ripper, runs the frame decoder, and queues the decoded samples per
//! channel; the AFAP hook hands one brick per active channel to the core
//! whenever a brick of PCM is buffered. The queues are bounded
//! single-producer/single-consumer rings sized to exactly two decoded
//! frames, decoupling decode jitter from the brick cadence.
//!
//! The MP3 bitstream algorithm itself is an external collaborator behind
//! the [`FrameDecoder`] trait; a front-end built with [`NullFrameDecoder`]
//! treats every chunk as a failed (zero-length) decode and forwards no PCM.

use log::debug;

use haos_core::config::{ChannelMask, Sample, BRICK_SIZE, NO_SOURCE, NUM_IO_CHANNELS};
use haos_core::matrix::Brick;
use haos_core::module::{Module, OdtEntry};
use haos_core::system::HostContext;
use haos_core::transfer::{BrickTransfer, DecodeInfo, FrameData};

/// Host-comm module id of the MP3 front-end.
pub const MP3_DECODER_MODULE_ID: u32 = 0x10;

/// Decoded samples per channel in one MP3 frame.
pub const MP3_FRAME_SAMPLES: usize = 1152;

/// Compressed bytes consumed from the FIFO per background call.
pub const MP3_INPUT_CHUNK_BYTES: usize = 768;

/// Channels the front-end decodes.
const MP3_CHANNELS: usize = 2;

/// Scale between a decoded 16-bit sample and a normalized [`Sample`].
const PCM16_SCALE: Sample = 32_768.0;

// Parameter block layout, in words.
const MCV_ENABLE: usize = 0;
const MCV_SRC_MAP: usize = 1;
const MCV_RESERVED_WORDS: usize = 32;
const MCV_WORDS: usize = MCV_SRC_MAP + NUM_IO_CHANNELS + MCV_RESERVED_WORDS;

/// One decoded frame of interleaved 16-bit PCM.
pub struct FramePcm {
    pub samples: Vec<i16>,
    pub channels: u32,
    pub sample_rate: u32,
}

/// The seam to the concrete MP3 frame decoder.
///
/// `decode` receives one compressed chunk and returns the decoded frame, or
/// `None` when the chunk did not produce audio. A zero-length decode skips
/// the frame: the front-end forwards no PCM for it and the pipeline
/// continues.
pub trait FrameDecoder {
    fn decode(&mut self, chunk: &[u8]) -> Option<FramePcm>;
}

/// A frame decoder that never produces audio.
///
/// Stands in where no MP3 implementation is linked; every chunk is consumed
/// and skipped.
pub struct NullFrameDecoder;

impl FrameDecoder for NullFrameDecoder {
    fn decode(&mut self, _chunk: &[u8]) -> Option<FramePcm> {
        None
    }
}

/// Bounded SPSC ring of bricks, sized to two decoded frames.
///
/// The background hook produces into it and the AFAP hook consumes from it;
/// both run on the scheduler thread, so the bound is what matters: a full
/// ring rejects pushes rather than overwriting undrained audio.
struct BrickQueue {
    bricks: Box<[Brick]>,
    head: usize,
    tail: usize,
    len: usize,
}

impl BrickQueue {
    const CAPACITY: usize = 2 * MP3_FRAME_SAMPLES / BRICK_SIZE;

    fn new() -> BrickQueue {
        BrickQueue {
            bricks: vec![[0.0; BRICK_SIZE]; Self::CAPACITY].into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    fn push(&mut self, brick: Brick) -> bool {
        if self.len == Self::CAPACITY {
            return false;
        }

        self.bricks[self.tail] = brick;
        self.tail = (self.tail + 1) % Self::CAPACITY;
        self.len += 1;
        true
    }

    fn pop(&mut self) -> Option<Brick> {
        if self.len == 0 {
            return None;
        }

        let brick = self.bricks[self.head];
        self.head = (self.head + 1) % Self::CAPACITY;
        self.len -= 1;
        Some(brick)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The MP3 front-end.
///
/// MCV layout matches the PCM decoder: word 0 enables the front-end; words
/// 1..33 map each IO channel to a decoded source channel, `NO_SOURCE`
/// marking unrouted channels. The defaults route the stereo pair to IO
/// channels 0 and 2.
pub struct Mp3FrontEnd {
    mcv: [u32; MCV_WORDS],
    decoder: Box<dyn FrameDecoder>,
    queues: Vec<BrickQueue>,
    frame_data: FrameData,
    pcm_available: usize,
}

impl Mp3FrontEnd {
    pub fn new(decoder: Box<dyn FrameDecoder>) -> Mp3FrontEnd {
        let mut mcv = [NO_SOURCE; MCV_WORDS];

        mcv[MCV_ENABLE] = 1;
        mcv[MCV_SRC_MAP] = 0;
        mcv[MCV_SRC_MAP + 2] = 1;

        Mp3FrontEnd {
            mcv,
            decoder,
            queues: (0..MP3_CHANNELS).map(|_| BrickQueue::new()).collect(),
            frame_data: FrameData::default(),
            pcm_available: 0,
        }
    }

    /// The front-end packaged as a module table entry.
    pub fn odt_entry(decoder: Box<dyn FrameDecoder>) -> OdtEntry {
        OdtEntry::new(MP3_DECODER_MODULE_ID, Box::new(Mp3FrontEnd::new(decoder)))
    }

    fn enabled(&self) -> bool {
        self.mcv[MCV_ENABLE] != 0
    }

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

impl Module for Mp3FrontEnd {
    fn mcv_mut(&mut self) -> Option<&mut [u32]> {
        Some(&mut self.mcv)
    }

    fn postkick(&mut self, ctx: &mut HostContext<'_>) {
        let mask = self.routed_mask();

        self.frame_data.input_channel_mask = mask;
        self.frame_data.output_channel_mask = mask;
        self.frame_data.sample_rate = ctx.input_sample_rate() as i32;
        self.frame_data.decode_info = DecodeInfo::Mp3;
    }

    /// Decode one compressed chunk into the channel queues.
    fn background(&mut self, ctx: &mut HostContext<'_>) {
        if !self.enabled() {
            return;
        }

        // Stop pulling pad words once the stream is over and the FIFO holds
        // nothing real.
        if ctx.input_stream_eof() && ctx.read_dipstick() == 0 {
            return;
        }

        let mut chunk = [0u8; MP3_INPUT_CHUNK_BYTES];
        for word_idx in 0..MP3_INPUT_CHUNK_BYTES / 4 {
            let word = ctx.extract_bits(32);
            chunk[word_idx * 4..word_idx * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }

        let Some(frame) = self.decoder.decode(&chunk) else {
            debug!("mp3 chunk produced no frame, skipping");
            return;
        };

        if frame.samples.is_empty() {
            return;
        }

        self.frame_data.sample_rate = frame.sample_rate as i32;

        let channels = (frame.channels as usize).clamp(1, MP3_CHANNELS);
        deinterleave_frame(&frame.samples, channels, &mut self.queues);

        self.pcm_available = MP3_FRAME_SAMPLES;
    }

    /// Hand one brick per routed channel to the core.
    fn afap(&mut self, ctx: &mut HostContext<'_>) {
        if self.pcm_available < BRICK_SIZE {
            return;
        }

        if self.queues.iter().any(|queue| queue.is_empty()) {
            return;
        }

        let bricks: Vec<Brick> = self.queues.iter_mut().filter_map(|queue| queue.pop()).collect();

        self.frame_data.output_channel_mask = self.frame_data.input_channel_mask;

        let mut transfer = BrickTransfer::new();
        transfer.frame_data = Some(&self.frame_data);

        let mut source = 0;
        let mut channel = 0;
        let mut mask = self.frame_data.input_channel_mask;

        while mask != 0 && source < bricks.len() {
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

        self.pcm_available -= BRICK_SIZE;
    }
}

/// Split one interleaved frame into per-channel bricks and queue them.
fn deinterleave_frame(samples: &[i16], channels: usize, queues: &mut [BrickQueue]) {
    for (queue_idx, queue) in queues.iter_mut().enumerate().take(channels) {
        let plane: Vec<Sample> = samples
            .iter()
            .skip(queue_idx)
            .step_by(channels)
            .map(|&sample| Sample::from(sample) / PCM16_SCALE)
            .collect();

        for chunk in plane.chunks(BRICK_SIZE) {
            let mut brick: Brick = [0.0; BRICK_SIZE];
            brick[..chunk.len()].copy_from_slice(chunk);

            if !queue.push(brick) {
                debug!("mp3 brick queue full, dropping decoded audio");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{deinterleave_frame, BrickQueue, FrameDecoder, FramePcm, Mp3FrontEnd, NullFrameDecoder};
    use haos_core::config::BRICK_SIZE;

    #[test]
    fn verify_queue_bounded_to_two_frames() {
        let mut queue = BrickQueue::new();

        for i in 0..BrickQueue::CAPACITY {
            assert!(queue.push([i as f64; BRICK_SIZE]));
        }

        // The ring holds exactly two frames of bricks and rejects overruns.
        assert_eq!(queue.len(), 2 * super::MP3_FRAME_SAMPLES / BRICK_SIZE);
        assert!(!queue.push([0.0; BRICK_SIZE]));

        for i in 0..BrickQueue::CAPACITY {
            assert_eq!(queue.pop().unwrap()[0], i as f64);
        }
        assert!(queue.pop().is_none());
    }

    #[test]
    fn verify_queue_wraps() {
        let mut queue = BrickQueue::new();

        for round in 0..3 {
            for i in 0..BrickQueue::CAPACITY / 2 {
                assert!(queue.push([(round * 1000 + i) as f64; BRICK_SIZE]));
            }
            for i in 0..BrickQueue::CAPACITY / 2 {
                assert_eq!(queue.pop().unwrap()[0], (round * 1000 + i) as f64);
            }
        }
    }

    #[test]
    fn verify_deinterleave_stereo() {
        // L = 0, 2, 4, ...; R = 1, 3, 5, ...
        let samples: Vec<i16> = (0..2 * super::MP3_FRAME_SAMPLES as i16).collect();
        let mut queues = vec![BrickQueue::new(), BrickQueue::new()];

        deinterleave_frame(&samples, 2, &mut queues);

        assert_eq!(queues[0].len(), super::MP3_FRAME_SAMPLES / BRICK_SIZE);
        assert_eq!(queues[1].len(), super::MP3_FRAME_SAMPLES / BRICK_SIZE);

        let left = queues[0].pop().unwrap();
        let right = queues[1].pop().unwrap();

        assert_eq!(left[0], 0.0);
        assert_eq!(left[1], 2.0 / 32_768.0);
        assert_eq!(right[0], 1.0 / 32_768.0);
        assert_eq!(right[1], 3.0 / 32_768.0);
    }

    #[test]
    fn verify_null_decoder_skips_frames() {
        let mut decoder = NullFrameDecoder;
        assert!(decoder.decode(&[0u8; 16]).is_none());
    }

    #[test]
    fn verify_default_routing() {
        struct Dummy;
        impl FrameDecoder for Dummy {
            fn decode(&mut self, _chunk: &[u8]) -> Option<FramePcm> {
                None
            }
        }

        let front_end = Mp3FrontEnd::new(Box::new(Dummy));
        // The stereo pair lands on IO channels 0 and 2.
        assert_eq!(front_end.routed_mask(), 0x5);
    }
}
