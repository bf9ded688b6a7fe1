// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! The audio manager module.
//!
//! Runs at the tail of the pipeline: applies global gain, mute, and
//! per-channel trim to every active channel, then routes channels to the
//! compacted output lanes according to the remap table. All controls live in
//! the parameter block and are host-comm writable.

use haos_core::config::{Sample, BRICK_SIZE, NO_SOURCE, NUM_IO_CHANNELS};
use haos_core::matrix::Brick;
use haos_core::module::{Module, OdtEntry};
use haos_core::system::HostContext;

/// Host-comm module id of the audio manager.
pub const AUDIO_MANAGER_MODULE_ID: u32 = 0x60;

// Parameter block layout, in words. Gains and trims are Q16.16.
const MCV_GAIN: usize = 0;
const MCV_MUTE: usize = 1;
const MCV_TRIM: usize = 2;
const MCV_REMAP: usize = MCV_TRIM + NUM_IO_CHANNELS;
const MCV_RESERVED_WORDS: usize = 32;
const MCV_WORDS: usize = MCV_REMAP + NUM_IO_CHANNELS + MCV_RESERVED_WORDS;

/// Q16.16 representation of unity.
const Q16_ONE: u32 = 1 << 16;

fn q16_to_sample(word: u32) -> Sample {
    Sample::from(word as i32) / Sample::from(Q16_ONE)
}

/// The audio manager.
///
/// MCV layout: word 0 global gain (Q16.16), word 1 mute, words 2..34
/// per-channel trim (Q16.16), words 34..66 channel remap. A remap word names
/// the source channel feeding that output lane; `NO_SOURCE` leaves the lane
/// unrouted. Defaults: unity gain and trim, no mute, identity remap for
/// channels 0 and 1.
pub struct AudioManager {
    mcv: [u32; MCV_WORDS],
}

impl AudioManager {
    pub fn new() -> AudioManager {
        let mut mcv = [0; MCV_WORDS];

        mcv[MCV_GAIN] = Q16_ONE;
        for channel in 0..NUM_IO_CHANNELS {
            mcv[MCV_TRIM + channel] = Q16_ONE;
            mcv[MCV_REMAP + channel] = NO_SOURCE;
        }
        mcv[MCV_REMAP] = 0;
        mcv[MCV_REMAP + 1] = 1;

        AudioManager { mcv }
    }

    /// The audio manager packaged as a module table entry.
    pub fn odt_entry() -> OdtEntry {
        OdtEntry::new(AUDIO_MANAGER_MODULE_ID, Box::new(AudioManager::new()))
    }

    fn remap(&self, lane: usize) -> u32 {
        self.mcv[MCV_REMAP + lane]
    }
}

impl Default for AudioManager {
    fn default() -> Self {
        AudioManager::new()
    }
}

impl Module for AudioManager {
    fn mcv_mut(&mut self) -> Option<&mut [u32]> {
        Some(&mut self.mcv)
    }

    fn brick(&mut self, ctx: &mut HostContext<'_>) {
        let valid_mask = ctx.valid_channel_mask();
        let mut output_mask = valid_mask;

        let mute = self.mcv[MCV_MUTE] != 0;
        let gain = q16_to_sample(self.mcv[MCV_GAIN]) * if mute { 0.0 } else { 1.0 };

        let mut processed = [[0.0 as Sample; BRICK_SIZE]; NUM_IO_CHANNELS];

        // Apply gain and trim into temporaries, clearing the source bricks;
        // collect the lanes with a remap target into the output mask.
        for channel in 0..NUM_IO_CHANNELS {
            if valid_mask & (1 << channel) != 0 {
                let trim = q16_to_sample(self.mcv[MCV_TRIM + channel]);
                let brick = ctx.output_brick_mut(channel);

                for sample in 0..BRICK_SIZE {
                    processed[channel][sample] = gain * trim * brick[sample];
                    brick[sample] = 0.0;
                }
            }

            if self.remap(channel) != NO_SOURCE {
                output_mask |= 1 << channel;
            }
        }

        ctx.set_valid_channel_mask(output_mask);

        // Route the processed bricks into the compacted output lanes, in
        // ascending mask order. A lane without a usable remap source falls
        // back to its own channel.
        let mut lane = 0;
        let mut channel = 0;
        let mut mask = output_mask;

        while mask != 0 {
            if mask & 1 != 0 {
                let remap = self.remap(channel);
                let source = if remap != NO_SOURCE && (remap as usize) < NUM_IO_CHANNELS {
                    remap as usize
                }
                else {
                    channel
                };

                let brick: &mut Brick = ctx.output_brick_mut(lane);
                *brick = processed[source];
                lane += 1;
            }

            channel += 1;
            mask >>= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AudioManager, MCV_GAIN, MCV_MUTE, MCV_REMAP, MCV_TRIM};
    use haos_core::config::NO_SOURCE;
    use haos_core::module::Module;

    fn set_word(am: &mut AudioManager, offset: usize, value: u32) {
        am.mcv_mut().unwrap()[offset] = value;
    }

    // Hook-level behavior is exercised end to end in the umbrella crate's
    // pipeline tests; here the parameter block plumbing is verified.

    #[test]
    fn verify_default_parameter_block() {
        let mut am = AudioManager::new();
        let mcv = am.mcv_mut().unwrap();

        assert_eq!(mcv[MCV_GAIN], 1 << 16);
        assert_eq!(mcv[MCV_MUTE], 0);
        assert_eq!(mcv[MCV_TRIM], 1 << 16);
        assert_eq!(mcv[MCV_TRIM + 31], 1 << 16);
        assert_eq!(mcv[MCV_REMAP], 0);
        assert_eq!(mcv[MCV_REMAP + 1], 1);
        assert_eq!(mcv[MCV_REMAP + 2], NO_SOURCE);
    }

    #[test]
    fn verify_remap_lookup() {
        let mut am = AudioManager::new();

        set_word(&mut am, MCV_REMAP, 1);
        set_word(&mut am, MCV_REMAP + 1, 0);

        assert_eq!(am.remap(0), 1);
        assert_eq!(am.remap(1), 0);
        assert_eq!(am.remap(5), NO_SOURCE);
    }

    #[test]
    fn verify_q16_conversion() {
        assert_eq!(super::q16_to_sample(1 << 16), 1.0);
        assert_eq!(super::q16_to_sample(1 << 15), 0.5);
        assert_eq!(super::q16_to_sample(0), 0.0);
        // Negative gains are representable.
        assert_eq!(super::q16_to_sample((-1i32 << 16) as u32), -1.0);
    }
}
