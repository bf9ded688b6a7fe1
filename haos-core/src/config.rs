// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `config` module defines the compile-time shape of the runtime: core,
//! channel, and buffer limits shared by the scheduler and all modules.

/// Maximum number of DSP cores the system can manage.
pub const MAX_CORES: usize = 3;

/// Maximum number of modules that can be registered per core ODT.
pub const MAX_MODULES_PER_CORE: usize = 128;

/// Maximum number of audio channels supported by the system.
pub const MAX_NUM_CHANNELS: usize = 32;

/// Number of I/O channels allocated per DSP core.
pub const NUM_IO_CHANNELS: usize = MAX_NUM_CHANNELS;

/// Number of samples processed per channel in one pass.
pub const BRICK_SIZE: usize = 16;

/// Number of brick slots in each channel's circular ring.
pub const IO_RING_LEN: usize = 4;

/// Total samples allocated per channel in the I/O buffer matrix.
pub const IO_SAMPLES_PER_CHANNEL: usize = BRICK_SIZE * IO_RING_LEN;

/// Default valid-channel mask for the post-processing stage (channels 0 and 2).
pub const DEFAULT_PPM_CHANNEL_MASK: u32 = 0x5;

/// Maximum number of host commands the replay queue can hold.
pub const MAX_HOST_COMMANDS: usize = 1024;

/// Number of FIFO descriptors and bit-ripper state blocks per core.
pub const MAX_FIFO_CNT: usize = 2;

/// Size of FIFO 0, in 32-bit words. FIFO 0 is bound to the system input.
pub const FIFO0_SIZE: usize = 2048;

/// Size of FIFO 1, in 32-bit words.
pub const FIFO1_SIZE: usize = 2048;

/// Number of bits per FIFO word.
pub const WORD_BITS: u32 = 32;

/// Marks a disconnected or unassigned I/O source in routing tables.
pub const NO_SOURCE: u32 = 0x0800_0000;

/// Number of dummy outer iterations processed after input EOF is detected.
pub const FLUSH_FRAMES_CNT_DFLT: u32 = 10;

/// Default bits per sample for the output stream.
pub const OUTPUT_BITS_PER_SAMPLE_DFLT: u32 = 16;

/// Default sampling frequency assumed for compressed input streams.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Number of words moved into the FIFO per stream-feeder burst.
pub const FILL_BURST_WORDS: usize = 32;

/// Pad word written after EOF when the input stream is compressed.
pub const EOF_PAD_COMPRESSED: u32 = 0xDEDA_CEDA;

/// Bricks processed in the foreground per background call, PCM front-end.
pub const FG2BG_RATIO_PCM: u32 = 16;

/// Bricks processed in the foreground per background call, MP3 front-end.
pub const FG2BG_RATIO_MP3: u32 = 72;

/// A PCM sample inside the I/O buffer matrix, normalized to `[-1, 1)`.
pub type Sample = f64;

/// Scale between a 32-bit left-justified stream sample and a [`Sample`].
pub const SAMPLE_SCALE: Sample = 2_147_483_648.0;

/// Bitmask naming a set of I/O channels, one bit per channel.
pub type ChannelMask = u32;
