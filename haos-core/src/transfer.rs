// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `transfer` module defines the decoder-to-core hand-off protocol: the
//! frame metadata record and the per-channel brick pointers a front-end
//! publishes with one transfer.

use crate::config::{ChannelMask, NUM_IO_CHANNELS};
use crate::matrix::Brick;

/// Decoding format of the input stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodeInfo {
    #[default]
    Unknown = 0,
    Pcm = 1,
    Mp3 = 2,
}

/// Per-frame metadata delivered alongside a brick transfer.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameData {
    /// Bitmask of active input channels.
    pub input_channel_mask: ChannelMask,
    /// Bitmask of active output channels.
    pub output_channel_mask: ChannelMask,
    /// Sampling rate of the current frame in Hz.
    pub sample_rate: i32,
    /// Decoding format of the frame.
    pub decode_info: DecodeInfo,
}

/// One brick transfer from a decoder front-end into the active core.
///
/// `frame_data` is present only on frame boundaries; a channel slot of `None`
/// zero-fills that channel's lane in the I/O matrix.
pub struct BrickTransfer<'a> {
    pub frame_data: Option<&'a FrameData>,
    pub channels: [Option<&'a Brick>; NUM_IO_CHANNELS],
}

impl<'a> BrickTransfer<'a> {
    /// A transfer carrying no metadata and no channel data.
    pub fn new() -> BrickTransfer<'a> {
        BrickTransfer { frame_data: None, channels: [None; NUM_IO_CHANNELS] }
    }
}

impl<'a> Default for BrickTransfer<'a> {
    fn default() -> Self {
        BrickTransfer::new()
    }
}
