// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `matrix` module implements the per-core I/O buffer matrix: a ring of
//! fixed-size bricks per channel, shared input/output cursors, and the
//! free-space counter.

use crate::config::{
    Sample, BRICK_SIZE, IO_RING_LEN, IO_SAMPLES_PER_CHANNEL, NUM_IO_CHANNELS,
};

/// One block of [`BRICK_SIZE`] samples for a single channel.
pub type Brick = [Sample; BRICK_SIZE];

const SILENT_BRICK: Brick = [0.0; BRICK_SIZE];

/// The per-core matrix of brick buffers: `channels × ring × brick`.
///
/// All channels share the same write (input) and read (output) ring indices;
/// a brick transfer writes all channel lanes at once, so the rings advance in
/// lockstep. `io_free` counts the free samples of one channel's ring and is
/// decremented when the input cursor advances by a brick and incremented when
/// the output cursor does.
pub struct IoMatrix {
    bricks: Vec<[Brick; IO_RING_LEN]>,
    write_idx: usize,
    read_idx: usize,
    io_free: i32,
}

impl IoMatrix {
    pub fn new() -> IoMatrix {
        IoMatrix {
            bricks: vec![[SILENT_BRICK; IO_RING_LEN]; NUM_IO_CHANNELS],
            write_idx: 0,
            read_idx: 0,
            io_free: IO_SAMPLES_PER_CHANNEL as i32,
        }
    }

    /// Zero the storage and return both cursors to slot 0 with a fully free
    /// ring.
    pub fn reset(&mut self) {
        for ring in &mut self.bricks {
            *ring = [SILENT_BRICK; IO_RING_LEN];
        }
        self.write_idx = 0;
        self.read_idx = 0;
        self.io_free = IO_SAMPLES_PER_CHANNEL as i32;
    }

    /// The brick the decoder writes next for `channel`.
    pub fn input_brick_mut(&mut self, channel: usize) -> &mut Brick {
        &mut self.bricks[channel][self.write_idx]
    }

    /// The brick downstream modules read (and mutate in place) for `channel`.
    pub fn output_brick(&self, channel: usize) -> &Brick {
        &self.bricks[channel][self.read_idx]
    }

    pub fn output_brick_mut(&mut self, channel: usize) -> &mut Brick {
        &mut self.bricks[channel][self.read_idx]
    }

    /// Advance the input cursor of every channel by one brick.
    pub fn advance_write(&mut self) {
        self.write_idx = (self.write_idx + 1) % IO_RING_LEN;
        self.io_free -= BRICK_SIZE as i32;
        debug_assert!(self.io_free >= 0, "I/O matrix overrun");
    }

    /// Advance the output cursor of every channel by one brick.
    pub fn advance_read(&mut self) {
        self.read_idx = (self.read_idx + 1) % IO_RING_LEN;
        self.io_free += BRICK_SIZE as i32;
        debug_assert!(self.io_free <= IO_SAMPLES_PER_CHANNEL as i32, "I/O matrix underrun");
    }

    /// Free samples of one channel's ring.
    pub fn io_free(&self) -> i32 {
        self.io_free
    }

    /// True when at least one brick of live data sits between the cursors.
    pub fn has_pending_brick(&self) -> bool {
        self.io_free < IO_SAMPLES_PER_CHANNEL as i32
    }

    pub fn write_idx(&self) -> usize {
        self.write_idx
    }

    pub fn read_idx(&self) -> usize {
        self.read_idx
    }
}

impl Default for IoMatrix {
    fn default() -> Self {
        IoMatrix::new()
    }
}

#[cfg(test)]
mod tests {
    use super::IoMatrix;
    use crate::config::{BRICK_SIZE, IO_RING_LEN, IO_SAMPLES_PER_CHANNEL};

    #[test]
    fn verify_cursor_lockstep_and_accounting() {
        let mut matrix = IoMatrix::new();

        assert_eq!(matrix.io_free(), IO_SAMPLES_PER_CHANNEL as i32);
        assert!(!matrix.has_pending_brick());

        matrix.input_brick_mut(0)[0] = 0.5;
        matrix.input_brick_mut(31)[BRICK_SIZE - 1] = -0.5;
        matrix.advance_write();

        assert_eq!(matrix.io_free(), (IO_SAMPLES_PER_CHANNEL - BRICK_SIZE) as i32);
        assert!(matrix.has_pending_brick());

        // The output cursor still points at the brick just written.
        assert_eq!(matrix.output_brick(0)[0], 0.5);
        assert_eq!(matrix.output_brick(31)[BRICK_SIZE - 1], -0.5);

        matrix.advance_read();
        assert_eq!(matrix.io_free(), IO_SAMPLES_PER_CHANNEL as i32);
        assert!(!matrix.has_pending_brick());
    }

    #[test]
    fn verify_ring_wraps_after_full_cycle() {
        let mut matrix = IoMatrix::new();

        for i in 0..IO_RING_LEN {
            matrix.input_brick_mut(3)[0] = i as f64;
            matrix.advance_write();
        }

        assert_eq!(matrix.io_free(), 0);
        assert_eq!(matrix.write_idx(), 0);

        for i in 0..IO_RING_LEN {
            assert_eq!(matrix.output_brick(3)[0], i as f64);
            matrix.advance_read();
        }

        assert_eq!(matrix.read_idx(), 0);
        assert_eq!(matrix.io_free(), IO_SAMPLES_PER_CHANNEL as i32);
    }

    #[test]
    fn verify_free_count_round_trip() {
        let mut matrix = IoMatrix::new();
        let initial = matrix.io_free();

        matrix.advance_write();
        matrix.advance_read();

        assert_eq!(matrix.io_free(), initial);
    }
}
