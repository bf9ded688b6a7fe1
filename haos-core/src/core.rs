// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `core` module defines one emulated DSP core: its module table, I/O
//! buffer matrix, valid-channel mask, and FIFO / bit-ripper state blocks.

use crate::config::{
    ChannelMask, DEFAULT_PPM_CHANNEL_MASK, FIFO0_SIZE, FIFO1_SIZE, MAX_FIFO_CNT,
    MAX_MODULES_PER_CORE,
};
use crate::fifo::Fifo;
use crate::matrix::IoMatrix;
use crate::module::OdtEntry;
use crate::ripper::BitRipper;

/// The state of one core, separate from its module table so the scheduler
/// can lend modules a mutable view of the core they run on.
pub struct CoreState {
    core_id: u32,
    valid_channels: ChannelMask,
    pub matrix: IoMatrix,
    fifos: Vec<Fifo>,
    rippers: Vec<BitRipper>,
    active_ripper: usize,
}

impl CoreState {
    fn new(core_id: u32) -> CoreState {
        let fifos = vec![Fifo::new(0, FIFO0_SIZE), Fifo::new(1, FIFO1_SIZE)];
        let rippers = fifos.iter().map(BitRipper::new).collect();

        CoreState {
            core_id,
            valid_channels: DEFAULT_PPM_CHANNEL_MASK,
            matrix: IoMatrix::new(),
            fifos,
            rippers,
            active_ripper: 0,
        }
    }

    pub fn core_id(&self) -> u32 {
        self.core_id
    }

    /// One-time core bring-up: clear the matrix, restore the default channel
    /// mask, and bind bit-ripper 0 to FIFO 0.
    pub fn init(&mut self) {
        self.matrix.reset();
        self.valid_channels = DEFAULT_PPM_CHANNEL_MASK;

        for fifo in &mut self.fifos {
            fifo.clear();
        }

        self.init_bitripper(0);
    }

    /// Rebind the FIFO descriptor `id` to a fresh buffer of `size` words.
    pub fn init_fifo(&mut self, id: u32, size: usize) {
        assert!((id as usize) < MAX_FIFO_CNT, "invalid FIFO id");
        self.fifos[id as usize] = Fifo::new(id, size);
    }

    /// Reinitialize the bit-ripper state for FIFO `id` and make it active.
    pub fn init_bitripper(&mut self, id: u32) {
        assert!((id as usize) < MAX_FIFO_CNT, "invalid FIFO id");
        self.rippers[id as usize] = BitRipper::new(&self.fifos[id as usize]);
        self.active_ripper = id as usize;
    }

    /// Select the bit-ripper bound to FIFO `id` without reinitializing it.
    pub fn switch_bitripper_fifo(&mut self, id: u32) {
        assert!((id as usize) < MAX_FIFO_CNT, "invalid FIFO id");
        self.active_ripper = id as usize;
    }

    /// The active bit-ripper together with the FIFO it is bound to.
    pub fn active_ripper_mut(&mut self) -> (&mut BitRipper, &mut Fifo) {
        let idx = self.active_ripper;
        (&mut self.rippers[idx], &mut self.fifos[idx])
    }

    pub fn active_ripper(&self) -> &BitRipper {
        &self.rippers[self.active_ripper]
    }

    pub fn valid_channels(&self) -> ChannelMask {
        self.valid_channels
    }

    pub fn set_valid_channels(&mut self, mask: ChannelMask) {
        self.valid_channels = mask;
    }

    pub fn is_active_channel(&self, channel: usize) -> bool {
        self.valid_channels & (1 << channel) != 0
    }
}

/// One emulated DSP core: its state plus the ordered module table.
pub struct Core {
    pub state: CoreState,
    pub(crate) modules: Vec<OdtEntry>,
}

impl Core {
    pub fn new(core_id: u32) -> Core {
        Core { state: CoreState::new(core_id), modules: Vec::new() }
    }

    /// Append one module table entry, bounded by the per-core capacity.
    pub fn add_module(&mut self, entry: OdtEntry) {
        assert!(self.modules.len() < MAX_MODULES_PER_CORE, "core module table full");
        self.modules.push(entry);
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::Core;
    use crate::config::{DEFAULT_PPM_CHANNEL_MASK, FIFO0_SIZE};

    #[test]
    fn verify_core_bring_up() {
        let mut core = Core::new(0);
        core.state.init();

        assert_eq!(core.state.valid_channels(), DEFAULT_PPM_CHANNEL_MASK);
        assert!(core.state.is_active_channel(0));
        assert!(!core.state.is_active_channel(1));
        assert!(core.state.is_active_channel(2));

        let (ripper, fifo) = core.state.active_ripper_mut();
        assert_eq!(fifo.id(), 0);
        assert_eq!(fifo.len(), FIFO0_SIZE);
        assert_eq!(ripper.read_dipstick(), 0);
    }

    #[test]
    fn verify_ripper_selection() {
        let mut core = Core::new(0);
        core.state.init();

        core.state.init_fifo(1, 64);
        core.state.init_bitripper(1);

        {
            let (ripper, fifo) = core.state.active_ripper_mut();
            assert_eq!(fifo.len(), 64);
            assert_eq!(ripper.fifo_id(), 1);
        }

        core.state.switch_bitripper_fifo(0);
        let (_, fifo) = core.state.active_ripper_mut();
        assert_eq!(fifo.id(), 0);
    }

    #[test]
    #[should_panic(expected = "invalid FIFO id")]
    fn verify_fifo_id_bounds() {
        let mut core = Core::new(0);
        core.state.switch_bitripper_fifo(2);
    }
}
