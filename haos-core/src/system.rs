// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `system` module implements the scheduler/runtime: the boot sequence,
//! the deterministic tick loop that drives module entry points across cores,
//! the frame-transfer protocol, the stream feeder, and the drain of the tail
//! core's bricks into the output sink.

use std::path::PathBuf;

use bitflags::bitflags;
use log::{info, warn};

use crate::config::{
    ChannelMask, Sample, BRICK_SIZE, DEFAULT_SAMPLE_RATE, EOF_PAD_COMPRESSED, FG2BG_RATIO_MP3,
    FG2BG_RATIO_PCM, FILL_BURST_WORDS, FLUSH_FRAMES_CNT_DFLT, MAX_CORES, NUM_IO_CHANNELS,
    SAMPLE_SCALE,
};
use crate::core::{Core, CoreState};
use crate::errors::Result;
use crate::fifo::{ring_add, Fifo};
use crate::hostcomm;
use crate::matrix::Brick;
use crate::module::{OdtEntry, Routine};
use crate::ripper::{BitRipper, RipperCursor, StreamFeeder};
use crate::stream::{InStream, OutStream, OutputSpec, StreamFlags, StreamIo};
use crate::transfer::{BrickTransfer, DecodeInfo, FrameData};

bitflags! {
    /// System-level control flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SysFlags: u32 {
        /// A module requested memory (re)allocation.
        const MEM_ALLOC_REQUESTED = 1 << 0;
        /// The most recent brick transfer carried frame metadata.
        const FRAME_TRIGGERED = 1 << 1;
        /// The decoder has delivered at least one frame.
        const DECODING_STARTED = 1 << 2;
    }
}

/// Which decoder front-end the pipeline is built around.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontEnd {
    #[default]
    Pcm,
    Mp3,
}

/// Startup options, normally populated from the command line.
#[derive(Debug, Default)]
pub struct SystemOptions {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    /// Host-comm replay file applied between postkick and timer.
    pub cfg: Option<PathBuf>,
    pub front_end: FrontEnd,
    /// Bricks per background call; defaults per front-end when `None`.
    pub fg2bg_ratio: Option<u32>,
    pub output_bits_per_sample: Option<u32>,
    pub output_sample_rate: Option<u32>,
}

/// System-wide state shared by every hook dispatch: stream descriptors,
/// frame metadata, control flags, and counters.
pub(crate) struct Shared {
    pub ctrl: SysFlags,
    pub in_stream: InStream,
    pub out_stream: OutStream,
    pub frame_data: FrameData,
    pub frame_counter: u32,
    pub flush_cnt: u32,
    pub fg2bg_ratio: u32,
    pub io: Box<dyn StreamIo>,
}

impl Shared {
    fn end_of_processing(&self) -> bool {
        self.in_stream.sample_rate != 0 && self.flush_cnt == 0
    }

    /// Open the input source if a path was configured and it has not been
    /// opened yet. An empty PCM container sets EOF immediately.
    fn open_input(&mut self) -> Result<()> {
        let Some(path) = self.in_stream.path.clone() else {
            return Ok(());
        };

        if !self.in_stream.flags.contains(StreamFlags::FIRST_OPEN) {
            return Ok(());
        }

        let source = self.io.open_input(&path)?;
        self.in_stream.flags.remove(StreamFlags::FIRST_OPEN);

        info!(">>Input file: {}", path.display());

        let info = source.info();
        self.in_stream.decode = DecodeInfo::Unknown;

        if info.compressed {
            // Not a PCM container: raw words at the default rate.
            self.in_stream.sample_rate = DEFAULT_SAMPLE_RATE;
            self.in_stream.set_compressed(true);
            self.in_stream.source = Some(source);
            return Ok(());
        }

        self.in_stream.sample_rate = info.sample_rate;

        if info.sample_rate != 0 {
            self.in_stream.decode = DecodeInfo::Pcm;
            self.in_stream.channel_count = info.channel_count;
            self.in_stream.bits_per_sample = info.bits_per_sample;
            self.in_stream.channel_samples = info.channel_samples;

            info!(">>Sample rate: {}", info.sample_rate);
            info!(">>Bits per sample: {}", info.bits_per_sample);
            info!(">>Channels: {}", info.channel_count);
            info!(">>Samples per channel: {}", info.channel_samples);

            if info.channel_samples == 0 {
                // Nothing to stream; close the source right away.
                self.in_stream.set_eof(true);
                return Ok(());
            }
        }

        self.in_stream.source = Some(source);
        Ok(())
    }
}

impl StreamFeeder for Shared {
    /// Refill the FIFO bound to `ripper` from the input source.
    ///
    /// Words move in bursts of [`FILL_BURST_WORDS`]; the burst gate is the
    /// free space reported by the ripper. After EOF (or with no input at
    /// all) the FIFO is padded so consumers always make progress: zeros for
    /// PCM streams, the `0xDEDACEDA` sentinel for compressed ones.
    fn fill(&mut self, ripper: &mut BitRipper, fifo: &mut Fifo) {
        if self.in_stream.path.is_some() {
            if self.in_stream.flags.contains(StreamFlags::FIRST_OPEN) {
                if let Err(err) = self.open_input() {
                    // The boot sequence surfaces open failures; a refill that
                    // still cannot open degrades to padding.
                    warn!("input refill: {}", err);
                    self.in_stream.flags.remove(StreamFlags::FIRST_OPEN);
                    self.in_stream.set_eof(true);
                }
            }

            while !self.in_stream.eof() {
                if (ripper.free_space_in_words() as usize) < FILL_BURST_WORDS {
                    break;
                }

                let Some(source) = self.in_stream.source.as_mut() else {
                    break;
                };

                let mut pos = ripper.write_pos();
                for _ in 0..FILL_BURST_WORDS {
                    fifo[pos] = source.next_word();
                    pos = ring_add(pos, 1, fifo.len());
                }

                ripper.advance_write_ptr(FILL_BURST_WORDS);

                if source.eof() {
                    self.in_stream.set_eof(true);
                    self.in_stream.source = None;
                    info!(">>EOF reached");
                }
            }
        }

        if self.in_stream.path.is_none() || self.in_stream.eof() {
            if (ripper.free_space_in_words() as usize) >= FILL_BURST_WORDS {
                let pad = if self.in_stream.compressed() { EOF_PAD_COMPRESSED } else { 0 };

                let mut pos = ripper.write_pos();
                for _ in 0..FILL_BURST_WORDS {
                    fifo[pos] = pad;
                    pos = ring_add(pos, 1, fifo.len());
                }

                ripper.advance_write_ptr(FILL_BURST_WORDS);
            }
        }
    }
}

/// The services a module hook may reach while it runs: the state of the core
/// it is scheduled on plus the system-wide shared state.
///
/// The scheduler constructs one context per hook call, so core-scoped
/// getters always resolve against the active core without any global state.
pub struct HostContext<'a> {
    pub core: &'a mut CoreState,
    pub(crate) shared: &'a mut Shared,
}

impl<'a> HostContext<'a> {
    // ---- core-scoped I/O ----------------------------------------------

    /// The brick downstream processing reads and mutates for `channel`.
    pub fn output_brick(&self, channel: usize) -> &Brick {
        self.core.matrix.output_brick(channel)
    }

    pub fn output_brick_mut(&mut self, channel: usize) -> &mut Brick {
        self.core.matrix.output_brick_mut(channel)
    }

    pub fn valid_channel_mask(&self) -> ChannelMask {
        self.core.valid_channels()
    }

    pub fn set_valid_channel_mask(&mut self, mask: ChannelMask) {
        self.core.set_valid_channels(mask);
    }

    pub fn is_active_channel(&self, channel: usize) -> bool {
        self.core.is_active_channel(channel)
    }

    /// Free sample slots in the active core's I/O buffer, per channel.
    pub fn io_unused_space(&self) -> i32 {
        self.core.matrix.io_free()
    }

    /// Deliver one brick per channel plus optional frame metadata into the
    /// active core's input side.
    ///
    /// Frame metadata raises the frame trigger, marks decoding started, and
    /// overwrites the output stream's sampling frequency. Channel lanes
    /// without a source brick are zero-filled; all lanes advance together.
    pub fn copy_brick_to_io(&mut self, transfer: &BrickTransfer<'_>) {
        self.shared.ctrl.remove(SysFlags::FRAME_TRIGGERED);

        if let Some(frame) = transfer.frame_data {
            self.shared.ctrl.insert(SysFlags::FRAME_TRIGGERED | SysFlags::DECODING_STARTED);
            self.shared.frame_data = *frame;
            self.shared.out_stream.sample_rate = frame.sample_rate as u32;
        }

        for channel in 0..NUM_IO_CHANNELS {
            let brick = self.core.matrix.input_brick_mut(channel);
            match transfer.channels[channel] {
                Some(source) => *brick = *source,
                None => *brick = [0.0; BRICK_SIZE],
            }
        }

        self.core.matrix.advance_write();
    }

    // ---- stream state --------------------------------------------------

    pub fn input_stream_eof(&self) -> bool {
        self.shared.in_stream.eof()
    }

    pub fn set_input_stream_eof(&mut self, value: bool) {
        self.shared.in_stream.set_eof(value);
    }

    pub fn input_sample_rate(&self) -> u32 {
        self.shared.in_stream.sample_rate
    }

    pub fn set_input_sample_rate(&mut self, rate: u32) {
        self.shared.in_stream.sample_rate = rate;
    }

    pub fn input_channel_count(&self) -> u32 {
        self.shared.in_stream.channel_count
    }

    pub fn compressed_input(&self) -> bool {
        self.shared.in_stream.compressed()
    }

    pub fn set_compressed_input(&mut self, value: bool) {
        self.shared.in_stream.set_compressed(value);
    }

    pub fn frame_counter(&self) -> u32 {
        self.shared.frame_counter
    }

    pub fn frame_data(&self) -> &FrameData {
        &self.shared.frame_data
    }

    pub fn end_of_processing(&self) -> bool {
        self.shared.end_of_processing()
    }

    pub fn decoding_started(&self) -> bool {
        self.shared.ctrl.contains(SysFlags::DECODING_STARTED)
    }

    /// Request a system memory allocation pass. The decoding-started flag
    /// may only be cleared by the decoder module on a fresh request.
    pub fn request_memory_allocation(&mut self, clear_decoding_started: bool) {
        self.shared.ctrl.insert(SysFlags::MEM_ALLOC_REQUESTED);
        if clear_decoding_started {
            self.shared.ctrl.remove(SysFlags::DECODING_STARTED);
        }
    }

    // ---- bit-ripper ----------------------------------------------------

    pub fn extract_bits(&mut self, bits: u32) -> u32 {
        let (ripper, fifo) = self.core.active_ripper_mut();
        ripper.extract_bits(bits, fifo, self.shared)
    }

    pub fn peek(&mut self, bits: u32) -> u32 {
        let (ripper, fifo) = self.core.active_ripper_mut();
        ripper.peek(bits, fifo, self.shared)
    }

    pub fn skip_bits(&mut self, count: i32) {
        let (ripper, fifo) = self.core.active_ripper_mut();
        ripper.skip_bits(count, fifo, self.shared);
    }

    pub fn read_dipstick(&self) -> u32 {
        self.core.active_ripper().read_dipstick()
    }

    pub fn wait_on_dipstick(&mut self, bits: u32) {
        let (ripper, fifo) = self.core.active_ripper_mut();
        ripper.wait_on_dipstick(bits, fifo, self.shared);
    }

    pub fn save_main_state(&mut self) {
        self.core.active_ripper_mut().0.save_main_state();
    }

    pub fn restore_main_state(&mut self) {
        self.core.active_ripper_mut().0.restore_main_state();
    }

    pub fn save_aux_state(&self) -> RipperCursor {
        self.core.active_ripper().save_aux_state()
    }

    pub fn load_aux_state(&mut self, state: &RipperCursor) {
        self.core.active_ripper_mut().0.load_aux_state(state);
    }

    pub fn load_main_state(&mut self, state: &RipperCursor) {
        self.core.active_ripper_mut().0.load_main_state(state);
    }

    pub fn bit_cnt_main_state(&self, to: &RipperCursor) -> i32 {
        self.core.active_ripper().bit_cnt_main_state(to)
    }

    pub fn save_alignment(&mut self, bits_offset: i32) {
        self.core.active_ripper_mut().0.save_alignment(bits_offset);
    }

    pub fn align_to_byte(&mut self) {
        let (ripper, fifo) = self.core.active_ripper_mut();
        ripper.align_to_byte(fifo, self.shared);
    }

    pub fn align_to_word(&mut self) {
        let (ripper, fifo) = self.core.active_ripper_mut();
        ripper.align_to_word(fifo, self.shared);
    }

    pub fn align_to_dword(&mut self) {
        let (ripper, fifo) = self.core.active_ripper_mut();
        ripper.align_to_dword(fifo, self.shared);
    }
}

/// The haOS system: the ordered core table, stream descriptors, and the
/// deterministic tick loop.
pub struct System {
    cores: Vec<Core>,
    shared: Shared,
    cfg: Option<PathBuf>,
}

impl System {
    /// Boot step 1: populate the system with defaults and startup options.
    pub fn new(options: SystemOptions, io: Box<dyn StreamIo>) -> System {
        info!("--------------- Home Audio Operating System (haOS) ---------------");
        info!("Arch: lightweight simulation");
        info!("Version: {}", env!("CARGO_PKG_VERSION"));
        info!(">>Booting haOS");

        let fg2bg_ratio = options.fg2bg_ratio.unwrap_or(match options.front_end {
            FrontEnd::Pcm => FG2BG_RATIO_PCM,
            FrontEnd::Mp3 => FG2BG_RATIO_MP3,
        });

        let in_stream = InStream::new(options.input);

        let mut out_stream = OutStream::new(options.output);
        out_stream.forced_sample_rate = options.output_sample_rate;
        out_stream.forced_bits_per_sample = options.output_bits_per_sample;

        System {
            cores: Vec::new(),
            shared: Shared {
                ctrl: SysFlags::empty(),
                in_stream,
                out_stream,
                frame_data: FrameData::default(),
                frame_counter: 0,
                flush_cnt: FLUSH_FRAMES_CNT_DFLT,
                fg2bg_ratio,
                io,
            },
            cfg: options.cfg,
        }
    }

    /// Boot step 2: create one core per provided module list, in slot order,
    /// and attach the modules.
    pub fn add_modules(&mut self, lists: Vec<Option<Vec<OdtEntry>>>) {
        for list in lists.into_iter().flatten() {
            assert!(self.cores.len() < MAX_CORES, "too many cores");

            let mut core = Core::new(self.cores.len() as u32);
            for entry in list {
                core.add_module(entry);
            }

            self.cores.push(core);
        }
    }

    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    pub fn frame_counter(&self) -> u32 {
        self.shared.frame_counter
    }

    pub fn fg2bg_ratio(&self) -> u32 {
        self.shared.fg2bg_ratio
    }

    /// Apply a queue of host-comm command words to the module tables.
    pub fn apply_host_commands(&mut self, queue: &[u32]) {
        hostcomm::apply_commands(&mut self.cores, queue);
    }

    /// Boot step 3: initialize cores, open the input, run the pre-start
    /// hooks and the host-comm replay, then the main loop until the flush
    /// countdown expires.
    pub fn run(&mut self) -> Result<()> {
        info!(">>Running haOS");

        for core in &mut self.cores {
            core.state.init();
        }

        self.shared.open_input()?;

        self.call_all(Routine::Prekick);
        self.call_all(Routine::Postkick);

        // Parameter blocks sit at compile-time defaults and postkick has
        // reacted to them; the replay now overwrites parameter words.
        if let Some(cfg) = self.cfg.clone() {
            let queue = hostcomm::load_commands(&cfg);
            self.apply_host_commands(&queue);
        }

        self.call_all(Routine::Timer);

        while self.shared.flush_cnt > 0 {
            if self.shared.in_stream.eof() {
                self.shared.flush_cnt -= 1;
            }

            for _ in 0..self.shared.fg2bg_ratio {
                self.call_all(Routine::Afap);

                if self.shared.ctrl.contains(SysFlags::FRAME_TRIGGERED) {
                    self.shared.frame_counter += 1;
                    self.call_all(Routine::Frame);
                    self.shared.ctrl.remove(SysFlags::FRAME_TRIGGERED);
                }

                if self.shared.ctrl.contains(SysFlags::MEM_ALLOC_REQUESTED) {
                    self.call_all(Routine::Premalloc);
                    self.call_all(Routine::Postmalloc);
                    self.shared.ctrl.remove(SysFlags::MEM_ALLOC_REQUESTED);
                }

                self.call_all(Routine::Brick);

                if self.cores.iter().any(|core| core.state.matrix.has_pending_brick()) {
                    self.drain_brick()?;

                    for core in &mut self.cores {
                        core.state.matrix.advance_read();
                    }
                }
            }

            self.call_all(Routine::Background);
            self.flush_output_header()?;
        }

        info!(">>Total frames: {}", self.shared.frame_counter);
        info!(">>Shutting down haOS");
        Ok(())
    }

    /// Call one entry point on every module: cores in index order, modules
    /// in ODT order within a core.
    fn call_all(&mut self, routine: Routine) {
        for core in &mut self.cores {
            for entry in &mut core.modules {
                let mut ctx = HostContext { core: &mut core.state, shared: &mut self.shared };

                match routine {
                    Routine::Prekick => entry.module.prekick(&mut ctx),
                    Routine::Postkick => entry.module.postkick(&mut ctx),
                    Routine::Timer => entry.module.timer(&mut ctx),
                    Routine::Frame => entry.module.frame(&mut ctx),
                    Routine::Brick => entry.module.brick(&mut ctx),
                    Routine::Afap => entry.module.afap(&mut ctx),
                    Routine::Background => entry.module.background(&mut ctx),
                    Routine::Postmalloc => entry.module.postmalloc(&mut ctx),
                    Routine::Premalloc => entry.module.premalloc(&mut ctx),
                }
            }
        }
    }

    /// Open the output sink on the first drained brick. The channel count is
    /// the popcount of the tail core's valid-channel mask at this moment.
    fn open_output(&mut self) -> Result<()> {
        if self.shared.out_stream.sink.is_some() {
            return Ok(());
        }

        let Some(path) = self.shared.out_stream.path.clone() else {
            return Ok(());
        };

        let mask = self.cores.last().map_or(0, |core| core.state.valid_channels());

        let spec = OutputSpec {
            bits_per_sample: self
                .shared
                .out_stream
                .resolve_bits_per_sample(self.shared.in_stream.bits_per_sample),
            channel_count: mask.count_ones(),
            sample_rate: self
                .shared
                .out_stream
                .resolve_sample_rate(self.shared.in_stream.sample_rate),
        };

        let sink = self.shared.io.open_output(&path, &spec)?;

        self.shared.out_stream.bits_per_sample = spec.bits_per_sample;
        self.shared.out_stream.channel_count = spec.channel_count;
        self.shared.out_stream.sample_rate = spec.sample_rate;
        self.shared.out_stream.sink = Some(sink);

        info!(">>Output file: {}", path.display());
        Ok(())
    }

    /// Write one brick of the tail core's channels to the output sink.
    fn drain_brick(&mut self) -> Result<()> {
        self.open_output()?;

        let Some(last) = self.cores.last() else {
            return Ok(());
        };

        if let Some(sink) = self.shared.out_stream.sink.as_mut() {
            let rounding = self.shared.out_stream.flags.contains(StreamFlags::ROUNDING);

            for sample in 0..BRICK_SIZE {
                for channel in 0..self.shared.out_stream.channel_count as usize {
                    let value = last.state.matrix.output_brick(channel)[sample];
                    sink.send_sample(scale_to_stream(value), rounding);
                }
            }
        }

        Ok(())
    }

    /// Rewrite the output header so partial output is observable, and report
    /// the final stream shape once processing has ended.
    fn flush_output_header(&mut self) -> Result<()> {
        let end_of_processing = self.shared.end_of_processing();

        let Some(sink) = self.shared.out_stream.sink.as_mut() else {
            return Ok(());
        };

        sink.flush_header()?;

        if end_of_processing {
            info!(">>Sample rate: {}", self.shared.out_stream.sample_rate);
            info!(">>Bits per sample: {}", self.shared.out_stream.bits_per_sample);
            info!(">>Channels: {}", self.shared.out_stream.channel_count);
            info!(">>Samples per channel: {}", sink.channel_samples());
        }

        Ok(())
    }
}

/// Convert a normalized sample to a 32-bit left-justified stream sample,
/// saturating at the rails.
fn scale_to_stream(value: Sample) -> i32 {
    (value * SAMPLE_SCALE).clamp(i32::MIN as Sample, i32::MAX as Sample) as i32
}
