// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `module` module defines the processing-module model: the table of
//! nine optional entry points every module may expose, the word-addressable
//! parameter block host-comm writes into, and the ordered per-core module
//! table entries.

use crate::system::HostContext;

/// A 7-bit module identifier used for host-comm routing.
pub type ModuleId = u32;

/// The framework entry points of one processing module.
///
/// Each method is one optional hook of the module call table; the default
/// no-op body is the rendition of an absent entry point, so the scheduler can
/// drive every module by name and absent hooks simply do nothing. All hooks
/// except `background` are foreground calls.
///
/// Hooks receive a [`HostContext`] resolving the services of the core the
/// module is scheduled on: I/O bricks, channel masks, the active bit-ripper,
/// and stream state.
pub trait Module {
    /// The module's parameter block, exposed for host-comm writes at word
    /// offsets. Modules without host-visible parameters return `None`.
    fn mcv_mut(&mut self) -> Option<&mut [u32]> {
        None
    }

    /// Unconditional initialization, called once before kickoff.
    fn prekick(&mut self, _ctx: &mut HostContext<'_>) {}

    /// Initialization reacting to parameter defaults, called after prekick
    /// and before any processing hook.
    fn postkick(&mut self, _ctx: &mut HostContext<'_>) {}

    /// Low-frequency foreground hook, called once before the main loop.
    fn timer(&mut self, _ctx: &mut HostContext<'_>) {}

    /// Called on frame boundaries, after a transfer delivered frame metadata.
    fn frame(&mut self, _ctx: &mut HostContext<'_>) {}

    /// Called once per brick of PCM moving through the pipeline.
    fn brick(&mut self, _ctx: &mut HostContext<'_>) {}

    /// "As fast as possible": every brick slot, without frame gating.
    fn afap(&mut self, _ctx: &mut HostContext<'_>) {}

    /// Interruptible low-priority processing, once per outer iteration.
    fn background(&mut self, _ctx: &mut HostContext<'_>) {}

    /// Called when a module requested memory allocation, before postmalloc.
    fn premalloc(&mut self, _ctx: &mut HostContext<'_>) {}

    /// Called after all premalloc hooks ran.
    fn postmalloc(&mut self, _ctx: &mut HostContext<'_>) {}
}

/// The entry points a scheduler pass dispatches by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routine {
    Prekick,
    Postkick,
    Timer,
    Frame,
    Brick,
    Afap,
    Background,
    Postmalloc,
    Premalloc,
}

/// One entry of a core's ordered module table.
pub struct OdtEntry {
    pub module_id: ModuleId,
    pub module: Box<dyn Module>,
}

impl OdtEntry {
    pub fn new(module_id: ModuleId, module: Box<dyn Module>) -> OdtEntry {
        OdtEntry { module_id, module }
    }
}
