// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! The haOS runtime core.
//!
//! haOS is a cooperative, brick-based runtime that coordinates a pipeline of
//! audio processing modules on one or more emulated DSP cores. This crate
//! provides the runtime itself:
//!
//! * the [`system`] scheduler that drives the deterministic tick loop,
//! * the per-core [`matrix`] of brick buffers with its cursors and free-space
//!   accounting,
//! * the [`ripper`] bit-granular FIFO reader used by decoder front-ends,
//! * the [`module`] model (nine optional entry points per module) and the
//!   ordered per-core module tables,
//! * the [`hostcomm`] replay that patches module parameter blocks before
//!   kickoff.
//!
//! Container I/O is abstracted behind the [`stream`] traits; concrete WAV
//! support lives in the `haos-format-wav` crate. Processing modules live in
//! their own `haos-module-*` crates.

pub mod config;
pub mod core;
pub mod errors;
pub mod fifo;
pub mod hostcomm;
pub mod matrix;
pub mod module;
pub mod ripper;
pub mod stream;
pub mod system;
pub mod transfer;
