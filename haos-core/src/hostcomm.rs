// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `hostcomm` module applies a stored sequence of host commands to
//! module parameter blocks before kickoff.
//!
//! Commands arrive as 32-bit words, optionally loaded from a textual
//! configuration file of hexadecimal tokens. Each command word routes to a
//! module by its 7-bit id and patches that module's MCV at word offsets.

use std::fs;
use std::path::Path;

use log::warn;

use crate::config::MAX_HOST_COMMANDS;
use crate::core::Core;
use crate::module::ModuleId;

/// Operation applied to the target MCV word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostOp {
    /// `mcv[offset] = payload`
    Write = 0,
    /// `mcv[offset] |= payload`
    Or = 1,
    /// `mcv[offset] &= payload`
    And = 2,
    /// Reads are not supported by the replay and carry no payload.
    Read = 3,
}

/// A decoded host command word.
///
/// Layout, MSB to LSB: `moduleID[7] | opCode[2] | numWords-1[5] | reserved |
/// offset[16]`.
#[derive(Clone, Copy, Debug)]
pub struct HostCommand {
    pub module_id: ModuleId,
    pub op: HostOp,
    pub num_words: u32,
    pub offset: u32,
}

impl HostCommand {
    pub fn parse(word: u32) -> HostCommand {
        let op = match (word >> 22) & 0x3 {
            0 => HostOp::Write,
            1 => HostOp::Or,
            2 => HostOp::And,
            _ => HostOp::Read,
        };

        HostCommand {
            module_id: (word >> 24) & 0x7f,
            op,
            num_words: ((word >> 16) & 0x1f) + 1,
            offset: word & 0xffff,
        }
    }
}

/// Apply a queue of command and payload words to the module tables of
/// `cores`.
///
/// Commands addressing an unknown module id consume their payload and are
/// dropped, as are payload words whose offset falls outside the target MCV.
pub fn apply_commands(cores: &mut [Core], queue: &[u32]) {
    let mut idx = 0;

    while idx < queue.len() {
        let cmd = HostCommand::parse(queue[idx]);
        idx += 1;

        if cmd.op == HostOp::Read {
            continue;
        }

        let take = (cmd.num_words as usize).min(queue.len() - idx);
        let payload = &queue[idx..idx + take];
        idx += take;

        let mut offset = cmd.offset as usize;

        match find_mcv(cores, cmd.module_id) {
            Some(mcv) => {
                for &value in payload {
                    if let Some(word) = mcv.get_mut(offset) {
                        match cmd.op {
                            HostOp::Write => *word = value,
                            HostOp::Or => *word |= value,
                            HostOp::And => *word &= value,
                            HostOp::Read => unreachable!(),
                        }
                    }
                    offset += 1;
                }
            }
            None => {
                // Messages for a module that is not resident are dropped.
            }
        }
    }
}

fn find_mcv(cores: &mut [Core], module_id: ModuleId) -> Option<&mut [u32]> {
    for core in cores.iter_mut() {
        for entry in core.modules.iter_mut() {
            if entry.module_id == module_id {
                return entry.module.mcv_mut();
            }
        }
    }

    None
}

/// Load a command queue from a configuration file.
///
/// The format is line oriented: `#include <path>` pulls in another file,
/// `# Frame: ` lines are placeholders for frame-gated command injection and
/// are skipped, other `#` lines are comments, and remaining lines carry
/// whitespace-separated hexadecimal words. A digit run longer than eight
/// characters with no separator is split after the first eight, so a command
/// word and its first payload word may be written back to back.
///
/// An unreadable file is reported and contributes no commands.
pub fn load_commands(path: &Path) -> Vec<u32> {
    let mut queue = Vec::new();
    read_cfg_file(path, &mut queue);
    queue
}

fn read_cfg_file(path: &Path, queue: &mut Vec<u32>) {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => {
            warn!("unable to open cfg file '{}'", path.display());
            return;
        }
    };

    for line in text.lines() {
        let line = line.trim_end_matches('\r');

        if let Some(include) = line.strip_prefix("#include") {
            read_cfg_file(Path::new(include.trim()), queue);
        }
        else if line.starts_with("# Frame: ") {
            // Frame-gated command injection is not simulated.
        }
        else if line.starts_with('#') {
            // Comment.
        }
        else if !line.is_empty() {
            let mut line = line.to_string();
            if line.len() > 8 && !line.contains(' ') {
                line.insert(8, ' ');
            }

            for token in line.split_whitespace() {
                match u32::from_str_radix(token, 16) {
                    Ok(word) => {
                        if queue.len() == MAX_HOST_COMMANDS {
                            warn!("host command queue full, dropping remainder");
                            return;
                        }
                        queue.push(word);
                    }
                    Err(_) => {
                        warn!("bad token '{}' in cfg file '{}'", token, path.display());
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::{apply_commands, load_commands, HostCommand, HostOp};
    use crate::core::Core;
    use crate::module::{Module, OdtEntry};

    struct McvOnly {
        mcv: Vec<u32>,
    }

    impl Module for McvOnly {
        fn mcv_mut(&mut self) -> Option<&mut [u32]> {
            Some(&mut self.mcv)
        }
    }

    fn core_with_module(module_id: u32, mcv: Vec<u32>) -> Core {
        let mut core = Core::new(0);
        core.add_module(OdtEntry::new(module_id, Box::new(McvOnly { mcv })));
        core
    }

    fn mcv_of(core: &mut Core) -> Vec<u32> {
        core.modules[0].module.mcv_mut().unwrap().to_vec()
    }

    fn cmd(module_id: u32, op: u32, num_words: u32, offset: u32) -> u32 {
        (module_id << 24) | (op << 22) | ((num_words - 1) << 16) | offset
    }

    #[test]
    fn verify_command_word_layout() {
        let word = cmd(0x60, 2, 17, 0x1234);
        let parsed = HostCommand::parse(word);

        assert_eq!(parsed.module_id, 0x60);
        assert_eq!(parsed.op, HostOp::And);
        assert_eq!(parsed.num_words, 17);
        assert_eq!(parsed.offset, 0x1234);
    }

    #[test]
    fn verify_write_or_and_ops() {
        let mut cores = [core_with_module(0x10, vec![0xffff_0000, 0, 0])];

        apply_commands(&mut cores, &[cmd(0x10, 0, 1, 1), 0x1111_2222]);
        assert_eq!(mcv_of(&mut cores[0]), vec![0xffff_0000, 0x1111_2222, 0]);

        apply_commands(&mut cores, &[cmd(0x10, 1, 1, 2), 0x0000_00ff]);
        assert_eq!(mcv_of(&mut cores[0]), vec![0xffff_0000, 0x1111_2222, 0xff]);

        apply_commands(&mut cores, &[cmd(0x10, 2, 1, 0), 0x00ff_ffff]);
        assert_eq!(mcv_of(&mut cores[0]), vec![0x00ff_0000, 0x1111_2222, 0xff]);
    }

    #[test]
    fn verify_multi_word_payload_increments_offset() {
        let mut cores = [core_with_module(0x42, vec![0; 8])];

        apply_commands(&mut cores, &[cmd(0x42, 0, 3, 2), 0xa, 0xb, 0xc]);
        assert_eq!(mcv_of(&mut cores[0]), vec![0, 0, 0xa, 0xb, 0xc, 0, 0, 0]);
    }

    #[test]
    fn verify_unknown_module_consumes_payload() {
        let mut cores = [core_with_module(0x10, vec![0; 4])];

        // The first command routes nowhere; its payload must not be
        // interpreted as the next command word.
        let queue =
            [cmd(0x7f, 0, 2, 0), 0xdead_beef, 0xdead_beef, cmd(0x10, 0, 1, 3), 0x77];
        apply_commands(&mut cores, &queue);

        assert_eq!(mcv_of(&mut cores[0]), vec![0, 0, 0, 0x77]);
    }

    #[test]
    fn verify_read_op_is_ignored() {
        let mut cores = [core_with_module(0x10, vec![0; 4])];

        // A read carries no payload; the following word is the next command.
        let queue = [cmd(0x10, 3, 4, 0), cmd(0x10, 0, 1, 1), 0x5];
        apply_commands(&mut cores, &queue);

        assert_eq!(mcv_of(&mut cores[0]), vec![0, 0x5, 0, 0]);
    }

    #[test]
    fn verify_out_of_range_offset_dropped() {
        let mut cores = [core_with_module(0x10, vec![0; 2])];

        apply_commands(&mut cores, &[cmd(0x10, 0, 3, 1), 0x1, 0x2, 0x3]);
        assert_eq!(mcv_of(&mut cores[0]), vec![0, 0x1]);
    }

    #[test]
    fn verify_cfg_file_parsing() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("haos-hostcomm-{}.cfg", std::process::id()));

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# gain configuration").unwrap();
        writeln!(file, "6000000100000000").unwrap();
        writeln!(file, "# Frame: 100").unwrap();
        writeln!(file, "60400001 0000ffff").unwrap();
        writeln!(file).unwrap();
        drop(file);

        let queue = load_commands(&path);
        std::fs::remove_file(&path).ok();

        assert_eq!(queue, vec![0x6000_0001, 0x0000_0000, 0x6040_0001, 0x0000_ffff]);
    }

    #[test]
    fn verify_cfg_include_directive() {
        let dir = std::env::temp_dir();
        let inner = dir.join(format!("haos-hostcomm-inner-{}.cfg", std::process::id()));
        let outer = dir.join(format!("haos-hostcomm-outer-{}.cfg", std::process::id()));

        std::fs::write(&inner, "deadbeef\n").unwrap();
        std::fs::write(&outer, format!("#include {}\n00000001\n", inner.display())).unwrap();

        let queue = load_commands(&outer);
        std::fs::remove_file(&inner).ok();
        std::fs::remove_file(&outer).ok();

        assert_eq!(queue, vec![0xdead_beef, 0x1]);
    }

    #[test]
    fn verify_missing_cfg_contributes_nothing() {
        let queue = load_commands(std::path::Path::new("/nonexistent/haos.cfg"));
        assert!(queue.is_empty());
    }
}
