// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process;

use clap::{Arg, Command, ErrorKind};
use log::error;

use haos::core::errors::{config_error, Result};
use haos::core::system::{FrontEnd, System, SystemOptions};
use haos::default;
use haos::wav::WavIo;

fn main() {
    pretty_env_logger::init();

    if let Err(err) = run() {
        error!("{}", err);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let command = Command::new("haos-play")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run a haOS audio pipeline over a WAV or bitstream file")
        .arg(
            Arg::new("fg2bg")
                .long("fg2bg")
                .value_name("RATIO")
                .takes_value(true)
                .help("Bricks processed per background entry-point call (default 16, 72 for MP3)"),
        )
        .arg(
            Arg::new("cfg")
                .long("cfg")
                .value_name("PATH")
                .takes_value(true)
                .help("Host-comm message file applied before kickoff"),
        )
        .arg(
            Arg::new("app")
                .long("app")
                .value_name("0|1")
                .takes_value(true)
                .help("Front-end selection: 0 = PCM decoder, 1 = MP3 decoder (default 0)"),
        )
        .arg(
            Arg::new("input")
                .long("input")
                .value_name("PATH")
                .takes_value(true)
                .help("Input audio file; WAV is decoded as PCM, anything else is fed as a bitstream"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .value_name("PATH")
                .takes_value(true)
                .help("Output WAV file; valid channels are written in ascending lane order"),
        )
        .arg(
            Arg::new("osample")
                .long("osample")
                .value_name("BITS")
                .takes_value(true)
                .help("Output bits per sample (default 16)"),
        )
        .arg(
            Arg::new("ofs")
                .long("ofs")
                .value_name("HZ")
                .takes_value(true)
                .help("Output sample rate (default follows the input)"),
        );

    let matches = match command.try_get_matches() {
        Ok(matches) => matches,
        Err(err) if err.kind() == ErrorKind::DisplayHelp || err.kind() == ErrorKind::DisplayVersion => {
            err.print().ok();
            process::exit(0);
        }
        Err(err) => {
            err.print().ok();
            process::exit(1);
        }
    };

    let front_end = match matches.value_of("app") {
        None | Some("0") => FrontEnd::Pcm,
        Some("1") => FrontEnd::Mp3,
        Some(other) => return config_error(format!("unknown front-end '{}'", other)),
    };

    let options = SystemOptions {
        input: matches.value_of("input").map(PathBuf::from),
        output: matches.value_of("output").map(PathBuf::from),
        cfg: matches.value_of("cfg").map(PathBuf::from),
        front_end,
        fg2bg_ratio: parse_arg(&matches, "fg2bg")?,
        output_bits_per_sample: parse_arg(&matches, "osample")?,
        output_sample_rate: parse_arg(&matches, "ofs")?,
    };

    if options.input.is_none() && options.output.is_none() {
        return config_error("at least one of --input and --output is required");
    }

    let mut system = System::new(options, Box::<WavIo>::default());
    system.add_modules(default::pipeline(front_end));
    system.run()
}

fn parse_arg(matches: &clap::ArgMatches, name: &str) -> Result<Option<u32>> {
    match matches.value_of(name) {
        None => Ok(None),
        Some(value) => match value.parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => config_error(format!("invalid value '{}' for --{}", value, name)),
        },
    }
}
