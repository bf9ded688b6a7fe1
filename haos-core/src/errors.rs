// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by haOS.
///
/// Protocol violations (bit-ripper argument out of range, FIFO id out of
/// range) are programming errors and are asserted, not reported through this
/// type. Recoverable stream conditions (EOF, short decodes) are absorbed
/// where they occur and surfaced through observable flags instead.
#[derive(Debug)]
pub enum Error {
    /// An IO error occurred while reading or writing a stream.
    IoError(io::Error),
    /// The command line, the input source, or the output sink could not be
    /// brought up.
    ConfigError(String),
    /// The stream contained data the front-end could not interpret.
    DecodeError(&'static str),
    /// An unsupported container or stream feature was encountered.
    Unsupported(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => write!(f, "io error: {}", err),
            Error::ConfigError(ref msg) => write!(f, "configuration error: {}", msg),
            Error::DecodeError(msg) => write!(f, "malformed stream: {}", msg),
            Error::Unsupported(feature) => write!(f, "unsupported feature: {}", feature),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a configuration error.
pub fn config_error<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::ConfigError(msg.into()))
}

/// Convenience function to create a decode error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::DecodeError(desc))
}

/// Convenience function to create an unsupported feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}
