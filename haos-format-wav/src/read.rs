// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RIFF/WAVE reading.

use std::io::{BufReader, Read, Seek, SeekFrom};

use haos_core::config::DEFAULT_SAMPLE_RATE;
use haos_core::errors::{decode_error, unsupported_error, Result};
use haos_core::stream::{InputInfo, InputSource};

/// WAVE is a RIFF stream with a "RIFF" ASCII stream marker.
const RIFF_STREAM_MARKER: [u8; 4] = *b"RIFF";
/// The RIFF form of a WAVE file.
const WAVE_RIFF_FORM: [u8; 4] = *b"WAVE";

const WAVE_FORMAT_PCM: u16 = 0x0001;

/// A reader over the sample data of a PCM WAVE file.
///
/// Samples are delivered as 32-bit left-justified signed values regardless
/// of the stored sample width. Reads past the data chunk return silence.
pub struct WavReader<R: Read + Seek> {
    reader: R,
    channel_count: u32,
    sample_rate: u32,
    bits_per_sample: u32,
    total_samples: u32,
    samples_read: u32,
}

impl<R: Read + Seek> WavReader<R> {
    /// Parse the RIFF header and chunk list up to the data chunk.
    pub fn new(mut reader: R) -> Result<WavReader<R>> {
        let marker = read_quad(&mut reader)?;
        if marker != RIFF_STREAM_MARKER {
            return unsupported_error("missing riff stream marker");
        }

        // Total RIFF chunk size; the chunk walk below is bounded by the
        // data chunk instead.
        let _riff_len = read_u32(&mut reader)?;

        let form = read_quad(&mut reader)?;
        if form != WAVE_RIFF_FORM {
            return unsupported_error("riff form is not wave");
        }

        let mut format: Option<(u16, u32, u32, u32)> = None;

        // Walk chunks until the data chunk; everything else is skipped.
        loop {
            let id = read_quad(&mut reader)?;
            let len = read_u32(&mut reader)?;

            match &id {
                b"fmt " => {
                    if len < 16 {
                        return decode_error("malformed fmt chunk");
                    }

                    let tag = read_u16(&mut reader)?;
                    let channels = u32::from(read_u16(&mut reader)?);
                    let sample_rate = read_u32(&mut reader)?;
                    let _avg_bytes = read_u32(&mut reader)?;
                    let _block_align = read_u16(&mut reader)?;
                    let bits = u32::from(read_u16(&mut reader)?);

                    // Skip any extension bytes.
                    skip(&mut reader, u64::from(len) - 16)?;

                    if tag != WAVE_FORMAT_PCM {
                        return unsupported_error("non-pcm wave format");
                    }
                    if channels == 0 || sample_rate == 0 {
                        return decode_error("malformed fmt chunk");
                    }
                    if !matches!(bits, 8 | 16 | 24 | 32) {
                        return unsupported_error("unsupported sample width");
                    }

                    format = Some((tag, channels, sample_rate, bits));
                }
                b"data" => {
                    let Some((_, channels, sample_rate, bits)) = format else {
                        return decode_error("data chunk before fmt chunk");
                    };

                    let total_samples = len / (bits / 8);

                    return Ok(WavReader {
                        reader,
                        channel_count: channels,
                        sample_rate,
                        bits_per_sample: bits,
                        total_samples,
                        samples_read: 0,
                    });
                }
                _ => {
                    // Chunks are word (2-byte) aligned.
                    skip(&mut reader, u64::from(len) + u64::from(len & 1))?;
                }
            }
        }
    }

    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    /// Samples per channel in the data chunk.
    pub fn channel_samples(&self) -> u32 {
        self.total_samples / self.channel_count
    }

    pub fn eof(&self) -> bool {
        self.samples_read >= self.total_samples
    }

    /// Read the next sample, interleaved, as a 32-bit left-justified signed
    /// value. Returns silence at and after the end of the data chunk.
    pub fn recv_sample(&mut self) -> i32 {
        if self.eof() {
            return 0;
        }

        self.samples_read += 1;

        match self.bits_per_sample {
            8 => {
                let mut buf = [0; 1];
                if self.reader.read_exact(&mut buf).is_err() {
                    return 0;
                }
                (i32::from(buf[0]) - 128) << 24
            }
            16 => {
                let mut buf = [0; 2];
                if self.reader.read_exact(&mut buf).is_err() {
                    return 0;
                }
                i32::from(i16::from_le_bytes(buf)) << 16
            }
            24 => {
                let mut buf = [0; 3];
                if self.reader.read_exact(&mut buf).is_err() {
                    return 0;
                }
                i32::from_le_bytes([0, buf[0], buf[1], buf[2]])
            }
            _ => {
                let mut buf = [0; 4];
                if self.reader.read_exact(&mut buf).is_err() {
                    return 0;
                }
                i32::from_le_bytes(buf)
            }
        }
    }
}

/// [`InputSource`] over a PCM WAVE file: one FIFO word per sample.
pub struct WavSource<R: Read + Seek> {
    reader: WavReader<R>,
}

impl<R: Read + Seek> WavSource<R> {
    pub fn new(reader: WavReader<R>) -> WavSource<R> {
        WavSource { reader }
    }
}

impl<R: Read + Seek> InputSource for WavSource<R> {
    fn info(&self) -> InputInfo {
        InputInfo {
            compressed: false,
            sample_rate: self.reader.sample_rate(),
            channel_count: self.reader.channel_count(),
            bits_per_sample: self.reader.bits_per_sample(),
            channel_samples: self.reader.channel_samples(),
        }
    }

    fn next_word(&mut self) -> u32 {
        self.reader.recv_sample() as u32
    }

    fn eof(&self) -> bool {
        self.reader.eof()
    }
}

/// [`InputSource`] over an arbitrary byte stream: four little-endian bytes
/// per FIFO word, zero-padded at the tail.
///
/// Used for inputs that are not PCM containers, i.e. compressed bitstreams
/// fed to a decoder front-end.
pub struct RawWordSource<R: Read> {
    reader: BufReader<R>,
    exhausted: bool,
}

impl<R: Read> RawWordSource<R> {
    pub fn new(inner: R) -> RawWordSource<R> {
        RawWordSource { reader: BufReader::new(inner), exhausted: false }
    }
}

impl<R: Read> InputSource for RawWordSource<R> {
    fn info(&self) -> InputInfo {
        InputInfo {
            compressed: true,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channel_count: 0,
            bits_per_sample: 0,
            channel_samples: 0,
        }
    }

    fn next_word(&mut self) -> u32 {
        let mut buf = [0; 4];
        let mut filled = 0;

        while filled < 4 {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) | Err(_) => {
                    self.exhausted = true;
                    break;
                }
                Ok(n) => filled += n,
            }
        }

        u32::from_le_bytes(buf)
    }

    fn eof(&self) -> bool {
        self.exhausted
    }
}

fn read_quad(reader: &mut impl Read) -> Result<[u8; 4]> {
    let mut buf = [0; 4];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    Ok(u32::from_le_bytes(read_quad(reader)?))
}

fn read_u16(reader: &mut impl Read) -> Result<u16> {
    let mut buf = [0; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn skip(reader: &mut impl Seek, bytes: u64) -> Result<()> {
    reader.seek(SeekFrom::Current(bytes as i64))?;
    Ok(())
}
