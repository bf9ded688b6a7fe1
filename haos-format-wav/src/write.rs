// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RIFF/WAVE writing.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use haos_core::errors::Result;
use haos_core::stream::{OutputSink, OutputSpec};

const HEADER_LEN: u32 = 44;
const WAVE_FORMAT_PCM: u16 = 0x0001;

/// A PCM WAVE writer accepting 32-bit left-justified signed samples.
///
/// Samples are truncated to the stream's sample width on write. The RIFF and
/// data chunk sizes are rewritten by [`flush_header`](OutputSink::flush_header)
/// so a partially written file parses at any point.
pub struct WavWriter {
    writer: BufWriter<File>,
    bits_per_sample: u32,
    channel_count: u32,
    sample_rate: u32,
    samples_written: u32,
}

impl WavWriter {
    pub fn create(path: &Path, spec: &OutputSpec) -> Result<WavWriter> {
        assert!(
            matches!(spec.bits_per_sample, 8 | 16 | 24 | 32),
            "invalid output sample width"
        );

        let file = File::create(path)?;

        let mut writer = WavWriter {
            writer: BufWriter::new(file),
            bits_per_sample: spec.bits_per_sample,
            channel_count: spec.channel_count,
            sample_rate: spec.sample_rate,
            samples_written: 0,
        };

        writer.write_header()?;
        Ok(writer)
    }

    fn data_bytes(&self) -> u32 {
        self.samples_written * (self.bits_per_sample / 8)
    }

    fn write_header(&mut self) -> Result<()> {
        let data_bytes = self.data_bytes();
        let block_align = (self.channel_count * self.bits_per_sample / 8) as u16;

        let w = &mut self.writer;
        w.write_all(b"RIFF")?;
        w.write_all(&(HEADER_LEN - 8 + data_bytes).to_le_bytes())?;
        w.write_all(b"WAVE")?;
        w.write_all(b"fmt ")?;
        w.write_all(&16u32.to_le_bytes())?;
        w.write_all(&WAVE_FORMAT_PCM.to_le_bytes())?;
        w.write_all(&(self.channel_count as u16).to_le_bytes())?;
        w.write_all(&self.sample_rate.to_le_bytes())?;
        w.write_all(&(self.sample_rate * u32::from(block_align)).to_le_bytes())?;
        w.write_all(&block_align.to_le_bytes())?;
        w.write_all(&(self.bits_per_sample as u16).to_le_bytes())?;
        w.write_all(b"data")?;
        w.write_all(&data_bytes.to_le_bytes())?;
        Ok(())
    }
}

impl OutputSink for WavWriter {
    fn send_sample(&mut self, sample: i32, _rounding: bool) {
        // The rounding request is part of the contract but not applied.
        let result = match self.bits_per_sample {
            8 => self.writer.write_all(&[((sample >> 24) + 128) as u8]),
            16 => self.writer.write_all(&((sample >> 16) as i16).to_le_bytes()),
            24 => self.writer.write_all(&(sample >> 8).to_le_bytes()[..3]),
            _ => self.writer.write_all(&sample.to_le_bytes()),
        };

        if result.is_ok() {
            self.samples_written += 1;
        }
    }

    fn flush_header(&mut self) -> Result<()> {
        self.writer.flush()?;

        let end = self.writer.seek(SeekFrom::End(0))?;
        self.writer.seek(SeekFrom::Start(0))?;
        self.write_header()?;
        self.writer.flush()?;
        self.writer.seek(SeekFrom::Start(end))?;

        Ok(())
    }

    fn channel_samples(&self) -> u32 {
        self.samples_written / self.channel_count.max(1)
    }
}
