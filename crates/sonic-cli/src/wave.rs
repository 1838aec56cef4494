//! WAV file I/O, restricted to signed-16 interleaved PCM (the only encoding
//! the reference CLI round-trips end to end, per `examples/original_source/wave.h`).

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub struct WaveIn {
    reader: WavReader<std::io::BufReader<File>>,
    pub sample_rate: u32,
    pub num_channels: u16,
}

impl WaveIn {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = WavReader::open(path)
            .with_context(|| format!("failed to open input wave file {}", path.display()))?;
        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            bail!(
                "{}: only signed-16 PCM wave files are supported (got {:?}/{} bits)",
                path.display(),
                spec.sample_format,
                spec.bits_per_sample
            );
        }
        Ok(Self {
            sample_rate: spec.sample_rate,
            num_channels: spec.channels,
            reader,
        })
    }

    /// Read up to `max_samples` interleaved samples (not frames). Returns
    /// an empty vec at end of file.
    pub fn read_chunk(&mut self, max_samples: usize) -> Result<Vec<i16>> {
        let mut out = Vec::with_capacity(max_samples);
        for sample in self.reader.samples::<i16>().take(max_samples) {
            out.push(sample.context("failed reading PCM sample")?);
        }
        Ok(out)
    }
}

pub struct WaveOut {
    writer: WavWriter<BufWriter<File>>,
}

impl WaveOut {
    pub fn create(path: &Path, sample_rate: u32, num_channels: u16) -> Result<Self> {
        let spec = WavSpec {
            channels: num_channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec)
            .with_context(|| format!("failed to create output wave file {}", path.display()))?;
        Ok(Self { writer })
    }

    pub fn write_chunk(&mut self, samples: &[i16]) -> Result<()> {
        for &s in samples {
            self.writer.write_sample(s)?;
        }
        Ok(())
    }

    pub fn finalize(self) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}
