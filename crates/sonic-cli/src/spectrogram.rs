//! PGM spectrogram rendering for the `-S width height` flag.
//!
//! Self-contained: it does not reach into `sonic-core`'s AMDF estimator,
//! since a spectrogram is a CLI-only diagnostic, not part of the engine
//! (`SPEC_FULL.md` §2). Pitch periods are re-estimated here with a plain
//! single-stage AMDF, grounded on the original `sonic.c`'s (non-experimental)
//! `findPitchPeriod` rather than the two-stage refinement `sonic-core` uses.
//!
//! Time-aliased-FFT technique from `examples/original_source/spectrogram.c`:
//! overlap-add two adjacent pitch periods with a sine window, FFT the
//! result, keep the power spectrum (skipping the DC bin), one spectral
//! column per pitch period. Columns/rows are then resampled to the
//! requested bitmap size by bilinear lookup.

use anyhow::{Context, Result};
use rustfft::{num_complex::Complex, FftPlanner};
use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;

const MIN_PITCH_HZ: u32 = 65;
const MAX_PITCH_HZ: u32 = 400;

struct Spectrum {
    /// Power per frequency bin, DC bin already excluded.
    power: Vec<f64>,
}

pub struct Spectrogram {
    spectrums: Vec<Spectrum>,
    min_power: f64,
    max_power: f64,
}

impl Spectrogram {
    pub fn new() -> Self {
        Self {
            spectrums: Vec::new(),
            min_power: f64::MAX,
            max_power: f64::MIN,
        }
    }

    /// Overlap-add `2 * period` mono samples with a sine window, FFT, and
    /// record the resulting power spectrum as the next time column.
    fn add_pitch_period(&mut self, samples: &[i16], period: usize, planner: &mut FftPlanner<f64>) {
        if period < 2 {
            return;
        }
        let mut windowed: Vec<Complex<f64>> = (0..period)
            .map(|i| {
                let sinx = (std::f64::consts::PI * i as f64 / 2.0).sin();
                let blended = sinx * samples[i] as f64 + (1.0 - sinx) * samples[i + period] as f64;
                Complex::new(blended, 0.0)
            })
            .collect();

        let fft = planner.plan_fft_forward(period);
        fft.process(&mut windowed);

        let num_freqs = period / 2;
        let mut power = Vec::with_capacity(num_freqs);
        // Skip bin 0 (DC), matching the reference.
        for bin in windowed.iter().skip(1).take(num_freqs) {
            let p = bin.norm_sqr();
            power.push(p);
            self.min_power = self.min_power.min(p);
            self.max_power = self.max_power.max(p);
        }
        self.spectrums.push(Spectrum { power });
    }

    fn interpolate_spectrum(&self, spectrum: &Spectrum, row: usize, num_rows: usize) -> f64 {
        let num_freqs = spectrum.power.len();
        if num_freqs == 0 {
            return self.min_power;
        }
        // Low frequency at the bottom of the image.
        let row = num_rows - row - 1;
        let top_index = (num_freqs * row / num_rows).min(num_freqs - 1);
        let remainder = num_freqs * row - top_index * num_rows;
        let top_power = spectrum.power[top_index];
        if remainder == 0 || top_index + 1 >= num_freqs {
            return top_power;
        }
        let bottom_power = spectrum.power[top_index + 1];
        let position = remainder as f64 / num_rows as f64;
        (1.0 - position) * top_power + position * bottom_power
    }

    fn interpolate(&self, row: usize, col: usize, num_rows: usize, num_cols: usize) -> f64 {
        let num_spectrums = self.spectrums.len();
        let left_index = (num_spectrums * col / num_cols).min(num_spectrums - 1);
        let remainder = num_spectrums * col - left_index * num_cols;
        let left_power = self.interpolate_spectrum(&self.spectrums[left_index], row, num_rows);
        if remainder == 0 || left_index + 1 >= num_spectrums {
            return left_power;
        }
        let right_power = self.interpolate_spectrum(&self.spectrums[left_index + 1], row, num_rows);
        let position = remainder as f64 / num_cols as f64;
        (1.0 - position) * left_power + position * right_power
    }

    /// Render to a `num_rows * num_cols` grayscale bitmap, row-major,
    /// top to bottom.
    pub fn to_bitmap(&self, num_rows: usize, num_cols: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(num_rows * num_cols);
        let range = (self.max_power - self.min_power).max(f64::EPSILON);
        for row in 0..num_rows {
            for col in 0..num_cols {
                let power = self.interpolate(row, col, num_rows, num_cols);
                let value = (((power - self.min_power) / range) * 256.0) as i32;
                data.push(value.clamp(0, 255) as u8);
            }
        }
        data
    }
}

/// Walk `samples` (interleaved, `channels` wide) one pitch period at a
/// time using channel 0, adding each to a fresh spectrogram.
pub fn build_spectrogram(samples: &[i16], channels: usize, sample_rate: u32) -> Spectrogram {
    let mut spectrogram = Spectrogram::new();
    let mut planner = FftPlanner::new();
    let min_period = ((sample_rate / MAX_PITCH_HZ).max(2)) as usize;
    let max_period = ((sample_rate / MIN_PITCH_HZ).max(min_period + 1)) as usize;

    let mono: Vec<i16> = samples.chunks(channels).map(|f| f[0]).collect();
    let mut position = 0usize;
    while position + 2 * max_period <= mono.len() {
        let window = &mono[position..];
        let period = find_pitch_period(window, min_period, max_period);
        spectrogram.add_pitch_period(window, period, &mut planner);
        position += period;
    }
    spectrogram
}

/// Plain single-stage AMDF search, independent of `sonic-core`'s two-stage
/// estimator (this module intentionally does not depend on it).
fn find_pitch_period(window: &[i16], min_period: usize, max_period: usize) -> usize {
    let max_period = max_period.min(window.len() / 2).max(min_period);
    let mut best_period = min_period;
    let mut best_diff = i64::MAX;
    for period in min_period..=max_period {
        let mut diff = 0i64;
        for i in 0..period {
            diff += (window[i] as i64 - window[i + period] as i64).abs();
        }
        if diff < best_diff {
            best_diff = diff;
            best_period = period;
        }
    }
    best_period
}

pub fn write_pgm(path: &Path, width: usize, height: usize, data: &[u8]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create spectrogram file {}", path.display()))?;
    let mut w = BufWriter::new(file);
    writeln!(w, "P2")?;
    writeln!(w, "# CREATOR: sonic-cli")?;
    writeln!(w, "{width} {height}")?;
    writeln!(w, "255")?;
    for row in data.chunks(width) {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(w, "{}", line.join(" "))?;
    }
    Ok(())
}
