//! Stream orchestrator (spec §4.6): parameter validation, scheduling of
//! period estimation → synthesis → resampling, and flush.

use crate::buffer::SampleBuffer;
use crate::constants::{self, is_unity, round_usize, MAX_PITCH_HZ, MIN_PITCH_HZ};
use crate::error::Result;
use crate::format;
use crate::nonlinear::nonlinear_speed;
use crate::period::PeriodEstimator;
use crate::resample::RateResampler;
use crate::synth;

/// A streaming, single-threaded speed/pitch/rate/volume modifier for PCM
/// speech audio. See the crate-level docs for the overall pipeline.
pub struct Stream {
    sample_rate: u32,
    channels: u16,

    speed: f64,
    pitch: f64,
    rate: f64,
    volume: f64,
    quality: bool,
    use_chord_pitch: bool,
    nonlinear_speedup: bool,

    input: SampleBuffer,
    output: SampleBuffer,

    min_period: usize,
    max_period: usize,
    max_required: usize,

    remaining_input_to_copy: usize,
    estimator: PeriodEstimator,
    resampler: RateResampler,

    /// `true` once a `flush` has run to completion with nothing new written
    /// since -- makes repeated `flush()` calls idempotent (spec §4.6).
    flushed: bool,
}

impl Stream {
    /// Create a stream. Parameters default to 1.0 (speed/pitch/rate/volume);
    /// quality/chord-pitch/nonlinear-speedup start disabled.
    pub fn new(sample_rate: u32, num_channels: u16) -> Result<Self> {
        let sample_rate = constants::clamp_sample_rate(sample_rate);
        let channels = constants::clamp_channels(num_channels);
        let (min_period, max_period, max_required) = period_bounds(sample_rate);

        let mut input = SampleBuffer::new(channels as usize, max_required);
        let mut output = SampleBuffer::new(channels as usize, max_required);
        input.reserve(max_required)?;
        output.reserve(max_required)?;

        tracing::debug!(sample_rate, channels, "created sonic stream");

        Ok(Self {
            sample_rate,
            channels,
            speed: constants::DEFAULT_SPEED,
            pitch: constants::DEFAULT_PITCH,
            rate: constants::DEFAULT_RATE,
            volume: constants::DEFAULT_VOLUME,
            quality: false,
            use_chord_pitch: false,
            nonlinear_speedup: false,
            input,
            output,
            min_period,
            max_period,
            max_required,
            remaining_input_to_copy: 0,
            estimator: PeriodEstimator::new(),
            resampler: RateResampler::new(channels as usize),
            flushed: true,
        })
    }

    // -- parameters --------------------------------------------------

    pub fn speed(&self) -> f64 {
        self.speed
    }
    pub fn set_speed(&mut self, v: f64) {
        self.speed = clamp_logged("speed", v, constants::clamp_speed(v));
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }
    pub fn set_pitch(&mut self, v: f64) {
        self.pitch = clamp_logged("pitch", v, constants::clamp_pitch(v));
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
    pub fn set_rate(&mut self, v: f64) {
        self.rate = clamp_logged("rate", v, constants::clamp_rate(v));
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }
    pub fn set_volume(&mut self, v: f64) {
        self.volume = clamp_logged("volume", v, constants::clamp_volume(v));
    }

    pub fn quality(&self) -> bool {
        self.quality
    }
    pub fn set_quality(&mut self, v: bool) {
        self.quality = v;
    }

    pub fn chord_pitch(&self) -> bool {
        self.use_chord_pitch
    }
    pub fn set_chord_pitch(&mut self, v: bool) {
        self.use_chord_pitch = v;
    }

    pub fn nonlinear_speedup(&self) -> bool {
        self.nonlinear_speedup
    }
    pub fn set_nonlinear_speedup(&mut self, v: bool) {
        self.nonlinear_speedup = v;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Changing the sample rate recomputes the period-search bounds; any
    /// frames already buffered are kept (invariant 2 concerns the *search*
    /// bounds, not buffered content).
    pub fn set_sample_rate(&mut self, v: u32) {
        let clamped = clamp_logged_u32("sampleRate", v, constants::clamp_sample_rate(v));
        self.sample_rate = clamped;
        let (min_period, max_period, max_required) = period_bounds(self.sample_rate);
        self.min_period = min_period;
        self.max_period = max_period;
        self.max_required = max_required;
        self.estimator.reset();
    }

    pub fn num_channels(&self) -> u16 {
        self.channels
    }

    /// Changing the channel count re-shapes (and discards) both staging
    /// buffers and the resampler's lookahead, since an interleaved frame's
    /// width just changed underneath them. Per §9(iii), 0 clamps to 1.
    pub fn set_num_channels(&mut self, v: u16) {
        let clamped = clamp_logged_u16("numChannels", v, constants::clamp_channels(v));
        self.channels = clamped;
        self.input.reset_channels(clamped as usize);
        self.output.reset_channels(clamped as usize);
        self.resampler.reset_channels(clamped as usize);
        self.estimator.reset();
        self.remaining_input_to_copy = 0;
    }

    // -- data path -----------------------------------------------------

    /// Append signed-16 interleaved samples and drain as many periods as
    /// the buffered input allows.
    pub fn write_i16(&mut self, samples: &[i16]) -> Result<()> {
        self.check_frame_aligned(samples.len())?;
        let mut staged = samples.to_vec();
        format::apply_volume_slice(&mut staged, self.volume);
        self.write_staged(&staged)
    }

    /// Append unsigned 8-bit samples (128 = zero point).
    pub fn write_u8(&mut self, samples: &[u8]) -> Result<()> {
        self.check_frame_aligned(samples.len())?;
        let mut staged = Vec::with_capacity(samples.len());
        format::u8_slice_to_i16(samples, &mut staged);
        format::apply_volume_slice(&mut staged, self.volume);
        self.write_staged(&staged)
    }

    /// Append normalised float samples in `[-1.0, 1.0]`.
    pub fn write_f32(&mut self, samples: &[f32]) -> Result<()> {
        self.check_frame_aligned(samples.len())?;
        let mut staged = Vec::with_capacity(samples.len());
        format::f32_slice_to_i16(samples, &mut staged);
        format::apply_volume_slice(&mut staged, self.volume);
        self.write_staged(&staged)
    }

    fn check_frame_aligned(&self, count: usize) -> Result<()> {
        let channels = self.channels as usize;
        if count % channels != 0 {
            return Err(crate::error::StreamError::InvalidEncoding { count, channels });
        }
        Ok(())
    }

    fn write_staged(&mut self, frames: &[i16]) -> Result<()> {
        if frames.is_empty() {
            return Ok(());
        }
        self.flushed = false;
        self.input.append(frames)?;
        self.drain()
    }

    /// Copy up to `out.len() / numChannels` frames out of the output
    /// staging buffer. Returns the number of frames copied; 0 is not an
    /// error, it just means nothing is available yet.
    pub fn read_i16(&mut self, out: &mut [i16]) -> usize {
        self.output.read_front(out)
    }

    pub fn read_f32(&mut self, out: &mut [f32]) -> usize {
        let channels = self.channels as usize;
        let max_frames = out.len() / channels;
        let mut scratch = vec![0i16; max_frames * channels];
        let frames = self.output.read_front(&mut scratch);
        for (dst, src) in out.iter_mut().zip(scratch.iter()) {
            *dst = format::i16_to_f32(*src);
        }
        frames
    }

    pub fn read_u8(&mut self, out: &mut [u8]) -> usize {
        let channels = self.channels as usize;
        let max_frames = out.len() / channels;
        let mut scratch = vec![0i16; max_frames * channels];
        let frames = self.output.read_front(&mut scratch);
        for (dst, src) in out.iter_mut().zip(scratch.iter()) {
            *dst = format::i16_to_u8(*src);
        }
        frames
    }

    pub fn samples_available(&self) -> usize {
        self.output.frames()
    }

    /// Force out whatever the stream can still produce: zero-pads the
    /// input up to `maxRequired`, drains once more, flushes the
    /// resampler's one-frame lookahead, then trims the silence-derived
    /// tail so total output matches `originalInputFrames / effectiveSpeed`.
    /// Calling this repeatedly with no intervening `write` is a no-op.
    pub fn flush(&mut self) -> Result<()> {
        if self.flushed {
            return Ok(());
        }

        let raw_remaining = self.input.frames();
        let divisor = self.duration_divisor().max(f64::EPSILON);
        let expected_additional = round_usize(raw_remaining as f64 / divisor);

        if raw_remaining >= self.max_required {
            self.drain()?;
        }
        let pad = self.max_required.saturating_sub(self.input.frames());
        self.input.append_silence(pad)?;

        let output_before = self.output.frames();
        self.drain()?;
        let resample_factor = self.resample_factor();
        self.resampler.flush(resample_factor, &mut self.output)?;

        let target_frames = output_before + expected_additional;
        if self.output.frames() > target_frames {
            self.output.truncate_back(target_frames);
        }

        tracing::debug!(target_frames, "flushed sonic stream");
        self.flushed = true;
        Ok(())
    }

    // -- internals -------------------------------------------------------

    fn synth_speed(&self) -> f64 {
        let speed = if self.nonlinear_speedup && self.speed > 1.0 {
            nonlinear_speed(self.speed)
        } else {
            self.speed
        };
        speed * self.pitch
    }

    fn resample_factor(&self) -> f64 {
        if self.use_chord_pitch {
            self.rate
        } else {
            self.rate / self.pitch
        }
    }

    /// Denominator of the flush truncation target: the total scale factor
    /// by which a frame count shrinks end to end (see `DESIGN.md` open
    /// question 5 for the derivation).
    fn duration_divisor(&self) -> f64 {
        if self.use_chord_pitch {
            self.speed * self.pitch * self.rate
        } else {
            self.speed * self.rate
        }
    }

    fn drain(&mut self) -> Result<()> {
        let channels = self.channels as usize;
        let mut position = 0usize;
        let mut scratch = SampleBuffer::new(channels, self.max_required.max(64));

        while self.input.frames() - position >= self.max_required {
            if self.remaining_input_to_copy > 0 {
                let n = self.remaining_input_to_copy.min(self.max_required);
                let window = self.input.frame_slice(position);
                scratch.clear();
                scratch.append(&window[..n * channels])?;
                self.remaining_input_to_copy -= n;
                position += n;
                let resample_factor = self.resample_factor();
                self.resampler
                    .process(scratch.as_slice(), resample_factor, &mut self.output)?;
                continue;
            }

            let synth_speed = self.synth_speed();
            let resample_factor = self.resample_factor();
            let quality_literal_unity =
                is_unity(self.speed) && is_unity(self.pitch) && is_unity(self.rate);
            let take_full_bypass = if self.quality {
                quality_literal_unity
            } else {
                is_unity(synth_speed) && is_unity(resample_factor)
            };

            if take_full_bypass {
                let remaining = self.input.frames() - position;
                let window = self.input.frame_slice(position);
                self.resampler
                    .process(window, resample_factor, &mut self.output)?;
                position += remaining;
                break;
            }

            if is_unity(synth_speed) {
                let n = self.max_required.min(self.input.frames() - position);
                let window = self.input.frame_slice(position);
                scratch.clear();
                scratch.append(&window[..n * channels])?;
                position += n;
                self.resampler
                    .process(scratch.as_slice(), resample_factor, &mut self.output)?;
                continue;
            }

            let window = self.input.frame_slice(position);
            let period = self.estimator.estimate(
                window,
                channels,
                self.sample_rate,
                self.min_period,
                self.max_period,
                self.quality,
                true,
            );

            scratch.clear();
            let outcome = if synth_speed > 1.0 {
                synth::skip_period(window, channels, period, synth_speed, &mut scratch)?
            } else {
                synth::insert_period(window, channels, period, synth_speed, &mut scratch)?
            };
            self.remaining_input_to_copy = outcome.remaining_input_to_copy;
            position += outcome.cursor_advance;
            self.resampler
                .process(scratch.as_slice(), resample_factor, &mut self.output)?;
        }

        self.input.consume_front(position);
        Ok(())
    }
}

fn period_bounds(sample_rate: u32) -> (usize, usize, usize) {
    let min_period = (sample_rate / MAX_PITCH_HZ) as usize;
    let max_period = (sample_rate / MIN_PITCH_HZ) as usize;
    (min_period, max_period, 2 * max_period)
}

fn clamp_logged(name: &str, requested: f64, clamped: f64) -> f64 {
    if (requested - clamped).abs() > f64::EPSILON {
        tracing::debug!(param = name, requested, clamped, "parameter clamped");
    }
    clamped
}

fn clamp_logged_u32(name: &str, requested: u32, clamped: u32) -> u32 {
    if requested != clamped {
        tracing::debug!(param = name, requested, clamped, "parameter clamped");
    }
    clamped
}

fn clamp_logged_u16(name: &str, requested: u16, clamped: u16) -> u16 {
    if requested != clamped {
        tracing::debug!(param = name, requested, clamped, "parameter clamped");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_defaults() {
        let s = Stream::new(44100, 2).unwrap();
        assert_eq!(s.sample_rate(), 44100);
        assert_eq!(s.num_channels(), 2);
        assert_eq!(s.speed(), 1.0);
        assert_eq!(s.pitch(), 1.0);
        assert_eq!(s.rate(), 1.0);
        assert_eq!(s.volume(), 1.0);
        assert!(!s.quality());
        assert!(!s.chord_pitch());
        assert!(!s.nonlinear_speedup());
    }

    #[test]
    fn setters_clamp_and_getters_report_clamped() {
        let mut s = Stream::new(44100, 1).unwrap();
        s.set_speed(0.0);
        assert_eq!(s.speed(), constants::MIN_SPEED);
        s.set_speed(1e9);
        assert_eq!(s.speed(), constants::MAX_SPEED);

        s.set_pitch(0.0);
        assert_eq!(s.pitch(), constants::MIN_PITCH);
        s.set_rate(1e9);
        assert_eq!(s.rate(), constants::MAX_RATE);
        s.set_volume(0.0);
        assert_eq!(s.volume(), constants::MIN_VOLUME);

        s.set_sample_rate(0);
        assert_eq!(s.sample_rate(), constants::MIN_SAMPLE_RATE);
        s.set_sample_rate(1_000_000);
        assert_eq!(s.sample_rate(), constants::MAX_SAMPLE_RATE);

        s.set_num_channels(0);
        assert_eq!(s.num_channels(), 1);
        s.set_num_channels(1000);
        assert_eq!(s.num_channels(), constants::MAX_CHANNELS);
    }

    #[test]
    fn invalid_encoding_rejected() {
        let mut s = Stream::new(44100, 2).unwrap();
        let err = s.write_i16(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StreamError::InvalidEncoding { .. }
        ));
    }

    #[test]
    fn flush_without_write_yields_no_output() {
        let mut s = Stream::new(44100, 1).unwrap();
        s.flush().unwrap();
        let mut buf = [0i16; 16];
        assert_eq!(s.read_i16(&mut buf), 0);
    }

    #[test]
    fn silence_in_silence_out() {
        let mut s = Stream::new(44100, 1).unwrap();
        let silence = vec![0i16; 10_000];
        s.write_i16(&silence).unwrap();
        s.flush().unwrap();
        let mut total = Vec::new();
        let mut buf = [0i16; 4096];
        loop {
            let n = s.read_i16(&mut buf);
            if n == 0 {
                break;
            }
            total.extend_from_slice(&buf[..n]);
        }
        assert!((total.len() as i64 - 10_000).abs() <= 1, "{}", total.len());
        assert!(total.iter().all(|&s| s == 0));
    }

    #[test]
    fn identity_params_round_trip_bit_exact_in_steady_state() {
        let mut s = Stream::new(8000, 1).unwrap();
        let input: Vec<i16> = (0..20_000).map(|i| ((i * 37) % 2000 - 1000) as i16).collect();
        s.write_i16(&input).unwrap();
        s.flush().unwrap();
        let mut total = Vec::new();
        let mut buf = [0i16; 4096];
        loop {
            let n = s.read_i16(&mut buf);
            if n == 0 {
                break;
            }
            total.extend_from_slice(&buf[..n]);
        }
        assert!((total.len() as i64 - input.len() as i64).abs() <= 1);
        // Steady state: once the one-frame lookahead settles, output tracks
        // input exactly sample for sample.
        let check_len = total.len().min(input.len()) - 8;
        assert_eq!(&total[4..check_len], &input[4..check_len]);
    }

    #[test]
    fn flush_is_idempotent() {
        let mut s = Stream::new(44100, 1).unwrap();
        s.write_i16(&vec![100i16; 5000]).unwrap();
        s.flush().unwrap();
        let mut buf = [0i16; 16384];
        let first = s.read_i16(&mut buf);
        s.flush().unwrap();
        s.flush().unwrap();
        let more = s.read_i16(&mut buf);
        assert_eq!(more, 0, "second/third flush should not manufacture more output, got {first} then {more}");
    }

    #[test]
    fn volume_saturates_full_scale_square_wave() {
        let mut s = Stream::new(44100, 1).unwrap();
        s.set_volume(10.0);
        let mut square = Vec::new();
        for i in 0..20_000 {
            square.push(if i % 2 == 0 { 32767 } else { -32768 });
        }
        s.write_i16(&square).unwrap();
        s.flush().unwrap();
        let mut buf = [0i16; 32768];
        let n = s.read_i16(&mut buf);
        for &v in &buf[..n] {
            assert!(v == 32767 || v == -32768, "unexpected sample {v}");
        }
    }

    #[test]
    fn speed_up_produces_shorter_output() {
        let mut s = Stream::new(22050, 1).unwrap();
        s.set_speed(2.0);
        let input: Vec<i16> = (0..44100)
            .map(|i| ((i as f64 * 0.05).sin() * 8000.0) as i16)
            .collect();
        let original_len = input.len();
        s.write_i16(&input).unwrap();
        s.flush().unwrap();
        let mut total = 0usize;
        let mut buf = [0i16; 8192];
        loop {
            let n = s.read_i16(&mut buf);
            if n == 0 {
                break;
            }
            total += n;
        }
        assert!(
            total < original_len,
            "2x speed should shrink duration: {total} vs {original_len}"
        );
    }

    #[test]
    fn slow_down_produces_longer_output() {
        let mut s = Stream::new(22050, 1).unwrap();
        s.set_speed(0.5);
        let input: Vec<i16> = (0..44100)
            .map(|i| ((i as f64 * 0.05).sin() * 8000.0) as i16)
            .collect();
        let original_len = input.len();
        s.write_i16(&input).unwrap();
        s.flush().unwrap();
        let mut total = 0usize;
        let mut buf = [0i16; 8192];
        loop {
            let n = s.read_i16(&mut buf);
            if n == 0 {
                break;
            }
            total += n;
        }
        assert!(
            total > original_len,
            "0.5x speed should grow duration: {total} vs {original_len}"
        );
    }

    #[test]
    fn chunking_invariance_for_speed_and_pitch() {
        let input: Vec<i16> = (0..44_100)
            .map(|i| ((i as f64 * 0.03).sin() * 6000.0) as i16)
            .collect();

        let mut whole = Stream::new(44100, 1).unwrap();
        whole.set_speed(1.5);
        whole.set_pitch(1.1);
        whole.write_i16(&input).unwrap();
        whole.flush().unwrap();
        let mut whole_out = Vec::new();
        let mut buf = [0i16; 8192];
        loop {
            let n = whole.read_i16(&mut buf);
            if n == 0 {
                break;
            }
            whole_out.extend_from_slice(&buf[..n]);
        }

        let mut chunked = Stream::new(44100, 1).unwrap();
        chunked.set_speed(1.5);
        chunked.set_pitch(1.1);
        for chunk in input.chunks(100) {
            chunked.write_i16(chunk).unwrap();
        }
        chunked.flush().unwrap();
        let mut chunked_out = Vec::new();
        loop {
            let n = chunked.read_i16(&mut buf);
            if n == 0 {
                break;
            }
            chunked_out.extend_from_slice(&buf[..n]);
        }

        assert_eq!(whole_out, chunked_out);
    }
}
