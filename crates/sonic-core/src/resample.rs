//! Linear-interpolation rate/pitch resampler with persistent fractional
//! phase (spec §4.5).
//!
//! The fractional position advances once per *output* sample regardless of
//! how input arrived, so streaming through many small `write` calls is
//! bit-identical to a single call on the concatenated input (spec §8,
//! chunking invariance). One frame of lookahead is always kept buffered;
//! `flush` supplies its missing successor by duplicating the last frame.

use crate::buffer::SampleBuffer;
use crate::error::Result;

#[derive(Debug)]
pub struct RateResampler {
    channels: usize,
    pending: SampleBuffer,
    pos: f64,
    /// Set once `flush` has duplicated the trailing lookahead frame; cleared
    /// by `process` as soon as real data arrives again. Without this, a
    /// second `flush` with nothing new appended would duplicate the
    /// already-duplicated frame and re-emit it.
    lookahead_extended: bool,
}

impl RateResampler {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            pending: SampleBuffer::new(channels, 64),
            pos: 0.0,
            lookahead_extended: false,
        }
    }

    pub fn reset_channels(&mut self, channels: usize) {
        self.channels = channels;
        self.pending.reset_channels(channels);
        self.pos = 0.0;
        self.lookahead_extended = false;
    }

    /// Append `input` (already at the synthesiser's output rate) and emit
    /// every output frame that can be produced with the lookahead currently
    /// available.
    pub fn process(&mut self, input: &[i16], factor: f64, out: &mut SampleBuffer) -> Result<()> {
        if !input.is_empty() {
            self.lookahead_extended = false;
        }
        self.pending.append(input)?;
        self.drain(factor, out)
    }

    /// Duplicate the final buffered frame so its position can be
    /// interpolated against, then drain whatever that unlocks. Idempotent:
    /// calling twice with nothing new appended in between drains nothing
    /// further, since the duplication only happens once per real tail.
    pub fn flush(&mut self, factor: f64, out: &mut SampleBuffer) -> Result<()> {
        if self.pending.is_empty() || self.lookahead_extended {
            return Ok(());
        }
        let channels = self.channels;
        let last = self.pending.frames() - 1;
        let last_frame = self.pending.as_slice()[last * channels..(last + 1) * channels].to_vec();
        self.pending.append(&last_frame)?;
        self.lookahead_extended = true;
        self.drain(factor, out)
    }

    fn drain(&mut self, factor: f64, out: &mut SampleBuffer) -> Result<()> {
        let channels = self.channels;
        let mut produced = Vec::new();
        loop {
            let idx = self.pos.floor() as usize;
            if idx + 1 >= self.pending.frames() {
                break;
            }
            let alpha = self.pos - idx as f64;
            let src = self.pending.as_slice();
            for c in 0..channels {
                let x0 = src[idx * channels + c] as f64;
                let x1 = src[(idx + 1) * channels + c] as f64;
                let y = (1.0 - alpha) * x0 + alpha * x1;
                produced.push(y.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
            }
            self.pos += factor;
        }
        out.append(&produced)?;
        let drop = self.pos.floor() as usize;
        if drop > 0 {
            self.pending.consume_front(drop);
            self.pos -= drop as f64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unity_factor_passes_samples_through_after_lookahead() {
        let mut rs = RateResampler::new(1);
        let mut out = SampleBuffer::new(1, 16);
        rs.process(&[1, 2, 3, 4], 1.0, &mut out).unwrap();
        // Last frame held back as lookahead.
        assert_eq!(out.as_slice(), &[1, 2, 3]);
        rs.flush(1.0, &mut out).unwrap();
        assert_eq!(out.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn chunking_does_not_change_output() {
        let input: Vec<i16> = (0..200).map(|i| (i * 37 % 2000) as i16 - 1000).collect();
        let factor = 1.37;

        let mut whole = SampleBuffer::new(1, 16);
        let mut rs_whole = RateResampler::new(1);
        rs_whole.process(&input, factor, &mut whole).unwrap();
        rs_whole.flush(factor, &mut whole).unwrap();

        let mut chunked = SampleBuffer::new(1, 16);
        let mut rs_chunked = RateResampler::new(1);
        for chunk in input.chunks(7) {
            rs_chunked.process(chunk, factor, &mut chunked).unwrap();
        }
        rs_chunked.flush(factor, &mut chunked).unwrap();

        assert_eq!(whole.as_slice(), chunked.as_slice());
    }

    #[test]
    fn downsampling_factor_shrinks_output_roughly_proportionally() {
        let input: Vec<i16> = (0..1000).collect();
        let mut rs = RateResampler::new(1);
        let mut out = SampleBuffer::new(1, 16);
        rs.process(&input, 2.0, &mut out).unwrap();
        rs.flush(2.0, &mut out).unwrap();
        assert!((out.frames() as i64 - 500).abs() <= 2);
    }

    #[test]
    fn flush_with_no_pending_data_is_a_no_op() {
        let mut rs = RateResampler::new(1);
        let mut out = SampleBuffer::new(1, 16);
        rs.flush(1.0, &mut out).unwrap();
        assert_eq!(out.frames(), 0);
    }

    #[test]
    fn flushing_twice_in_a_row_does_not_duplicate_the_tail_frame() {
        let mut rs = RateResampler::new(1);
        let mut out = SampleBuffer::new(1, 16);
        rs.process(&[1, 2, 3, 4], 1.0, &mut out).unwrap();
        rs.flush(1.0, &mut out).unwrap();
        assert_eq!(out.as_slice(), &[1, 2, 3, 4]);
        rs.flush(1.0, &mut out).unwrap();
        assert_eq!(out.as_slice(), &[1, 2, 3, 4]);
    }
}
