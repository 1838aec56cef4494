//! Expandable interleaved-sample staging (spec §4.1).
//!
//! Growth policy mirrors the reference `enlargeInputBufferIfNeeded`/
//! `enlargeOutputBufferIfNeeded` (`examples/original_source/sonic.c`):
//! `newCapacity = capacity + capacity/2 + needed`, only when the current
//! capacity can't already hold the incoming frames. Allocation goes
//! through `try_reserve_exact` so a failure surfaces as `StreamError`
//! rather than aborting the process.

use crate::error::{Result, StreamError};

/// A contiguous run of signed-16 samples, addressed per-frame (a frame is
/// `channels` consecutive samples). One instance backs the `Stream`'s
/// input staging, another its output staging.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    channels: usize,
    data: Vec<i16>,
}

impl SampleBuffer {
    pub fn new(channels: usize, initial_capacity_frames: usize) -> Self {
        let mut data = Vec::new();
        // Best-effort: if this fails, the first real `reserve` call pays
        // for it instead of the constructor.
        let _ = data.try_reserve_exact(initial_capacity_frames * channels);
        Self { channels, data }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Change the frame width in place, discarding any buffered content
    /// (used when `numChannels` changes on the owning stream).
    pub fn reset_channels(&mut self, channels: usize) {
        self.channels = channels;
        self.data.clear();
    }

    pub fn frames(&self) -> usize {
        self.data.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [i16] {
        &mut self.data
    }

    /// View starting at `start_frame`, running to the end of the buffer.
    pub fn frame_slice(&self, start_frame: usize) -> &[i16] {
        &self.data[start_frame * self.channels..]
    }

    /// Ensure at least `additional_frames` more frames fit without a
    /// further reallocation.
    pub fn reserve(&mut self, additional_frames: usize) -> Result<()> {
        let needed = additional_frames * self.channels;
        if self.data.len() + needed <= self.data.capacity() {
            return Ok(());
        }
        let cap = self.data.capacity();
        let new_cap = cap + cap / 2 + needed;
        self.data
            .try_reserve_exact(new_cap - self.data.len())
            .map_err(|_| StreamError::OutOfMemory {
                requested_frames: additional_frames,
            })?;
        tracing::trace!(
            new_capacity_frames = new_cap / self.channels,
            "grew sample buffer"
        );
        Ok(())
    }

    /// Append already-interleaved frame data (`frame_data.len()` must be a
    /// multiple of `channels`) to the tail.
    pub fn append(&mut self, frame_data: &[i16]) -> Result<()> {
        if frame_data.is_empty() {
            return Ok(());
        }
        self.reserve(frame_data.len() / self.channels)?;
        self.data.extend_from_slice(frame_data);
        Ok(())
    }

    /// Append `count` frames of silence.
    pub fn append_silence(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.reserve(count)?;
        let new_len = self.data.len() + count * self.channels;
        self.data.resize(new_len, 0);
        Ok(())
    }

    /// Drop the first `frames` frames, shifting the remainder down.
    pub fn consume_front(&mut self, frames: usize) {
        let n = (frames * self.channels).min(self.data.len());
        self.data.drain(0..n);
    }

    /// Drop the last `frames` frames (used by flush truncation).
    pub fn truncate_back(&mut self, frames: usize) {
        let keep = frames.saturating_mul(self.channels).min(self.data.len());
        self.data.truncate(keep);
    }

    /// Copy up to `out.len()/channels` frames from the front into `out`
    /// (interleaved), removing them. Returns the number of frames copied.
    pub fn read_front(&mut self, out: &mut [i16]) -> usize {
        let max_frames = out.len() / self.channels;
        let frames = self.frames().min(max_frames);
        let n = frames * self.channels;
        out[..n].copy_from_slice(&self.data[..n]);
        self.data.drain(0..n);
        frames
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_consume_round_trip() {
        let mut buf = SampleBuffer::new(2, 4);
        buf.append(&[1, 2, 3, 4]).unwrap();
        assert_eq!(buf.frames(), 2);
        buf.consume_front(1);
        assert_eq!(buf.as_slice(), &[3, 4]);
    }

    #[test]
    fn read_front_drains_no_more_than_available() {
        let mut buf = SampleBuffer::new(1, 4);
        buf.append(&[10, 20, 30]).unwrap();
        let mut out = [0i16; 8];
        let n = buf.read_front(&mut out);
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[10, 20, 30]);
        assert_eq!(buf.frames(), 0);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut buf = SampleBuffer::new(1, 1);
        for i in 0..1000i16 {
            buf.append(&[i]).unwrap();
        }
        assert_eq!(buf.frames(), 1000);
    }

    #[test]
    fn truncate_back_trims_tail() {
        let mut buf = SampleBuffer::new(1, 4);
        buf.append(&[1, 2, 3, 4]).unwrap();
        buf.truncate_back(2);
        assert_eq!(buf.as_slice(), &[1, 2]);
    }
}
