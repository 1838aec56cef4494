//! Error kinds for the streaming engine (spec §7).
//!
//! Only two conditions are recoverable at runtime: a failed allocation, and
//! a caller-supplied sample count that doesn't divide evenly into frames.
//! Parameter clamping is *not* an error — setters clamp silently and the
//! getter reports the clamped value (§3 invariant 5).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// A buffer growth (`SampleBuffer::reserve`) failed to allocate.
    /// The stream is left exactly as it was before the call that
    /// triggered the growth; no partial output is exposed.
    #[error("failed to grow sample buffer by {requested_frames} frames: allocator out of memory")]
    OutOfMemory { requested_frames: usize },

    /// `count` samples were supplied but `count` is not a multiple of
    /// `channels`, or a zero-length buffer was paired with a non-zero
    /// count.
    #[error("sample count {count} is not a multiple of numChannels ({channels})")]
    InvalidEncoding { count: usize, channels: usize },
}

pub type Result<T> = std::result::Result<T, StreamError>;
