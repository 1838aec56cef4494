//! Streaming time-scale and pitch modifier for speech, driven by
//! independent speed, pitch, rate, and volume controls.
//!
//! [`Stream`] is the entry point: push interleaved PCM in with `write_*`,
//! pull processed PCM back out with `read_*`, and call [`Stream::flush`]
//! once the input is exhausted to drain the last partial period.
//!
//! The pipeline per period is pitch estimation ([`period`]) feeding
//! overlap-add synthesis ([`synth`]) feeding a persistent-phase linear
//! resampler ([`resample`]) that applies the independent rate/pitch ratio.
//! [`buffer`] backs the staging areas on both sides, and [`format`]
//! bridges the caller-facing `i16`/`u8`/`f32` encodings to the internal
//! signed-16 representation.

mod buffer;
mod constants;
mod error;
mod format;
mod nonlinear;
mod period;
mod resample;
mod stream;
mod synth;

pub use constants::{
    MAX_CHANNELS, MAX_PITCH, MAX_RATE, MAX_SAMPLE_RATE, MAX_SPEED, MAX_VOLUME, MIN_CHANNELS,
    MIN_PITCH, MIN_RATE, MIN_SAMPLE_RATE, MIN_SPEED, MIN_VOLUME,
};
pub use error::{Result, StreamError};
pub use format::SampleFormat;
pub use stream::Stream;
