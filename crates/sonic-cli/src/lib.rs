//! Library half of the `sonic` CLI: WAV I/O and spectrogram rendering,
//! split out of `main.rs` so both have integration test coverage.

pub mod spectrogram;
pub mod wave;
