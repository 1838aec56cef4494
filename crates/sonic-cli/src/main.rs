//! Reference command-line driver for `sonic-core`: speeds up, slows down,
//! re-pitches, and rescales the volume of a wave file, with an optional
//! PGM spectrogram of the result.
//!
//! Flag set and drive loop are grounded on `examples/original_source/main.c`
//! (`runSonic`): read a chunk, write it (or flush at end of input), then
//! drain everything the stream is willing to produce before reading more.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use sonic_cli::{spectrogram, wave};
use sonic_core::Stream;
use tracing_subscriber::EnvFilter;

const BUFFER_FRAMES: usize = 2048;

/// Change the speed, pitch, rate, or volume of a wave file.
#[derive(Parser, Debug)]
#[command(name = "sonic", about = "Streaming speed/pitch/rate/volume changer")]
struct Args {
    /// Input wave file (signed-16 PCM).
    infile: PathBuf,
    /// Output wave file (signed-16 PCM).
    outfile: PathBuf,

    /// Set speed up factor. 2.0 means 2X faster.
    #[arg(short = 's', long, default_value_t = 1.0)]
    speed: f64,

    /// Set pitch scaling factor. 1.3 means 30% higher.
    #[arg(short = 'p', long, default_value_t = 1.0)]
    pitch: f64,

    /// Set playback rate. 2.0 means 2X faster, and 2X pitch.
    #[arg(short = 'r', long, default_value_t = 1.0)]
    rate: f64,

    /// Scale volume by a constant factor.
    #[arg(short = 'v', long, default_value_t = 1.0)]
    volume: f64,

    /// Modify pitch by emulating vocal chords vibrating faster or slower.
    #[arg(short = 'c', long)]
    chord_pitch: bool,

    /// Disable speed-up heuristics. May increase quality.
    #[arg(short = 'q', long)]
    quality: bool,

    /// Enable nonlinear speedup.
    #[arg(short = 'n', long)]
    nonlinear_speedup: bool,

    /// Generate a spectrogram in sonic.pgm: width then height.
    #[arg(short = 'S', long, num_args = 2, value_names = ["WIDTH", "HEIGHT"])]
    spectrogram: Option<Vec<u32>>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sonic: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let mut infile = wave::WaveIn::open(&args.infile)?;
    let mut outfile = wave::WaveOut::create(&args.outfile, infile.sample_rate, infile.num_channels)?;

    let mut stream = Stream::new(infile.sample_rate, infile.num_channels)
        .context("failed to create sonic stream")?;
    stream.set_speed(args.speed);
    stream.set_pitch(args.pitch);
    stream.set_rate(args.rate);
    stream.set_volume(args.volume);
    stream.set_chord_pitch(args.chord_pitch);
    stream.set_quality(args.quality);
    stream.set_nonlinear_speedup(args.nonlinear_speedup);

    tracing::info!(
        speed = args.speed,
        pitch = args.pitch,
        rate = args.rate,
        volume = args.volume,
        chord_pitch = args.chord_pitch,
        quality = args.quality,
        "processing {}",
        args.infile.display()
    );

    let channels = infile.num_channels as usize;
    let read_samples = (BUFFER_FRAMES / channels).max(1) * channels;
    let mut out_buf = vec![0i16; read_samples];
    let mut processed = Vec::new();

    loop {
        let chunk = infile.read_chunk(read_samples)?;
        if chunk.is_empty() {
            stream.flush().context("failed to flush sonic stream")?;
        } else {
            stream
                .write_i16(&chunk)
                .context("failed to write samples to sonic stream")?;
        }
        loop {
            let n = stream.read_i16(&mut out_buf);
            if n == 0 {
                break;
            }
            let produced = &out_buf[..n * channels];
            outfile.write_chunk(produced)?;
            if args.spectrogram.is_some() {
                processed.extend_from_slice(produced);
            }
        }
        if chunk.is_empty() {
            break;
        }
    }

    outfile.finalize()?;

    if let Some(dims) = args.spectrogram {
        let (cols, rows) = (dims[0] as usize, dims[1] as usize);
        tracing::info!(cols, rows, "computing spectrogram");
        let spectrogram = spectrogram::build_spectrogram(&processed, channels, infile.sample_rate);
        let bitmap = spectrogram.to_bitmap(rows, cols);
        spectrogram::write_pgm(&PathBuf::from("sonic.pgm"), cols, rows, &bitmap)?;
    }

    Ok(())
}
