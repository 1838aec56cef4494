//! Two-stage AMDF pitch-period estimator (spec §4.3).
//!
//! Stage one runs the Average Magnitude Difference Function on a
//! box-averaged, down-sampled view of channel 0 to get a coarse period
//! cheaply; stage two re-runs at full resolution in a narrow window around
//! that estimate. Disabled (full-resolution only) when `quality` is set.
//! Exact refinement shape follows `examples/original_source/sonic_experimental.c`
//! (`downSampleInput`, `findPitchPeriodInRange`, `prevPeriodBetter`), per
//! `SPEC_FULL.md` §1.2. Candidate periods and previous-period fallback
//! decisions are traced at `trace` level.

use crate::constants::AMDF_FREQ;

/// Cross-call memory needed for the previous-period fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodEstimator {
    prev_period: usize,
    prev_min_diff: f64,
}

impl PeriodEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.prev_period = 0;
        self.prev_min_diff = 0.0;
    }

    /// Estimate the pitch period (in frames) for the window starting at the
    /// front of `frames`, which must hold at least `2 * max_period` frames.
    /// Only channel 0 is examined.
    pub fn estimate(
        &mut self,
        frames: &[i16],
        channels: usize,
        sample_rate: u32,
        min_period: usize,
        max_period: usize,
        quality: bool,
        prefer_new_period: bool,
    ) -> usize {
        let skip = ((sample_rate / AMDF_FREQ).max(1)) as usize;
        let available = frames.len() / channels;
        let two_stage = !quality && skip > 1;

        let (period, min_diff, max_diff) = if !two_stage {
            search_range(
                |i| frames[i * channels] as i64,
                available,
                min_period,
                max_period,
            )
        } else {
            let down = downsample_channel0(frames, channels, skip);
            let (p0, _, _) = search_range(
                |i| down[i] as i64,
                down.len(),
                (min_period / skip).max(1),
                (max_period / skip).max(1),
            );
            let p0_full = p0 * skip;
            let lo = p0_full.saturating_sub(4 * skip).max(min_period);
            let hi = (p0_full + 4 * skip).min(max_period);
            search_range(|i| frames[i * channels] as i64, available, lo, hi)
        };
        tracing::trace!(skip, two_stage, period, min_diff, max_diff, "pitch period candidate");

        let chosen = self.choose(period, min_diff, max_diff, prefer_new_period);
        self.prev_period = period;
        self.prev_min_diff = min_diff;
        chosen
    }

    fn choose(&self, period: usize, min_diff: f64, max_diff: f64, prefer_new_period: bool) -> usize {
        if self.prev_period == 0 || min_diff == 0.0 {
            return period;
        }
        let use_new = if prefer_new_period {
            !(max_diff <= 3.0 * min_diff && 2.0 * min_diff > 3.0 * self.prev_min_diff)
        } else {
            min_diff <= self.prev_min_diff
        };
        if !use_new {
            tracing::trace!(
                candidate = period,
                prev = self.prev_period,
                "period estimator stuck with previous period"
            );
        }
        if use_new {
            period
        } else {
            self.prev_period
        }
    }
}

/// Box-average `skip` consecutive channel-0 samples into each output bin,
/// matching `sonic_experimental.c`'s `downSampleInput`.
fn downsample_channel0(frames: &[i16], channels: usize, skip: usize) -> Vec<i16> {
    let available = frames.len() / channels;
    let bins = available / skip;
    let mut out = Vec::with_capacity(bins);
    for b in 0..bins {
        let mut sum: i64 = 0;
        for j in 0..skip {
            sum += frames[(b * skip + j) * channels] as i64;
        }
        out.push((sum / skip as i64) as i16);
    }
    out
}

/// AMDF search over `[min_p, max_p]`, clamped so every candidate's window
/// fits within `len` samples. Returns `(best_period, min_diff_per_sample,
/// max_diff_per_sample)`. The comparison rule cross-multiplies by the
/// candidate periods instead of dividing, per §4.3.
fn search_range<F: Fn(usize) -> i64>(
    sample_at: F,
    len: usize,
    min_p: usize,
    max_p: usize,
) -> (usize, f64, f64) {
    let hard_max = if len >= 2 { len / 2 } else { 1 };
    let max_p = max_p.min(hard_max).max(1);
    let min_p = min_p.min(max_p).max(1);

    let mut best_period = 0usize;
    let mut best_diff = 0i64;
    let mut worst_period = 0usize;
    let mut worst_diff = 0i64;

    for period in min_p..=max_p {
        let mut diff = 0i64;
        for i in 0..period {
            diff += (sample_at(i) - sample_at(i + period)).abs();
        }
        if best_period == 0 || diff * best_period as i64 < best_diff * period as i64 {
            best_diff = diff;
            best_period = period;
        }
        if worst_period == 0 || diff * worst_period as i64 > worst_diff * period as i64 {
            worst_diff = diff;
            worst_period = period;
        }
    }

    let min_diff = best_diff as f64 / best_period as f64;
    let max_diff = worst_diff as f64 / worst_period as f64;
    (best_period, min_diff, max_diff)
}
