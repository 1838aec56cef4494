//! Non-linear speed curve (spec §4.7): speeds up already-fast speech less
//! aggressively than a linear multiplier would.

/// Breakpoints `(speed, adjustedSpeed)`, fixed at `(1, 1)` and monotonic,
/// matching the reference's own suggested table.
const BREAKPOINTS: &[(f64, f64)] = &[
    (1.0, 1.0),
    (1.5, 1.4),
    (2.0, 1.7),
    (3.0, 2.1),
    (4.0, 2.4),
    (6.0, 2.9),
];

/// Map a requested `speed` to the effective speed used for one synthesis
/// period when `nonlinearSpeedup` is enabled. Clamps outside `[1, 6]` to the
/// curve's endpoints, consistent with §4.7 and §9(ii) (the curve shape is an
/// open question; any monotonic, continuous, fixed-at-1 curve conforms).
pub fn nonlinear_speed(speed: f64) -> f64 {
    if speed <= BREAKPOINTS[0].0 {
        return BREAKPOINTS[0].1;
    }
    let last = BREAKPOINTS[BREAKPOINTS.len() - 1];
    if speed >= last.0 {
        return last.1;
    }
    for window in BREAKPOINTS.windows(2) {
        let (x0, y0) = window[0];
        let (x1, y1) = window[1];
        if speed <= x1 {
            let t = (speed - x0) / (x1 - x0);
            return y0 + t * (y1 - y0);
        }
    }
    speed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_at_one() {
        assert_eq!(nonlinear_speed(1.0), 1.0);
    }

    #[test]
    fn strictly_less_above_one() {
        for s in [1.1, 1.5, 2.0, 3.0, 4.5, 6.0, 9.0] {
            assert!(nonlinear_speed(s) < s, "nonlinear({s}) should be < {s}");
        }
    }

    #[test]
    fn monotonic_non_decreasing() {
        let mut prev = nonlinear_speed(0.1);
        let mut s = 0.1;
        while s <= 10.0 {
            let v = nonlinear_speed(s);
            assert!(v >= prev - 1e-12, "not monotonic at {s}: {v} < {prev}");
            prev = v;
            s += 0.05;
        }
    }

    #[test]
    fn clamps_outside_table_range() {
        assert_eq!(nonlinear_speed(0.2), nonlinear_speed(1.0));
        assert_eq!(nonlinear_speed(20.0), nonlinear_speed(6.0));
    }

    #[test]
    fn matches_breakpoints_exactly() {
        for &(x, y) in BREAKPOINTS {
            assert!((nonlinear_speed(x) - y).abs() < 1e-9);
        }
    }
}
