//! Musical position to wall-clock conversion.

/// Convert a musical position to seconds.
///
/// `seconds = pos * numerator / bpm * 60`. Callers must ensure `bpm > 0`.
pub fn pos_to_time(pos: f64, bpm: f64, time_sig_numerator: u32) -> f64 {
    pos * time_sig_numerator as f64 / bpm * 60.0
}

/// Round a time in seconds to the nearest sample index.
pub fn seconds_to_samples(seconds: f64, sample_rate: u32) -> usize {
    if seconds <= 0.0 || !seconds.is_finite() {
        return 0;
    }
    (seconds * sample_rate as f64).round() as usize
}

/// Inverse of [`seconds_to_samples`], without rounding.
pub fn samples_to_seconds(samples: usize, sample_rate: u32) -> f64 {
    samples as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_bar_at_120_in_four_four_is_two_seconds() {
        let t = pos_to_time(1.0, 120.0, 4);
        assert!((t - 2.0).abs() < 1e-12, "got {t}");
    }

    #[test]
    fn zero_position_is_zero() {
        assert_eq!(pos_to_time(0.0, 97.0, 3), 0.0);
    }

    #[test]
    fn monotonic_and_linear() {
        for &bpm in &[40.0, 90.0, 120.0, 174.0] {
            for &num in &[2u32, 3, 4, 7] {
                let mut prev = pos_to_time(0.0, bpm, num);
                for i in 1..200 {
                    let x = i as f64 * 0.37;
                    let t = pos_to_time(x, bpm, num);
                    assert!(t > prev, "not increasing at {x} (bpm {bpm}, num {num})");
                    let doubled = pos_to_time(2.0 * x, bpm, num);
                    assert!(
                        (doubled - 2.0 * t).abs() < 1e-9,
                        "not linear at {x}: {doubled} vs {}",
                        2.0 * t
                    );
                    prev = t;
                }
            }
        }
    }

    #[test]
    fn sample_rounding() {
        assert_eq!(seconds_to_samples(1.0, 48000), 48000);
        assert_eq!(seconds_to_samples(0.5 / 48000.0, 48000), 1);
        assert_eq!(seconds_to_samples(-1.0, 48000), 0);
        assert_eq!(seconds_to_samples(f64::NAN, 48000), 0);
        assert!((samples_to_seconds(24000, 48000) - 0.5).abs() < 1e-12);
    }
}
