//! Synthetic placeholder audio.
//!
//! When no speech model is available the service still answers with a
//! deterministic tone: three additive harmonics of 440 Hz, shaped by short
//! linear fades so playback does not click. The duration tracks how long the
//! text would take to read aloud.

use std::f64::consts::PI;

/// Sample rate of generated fallback audio.
pub const FALLBACK_SAMPLE_RATE: u32 = 24_000;

/// Reading speed for text containing CJK ideographs, in characters/second.
const CJK_CHARS_PER_SEC: f64 = 3.0;

/// Reading speed for other text, in characters/second.
const DEFAULT_CHARS_PER_SEC: f64 = 5.0;

/// Shortest tone ever produced, in seconds.
const MIN_DURATION_SECS: f64 = 1.0;

/// (frequency Hz, amplitude) of each harmonic.
const HARMONICS: [(f64, f64); 3] = [(440.0, 0.3), (880.0, 0.15), (1320.0, 0.1)];

/// A rendered fallback clip.
#[derive(Debug, Clone)]
pub struct FallbackAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

/// Whether `text` contains a CJK unified ideograph.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

/// Estimated spoken duration of `text` at the given speed multiplier.
pub fn estimate_duration(text: &str, speed: f64) -> f64 {
    let chars_per_sec = if contains_cjk(text) {
        CJK_CHARS_PER_SEC
    } else {
        DEFAULT_CHARS_PER_SEC
    };
    let chars = text.chars().count() as f64;
    (chars / chars_per_sec / speed).max(MIN_DURATION_SECS)
}

/// Render the placeholder tone for `text`.
pub fn generate_fallback_audio(text: &str, speed: f64, sample_rate: u32) -> FallbackAudio {
    let duration = estimate_duration(text, speed);
    let n = (sample_rate as f64 * duration) as usize;
    let fade = ((0.01 * sample_rate as f64) as usize).min(n / 4);

    let samples = (0..n)
        .map(|i| {
            let t = i as f64 * duration / n as f64;
            let value: f64 = HARMONICS
                .iter()
                .map(|&(freq, amp)| amp * (2.0 * PI * freq * t).sin())
                .sum();
            (value * envelope(i, n, fade) * 32767.0) as i16
        })
        .collect();

    FallbackAudio {
        samples,
        sample_rate,
        duration_secs: duration,
    }
}

/// Linear fade-in over the first `fade` samples and fade-out over the last.
fn envelope(i: usize, n: usize, fade: usize) -> f64 {
    if fade == 0 {
        return 1.0;
    }
    let ramp = |k: usize| {
        if fade == 1 {
            0.0
        } else {
            k as f64 / (fade - 1) as f64
        }
    };
    if i < fade {
        ramp(i)
    } else if i >= n - fade {
        ramp(n - 1 - i)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_duration() {
        assert_eq!(estimate_duration("hi", 1.0), 1.0);
        assert_eq!(estimate_duration("", 2.0), 1.0);
    }

    #[test]
    fn test_duration_monotonic_in_length() {
        let mut prev = 0.0;
        for len in [10, 20, 40, 80, 160] {
            let d = estimate_duration(&"a".repeat(len), 1.0);
            assert!(d >= prev);
            prev = d;
        }
        assert_eq!(estimate_duration(&"a".repeat(50), 1.0), 10.0);
    }

    #[test]
    fn test_duration_inverse_in_speed() {
        let text = "a".repeat(100);
        let base = estimate_duration(&text, 1.0);
        assert!((estimate_duration(&text, 2.0) - base / 2.0).abs() < 1e-9);
        assert!((estimate_duration(&text, 0.5) - base * 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_cjk_reads_slower_per_char() {
        // 30 ideographs and 50 latin letters both last 10 seconds.
        let cjk = "你".repeat(30);
        let latin = "a".repeat(50);
        assert!(contains_cjk(&cjk));
        assert!(!contains_cjk(&latin));
        assert_eq!(estimate_duration(&cjk, 1.0), 10.0);
        assert_eq!(estimate_duration(&latin, 1.0), 10.0);
    }

    #[test]
    fn test_sample_count_and_fades() {
        let audio = generate_fallback_audio(&"a".repeat(10), 1.0, FALLBACK_SAMPLE_RATE);
        assert_eq!(audio.duration_secs, 2.0);
        assert_eq!(audio.samples.len(), 48_000);
        assert_eq!(audio.samples[0], 0);
        assert_eq!(*audio.samples.last().unwrap(), 0);

        let peak = audio.samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak > 10_000);
        assert!(peak <= (0.55 * 32767.0) as u16);
    }

    #[test]
    fn test_deterministic() {
        let a = generate_fallback_audio("hello world", 1.3, 16_000);
        let b = generate_fallback_audio("hello world", 1.3, 16_000);
        assert_eq!(a.samples, b.samples);
    }
}
